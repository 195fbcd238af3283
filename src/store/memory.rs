use anyhow::{bail, Result};
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};

use crate::model::{
    Key, NewPerson, NewVinylRecord, Person, PersonRelation, Rating, RecordStore, VinylRecord,
};
use crate::store::traits::{
    FriendLinkStore, Page, PersonStore, RatingStore, RecordStoreCatalog, RecordStoreDraft, Store,
    VinylRecordStore,
};

#[derive(Debug, Default)]
struct Tables {
    /// Stored without loaded relations
    people: BTreeMap<Key, Person>,
    friendships: BTreeMap<Key, BTreeSet<Key>>,
    vinyl_records: BTreeMap<Key, VinylRecord>,
    /// Stored without loaded ratings
    record_stores: BTreeMap<Key, RecordStore>,
    ratings: BTreeMap<Key, Rating>,
    last_person: Key,
    last_vinyl_record: Key,
    last_record_store: Key,
    last_rating: Key,
}

impl Tables {
    fn next_person_key(&mut self) -> Key {
        self.last_person += 1;
        self.last_person
    }

    fn next_vinyl_record_key(&mut self) -> Key {
        self.last_vinyl_record += 1;
        self.last_vinyl_record
    }

    fn next_record_store_key(&mut self) -> Key {
        self.last_record_store += 1;
        self.last_record_store
    }

    fn next_rating_key(&mut self) -> Key {
        self.last_rating += 1;
        self.last_rating
    }

    fn load_person(&self, key: Key, include: &[PersonRelation]) -> Option<Person> {
        let mut person = self.people.get(&key)?.clone();

        if include.contains(&PersonRelation::Friends) {
            let friends: Vec<Person> = self
                .friendships
                .get(&key)
                .map(|keys| {
                    keys.iter()
                        .filter_map(|k| self.people.get(k).cloned())
                        .collect()
                })
                .unwrap_or_default();
            person.friends = Some(friends);
        }

        if include.contains(&PersonRelation::VinylRecords) {
            person.vinyl_records = Some(self.records_of(key));
        }

        Some(person)
    }

    fn records_of(&self, person: Key) -> Vec<VinylRecord> {
        self.vinyl_records
            .values()
            .filter(|r| r.person_id == person)
            .cloned()
            .collect()
    }

    fn load_record_store(&self, key: Key, include_ratings: bool) -> Option<RecordStore> {
        let mut store = self.record_stores.get(&key)?.clone();
        if include_ratings {
            store.ratings = Some(
                self.ratings
                    .values()
                    .filter(|r| r.record_store_id == key)
                    .cloned()
                    .collect(),
            );
        }
        Some(store)
    }
}

/// Process-local store; every operation holds the lock for its whole duration,
/// which makes multi-step mutations atomic.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl PersonStore for MemoryStore {
    async fn list_people(&self, page: Page) -> Result<Vec<Person>> {
        let tables = self.tables.read();
        Ok(tables
            .people
            .values()
            .skip(page.skip)
            .take(page.take)
            .cloned()
            .collect())
    }

    async fn count_people(&self) -> Result<usize> {
        Ok(self.tables.read().people.len())
    }

    async fn get_person(&self, key: Key, include: &[PersonRelation]) -> Result<Option<Person>> {
        Ok(self.tables.read().load_person(key, include))
    }

    async fn person_exists(&self, key: Key) -> Result<bool> {
        Ok(self.tables.read().people.contains_key(&key))
    }

    async fn insert_person(&self, person: NewPerson) -> Result<Person> {
        let mut tables = self.tables.write();
        let person_id = tables.next_person_key();

        let stored = Person {
            person_id,
            email: person.email,
            first_name: person.first_name,
            last_name: person.last_name,
            date_of_birth: person.date_of_birth,
            gender: person.gender,
            number_of_records_on_wish_list: person.number_of_records_on_wish_list,
            amount_of_cash_to_spend: person.amount_of_cash_to_spend,
            friends: None,
            vinyl_records: None,
        };
        tables.people.insert(person_id, stored);

        let mut records = Vec::with_capacity(person.vinyl_records.len());
        for record in person.vinyl_records {
            let record = record.into_record(tables.next_vinyl_record_key(), person_id);
            tables.vinyl_records.insert(record.vinyl_record_id, record.clone());
            records.push(record);
        }

        let mut created = tables.people[&person_id].clone();
        if !records.is_empty() {
            created.vinyl_records = Some(records);
        }
        Ok(created)
    }

    async fn update_person(&self, person: &Person) -> Result<bool> {
        let mut tables = self.tables.write();
        let Some(stored) = tables.people.get_mut(&person.person_id) else {
            return Ok(false);
        };
        *stored = Person {
            friends: None,
            vinyl_records: None,
            ..person.clone()
        };
        Ok(true)
    }

    async fn delete_person(&self, key: Key) -> Result<bool> {
        let mut tables = self.tables.write();
        if tables.people.remove(&key).is_none() {
            return Ok(false);
        }
        tables.friendships.remove(&key);
        for friends in tables.friendships.values_mut() {
            friends.remove(&key);
        }
        tables.vinyl_records.retain(|_, r| r.person_id != key);
        tables.ratings.retain(|_, r| r.rated_by != key);
        Ok(true)
    }
}

#[async_trait::async_trait]
impl FriendLinkStore for MemoryStore {
    async fn add_friend(&self, owner: Key, friend: Key) -> Result<()> {
        let mut tables = self.tables.write();
        if !tables.people.contains_key(&owner) || !tables.people.contains_key(&friend) {
            bail!("Cannot link person {} to person {}: person missing", owner, friend);
        }
        tables.friendships.entry(owner).or_default().insert(friend);
        Ok(())
    }

    async fn replace_friend(&self, owner: Key, current: Key, replacement: Key) -> Result<()> {
        let mut tables = self.tables.write();
        if !tables.people.contains_key(&replacement) {
            bail!("Cannot link person {} to missing person {}", owner, replacement);
        }
        let Some(friends) = tables.friendships.get_mut(&owner) else {
            bail!("Person {} has no friends to replace", owner);
        };
        if !friends.remove(&current) {
            bail!("Person {} is not linked to person {}", owner, current);
        }
        friends.insert(replacement);
        Ok(())
    }

    async fn remove_friend(&self, owner: Key, friend: Key) -> Result<bool> {
        let mut tables = self.tables.write();
        Ok(tables
            .friendships
            .get_mut(&owner)
            .map(|friends| friends.remove(&friend))
            .unwrap_or(false))
    }
}

#[async_trait::async_trait]
impl VinylRecordStore for MemoryStore {
    async fn list_vinyl_records(&self, person: Key) -> Result<Vec<VinylRecord>> {
        Ok(self.tables.read().records_of(person))
    }

    async fn get_vinyl_record(&self, person: Key, record: Key) -> Result<Option<VinylRecord>> {
        Ok(self
            .tables
            .read()
            .vinyl_records
            .get(&record)
            .filter(|r| r.person_id == person)
            .cloned())
    }

    async fn insert_vinyl_record(&self, person: Key, record: NewVinylRecord) -> Result<VinylRecord> {
        let mut tables = self.tables.write();
        if !tables.people.contains_key(&person) {
            bail!("Cannot add a vinyl record to missing person {}", person);
        }
        let record = record.into_record(tables.next_vinyl_record_key(), person);
        tables
            .vinyl_records
            .insert(record.vinyl_record_id, record.clone());
        Ok(record)
    }

    async fn update_vinyl_record(&self, record: &VinylRecord) -> Result<bool> {
        let mut tables = self.tables.write();
        match tables.vinyl_records.get_mut(&record.vinyl_record_id) {
            Some(stored) if stored.person_id == record.person_id => {
                *stored = record.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete_vinyl_record(&self, person: Key, record: Key) -> Result<bool> {
        let mut tables = self.tables.write();
        let owned = tables
            .vinyl_records
            .get(&record)
            .map(|r| r.person_id == person)
            .unwrap_or(false);
        if owned {
            tables.vinyl_records.remove(&record);
        }
        Ok(owned)
    }
}

#[async_trait::async_trait]
impl RecordStoreCatalog for MemoryStore {
    async fn list_record_stores(&self, include_ratings: bool) -> Result<Vec<RecordStore>> {
        let tables = self.tables.read();
        Ok(tables
            .record_stores
            .keys()
            .filter_map(|key| tables.load_record_store(*key, include_ratings))
            .collect())
    }

    async fn get_record_store(&self, key: Key, include_ratings: bool) -> Result<Option<RecordStore>> {
        Ok(self.tables.read().load_record_store(key, include_ratings))
    }

    async fn insert_record_store(&self, draft: RecordStoreDraft) -> Result<RecordStore> {
        let mut tables = self.tables.write();
        let record_store_id = tables.next_record_store_key();
        let store = RecordStore {
            record_store_id,
            name: draft.name,
            store_address: draft.store_address,
            tags: draft.tags,
            kind: draft.kind,
            ratings: None,
        };
        tables.record_stores.insert(record_store_id, store.clone());
        Ok(store)
    }

    async fn update_record_store(&self, store: &RecordStore) -> Result<bool> {
        let mut tables = self.tables.write();
        let Some(stored) = tables.record_stores.get_mut(&store.record_store_id) else {
            return Ok(false);
        };
        *stored = RecordStore {
            ratings: None,
            ..store.clone()
        };
        Ok(true)
    }

    async fn delete_record_store(&self, key: Key) -> Result<bool> {
        let mut tables = self.tables.write();
        tables.ratings.retain(|_, r| r.record_store_id != key);
        Ok(tables.record_stores.remove(&key).is_some())
    }
}

#[async_trait::async_trait]
impl RatingStore for MemoryStore {
    async fn add_rating(&self, record_store: Key, rated_by: Key, value: i32) -> Result<Rating> {
        let mut tables = self.tables.write();
        if !tables.record_stores.contains_key(&record_store) {
            bail!("Record store {} does not exist", record_store);
        }
        if !tables.people.contains_key(&rated_by) {
            bail!("Person {} does not exist", rated_by);
        }
        let rating = Rating {
            rating_id: tables.next_rating_key(),
            value,
            rated_by,
            record_store_id: record_store,
        };
        tables.ratings.insert(rating.rating_id, rating.clone());
        Ok(rating)
    }

    async fn remove_ratings_by(&self, rated_by: Key) -> Result<usize> {
        let mut tables = self.tables.write();
        let before = tables.ratings.len();
        tables.ratings.retain(|_, r| r.rated_by != rated_by);
        Ok(before - tables.ratings.len())
    }
}

impl Store for MemoryStore {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Gender, RecordStoreKind};
    use chrono::DateTime;

    fn new_person(first_name: &str) -> NewPerson {
        NewPerson {
            email: None,
            first_name: first_name.to_string(),
            last_name: "Test".to_string(),
            date_of_birth: DateTime::parse_from_rfc3339("1980-01-01T00:00:00+00:00").unwrap(),
            gender: Gender::Other,
            number_of_records_on_wish_list: 0,
            amount_of_cash_to_spend: 0.0,
            vinyl_records: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_keys_are_assigned_sequentially() {
        let store = MemoryStore::new();
        let a = store.insert_person(new_person("A")).await.unwrap();
        let b = store.insert_person(new_person("B")).await.unwrap();
        assert_eq!((a.person_id, b.person_id), (1, 2));

        // keys are not reused after delete
        assert!(store.delete_person(2).await.unwrap());
        let c = store.insert_person(new_person("C")).await.unwrap();
        assert_eq!(c.person_id, 3);
    }

    #[tokio::test]
    async fn test_delete_person_unlinks_friends() {
        let store = MemoryStore::new();
        for name in ["A", "B", "C"] {
            store.insert_person(new_person(name)).await.unwrap();
        }
        store.add_friend(1, 2).await.unwrap();
        store.add_friend(3, 2).await.unwrap();

        assert!(store.delete_person(2).await.unwrap());

        for key in [1, 3] {
            let person = store
                .get_person(key, &[PersonRelation::Friends])
                .await
                .unwrap()
                .unwrap();
            assert_eq!(person.friends, Some(Vec::new()));
        }
    }

    #[tokio::test]
    async fn test_replace_friend_leaves_links_intact_on_failure() {
        let store = MemoryStore::new();
        for name in ["A", "B"] {
            store.insert_person(new_person(name)).await.unwrap();
        }
        store.add_friend(1, 2).await.unwrap();

        assert!(store.replace_friend(1, 2, 42).await.is_err());
        let person = store
            .get_person(1, &[PersonRelation::Friends])
            .await
            .unwrap()
            .unwrap();
        assert!(person.is_friend(2));
    }

    #[tokio::test]
    async fn test_vinyl_records_only_resolve_under_owner() {
        let store = MemoryStore::new();
        store.insert_person(new_person("A")).await.unwrap();
        store.insert_person(new_person("B")).await.unwrap();

        let record = store
            .insert_vinyl_record(
                1,
                NewVinylRecord {
                    title: "Nevermind".to_string(),
                    artist: "Nirvana".to_string(),
                    catalog_number: None,
                    year: Some(1991),
                    dynamic_properties: Default::default(),
                },
            )
            .await
            .unwrap();

        assert!(store.get_vinyl_record(1, record.vinyl_record_id).await.unwrap().is_some());
        assert!(store.get_vinyl_record(2, record.vinyl_record_id).await.unwrap().is_none());
        assert!(!store.delete_vinyl_record(2, record.vinyl_record_id).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_record_store_removes_its_ratings() {
        let store = MemoryStore::new();
        store.insert_person(new_person("A")).await.unwrap();
        let shop = store
            .insert_record_store(RecordStoreDraft {
                name: "Shop".to_string(),
                store_address: None,
                tags: Vec::new(),
                kind: RecordStoreKind::General,
            })
            .await
            .unwrap();
        store.add_rating(shop.record_store_id, 1, 4).await.unwrap();

        assert!(store.delete_record_store(shop.record_store_id).await.unwrap());
        assert_eq!(store.remove_ratings_by(1).await.unwrap(), 0);
    }
}
