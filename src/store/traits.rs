use crate::model::{
    Key, NewPerson, NewVinylRecord, Person, PersonRelation, Rating, RecordStore, RecordStoreKind,
    Address, VinylRecord,
};
use anyhow::Result;

/// Window over an ordered entity set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub skip: usize,
    pub take: usize,
}

#[async_trait::async_trait]
pub trait PersonStore: Send + Sync {
    /// People ordered by key
    async fn list_people(&self, page: Page) -> Result<Vec<Person>>;
    async fn count_people(&self) -> Result<usize>;
    /// Load a person, eager-loading the named relations
    async fn get_person(&self, key: Key, include: &[PersonRelation]) -> Result<Option<Person>>;
    async fn person_exists(&self, key: Key) -> Result<bool>;
    /// Insert a person together with any contained vinyl records
    async fn insert_person(&self, person: NewPerson) -> Result<Person>;
    /// Overwrite the scalar values of an existing person
    async fn update_person(&self, person: &Person) -> Result<bool>;
    /// Delete a person, first removing them from every friends list
    async fn delete_person(&self, key: Key) -> Result<bool>;
}

/// Mutations of the `Person.Friends` many-to-many relation.
#[async_trait::async_trait]
pub trait FriendLinkStore: Send + Sync {
    async fn add_friend(&self, owner: Key, friend: Key) -> Result<()>;
    /// Swap `current` for `replacement` in one transaction
    async fn replace_friend(&self, owner: Key, current: Key, replacement: Key) -> Result<()>;
    async fn remove_friend(&self, owner: Key, friend: Key) -> Result<bool>;
}

#[async_trait::async_trait]
pub trait VinylRecordStore: Send + Sync {
    async fn list_vinyl_records(&self, person: Key) -> Result<Vec<VinylRecord>>;
    /// A record only resolves under its owner
    async fn get_vinyl_record(&self, person: Key, record: Key) -> Result<Option<VinylRecord>>;
    async fn insert_vinyl_record(&self, person: Key, record: NewVinylRecord) -> Result<VinylRecord>;
    async fn update_vinyl_record(&self, record: &VinylRecord) -> Result<bool>;
    async fn delete_vinyl_record(&self, person: Key, record: Key) -> Result<bool>;
}

/// Input for a new record store, already validated.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordStoreDraft {
    pub name: String,
    pub store_address: Option<Address>,
    pub tags: Vec<String>,
    pub kind: RecordStoreKind,
}

#[async_trait::async_trait]
pub trait RecordStoreCatalog: Send + Sync {
    /// Record stores ordered by key, optionally with their ratings
    async fn list_record_stores(&self, include_ratings: bool) -> Result<Vec<RecordStore>>;
    async fn get_record_store(&self, key: Key, include_ratings: bool) -> Result<Option<RecordStore>>;
    async fn insert_record_store(&self, draft: RecordStoreDraft) -> Result<RecordStore>;
    async fn update_record_store(&self, store: &RecordStore) -> Result<bool>;
    /// Delete a record store and its ratings
    async fn delete_record_store(&self, key: Key) -> Result<bool>;
}

#[async_trait::async_trait]
pub trait RatingStore: Send + Sync {
    async fn add_rating(&self, record_store: Key, rated_by: Key, value: i32) -> Result<Rating>;
    /// Remove every rating left by `rated_by`; returns how many were removed
    async fn remove_ratings_by(&self, rated_by: Key) -> Result<usize>;
}

pub trait Store:
    PersonStore + FriendLinkStore + VinylRecordStore + RecordStoreCatalog + RatingStore + Send + Sync
{
}
