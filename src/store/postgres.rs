use anyhow::{anyhow, bail, Context, Result};
use serde_json::Value;
use sqlx::{
    postgres::{PgPoolOptions, PgRow},
    types::Json,
    PgPool, Postgres, Row, Transaction,
};
use std::collections::BTreeMap;

use crate::model::{
    Address, Gender, Key, NewPerson, NewVinylRecord, Person, PersonRelation, Rating, RecordStore,
    RecordStoreKind, VinylRecord, SPECIALIZED_RECORD_STORE_TYPE,
};
use crate::store::traits::{
    FriendLinkStore, Page, PersonStore, RatingStore, RecordStoreCatalog, RecordStoreDraft, Store,
    VinylRecordStore,
};

const PERSON_COLUMNS: &str = "person_id, email, first_name, last_name, date_of_birth, gender, \
     number_of_records_on_wish_list, amount_of_cash_to_spend";
const VINYL_RECORD_COLUMNS: &str =
    "vinyl_record_id, title, artist, catalog_number, year, person_id, dynamic_properties";
const RECORD_STORE_COLUMNS: &str =
    "record_store_id, name, store_address, tags, discriminator, specialization";

#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Create a new PostgreSQL store with the given database URL
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .context("Failed to create PostgreSQL connection pool")?;

        Ok(Self { pool })
    }

    /// Run database migrations
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Failed to run database migrations")?;
        Ok(())
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn insert_vinyl_record_tx(
        tx: &mut Transaction<'_, Postgres>,
        person: Key,
        record: NewVinylRecord,
    ) -> Result<VinylRecord> {
        // Key is assigned by the sequence; the placeholder is replaced below
        let record = record.into_record(0, person);
        let row = sqlx::query(&format!(
            "INSERT INTO vinyl_records (title, artist, catalog_number, year, person_id, dynamic_properties) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {}",
            VINYL_RECORD_COLUMNS
        ))
        .bind(&record.title)
        .bind(&record.artist)
        .bind(&record.catalog_number)
        .bind(record.year)
        .bind(person)
        .bind(Json(&record.dynamic_properties))
        .fetch_one(&mut **tx)
        .await
        .context("Failed to insert vinyl record")?;

        vinyl_record_from_row(&row)
    }
}

fn person_from_row(row: &PgRow) -> Result<Person> {
    let gender: String = row.get("gender");
    Ok(Person {
        person_id: row.get("person_id"),
        email: row.get("email"),
        first_name: row.get("first_name"),
        last_name: row.get("last_name"),
        date_of_birth: row.get("date_of_birth"),
        gender: Gender::parse(&gender).ok_or_else(|| anyhow!("Unknown gender '{}'", gender))?,
        number_of_records_on_wish_list: row.get("number_of_records_on_wish_list"),
        amount_of_cash_to_spend: row.get("amount_of_cash_to_spend"),
        friends: None,
        vinyl_records: None,
    })
}

fn vinyl_record_from_row(row: &PgRow) -> Result<VinylRecord> {
    let Json(dynamic_properties): Json<BTreeMap<String, Value>> = row.get("dynamic_properties");
    Ok(VinylRecord {
        vinyl_record_id: row.get("vinyl_record_id"),
        title: row.get("title"),
        artist: row.get("artist"),
        catalog_number: row.get("catalog_number"),
        year: row.get("year"),
        person_id: row.get("person_id"),
        dynamic_properties,
    })
}

fn record_store_from_row(row: &PgRow) -> Result<RecordStore> {
    let discriminator: String = row.get("discriminator");
    let specialization: Option<String> = row.get("specialization");
    let kind = if discriminator == SPECIALIZED_RECORD_STORE_TYPE {
        RecordStoreKind::Specialized { specialization }
    } else {
        RecordStoreKind::General
    };
    let store_address: Option<Json<Address>> = row.get("store_address");

    Ok(RecordStore {
        record_store_id: row.get("record_store_id"),
        name: row.get("name"),
        store_address: store_address.map(|Json(address)| address),
        tags: row.get("tags"),
        kind,
        ratings: None,
    })
}

fn rating_from_row(row: &PgRow) -> Rating {
    Rating {
        rating_id: row.get("rating_id"),
        value: row.get("value"),
        rated_by: row.get("rated_by"),
        record_store_id: row.get("record_store_id"),
    }
}

fn specialization_of(kind: &RecordStoreKind) -> Option<&str> {
    match kind {
        RecordStoreKind::Specialized { specialization } => specialization.as_deref(),
        RecordStoreKind::General => None,
    }
}

#[async_trait::async_trait]
impl PersonStore for PostgresStore {
    async fn list_people(&self, page: Page) -> Result<Vec<Person>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM people ORDER BY person_id LIMIT $1 OFFSET $2",
            PERSON_COLUMNS
        ))
        .bind(page.take as i64)
        .bind(page.skip as i64)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list people")?;

        rows.iter().map(person_from_row).collect()
    }

    async fn count_people(&self) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM people")
            .fetch_one(&self.pool)
            .await
            .context("Failed to count people")?;

        Ok(count as usize)
    }

    async fn get_person(&self, key: Key, include: &[PersonRelation]) -> Result<Option<Person>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM people WHERE person_id = $1",
            PERSON_COLUMNS
        ))
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch person")?;

        let Some(row) = row else {
            return Ok(None);
        };
        let mut person = person_from_row(&row)?;

        if include.contains(&PersonRelation::Friends) {
            let rows = sqlx::query(
                "SELECT p.person_id, p.email, p.first_name, p.last_name, p.date_of_birth, p.gender, \
                 p.number_of_records_on_wish_list, p.amount_of_cash_to_spend \
                 FROM friendships f JOIN people p ON p.person_id = f.friend_id \
                 WHERE f.person_id = $1 ORDER BY p.person_id",
            )
            .bind(key)
            .fetch_all(&self.pool)
            .await
            .context("Failed to load friends")?;

            person.friends = Some(rows.iter().map(person_from_row).collect::<Result<_>>()?);
        }

        if include.contains(&PersonRelation::VinylRecords) {
            person.vinyl_records = Some(self.list_vinyl_records(key).await?);
        }

        Ok(Some(person))
    }

    async fn person_exists(&self, key: Key) -> Result<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM people WHERE person_id = $1)")
                .bind(key)
                .fetch_one(&self.pool)
                .await
                .context("Failed to check person existence")?;

        Ok(exists)
    }

    async fn insert_person(&self, person: NewPerson) -> Result<Person> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        let row = sqlx::query(&format!(
            "INSERT INTO people (email, first_name, last_name, date_of_birth, gender, \
             number_of_records_on_wish_list, amount_of_cash_to_spend) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {}",
            PERSON_COLUMNS
        ))
        .bind(&person.email)
        .bind(&person.first_name)
        .bind(&person.last_name)
        .bind(person.date_of_birth)
        .bind(person.gender.as_str())
        .bind(person.number_of_records_on_wish_list)
        .bind(person.amount_of_cash_to_spend)
        .fetch_one(&mut *tx)
        .await
        .context("Failed to insert person")?;

        let mut created = person_from_row(&row)?;

        let mut records = Vec::with_capacity(person.vinyl_records.len());
        for record in person.vinyl_records {
            records.push(Self::insert_vinyl_record_tx(&mut tx, created.person_id, record).await?);
        }
        if !records.is_empty() {
            created.vinyl_records = Some(records);
        }

        tx.commit().await.context("Failed to commit person insert")?;
        Ok(created)
    }

    async fn update_person(&self, person: &Person) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE people SET email = $2, first_name = $3, last_name = $4, date_of_birth = $5, \
             gender = $6, number_of_records_on_wish_list = $7, amount_of_cash_to_spend = $8 \
             WHERE person_id = $1",
        )
        .bind(person.person_id)
        .bind(&person.email)
        .bind(&person.first_name)
        .bind(&person.last_name)
        .bind(person.date_of_birth)
        .bind(person.gender.as_str())
        .bind(person.number_of_records_on_wish_list)
        .bind(person.amount_of_cash_to_spend)
        .execute(&self.pool)
        .await
        .context("Failed to update person")?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_person(&self, key: Key) -> Result<bool> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        sqlx::query("DELETE FROM friendships WHERE person_id = $1 OR friend_id = $1")
            .bind(key)
            .execute(&mut *tx)
            .await
            .context("Failed to unlink friends")?;

        let result = sqlx::query("DELETE FROM people WHERE person_id = $1")
            .bind(key)
            .execute(&mut *tx)
            .await
            .context("Failed to delete person")?;

        tx.commit().await.context("Failed to commit person delete")?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait::async_trait]
impl FriendLinkStore for PostgresStore {
    async fn add_friend(&self, owner: Key, friend: Key) -> Result<()> {
        sqlx::query(
            "INSERT INTO friendships (person_id, friend_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(owner)
        .bind(friend)
        .execute(&self.pool)
        .await
        .context("Failed to add friend")?;

        Ok(())
    }

    async fn replace_friend(&self, owner: Key, current: Key, replacement: Key) -> Result<()> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        let removed = sqlx::query("DELETE FROM friendships WHERE person_id = $1 AND friend_id = $2")
            .bind(owner)
            .bind(current)
            .execute(&mut *tx)
            .await
            .context("Failed to remove current friend")?;
        if removed.rows_affected() == 0 {
            bail!("Person {} is not linked to person {}", owner, current);
        }

        sqlx::query(
            "INSERT INTO friendships (person_id, friend_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(owner)
        .bind(replacement)
        .execute(&mut *tx)
        .await
        .context("Failed to add replacement friend")?;

        tx.commit().await.context("Failed to commit friend replacement")?;
        Ok(())
    }

    async fn remove_friend(&self, owner: Key, friend: Key) -> Result<bool> {
        let result = sqlx::query("DELETE FROM friendships WHERE person_id = $1 AND friend_id = $2")
            .bind(owner)
            .bind(friend)
            .execute(&self.pool)
            .await
            .context("Failed to remove friend")?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait::async_trait]
impl VinylRecordStore for PostgresStore {
    async fn list_vinyl_records(&self, person: Key) -> Result<Vec<VinylRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM vinyl_records WHERE person_id = $1 ORDER BY vinyl_record_id",
            VINYL_RECORD_COLUMNS
        ))
        .bind(person)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list vinyl records")?;

        rows.iter().map(vinyl_record_from_row).collect()
    }

    async fn get_vinyl_record(&self, person: Key, record: Key) -> Result<Option<VinylRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM vinyl_records WHERE person_id = $1 AND vinyl_record_id = $2",
            VINYL_RECORD_COLUMNS
        ))
        .bind(person)
        .bind(record)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch vinyl record")?;

        row.as_ref().map(vinyl_record_from_row).transpose()
    }

    async fn insert_vinyl_record(&self, person: Key, record: NewVinylRecord) -> Result<VinylRecord> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;
        let created = Self::insert_vinyl_record_tx(&mut tx, person, record).await?;
        tx.commit().await.context("Failed to commit vinyl record insert")?;
        Ok(created)
    }

    async fn update_vinyl_record(&self, record: &VinylRecord) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE vinyl_records SET title = $3, artist = $4, catalog_number = $5, year = $6, \
             dynamic_properties = $7 WHERE vinyl_record_id = $1 AND person_id = $2",
        )
        .bind(record.vinyl_record_id)
        .bind(record.person_id)
        .bind(&record.title)
        .bind(&record.artist)
        .bind(&record.catalog_number)
        .bind(record.year)
        .bind(Json(&record.dynamic_properties))
        .execute(&self.pool)
        .await
        .context("Failed to update vinyl record")?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_vinyl_record(&self, person: Key, record: Key) -> Result<bool> {
        let result =
            sqlx::query("DELETE FROM vinyl_records WHERE person_id = $1 AND vinyl_record_id = $2")
                .bind(person)
                .bind(record)
                .execute(&self.pool)
                .await
                .context("Failed to delete vinyl record")?;

        Ok(result.rows_affected() > 0)
    }
}

impl PostgresStore {
    async fn ratings_for(&self, record_store: Option<Key>) -> Result<Vec<Rating>> {
        let rows = sqlx::query(
            "SELECT rating_id, value, rated_by, record_store_id FROM ratings \
             WHERE $1::INTEGER IS NULL OR record_store_id = $1 ORDER BY rating_id",
        )
        .bind(record_store)
        .fetch_all(&self.pool)
        .await
        .context("Failed to load ratings")?;

        Ok(rows.iter().map(rating_from_row).collect())
    }
}

#[async_trait::async_trait]
impl RecordStoreCatalog for PostgresStore {
    async fn list_record_stores(&self, include_ratings: bool) -> Result<Vec<RecordStore>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM record_stores ORDER BY record_store_id",
            RECORD_STORE_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .context("Failed to list record stores")?;

        let mut stores = rows
            .iter()
            .map(record_store_from_row)
            .collect::<Result<Vec<_>>>()?;

        if include_ratings {
            let ratings = self.ratings_for(None).await?;
            for store in &mut stores {
                store.ratings = Some(
                    ratings
                        .iter()
                        .filter(|r| r.record_store_id == store.record_store_id)
                        .cloned()
                        .collect(),
                );
            }
        }

        Ok(stores)
    }

    async fn get_record_store(&self, key: Key, include_ratings: bool) -> Result<Option<RecordStore>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM record_stores WHERE record_store_id = $1",
            RECORD_STORE_COLUMNS
        ))
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch record store")?;

        let Some(row) = row else {
            return Ok(None);
        };
        let mut store = record_store_from_row(&row)?;
        if include_ratings {
            store.ratings = Some(self.ratings_for(Some(key)).await?);
        }
        Ok(Some(store))
    }

    async fn insert_record_store(&self, draft: RecordStoreDraft) -> Result<RecordStore> {
        let row = sqlx::query(&format!(
            "INSERT INTO record_stores (name, store_address, tags, discriminator, specialization) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {}",
            RECORD_STORE_COLUMNS
        ))
        .bind(&draft.name)
        .bind(draft.store_address.as_ref().map(Json))
        .bind(&draft.tags)
        .bind(draft.kind.type_name())
        .bind(specialization_of(&draft.kind))
        .fetch_one(&self.pool)
        .await
        .context("Failed to insert record store")?;

        record_store_from_row(&row)
    }

    async fn update_record_store(&self, store: &RecordStore) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE record_stores SET name = $2, store_address = $3, tags = $4, specialization = $5 \
             WHERE record_store_id = $1",
        )
        .bind(store.record_store_id)
        .bind(&store.name)
        .bind(store.store_address.as_ref().map(Json))
        .bind(&store.tags)
        .bind(specialization_of(&store.kind))
        .execute(&self.pool)
        .await
        .context("Failed to update record store")?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_record_store(&self, key: Key) -> Result<bool> {
        // ratings follow through ON DELETE CASCADE
        let result = sqlx::query("DELETE FROM record_stores WHERE record_store_id = $1")
            .bind(key)
            .execute(&self.pool)
            .await
            .context("Failed to delete record store")?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait::async_trait]
impl RatingStore for PostgresStore {
    async fn add_rating(&self, record_store: Key, rated_by: Key, value: i32) -> Result<Rating> {
        let row = sqlx::query(
            "INSERT INTO ratings (value, rated_by, record_store_id) VALUES ($1, $2, $3) \
             RETURNING rating_id, value, rated_by, record_store_id",
        )
        .bind(value)
        .bind(rated_by)
        .bind(record_store)
        .fetch_one(&self.pool)
        .await
        .context("Failed to insert rating")?;

        Ok(rating_from_row(&row))
    }

    async fn remove_ratings_by(&self, rated_by: Key) -> Result<usize> {
        let result = sqlx::query("DELETE FROM ratings WHERE rated_by = $1")
            .bind(rated_by)
            .execute(&self.pool)
            .await
            .context("Failed to remove ratings")?;

        Ok(result.rows_affected() as usize)
    }
}

impl Store for PostgresStore {}
