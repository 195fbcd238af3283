use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::{AirVinylError, AirVinylResult};
use crate::model::{Key, Rating, RecordStore};
use crate::store::{PersonStore, RatingStore, RecordStoreCatalog, Store};

/// Integer average of the ratings, truncated. `None` without ratings.
pub fn average_rating(ratings: &[Rating]) -> Option<i64> {
    if ratings.is_empty() {
        return None;
    }
    let sum: i64 = ratings.iter().map(|r| i64::from(r.value)).sum();
    Some(sum / ratings.len() as i64)
}

/// A store is high rated when it has ratings and their average reaches `minimum_rating`.
pub fn is_high_rated(ratings: &[Rating], minimum_rating: i32) -> bool {
    average_rating(ratings)
        .map(|average| average >= i64::from(minimum_rating))
        .unwrap_or(false)
}

pub fn is_rated_by_any(ratings: &[Rating], person_ids: &[Key]) -> bool {
    ratings.iter().any(|r| person_ids.contains(&r.rated_by))
}

/// JSON object of action parameters, e.g. `{"rating": 5, "personId": "7"}`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct ActionParameters(Map<String, Value>);

impl ActionParameters {
    /// Integer parameter given as a JSON number or a numeric string
    pub fn int(&self, name: &str) -> Option<i32> {
        match self.0.get(name)? {
            Value::Number(n) => n.as_i64().and_then(|n| i32::try_from(n).ok()),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    fn required_int(&self, name: &str) -> AirVinylResult<i32> {
        self.int(name).ok_or_else(|| {
            AirVinylError::not_found(format!("Parameter '{}' is missing or not an integer", name))
        })
    }
}

impl From<Map<String, Value>> for ActionParameters {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Rating functions and actions over a store.
pub struct RatingService<'a, S: Store> {
    store: &'a S,
}

impl<'a, S: Store> RatingService<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    async fn stores_matching(&self, pred: impl Fn(&[Rating]) -> bool) -> AirVinylResult<Vec<RecordStore>> {
        let stores = self.store.list_record_stores(true).await?;
        Ok(stores
            .into_iter()
            .filter(|s| pred(s.ratings.as_deref().unwrap_or_default()))
            .map(|s| RecordStore { ratings: None, ..s })
            .collect())
    }

    /// `IsHighRatedFn`; an unknown store is simply not high rated.
    pub async fn is_high_rated(&self, key: Key, minimum_rating: i32) -> AirVinylResult<bool> {
        let Some(store) = self.store.get_record_store(key, true).await? else {
            return Ok(false);
        };
        Ok(is_high_rated(
            store.ratings.as_deref().unwrap_or_default(),
            minimum_rating,
        ))
    }

    /// `AreRatedByFn`
    pub async fn are_rated_by(&self, person_ids: &[Key]) -> AirVinylResult<Vec<RecordStore>> {
        self.stores_matching(|ratings| is_rated_by_any(ratings, person_ids))
            .await
    }

    /// `GetHighRatedRecordStoresFn`. Uses the same whole-sum truncated average as
    /// `IsHighRatedFn`, so ratings `[1, 1, 1]` average 1, not a sum of per-rating
    /// quotients (0).
    pub async fn high_rated_record_stores(&self, minimum_rating: i32) -> AirVinylResult<Vec<RecordStore>> {
        self.stores_matching(|ratings| is_high_rated(ratings, minimum_rating))
            .await
    }

    /// `Rate`. Lookup failures are errors; a failed write is reported as `false`.
    pub async fn rate(&self, key: Key, parameters: &ActionParameters) -> AirVinylResult<bool> {
        if self.store.get_record_store(key, false).await?.is_none() {
            return Err(AirVinylError::not_found(format!("Record store {} not found", key)));
        }
        let rating = parameters.required_int("rating")?;
        let person_id = parameters.required_int("personId")?;
        if !self.store.person_exists(person_id).await? {
            return Err(AirVinylError::not_found(format!("Person {} not found", person_id)));
        }

        match self.store.add_rating(key, person_id, rating).await {
            Ok(created) => {
                log::info!(
                    "Person {} rated record store {} with {}",
                    person_id,
                    key,
                    created.value
                );
                Ok(true)
            }
            Err(e) => {
                log::error!("Failed to store rating for record store {}: {:#}", key, e);
                Ok(false)
            }
        }
    }

    /// `RemoveRatings`. Removing nothing still succeeds.
    pub async fn remove_ratings(&self, parameters: &ActionParameters) -> AirVinylResult<bool> {
        let person_id = parameters.required_int("personId")?;
        match self.store.remove_ratings_by(person_id).await {
            Ok(removed) => {
                log::info!("Removed {} rating(s) left by person {}", removed, person_id);
                Ok(true)
            }
            Err(e) => {
                log::error!("Failed to remove ratings of person {}: {:#}", person_id, e);
                Ok(false)
            }
        }
    }

    /// `RemoveRecordStoreRatings`; unlike the bound action, failures propagate.
    pub async fn remove_record_store_ratings(&self, parameters: &ActionParameters) -> AirVinylResult<usize> {
        let person_id = parameters.required_int("personId")?;
        let removed = self.store.remove_ratings_by(person_id).await?;
        log::info!("Removed {} rating(s) left by person {}", removed, person_id);
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Gender, NewPerson, RecordStoreKind};
    use crate::store::{MemoryStore, RecordStoreDraft};
    use chrono::DateTime;
    use serde_json::json;

    fn ratings(values: &[i32]) -> Vec<Rating> {
        values
            .iter()
            .enumerate()
            .map(|(i, value)| Rating {
                rating_id: i as Key + 1,
                value: *value,
                rated_by: 1,
                record_store_id: 1,
            })
            .collect()
    }

    fn parameters(value: Value) -> ActionParameters {
        serde_json::from_value(value).unwrap()
    }

    async fn seeded_store() -> MemoryStore {
        let store = MemoryStore::new();
        for name in ["Kevin", "Nele"] {
            store
                .insert_person(NewPerson {
                    email: None,
                    first_name: name.to_string(),
                    last_name: "Test".to_string(),
                    date_of_birth: DateTime::parse_from_rfc3339("1990-01-01T00:00:00+00:00")
                        .unwrap(),
                    gender: Gender::Other,
                    number_of_records_on_wish_list: 0,
                    amount_of_cash_to_spend: 0.0,
                    vinyl_records: Vec::new(),
                })
                .await
                .unwrap();
        }
        for name in ["Rock Central", "Quiet Corner"] {
            store
                .insert_record_store(RecordStoreDraft {
                    name: name.to_string(),
                    store_address: None,
                    tags: Vec::new(),
                    kind: RecordStoreKind::General,
                })
                .await
                .unwrap();
        }
        store
    }

    #[test]
    fn test_is_high_rated_uses_truncated_average() {
        assert!(is_high_rated(&ratings(&[2, 4]), 3));
        assert!(!is_high_rated(&ratings(&[2, 3]), 3));
        assert!(!is_high_rated(&[], 0));
        assert_eq!(average_rating(&ratings(&[5, 4, 4])), Some(4));
    }

    #[tokio::test]
    async fn test_high_rated_record_stores_divides_the_sum() {
        let store = seeded_store().await;
        let service = RatingService::new(&store);
        for _ in 0..3 {
            store.add_rating(2, 1, 1).await.unwrap();
        }

        let high = service.high_rated_record_stores(1).await.unwrap();
        assert_eq!(high.iter().map(|s| s.record_store_id).collect::<Vec<_>>(), vec![2]);
        assert!(service.is_high_rated(2, 1).await.unwrap());
    }

    #[test]
    fn test_action_parameters_accept_numbers_and_numeric_strings() {
        let params = parameters(json!({"rating": 4, "personId": " 7 ", "bad": "x", "frac": 1.5}));
        assert_eq!(params.int("rating"), Some(4));
        assert_eq!(params.int("personId"), Some(7));
        assert_eq!(params.int("bad"), None);
        assert_eq!(params.int("frac"), None);
        assert_eq!(params.int("missing"), None);
    }

    #[tokio::test]
    async fn test_rate_and_high_rated_functions() {
        let store = seeded_store().await;
        let service = RatingService::new(&store);

        assert!(!service.is_high_rated(1, 1).await.unwrap());
        assert!(service
            .rate(1, &parameters(json!({"rating": 5, "personId": 1})))
            .await
            .unwrap());
        assert!(service
            .rate(1, &parameters(json!({"rating": "3", "personId": 2})))
            .await
            .unwrap());

        assert!(service.is_high_rated(1, 4).await.unwrap());
        assert!(!service.is_high_rated(1, 5).await.unwrap());
        // unknown store
        assert!(!service.is_high_rated(99, 1).await.unwrap());

        let high = service.high_rated_record_stores(4).await.unwrap();
        assert_eq!(high.len(), 1);
        assert_eq!(high[0].record_store_id, 1);
        assert!(high[0].ratings.is_none());

        let rated = service.are_rated_by(&[2, 5]).await.unwrap();
        assert_eq!(rated.iter().map(|s| s.record_store_id).collect::<Vec<_>>(), vec![1]);
    }

    #[tokio::test]
    async fn test_rate_rejects_missing_targets_and_parameters() {
        let store = seeded_store().await;
        let service = RatingService::new(&store);

        for (key, params) in [
            (99, json!({"rating": 5, "personId": 1})),
            (1, json!({"rating": 5, "personId": 42})),
            (1, json!({"personId": 1})),
            (1, json!({"rating": "five", "personId": 1})),
        ] {
            assert!(matches!(
                service.rate(key, &parameters(params)).await,
                Err(AirVinylError::NotFound(_))
            ));
        }
        assert!(store.get_record_store(1, true).await.unwrap().unwrap().ratings.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_remove_ratings_is_idempotent() {
        let store = seeded_store().await;
        store.add_rating(1, 1, 4).await.unwrap();
        store.add_rating(2, 1, 2).await.unwrap();
        store.add_rating(2, 2, 5).await.unwrap();
        let service = RatingService::new(&store);

        let params = parameters(json!({"personId": 1}));
        assert!(service.remove_ratings(&params).await.unwrap());
        assert!(service.remove_ratings(&params).await.unwrap());
        assert_eq!(service.remove_record_store_ratings(&params).await.unwrap(), 0);

        let rated = service.are_rated_by(&[1]).await.unwrap();
        assert!(rated.is_empty());
        assert_eq!(service.are_rated_by(&[2]).await.unwrap().len(), 1);
    }
}
