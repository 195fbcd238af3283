use anyhow::{anyhow, Result};
use serde_json::json;
use std::collections::BTreeMap;

use crate::model::{
    parse_date_time, Address, Gender, Key, NewPerson, NewVinylRecord, RecordStoreKind,
};
use crate::store::traits::{
    FriendLinkStore, PersonStore, RatingStore, RecordStoreCatalog, RecordStoreDraft, Store,
};

/// Helper function to create a NewVinylRecord without dynamic properties
fn record(title: &str, artist: &str, catalog_number: &str, year: Option<i32>) -> NewVinylRecord {
    NewVinylRecord {
        title: title.to_string(),
        artist: artist.to_string(),
        catalog_number: Some(catalog_number.to_string()),
        year,
        dynamic_properties: BTreeMap::new(),
    }
}

#[allow(clippy::too_many_arguments)]
fn person(
    first_name: &str,
    last_name: &str,
    email: Option<&str>,
    date_of_birth: &str,
    gender: Gender,
    wish_list: i32,
    cash: f64,
    vinyl_records: Vec<NewVinylRecord>,
) -> Result<NewPerson> {
    Ok(NewPerson {
        email: email.map(str::to_string),
        first_name: first_name.to_string(),
        last_name: last_name.to_string(),
        date_of_birth: parse_date_time(date_of_birth)
            .ok_or_else(|| anyhow!("Invalid seed date '{}'", date_of_birth))?,
        gender,
        number_of_records_on_wish_list: wish_list,
        amount_of_cash_to_spend: cash,
        vinyl_records,
    })
}

fn people() -> Result<Vec<NewPerson>> {
    let mut publisher_record = record("Nana", "Lady Punk", "PL/114", Some(1986));
    publisher_record
        .dynamic_properties
        .insert("Publisher".to_string(), json!("Tonpress"));

    Ok(vec![
        person(
            "Kevin",
            "Dockx",
            Some("kevin@kevindockx.com"),
            "1981-05-05",
            Gender::Male,
            10,
            300.0,
            vec![
                record("Nevermind", "Nirvana", "ABC/111", Some(1991)),
                record("Ten", "Pearl Jam", "XBB/123", Some(1991)),
            ],
        )?,
        person(
            "Sven",
            "Vercauteren",
            Some("sven@someprovider.com"),
            "1983-03-20",
            Gender::Male,
            34,
            2000.0,
            vec![record("Use Your Illusion I", "Guns N' Roses", "GNR/091", Some(1991))],
        )?,
        person(
            "Nick",
            "Missorten",
            None,
            "1983-03-10",
            Gender::Male,
            12,
            50.0,
            vec![record("Colour of the Trap", "Miles Kane", "MKA/001", Some(2011))],
        )?,
        person(
            "Emma",
            "Smith",
            Some("emma@smith.com"),
            "1981-01-03",
            Gender::Female,
            0,
            120.5,
            vec![publisher_record],
        )?,
        person(
            "Jess",
            "Aerts",
            Some("jess@someprovider.com"),
            "1990-12-24",
            Gender::Other,
            5,
            75.0,
            Vec::new(),
        )?,
        person(
            "Tim",
            "Van den Broeck",
            Some("tim@someprovider.com"),
            "1981-07-14",
            Gender::Male,
            22,
            500.0,
            vec![
                record("Dark Side of the Moon", "Pink Floyd", "PF/973", Some(1973)),
                record("Rumours", "Fleetwood Mac", "FM/977", None),
            ],
        )?,
        person(
            "Nele",
            "Verheyen",
            Some("nele@someprovider.com"),
            "1982-03-20",
            Gender::Female,
            8,
            250.5,
            vec![record("Back to Black", "Amy Winehouse", "AW/006", Some(2006))],
        )?,
    ])
}

fn record_stores() -> Vec<RecordStoreDraft> {
    vec![
        RecordStoreDraft {
            name: "All Your Music Needs".to_string(),
            store_address: Some(Address {
                street: Some("25, Fluffy Road".to_string()),
                city: Some("Antwerp".to_string()),
                postal_code: Some("2000".to_string()),
                country: Some("Belgium".to_string()),
            }),
            tags: vec!["Rock".to_string(), "Pop".to_string(), "Indie".to_string()],
            kind: RecordStoreKind::General,
        },
        RecordStoreDraft {
            name: "Indie Records, Inc.".to_string(),
            store_address: Some(Address {
                street: Some("1, Main Street".to_string()),
                city: Some("Ghent".to_string()),
                postal_code: Some("9000".to_string()),
                country: Some("Belgium".to_string()),
            }),
            tags: vec!["Indie".to_string()],
            kind: RecordStoreKind::Specialized {
                specialization: Some("Indie".to_string()),
            },
        },
        RecordStoreDraft {
            name: "Rock Central".to_string(),
            store_address: None,
            tags: vec!["Rock".to_string(), "Metal".to_string()],
            kind: RecordStoreKind::Specialized {
                specialization: Some("Rock".to_string()),
            },
        },
    ]
}

/// (owner, friend) pairs, by person key
const FRIENDSHIPS: &[(Key, Key)] = &[(1, 3), (1, 7), (6, 1), (6, 2), (7, 1), (7, 6)];

/// (record store, rated by, value)
const RATINGS: &[(Key, Key, i32)] = &[(1, 1, 4), (1, 6, 2), (1, 7, 5), (2, 1, 2), (2, 7, 3), (3, 6, 5)];

/// Load the demo data set into an empty store. A non-empty store is left untouched.
pub async fn load_seed_data<S: Store>(store: &S) -> Result<()> {
    if store.count_people().await? > 0 {
        log::info!("Store already holds data, skipping seed");
        return Ok(());
    }

    let mut person_keys = Vec::new();
    for new_person in people()? {
        person_keys.push(store.insert_person(new_person).await?.person_id);
    }
    // seed references are positions in `people()`, starting at 1
    let person_key = |position: Key| -> Result<Key> {
        person_keys
            .get(position as usize - 1)
            .copied()
            .ok_or_else(|| anyhow!("Seed references unknown person {}", position))
    };

    for (owner, friend) in FRIENDSHIPS {
        store.add_friend(person_key(*owner)?, person_key(*friend)?).await?;
    }

    let mut store_keys = Vec::new();
    for draft in record_stores() {
        store_keys.push(store.insert_record_store(draft).await?.record_store_id);
    }

    for (record_store, rated_by, value) in RATINGS {
        let record_store = store_keys
            .get(*record_store as usize - 1)
            .copied()
            .ok_or_else(|| anyhow!("Seed references unknown record store {}", record_store))?;
        store
            .add_rating(record_store, person_key(*rated_by)?, *value)
            .await?;
    }

    log::info!(
        "Seeded {} people, {} record stores and {} ratings",
        person_keys.len(),
        store_keys.len(),
        RATINGS.len()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PersonRelation;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn test_seed_loads_once() {
        let store = MemoryStore::new();
        load_seed_data(&store).await.unwrap();
        load_seed_data(&store).await.unwrap();

        assert_eq!(store.count_people().await.unwrap(), 7);
        let tim = store
            .get_person(6, &[PersonRelation::Friends])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(tim.first_name, "Tim");
        assert!(tim.is_friend(1) && tim.is_friend(2));

        let specialized = store.get_record_store(2, true).await.unwrap().unwrap();
        assert_eq!(specialized.specialization(), Some("Indie"));
        assert_eq!(specialized.ratings.map(|r| r.len()), Some(2));
    }
}
