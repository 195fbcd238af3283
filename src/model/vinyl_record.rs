use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::logic::resolve::{PropertyDescriptor, PropertyKind, Resolvable};
use crate::model::common::{check_max_len, check_required, double_option, json_value};
use crate::model::Key;

/// A record contained in a person's collection.
///
/// VinylRecord is an open type: members without a declared property are kept
/// as dynamic properties and written back inline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct VinylRecord {
    pub vinyl_record_id: Key,
    pub title: String,
    pub artist: String,
    pub catalog_number: Option<String>,
    pub year: Option<i32>,
    pub person_id: Key,
    #[serde(flatten)]
    pub dynamic_properties: BTreeMap<String, Value>,
}

const VINYL_RECORD_PROPERTIES: &[PropertyDescriptor<VinylRecord>] = &[
    PropertyDescriptor {
        name: "VinylRecordId",
        kind: PropertyKind::Scalar,
        read: |v| json_value(&v.vinyl_record_id),
    },
    PropertyDescriptor {
        name: "Title",
        kind: PropertyKind::Scalar,
        read: |v| json_value(&v.title),
    },
    PropertyDescriptor {
        name: "Artist",
        kind: PropertyKind::Scalar,
        read: |v| json_value(&v.artist),
    },
    PropertyDescriptor {
        name: "CatalogNumber",
        kind: PropertyKind::Scalar,
        read: |v| json_value(&v.catalog_number),
    },
    PropertyDescriptor {
        name: "Year",
        kind: PropertyKind::Scalar,
        read: |v| json_value(&v.year),
    },
    PropertyDescriptor {
        name: "PersonId",
        kind: PropertyKind::Scalar,
        read: |v| json_value(&v.person_id),
    },
];

const VINYL_RECORD_TABLES: &[&[PropertyDescriptor<VinylRecord>]] = &[VINYL_RECORD_PROPERTIES];

impl Resolvable for VinylRecord {
    fn property_tables(&self) -> &'static [&'static [PropertyDescriptor<Self>]] {
        VINYL_RECORD_TABLES
    }
}

/// Body of `POST People(k)/VinylRecords`; the owner comes from the URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NewVinylRecord {
    pub title: String,
    pub artist: String,
    #[serde(default)]
    pub catalog_number: Option<String>,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(flatten)]
    pub dynamic_properties: BTreeMap<String, Value>,
}

impl NewVinylRecord {
    pub fn validate(&self) -> Result<(), String> {
        check_required("Title", &self.title)?;
        check_max_len("Title", &self.title, 150)?;
        check_required("Artist", &self.artist)?;
        check_max_len("Artist", &self.artist, 150)?;
        if let Some(catalog_number) = &self.catalog_number {
            check_max_len("CatalogNumber", catalog_number, 50)?;
        }
        Ok(())
    }

    pub fn into_record(self, vinyl_record_id: Key, person_id: Key) -> VinylRecord {
        VinylRecord {
            vinyl_record_id,
            title: self.title,
            artist: self.artist,
            catalog_number: self.catalog_number,
            year: self.year,
            person_id,
            dynamic_properties: dynamic_only(self.dynamic_properties),
        }
    }
}

/// Body of `PATCH People(k)/VinylRecords(v)`.
///
/// Undeclared members update dynamic properties; `null` removes one.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct VinylRecordPatch {
    pub title: Option<String>,
    pub artist: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub catalog_number: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub year: Option<Option<i32>>,
    #[serde(flatten)]
    pub dynamic_properties: BTreeMap<String, Value>,
}

impl VinylRecordPatch {
    pub fn validate(&self) -> Result<(), String> {
        if let Some(title) = &self.title {
            check_required("Title", title)?;
            check_max_len("Title", title, 150)?;
        }
        if let Some(artist) = &self.artist {
            check_required("Artist", artist)?;
            check_max_len("Artist", artist, 150)?;
        }
        if let Some(Some(catalog_number)) = &self.catalog_number {
            check_max_len("CatalogNumber", catalog_number, 50)?;
        }
        if self.dynamic_properties.contains_key("PersonId")
            || self.dynamic_properties.contains_key("VinylRecordId")
        {
            return Err("Key properties of a vinyl record cannot be changed.".to_string());
        }
        Ok(())
    }

    pub fn apply_to(&self, record: &mut VinylRecord) {
        if let Some(title) = &self.title {
            record.title = title.clone();
        }
        if let Some(artist) = &self.artist {
            record.artist = artist.clone();
        }
        if let Some(catalog_number) = &self.catalog_number {
            record.catalog_number = catalog_number.clone();
        }
        if let Some(year) = self.year {
            record.year = year;
        }
        for (name, value) in &self.dynamic_properties {
            if name.starts_with('@') {
                continue;
            }
            if value.is_null() {
                record.dynamic_properties.remove(name);
            } else {
                record.dynamic_properties.insert(name.clone(), value.clone());
            }
        }
    }
}

/// Drops annotations and key members; the URL decides the record's keys.
fn dynamic_only(mut properties: BTreeMap<String, Value>) -> BTreeMap<String, Value> {
    properties.retain(|name, _| {
        !name.starts_with('@') && name != "PersonId" && name != "VinylRecordId"
    });
    properties
}
