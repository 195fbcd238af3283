use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::logic::resolve::{PropertyDescriptor, PropertyKind, Resolvable};
use crate::model::common::{
    check_max_len, check_required, double_option, json_value, undeclared_members,
};
use crate::model::Key;

pub const RECORD_STORE_TYPE: &str = "AirVinyl.Model.RecordStore";
pub const SPECIALIZED_RECORD_STORE_TYPE: &str = "AirVinyl.Model.SpecializedRecordStore";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Address {
    pub street: Option<String>,
    pub city: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Rating {
    pub rating_id: Key,
    pub value: i32,
    /// Key of the person who left the rating
    pub rated_by: Key,
    pub record_store_id: Key,
}

/// Runtime variant of a record store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "@odata.type")]
pub enum RecordStoreKind {
    #[serde(rename = "#AirVinyl.Model.RecordStore")]
    General,
    #[serde(rename = "#AirVinyl.Model.SpecializedRecordStore", rename_all = "PascalCase")]
    Specialized { specialization: Option<String> },
}

impl RecordStoreKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            RecordStoreKind::General => RECORD_STORE_TYPE,
            RecordStoreKind::Specialized { .. } => SPECIALIZED_RECORD_STORE_TYPE,
        }
    }

    /// Resolve an `@odata.type` annotation (with or without the leading `#`)
    pub fn from_type_name(
        type_name: Option<&str>,
        specialization: Option<String>,
    ) -> Result<Self, String> {
        match type_name.map(|t| t.trim_start_matches('#')) {
            None | Some(RECORD_STORE_TYPE) => {
                if specialization.is_some() {
                    return Err(format!(
                        "The entity type '{}' does not have a property named 'Specialization'.",
                        RECORD_STORE_TYPE
                    ));
                }
                Ok(RecordStoreKind::General)
            }
            Some(SPECIALIZED_RECORD_STORE_TYPE) => Ok(RecordStoreKind::Specialized { specialization }),
            Some(other) => Err(format!(
                "'{}' is not a record store type. Expected '{}' or '{}'.",
                other, RECORD_STORE_TYPE, SPECIALIZED_RECORD_STORE_TYPE
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RecordStore {
    pub record_store_id: Key,
    pub name: String,
    pub store_address: Option<Address>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(flatten)]
    pub kind: RecordStoreKind,
    /// Present only when the relation was eager-loaded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ratings: Option<Vec<Rating>>,
}

impl RecordStore {
    pub fn is_specialized(&self) -> bool {
        matches!(self.kind, RecordStoreKind::Specialized { .. })
    }

    pub fn specialization(&self) -> Option<&str> {
        match &self.kind {
            RecordStoreKind::Specialized { specialization } => specialization.as_deref(),
            RecordStoreKind::General => None,
        }
    }
}

const RECORD_STORE_PROPERTIES: &[PropertyDescriptor<RecordStore>] = &[
    PropertyDescriptor {
        name: "RecordStoreId",
        kind: PropertyKind::Scalar,
        read: |s| json_value(&s.record_store_id),
    },
    PropertyDescriptor {
        name: "Name",
        kind: PropertyKind::Scalar,
        read: |s| json_value(&s.name),
    },
    PropertyDescriptor {
        name: "StoreAddress",
        kind: PropertyKind::Complex,
        read: |s| json_value(&s.store_address),
    },
    PropertyDescriptor {
        name: "Tags",
        kind: PropertyKind::Collection,
        read: |s| json_value(&s.tags),
    },
    PropertyDescriptor {
        name: "Ratings",
        kind: PropertyKind::Navigation,
        read: |s| json_value(&s.ratings),
    },
];

const SPECIALIZED_RECORD_STORE_PROPERTIES: &[PropertyDescriptor<RecordStore>] =
    &[PropertyDescriptor {
        name: "Specialization",
        kind: PropertyKind::Scalar,
        read: |s| s.specialization().and_then(|v| json_value(&v)),
    }];

const GENERAL_TABLES: &[&[PropertyDescriptor<RecordStore>]] = &[RECORD_STORE_PROPERTIES];
const SPECIALIZED_TABLES: &[&[PropertyDescriptor<RecordStore>]] =
    &[RECORD_STORE_PROPERTIES, SPECIALIZED_RECORD_STORE_PROPERTIES];

impl Resolvable for RecordStore {
    fn property_tables(&self) -> &'static [&'static [PropertyDescriptor<Self>]] {
        match self.kind {
            RecordStoreKind::General => GENERAL_TABLES,
            RecordStoreKind::Specialized { .. } => SPECIALIZED_TABLES,
        }
    }
}

/// Body of `POST RecordStores`. `@odata.type` picks the derived type.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NewRecordStore {
    pub name: String,
    #[serde(default)]
    pub store_address: Option<Address>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(rename = "@odata.type", default)]
    pub odata_type: Option<String>,
    #[serde(default)]
    pub specialization: Option<String>,
}

impl NewRecordStore {
    pub fn validate(&self) -> Result<RecordStoreKind, String> {
        check_required("Name", &self.name)?;
        check_max_len("Name", &self.name, 150)?;
        RecordStoreKind::from_type_name(self.odata_type.as_deref(), self.specialization.clone())
    }
}

/// Body of `PATCH RecordStores(k)`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RecordStorePatch {
    pub name: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub store_address: Option<Option<Address>>,
    pub tags: Option<Vec<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub specialization: Option<Option<String>>,
    #[serde(flatten)]
    pub other: BTreeMap<String, Value>,
}

impl RecordStorePatch {
    /// Validate against the stored entity and apply; the derived type never changes.
    pub fn apply_to(&self, store: &mut RecordStore) -> Result<(), String> {
        let unknown = undeclared_members(&self.other);
        if !unknown.is_empty() {
            return Err(format!(
                "The entity type '{}' does not have properties: {}",
                store.kind.type_name(),
                unknown.join(", ")
            ));
        }
        if let Some(name) = &self.name {
            check_required("Name", name)?;
            check_max_len("Name", name, 150)?;
        }
        if let Some(specialization) = &self.specialization {
            match &mut store.kind {
                RecordStoreKind::Specialized { specialization: current } => {
                    *current = specialization.clone();
                }
                RecordStoreKind::General => {
                    return Err(format!(
                        "The entity type '{}' does not have a property named 'Specialization'.",
                        RECORD_STORE_TYPE
                    ));
                }
            }
        }

        if let Some(name) = &self.name {
            store.name = name.clone();
        }
        if let Some(address) = &self.store_address {
            store.store_address = address.clone();
        }
        if let Some(tags) = &self.tags {
            store.tags = tags.clone();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn general_store() -> RecordStore {
        RecordStore {
            record_store_id: 1,
            name: "All Your Music Needs".to_string(),
            store_address: None,
            tags: vec!["Rock".to_string()],
            kind: RecordStoreKind::General,
            ratings: None,
        }
    }

    #[test]
    fn test_serialization_carries_type_annotation() {
        let mut store = general_store();
        let value = serde_json::to_value(&store).unwrap();
        assert_eq!(value["@odata.type"], "#AirVinyl.Model.RecordStore");
        assert!(value.get("Specialization").is_none());
        assert!(value.get("Ratings").is_none());

        store.kind = RecordStoreKind::Specialized {
            specialization: Some("Indie".to_string()),
        };
        let value = serde_json::to_value(&store).unwrap();
        assert_eq!(value["@odata.type"], "#AirVinyl.Model.SpecializedRecordStore");
        assert_eq!(value["Specialization"], "Indie");
    }

    #[test]
    fn test_new_record_store_type_selection() {
        let new: NewRecordStore = serde_json::from_value(json!({
            "@odata.type": "#AirVinyl.Model.SpecializedRecordStore",
            "Name": "Indie Records, Inc.",
            "Specialization": "Indie"
        }))
        .unwrap();
        assert_eq!(
            new.validate().unwrap(),
            RecordStoreKind::Specialized {
                specialization: Some("Indie".to_string())
            }
        );

        let base_with_derived_member: NewRecordStore = serde_json::from_value(json!({
            "Name": "Rock Central",
            "Specialization": "Rock"
        }))
        .unwrap();
        assert!(base_with_derived_member.validate().is_err());

        let wrong_type: NewRecordStore = serde_json::from_value(json!({
            "@odata.type": "#AirVinyl.Model.Person",
            "Name": "Rock Central"
        }))
        .unwrap();
        assert!(wrong_type.validate().is_err());
    }

    #[test]
    fn test_patch_specialization_on_general_store_is_rejected() {
        let mut store = general_store();
        let patch: RecordStorePatch =
            serde_json::from_value(json!({"Name": "Renamed", "Specialization": "Jazz"})).unwrap();
        assert!(patch.apply_to(&mut store).is_err());
        // nothing applied
        assert_eq!(store.name, "All Your Music Needs");
    }

    #[test]
    fn test_patch_updates_tags_and_address() {
        let mut store = general_store();
        let patch: RecordStorePatch = serde_json::from_value(json!({
            "Tags": ["Rock", "Blues"],
            "StoreAddress": {"City": "Ghent", "Country": "Belgium"}
        }))
        .unwrap();
        patch.apply_to(&mut store).unwrap();
        assert_eq!(store.tags, vec!["Rock".to_string(), "Blues".to_string()]);
        assert_eq!(
            store.store_address.as_ref().and_then(|a| a.city.as_deref()),
            Some("Ghent")
        );
    }
}
