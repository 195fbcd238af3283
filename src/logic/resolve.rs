use serde_json::Value;

/// How a declared property is shaped in a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyKind {
    /// Primitive value: string, number, date, enum member
    Scalar,
    /// Structured single value such as an address
    Complex,
    /// Collection of primitive or complex values
    Collection,
    /// Relation to other entities
    Navigation,
}

/// One row of an entity type's property table.
pub struct PropertyDescriptor<T> {
    pub name: &'static str,
    pub kind: PropertyKind,
    /// Returns `None` when the property holds no value
    pub read: fn(&T) -> Option<Value>,
}

/// An entity type with an explicit property table.
///
/// Derived types return the base table followed by their own, so lookups
/// always run against the runtime variant of the entity.
pub trait Resolvable: Sized + 'static {
    fn property_tables(&self) -> &'static [&'static [PropertyDescriptor<Self>]];

    fn descriptor(&self, name: &str) -> Option<&'static PropertyDescriptor<Self>> {
        self.property_tables()
            .iter()
            .flat_map(|table| table.iter())
            .find(|descriptor| descriptor.name == name)
    }

    fn has_property(&self, name: &str) -> bool {
        self.descriptor(name).is_some()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PropertyOutcome {
    NotFound,
    NoContent,
    Value { value: Value, kind: PropertyKind },
}

#[derive(Debug, Clone, PartialEq)]
pub enum RawOutcome {
    NotFound,
    NoContent,
    Raw(String),
}

pub struct PropertyResolver;

impl PropertyResolver {
    /// Look up `name` on the entity's runtime type and classify its value
    pub fn resolve<T: Resolvable>(entity: &T, name: &str) -> PropertyOutcome {
        let Some(descriptor) = entity.descriptor(name) else {
            return PropertyOutcome::NotFound;
        };

        match (descriptor.read)(entity) {
            Some(value) => PropertyOutcome::Value {
                value,
                kind: descriptor.kind,
            },
            None => PropertyOutcome::NoContent,
        }
    }

    /// Render a scalar property as its bare string form.
    ///
    /// Only defined for `PropertyKind::Scalar`; every other kind is `NotFound`.
    pub fn resolve_raw<T: Resolvable>(entity: &T, name: &str) -> RawOutcome {
        match Self::resolve(entity, name) {
            PropertyOutcome::NotFound => RawOutcome::NotFound,
            PropertyOutcome::NoContent => RawOutcome::NoContent,
            PropertyOutcome::Value {
                kind: PropertyKind::Scalar,
                value,
            } => match raw_string(&value) {
                Some(raw) => RawOutcome::Raw(raw),
                None => RawOutcome::NotFound,
            },
            PropertyOutcome::Value { .. } => RawOutcome::NotFound,
        }
    }
}

fn raw_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        Address, Gender, Person, RecordStore, RecordStoreKind, VinylRecord,
    };
    use chrono::DateTime;
    use std::collections::BTreeMap;

    fn person() -> Person {
        Person {
            person_id: 7,
            email: None,
            first_name: "Nele".to_string(),
            last_name: "Verheyen".to_string(),
            date_of_birth: DateTime::parse_from_rfc3339("1982-03-20T00:00:00+01:00").unwrap(),
            gender: Gender::Female,
            number_of_records_on_wish_list: 12,
            amount_of_cash_to_spend: 250.5,
            friends: Some(Vec::new()),
            vinyl_records: None,
        }
    }

    fn store(kind: RecordStoreKind) -> RecordStore {
        RecordStore {
            record_store_id: 1,
            name: "Indie Records, Inc.".to_string(),
            store_address: Some(Address {
                street: Some("1 Main Street".to_string()),
                city: Some("Antwerp".to_string()),
                postal_code: Some("2000".to_string()),
                country: Some("Belgium".to_string()),
            }),
            tags: vec!["Indie".to_string(), "Rock".to_string()],
            kind,
            ratings: None,
        }
    }

    #[test]
    fn test_every_declared_person_property_resolves() {
        let p = person();
        for table in p.property_tables() {
            for descriptor in table.iter() {
                assert_ne!(
                    PropertyResolver::resolve(&p, descriptor.name),
                    PropertyOutcome::NotFound,
                    "{} should resolve",
                    descriptor.name
                );
            }
        }
    }

    #[test]
    fn test_scalar_value_and_null_value() {
        let p = person();
        assert_eq!(
            PropertyResolver::resolve(&p, "FirstName"),
            PropertyOutcome::Value {
                value: Value::String("Nele".to_string()),
                kind: PropertyKind::Scalar,
            }
        );
        assert_eq!(PropertyResolver::resolve(&p, "Email"), PropertyOutcome::NoContent);
    }

    #[test]
    fn test_name_matching_is_case_sensitive() {
        let p = person();
        assert_eq!(PropertyResolver::resolve(&p, "firstname"), PropertyOutcome::NotFound);
        assert_eq!(PropertyResolver::resolve(&p, "FirstName/"), PropertyOutcome::NotFound);
        assert_eq!(PropertyResolver::resolve(&p, "Nope"), PropertyOutcome::NotFound);
    }

    #[test]
    fn test_raw_value_renders_scalars_only() {
        let p = person();
        assert_eq!(
            PropertyResolver::resolve_raw(&p, "FirstName"),
            RawOutcome::Raw("Nele".to_string())
        );
        assert_eq!(
            PropertyResolver::resolve_raw(&p, "Gender"),
            RawOutcome::Raw("Female".to_string())
        );
        assert_eq!(
            PropertyResolver::resolve_raw(&p, "NumberOfRecordsOnWishList"),
            RawOutcome::Raw("12".to_string())
        );
        assert_eq!(PropertyResolver::resolve_raw(&p, "Email"), RawOutcome::NoContent);
        // Friends is loaded (empty) but multi-valued
        assert_eq!(PropertyResolver::resolve_raw(&p, "Friends"), RawOutcome::NotFound);
    }

    #[test]
    fn test_raw_value_on_collections_is_not_found() {
        let s = store(RecordStoreKind::General);
        assert!(matches!(
            PropertyResolver::resolve(&s, "Tags"),
            PropertyOutcome::Value { kind: PropertyKind::Collection, .. }
        ));
        assert_eq!(PropertyResolver::resolve_raw(&s, "Tags"), RawOutcome::NotFound);
        assert_eq!(PropertyResolver::resolve_raw(&s, "StoreAddress"), RawOutcome::NotFound);
    }

    #[test]
    fn test_derived_only_property_uses_runtime_variant() {
        let general = store(RecordStoreKind::General);
        assert_eq!(
            PropertyResolver::resolve(&general, "Specialization"),
            PropertyOutcome::NotFound
        );

        let specialized = store(RecordStoreKind::Specialized {
            specialization: Some("Indie".to_string()),
        });
        assert_eq!(
            PropertyResolver::resolve_raw(&specialized, "Specialization"),
            RawOutcome::Raw("Indie".to_string())
        );
        // base properties are still there
        assert!(specialized.has_property("Name"));

        let unnamed = store(RecordStoreKind::Specialized { specialization: None });
        assert_eq!(
            PropertyResolver::resolve(&unnamed, "Specialization"),
            PropertyOutcome::NoContent
        );
    }

    #[test]
    fn test_sibling_type_property_is_not_found() {
        let s = store(RecordStoreKind::General);
        assert_eq!(PropertyResolver::resolve(&s, "FirstName"), PropertyOutcome::NotFound);

        let record = VinylRecord {
            vinyl_record_id: 11,
            title: "Nana".to_string(),
            artist: "Lady Punk".to_string(),
            catalog_number: Some("PL/114".to_string()),
            year: None,
            person_id: 7,
            dynamic_properties: BTreeMap::new(),
        };
        assert_eq!(PropertyResolver::resolve(&record, "Tags"), PropertyOutcome::NotFound);
        assert_eq!(PropertyResolver::resolve(&record, "Year"), PropertyOutcome::NoContent);
        assert_eq!(
            PropertyResolver::resolve_raw(&record, "CatalogNumber"),
            RawOutcome::Raw("PL/114".to_string())
        );
    }

    #[test]
    fn test_unloaded_relation_is_no_content() {
        let p = person();
        assert_eq!(
            PropertyResolver::resolve(&p, "VinylRecords"),
            PropertyOutcome::NoContent
        );
        assert_eq!(
            PropertyResolver::resolve(&p, "Friends"),
            PropertyOutcome::Value {
                value: Value::Array(Vec::new()),
                kind: PropertyKind::Navigation,
            }
        );
    }
}
