use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::logic::resolve::{PropertyDescriptor, PropertyKind, Resolvable};
use crate::model::common::{
    check_max_len, check_required, deserialize_date_time, deserialize_optional_date_time,
    double_option, json_value, undeclared_members,
};
use crate::model::{Gender, Key, NewVinylRecord, VinylRecord};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Person {
    pub person_id: Key,
    pub email: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: DateTime<FixedOffset>,
    pub gender: Gender,
    pub number_of_records_on_wish_list: i32,
    pub amount_of_cash_to_spend: f64,

    /// Present only when the relation was eager-loaded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub friends: Option<Vec<Person>>,
    /// Contained collection; present only when eager-loaded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vinyl_records: Option<Vec<VinylRecord>>,
}

impl Person {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    pub fn is_friend(&self, key: Key) -> bool {
        self.friends
            .as_ref()
            .map(|friends| friends.iter().any(|f| f.person_id == key))
            .unwrap_or(false)
    }
}

const PERSON_PROPERTIES: &[PropertyDescriptor<Person>] = &[
    PropertyDescriptor {
        name: "PersonId",
        kind: PropertyKind::Scalar,
        read: |p| json_value(&p.person_id),
    },
    PropertyDescriptor {
        name: "Email",
        kind: PropertyKind::Scalar,
        read: |p| json_value(&p.email),
    },
    PropertyDescriptor {
        name: "FirstName",
        kind: PropertyKind::Scalar,
        read: |p| json_value(&p.first_name),
    },
    PropertyDescriptor {
        name: "LastName",
        kind: PropertyKind::Scalar,
        read: |p| json_value(&p.last_name),
    },
    PropertyDescriptor {
        name: "DateOfBirth",
        kind: PropertyKind::Scalar,
        read: |p| json_value(&p.date_of_birth),
    },
    PropertyDescriptor {
        name: "Gender",
        kind: PropertyKind::Scalar,
        read: |p| json_value(&p.gender),
    },
    PropertyDescriptor {
        name: "NumberOfRecordsOnWishList",
        kind: PropertyKind::Scalar,
        read: |p| json_value(&p.number_of_records_on_wish_list),
    },
    PropertyDescriptor {
        name: "AmountOfCashToSpend",
        kind: PropertyKind::Scalar,
        read: |p| json_value(&p.amount_of_cash_to_spend),
    },
    PropertyDescriptor {
        name: "Friends",
        kind: PropertyKind::Navigation,
        read: |p| json_value(&p.friends),
    },
    PropertyDescriptor {
        name: "VinylRecords",
        kind: PropertyKind::Navigation,
        read: |p| json_value(&p.vinyl_records),
    },
];

const PERSON_TABLES: &[&[PropertyDescriptor<Person>]] = &[PERSON_PROPERTIES];

impl Resolvable for Person {
    fn property_tables(&self) -> &'static [&'static [PropertyDescriptor<Self>]] {
        PERSON_TABLES
    }
}

/// Body of `POST People` and `PUT People(k)`.
///
/// The key is always taken from the store (POST) or the URL (PUT); a
/// `PersonId` member in the body is ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct NewPerson {
    #[serde(default)]
    pub email: Option<String>,
    pub first_name: String,
    pub last_name: String,
    #[serde(deserialize_with = "deserialize_date_time")]
    pub date_of_birth: DateTime<FixedOffset>,
    pub gender: Gender,
    #[serde(default)]
    pub number_of_records_on_wish_list: i32,
    #[serde(default)]
    pub amount_of_cash_to_spend: f64,
    /// Deep insert of contained records (POST only)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub vinyl_records: Vec<NewVinylRecord>,
}

impl NewPerson {
    pub fn validate(&self) -> Result<(), String> {
        check_required("FirstName", &self.first_name)?;
        check_max_len("FirstName", &self.first_name, 50)?;
        check_required("LastName", &self.last_name)?;
        check_max_len("LastName", &self.last_name, 50)?;
        if let Some(email) = &self.email {
            check_max_len("Email", email, 100)?;
        }
        for record in &self.vinyl_records {
            record.validate()?;
        }
        Ok(())
    }

    /// Full replacement of the stored scalar values, keeping key and relations
    pub fn apply_to(&self, person: &mut Person) {
        person.email = self.email.clone();
        person.first_name = self.first_name.clone();
        person.last_name = self.last_name.clone();
        person.date_of_birth = self.date_of_birth;
        person.gender = self.gender;
        person.number_of_records_on_wish_list = self.number_of_records_on_wish_list;
        person.amount_of_cash_to_spend = self.amount_of_cash_to_spend;
    }
}

/// Body of `PATCH People(k)` and `PATCH GetTim`: only present members change.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PersonPatch {
    #[serde(default, deserialize_with = "double_option")]
    pub email: Option<Option<String>>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    #[serde(default, deserialize_with = "deserialize_optional_date_time")]
    pub date_of_birth: Option<DateTime<FixedOffset>>,
    pub gender: Option<Gender>,
    pub number_of_records_on_wish_list: Option<i32>,
    pub amount_of_cash_to_spend: Option<f64>,
    #[serde(flatten)]
    pub other: BTreeMap<String, Value>,
}

impl PersonPatch {
    pub fn validate(&self) -> Result<(), String> {
        let unknown = undeclared_members(&self.other);
        if !unknown.is_empty() {
            return Err(format!(
                "The entity type 'AirVinyl.Model.Person' does not have properties: {}",
                unknown.join(", ")
            ));
        }
        if let Some(first_name) = &self.first_name {
            check_required("FirstName", first_name)?;
            check_max_len("FirstName", first_name, 50)?;
        }
        if let Some(last_name) = &self.last_name {
            check_required("LastName", last_name)?;
            check_max_len("LastName", last_name, 50)?;
        }
        if let Some(Some(email)) = &self.email {
            check_max_len("Email", email, 100)?;
        }
        Ok(())
    }

    pub fn apply_to(&self, person: &mut Person) {
        if let Some(email) = &self.email {
            person.email = email.clone();
        }
        if let Some(first_name) = &self.first_name {
            person.first_name = first_name.clone();
        }
        if let Some(last_name) = &self.last_name {
            person.last_name = last_name.clone();
        }
        if let Some(date_of_birth) = self.date_of_birth {
            person.date_of_birth = date_of_birth;
        }
        if let Some(gender) = self.gender {
            person.gender = gender;
        }
        if let Some(wish_list) = self.number_of_records_on_wish_list {
            person.number_of_records_on_wish_list = wish_list;
        }
        if let Some(cash) = self.amount_of_cash_to_spend {
            person.amount_of_cash_to_spend = cash;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_person_accepts_plain_date() {
        let body = json!({
            "@odata.context": "http://localhost/odata/$metadata#People/$entity",
            "Email": "emma@smith.com",
            "FirstName": "Emma",
            "LastName": "Smith",
            "DateOfBirth": "1981-01-03",
            "Gender": "Female",
            "VinylRecords": [{"Title": "Nana", "Artist": "Lady Punk", "CatalogNumber": "PL/114"}]
        });
        let person: NewPerson = serde_json::from_value(body).unwrap();
        assert_eq!(person.date_of_birth.to_rfc3339(), "1981-01-03T00:00:00+00:00");
        assert_eq!(person.vinyl_records.len(), 1);
        assert!(person.validate().is_ok());
    }

    #[test]
    fn test_new_person_validation() {
        let mut person: NewPerson = serde_json::from_value(json!({
            "FirstName": "",
            "LastName": "Smith",
            "DateOfBirth": "1981-01-03T00:00:00+02:00",
            "Gender": "Male"
        }))
        .unwrap();
        assert!(person.validate().is_err());

        person.first_name = "x".repeat(51);
        assert!(person.validate().unwrap_err().contains("FirstName"));

        person.first_name = "Nick".to_string();
        assert!(person.validate().is_ok());
    }

    #[test]
    fn test_patch_distinguishes_null_from_absent() {
        let patch: PersonPatch = serde_json::from_value(json!({"Email": null})).unwrap();
        assert_eq!(patch.email, Some(None));

        let patch: PersonPatch = serde_json::from_value(json!({"FirstName": "Jack"})).unwrap();
        assert_eq!(patch.email, None);
        assert!(patch.validate().is_ok());
    }

    #[test]
    fn test_patch_rejects_undeclared_members() {
        let patch: PersonPatch =
            serde_json::from_value(json!({"FirstName": "Jack", "Nickname": "JJ"})).unwrap();
        assert!(patch.validate().unwrap_err().contains("Nickname"));

        let patch: PersonPatch =
            serde_json::from_value(json!({"@odata.type": "#AirVinyl.Model.Person"})).unwrap();
        assert!(patch.validate().is_ok());
    }
}
