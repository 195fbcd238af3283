use chrono::{DateTime, FixedOffset, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Store-assigned entity key. Immutable once assigned.
pub type Key = i32;

/// Namespaces of the bound and unbound operations.
pub const FUNCTIONS_NAMESPACE: &str = "AirVinyl.Functions";
pub const ACTIONS_NAMESPACE: &str = "AirVinyl.Actions";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Gender {
    Female,
    Male,
    Other,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Female => "Female",
            Gender::Male => "Male",
            Gender::Other => "Other",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Female" => Some(Gender::Female),
            "Male" => Some(Gender::Male),
            "Other" => Some(Gender::Other),
            _ => None,
        }
    }
}

/// Relations of a `Person` that a store can eager-load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersonRelation {
    Friends,
    VinylRecords,
}

impl PersonRelation {
    /// Map a trailing path segment to the relation it names, if any
    pub fn from_property(name: &str) -> Option<Self> {
        match name {
            "Friends" => Some(PersonRelation::Friends),
            "VinylRecords" => Some(PersonRelation::VinylRecords),
            _ => None,
        }
    }
}

/// Convert to JSON, treating `null` as an absent value.
pub(crate) fn json_value<T: Serialize>(value: &T) -> Option<Value> {
    match serde_json::to_value(value) {
        Ok(Value::Null) | Err(_) => None,
        Ok(v) => Some(v),
    }
}

/// Check a string length limit; returns a message naming the field when violated.
pub(crate) fn check_max_len(field: &str, value: &str, max: usize) -> Result<(), String> {
    if value.chars().count() > max {
        return Err(format!(
            "The field {} must be a string with a maximum length of {}.",
            field, max
        ));
    }
    Ok(())
}

pub(crate) fn check_required(field: &str, value: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("The {} field is required.", field));
    }
    Ok(())
}

/// Accepts RFC 3339 date-times as well as plain `YYYY-MM-DD` dates (taken as midnight UTC).
pub fn parse_date_time(value: &str) -> Option<DateTime<FixedOffset>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt);
    }
    let date = NaiveDate::parse_from_str(value, "%Y-%m-%d").ok()?;
    let midnight = date.and_hms_opt(0, 0, 0)?;
    Some(Utc.from_utc_datetime(&midnight).fixed_offset())
}

pub(crate) fn deserialize_date_time<'de, D>(deserializer: D) -> Result<DateTime<FixedOffset>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_date_time(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid date '{}'", raw)))
}

pub(crate) fn deserialize_optional_date_time<'de, D>(
    deserializer: D,
) -> Result<Option<DateTime<FixedOffset>>, D::Error>
where
    D: Deserializer<'de>,
{
    deserialize_date_time(deserializer).map(Some)
}

/// Distinguishes an absent member (`None`) from an explicit `null` (`Some(None)`).
pub(crate) fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Members that are neither declared nor OData annotations (`@odata.context`, ...)
pub(crate) fn undeclared_members(extra: &BTreeMap<String, Value>) -> Vec<&str> {
    extra
        .keys()
        .filter(|k| !k.starts_with('@'))
        .map(|k| k.as_str())
        .collect()
}
