use std::collections::BTreeMap;

use crate::error::{AirVinylError, AirVinylResult};
use crate::model::common::{ACTIONS_NAMESPACE, FUNCTIONS_NAMESPACE};
use crate::model::record_store::SPECIALIZED_RECORD_STORE_TYPE;
use crate::model::Key;

pub const PEOPLE: &str = "People";
pub const RECORD_STORES: &str = "RecordStores";
pub const SINGLETON: &str = "GetTim";
pub const FRIENDS: &str = "Friends";
pub const VINYL_RECORDS: &str = "VinylRecords";

/// One `/`-separated piece of a resource path: `People`, `People(7)`,
/// `AirVinyl.Functions.IsHighRatedFn(minimumRating=3)`, `$ref`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub name: String,
    /// Text between the parentheses, if any
    pub args: Option<String>,
}

impl Segment {
    fn is(&self, name: &str) -> bool {
        self.name == name && self.args.is_none()
    }

    /// Key of a keyed segment: `People(3)` or `People(PersonId=3)`.
    pub fn key(&self) -> Option<Result<Key, String>> {
        self.args
            .as_deref()
            .map(|args| parse_key_literal(args, key_property(&self.name)))
    }
}

/// Name of the key property of an entity set or collection navigation.
fn key_property(set: &str) -> Option<&'static str> {
    match set {
        PEOPLE | FRIENDS => Some("PersonId"),
        VINYL_RECORDS => Some("VinylRecordId"),
        RECORD_STORES => Some("RecordStoreId"),
        _ => None,
    }
}

/// Split a resource path into segments, ignoring `/` inside parentheses and
/// quoted literals. Empty segments (leading or trailing slashes) are dropped.
pub fn split_segments(path: &str) -> Result<Vec<Segment>, String> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut in_quotes = false;

    for c in path.chars() {
        match c {
            '\'' => in_quotes = !in_quotes,
            '(' if !in_quotes => depth += 1,
            ')' if !in_quotes => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| format!("Unbalanced ')' in '{}'", path))?;
            }
            '/' if depth == 0 && !in_quotes => {
                if !current.is_empty() {
                    segments.push(parse_segment(&current)?);
                    current.clear();
                }
                continue;
            }
            _ => {}
        }
        current.push(c);
    }

    if depth != 0 || in_quotes {
        return Err(format!("Unbalanced '(' or quote in '{}'", path));
    }
    if !current.is_empty() {
        segments.push(parse_segment(&current)?);
    }
    Ok(segments)
}

fn parse_segment(raw: &str) -> Result<Segment, String> {
    let Some(open) = raw.find('(') else {
        return Ok(Segment {
            name: raw.to_string(),
            args: None,
        });
    };
    if !raw.ends_with(')') {
        return Err(format!("Unexpected text after ')' in segment '{}'", raw));
    }
    Ok(Segment {
        name: raw[..open].to_string(),
        args: Some(raw[open + 1..raw.len() - 1].to_string()),
    })
}

/// Convert a key literal to an integer key. A named key (`PersonId=3`) must
/// name `key_name`.
pub fn parse_key_literal(args: &str, key_name: Option<&str>) -> Result<Key, String> {
    let literal = match args.split_once('=') {
        Some((name, value)) if Some(name.trim()) == key_name => value,
        Some((name, _)) => return Err(format!("'{}' is not a key property", name.trim())),
        None => args,
    };
    literal
        .trim()
        .parse::<Key>()
        .map_err(|_| format!("'{}' is not a valid integer key", args))
}

/// Split `a=1,b=[1,2]` into name/value pairs, respecting brackets.
pub fn parse_parameters(args: &str) -> Result<BTreeMap<String, String>, String> {
    let mut parameters = BTreeMap::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    let mut pieces = Vec::new();

    for (i, c) in args.char_indices() {
        match c {
            '[' | '(' => depth += 1,
            ']' | ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                pieces.push(&args[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    pieces.push(&args[start..]);

    for piece in pieces.into_iter().filter(|p| !p.trim().is_empty()) {
        let (name, value) = piece
            .split_once('=')
            .ok_or_else(|| format!("Parameter '{}' has no value", piece))?;
        parameters.insert(name.trim().to_string(), value.trim().to_string());
    }
    Ok(parameters)
}

/// The person a `People(k)/...` or `GetTim/...` path is rooted at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersonTarget {
    Key(Key),
    Singleton,
}

/// A recognised resource path below the service root.
#[derive(Debug, Clone, PartialEq)]
pub enum Resource {
    People,
    Person(PersonTarget),
    PersonProperty {
        person: PersonTarget,
        property: String,
        raw: bool,
    },
    VinylRecords(PersonTarget),
    VinylRecord(PersonTarget, Key),
    VinylRecordProperty {
        person: PersonTarget,
        record: Key,
        property: String,
        raw: bool,
    },
    /// `People(k)/Friends/$ref`
    FriendsRef(PersonTarget),
    /// `People(k)/Friends(r)/$ref`
    FriendRef(PersonTarget, Key),
    RecordStores,
    SpecializedRecordStores,
    RecordStore(Key),
    SpecializedRecordStore(Key),
    RecordStoreProperty {
        key: Key,
        /// Addressed through the derived type cast
        specialized: bool,
        property: String,
        raw: bool,
    },
    IsHighRated {
        key: Key,
        minimum_rating: i32,
    },
    AreRatedBy {
        person_ids: Vec<Key>,
    },
    HighRatedRecordStores {
        minimum_rating: i32,
    },
    Rate(Key),
    RemoveRatings,
    RemoveRecordStoreRatings,
}

impl Resource {
    /// Parse a path relative to the service root, e.g. `People(7)/Friends/$ref`.
    pub fn parse(path: &str) -> AirVinylResult<Self> {
        let segments = split_segments(path).map_err(AirVinylError::validation)?;
        let not_found = || AirVinylError::not_found(format!("No resource found at '{}'", path));

        let Some((root, rest)) = segments.split_first() else {
            return Err(not_found());
        };

        match root.name.as_str() {
            PEOPLE => match root.key() {
                None if rest.is_empty() => Ok(Resource::People),
                None => Err(not_found()),
                Some(key) => {
                    let key = key.map_err(AirVinylError::validation)?;
                    Self::parse_person(PersonTarget::Key(key), rest).ok_or_else(not_found)
                }
            },
            SINGLETON if root.args.is_none() => {
                Self::parse_person(PersonTarget::Singleton, rest).ok_or_else(not_found)
            }
            RECORD_STORES => match root.key() {
                None => Self::parse_record_stores(rest)?.ok_or_else(not_found),
                Some(key) => {
                    let key = key.map_err(AirVinylError::validation)?;
                    Self::parse_record_store(key, rest)?.ok_or_else(not_found)
                }
            },
            "GetHighRatedRecordStoresFn" if rest.is_empty() => {
                let minimum_rating = int_parameter(root, "minimumRating")?;
                Ok(Resource::HighRatedRecordStores { minimum_rating })
            }
            "RemoveRecordStoreRatings" if rest.is_empty() && root.args.is_none() => {
                Ok(Resource::RemoveRecordStoreRatings)
            }
            _ => Err(not_found()),
        }
    }

    fn parse_person(person: PersonTarget, rest: &[Segment]) -> Option<Self> {
        match rest {
            [] => Some(Resource::Person(person)),
            [friends, reference] if friends.is(FRIENDS) && reference.is("$ref") => {
                Some(Resource::FriendsRef(person))
            }
            [friend, reference] if friend.name == FRIENDS && reference.is("$ref") => {
                let related = friend.key()?.ok()?;
                Some(Resource::FriendRef(person, related))
            }
            [records] if records.is(VINYL_RECORDS) => Some(Resource::VinylRecords(person)),
            [record] if record.name == VINYL_RECORDS => {
                Some(Resource::VinylRecord(person, record.key()?.ok()?))
            }
            [record, property] if record.name == VINYL_RECORDS => {
                Some(Resource::VinylRecordProperty {
                    person,
                    record: record.key()?.ok()?,
                    property: property_name(property)?,
                    raw: false,
                })
            }
            [record, property, value] if record.name == VINYL_RECORDS && value.is("$value") => {
                Some(Resource::VinylRecordProperty {
                    person,
                    record: record.key()?.ok()?,
                    property: property_name(property)?,
                    raw: true,
                })
            }
            [property] => Some(Resource::PersonProperty {
                person,
                property: property_name(property)?,
                raw: false,
            }),
            [property, value] if value.is("$value") => Some(Resource::PersonProperty {
                person,
                property: property_name(property)?,
                raw: true,
            }),
            _ => None,
        }
    }

    fn parse_record_stores(rest: &[Segment]) -> AirVinylResult<Option<Self>> {
        let resource = match rest {
            [] => Some(Resource::RecordStores),
            [derived] if derived.is(SPECIALIZED_RECORD_STORE_TYPE) => {
                Some(Resource::SpecializedRecordStores)
            }
            [function] if function.name == qualified(FUNCTIONS_NAMESPACE, "AreRatedByFn") => {
                let raw = required_parameter(function, "personIds")?;
                let person_ids = serde_json::from_str::<Vec<Key>>(&raw).map_err(|_| {
                    AirVinylError::validation(format!(
                        "personIds must be a collection of integers, got '{}'",
                        raw
                    ))
                })?;
                Some(Resource::AreRatedBy { person_ids })
            }
            [action] if action.is(&qualified(ACTIONS_NAMESPACE, "RemoveRatings")) => {
                Some(Resource::RemoveRatings)
            }
            _ => None,
        };
        Ok(resource)
    }

    fn parse_record_store(key: Key, rest: &[Segment]) -> AirVinylResult<Option<Self>> {
        let resource = match rest {
            [] => Some(Resource::RecordStore(key)),
            [derived] if derived.is(SPECIALIZED_RECORD_STORE_TYPE) => {
                Some(Resource::SpecializedRecordStore(key))
            }
            [function] if function.name == qualified(FUNCTIONS_NAMESPACE, "IsHighRatedFn") => {
                let minimum_rating = int_parameter(function, "minimumRating")?;
                Some(Resource::IsHighRated {
                    key,
                    minimum_rating,
                })
            }
            [action] if action.is(&qualified(ACTIONS_NAMESPACE, "Rate")) => {
                Some(Resource::Rate(key))
            }
            [derived, property] if derived.is(SPECIALIZED_RECORD_STORE_TYPE) => {
                store_property(key, true, property, false)
            }
            [derived, property, value]
                if derived.is(SPECIALIZED_RECORD_STORE_TYPE) && value.is("$value") =>
            {
                store_property(key, true, property, true)
            }
            [property] => store_property(key, false, property, false),
            [property, value] if value.is("$value") => store_property(key, false, property, true),
            _ => None,
        };
        Ok(resource)
    }
}

fn store_property(key: Key, specialized: bool, property: &Segment, raw: bool) -> Option<Resource> {
    property_name(property).map(|property| Resource::RecordStoreProperty {
        key,
        specialized,
        property,
        raw,
    })
}

fn qualified(namespace: &str, name: &str) -> String {
    format!("{}.{}", namespace, name)
}

/// A plain property segment: no arguments, not a `$` system segment.
fn property_name(segment: &Segment) -> Option<String> {
    if segment.args.is_some() || segment.name.starts_with('$') {
        return None;
    }
    Some(segment.name.clone())
}

fn required_parameter(segment: &Segment, name: &str) -> AirVinylResult<String> {
    let parameters = parse_parameters(segment.args.as_deref().unwrap_or_default())
        .map_err(AirVinylError::validation)?;
    parameters.get(name).cloned().ok_or_else(|| {
        AirVinylError::validation(format!(
            "Missing parameter '{}' for '{}'",
            name, segment.name
        ))
    })
}

fn int_parameter(segment: &Segment, name: &str) -> AirVinylResult<i32> {
    let raw = required_parameter(segment, name)?;
    raw.parse::<i32>().map_err(|_| {
        AirVinylError::validation(format!("Parameter '{}' must be an integer, got '{}'", name, raw))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_segments_respects_parentheses() {
        let segments =
            split_segments("RecordStores(1)/AirVinyl.Functions.IsHighRatedFn(minimumRating=3)")
                .unwrap();
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].name, "RecordStores");
        assert_eq!(segments[0].args.as_deref(), Some("1"));
        assert_eq!(segments[1].args.as_deref(), Some("minimumRating=3"));

        let quoted = split_segments("People('a/b')/Email").unwrap();
        assert_eq!(quoted.len(), 2);

        assert!(split_segments("People(1/Email").is_err());
    }

    #[test]
    fn test_key_literals() {
        assert_eq!(parse_key_literal("7", Some("PersonId")), Ok(7));
        assert_eq!(parse_key_literal("PersonId=3", Some("PersonId")), Ok(3));
        assert!(parse_key_literal("'seven'", Some("PersonId")).is_err());
        assert!(parse_key_literal("Foo=3", Some("PersonId")).is_err());
        assert!(parse_key_literal("PersonId=3", Some("RecordStoreId")).is_err());
    }

    #[test]
    fn test_parse_parameters_with_collections() {
        let params = parse_parameters("personIds=[1,7],minimumRating=2").unwrap();
        assert_eq!(params["personIds"], "[1,7]");
        assert_eq!(params["minimumRating"], "2");
    }

    #[test]
    fn test_parse_person_paths() {
        assert_eq!(Resource::parse("People").unwrap(), Resource::People);
        assert_eq!(
            Resource::parse("People(7)").unwrap(),
            Resource::Person(PersonTarget::Key(7))
        );
        assert_eq!(
            Resource::parse("People(7)/FirstName/$value").unwrap(),
            Resource::PersonProperty {
                person: PersonTarget::Key(7),
                property: "FirstName".to_string(),
                raw: true,
            }
        );
        assert_eq!(
            Resource::parse("GetTim/Email").unwrap(),
            Resource::PersonProperty {
                person: PersonTarget::Singleton,
                property: "Email".to_string(),
                raw: false,
            }
        );
        assert_eq!(
            Resource::parse("People(1)/VinylRecords(11)").unwrap(),
            Resource::VinylRecord(PersonTarget::Key(1), 11)
        );
    }

    #[test]
    fn test_parse_link_paths() {
        assert_eq!(
            Resource::parse("People(7)/Friends/$ref").unwrap(),
            Resource::FriendsRef(PersonTarget::Key(7))
        );
        assert_eq!(
            Resource::parse("People(7)/Friends(1)/$ref").unwrap(),
            Resource::FriendRef(PersonTarget::Key(7), 1)
        );
        // GET on the friends navigation itself goes through the resolver
        assert_eq!(
            Resource::parse("People(7)/Friends").unwrap(),
            Resource::PersonProperty {
                person: PersonTarget::Key(7),
                property: "Friends".to_string(),
                raw: false,
            }
        );
    }

    #[test]
    fn test_parse_record_store_operations() {
        assert_eq!(
            Resource::parse("RecordStores(1)/AirVinyl.Functions.IsHighRatedFn(minimumRating=3)")
                .unwrap(),
            Resource::IsHighRated {
                key: 1,
                minimum_rating: 3
            }
        );
        assert_eq!(
            Resource::parse("RecordStores/AirVinyl.Functions.AreRatedByFn(personIds=[1,7])")
                .unwrap(),
            Resource::AreRatedBy {
                person_ids: vec![1, 7]
            }
        );
        assert_eq!(
            Resource::parse("GetHighRatedRecordStoresFn(minimumRating=4)").unwrap(),
            Resource::HighRatedRecordStores { minimum_rating: 4 }
        );
        assert_eq!(
            Resource::parse("RecordStores(2)/AirVinyl.Actions.Rate").unwrap(),
            Resource::Rate(2)
        );
        assert_eq!(
            Resource::parse("RecordStores/AirVinyl.Actions.RemoveRatings").unwrap(),
            Resource::RemoveRatings
        );
        assert_eq!(
            Resource::parse("RecordStores(2)/AirVinyl.Model.SpecializedRecordStore").unwrap(),
            Resource::SpecializedRecordStore(2)
        );
    }

    #[test]
    fn test_parse_derived_type_property_paths() {
        assert_eq!(
            Resource::parse("RecordStores(2)/AirVinyl.Model.SpecializedRecordStore/Specialization/$value")
                .unwrap(),
            Resource::RecordStoreProperty {
                key: 2,
                specialized: true,
                property: "Specialization".to_string(),
                raw: true,
            }
        );
        assert_eq!(
            Resource::parse("RecordStores(2)/Name").unwrap(),
            Resource::RecordStoreProperty {
                key: 2,
                specialized: false,
                property: "Name".to_string(),
                raw: false,
            }
        );
    }

    #[test]
    fn test_parse_rejections() {
        assert!(matches!(
            Resource::parse("Albums(1)"),
            Err(AirVinylError::NotFound(_))
        ));
        assert!(matches!(
            Resource::parse("People(x)"),
            Err(AirVinylError::ValidationFailed(_))
        ));
        assert!(matches!(
            Resource::parse("People(Foo=3)"),
            Err(AirVinylError::ValidationFailed(_))
        ));
        assert_eq!(
            Resource::parse("RecordStores(RecordStoreId=2)").unwrap(),
            Resource::RecordStore(2)
        );
        assert!(matches!(
            Resource::parse("People(1)/$ref"),
            Err(AirVinylError::NotFound(_))
        ));
        assert!(matches!(
            Resource::parse("RecordStores(1)/AirVinyl.Functions.IsHighRatedFn(minimumRating=high)"),
            Err(AirVinylError::ValidationFailed(_))
        ));
        assert!(matches!(Resource::parse(""), Err(AirVinylError::NotFound(_))));
    }
}
