use anyhow::anyhow;
use serde::Deserialize;
use url::Url;

use crate::config::ODataConfig;
use crate::error::{AirVinylError, AirVinylResult};
use crate::model::odata_path::{split_segments, PEOPLE};
use crate::model::{Key, PersonRelation};
use crate::store::{FriendLinkStore, PersonStore, Store};

/// Body of a `$ref` request: `{"@odata.id": "http://host/odata/People(3)"}`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EntityReference {
    #[serde(rename = "@odata.id")]
    pub id: String,
}

/// Turn an entity reference into the key it names within `entity_set`.
///
/// Relative and scheme-less references are joined onto the service root.
/// Host, query and fragment are ignored, as is everything up to and including
/// the route prefix, so `http://localhost/odata/People(3)`,
/// `localhost/odata/People(3)` and `People(PersonId=3)` all resolve to 3.
pub fn resolve_reference(reference: &str, odata: &ODataConfig, entity_set: &str) -> AirVinylResult<Key> {
    let invalid = || AirVinylError::InvalidReference(reference.to_string());

    let url = match Url::parse(reference.trim()) {
        Ok(url) => url,
        Err(url::ParseError::RelativeUrlWithoutBase) => odata
            .service_root_url()
            .map_err(|e| anyhow!("Invalid service root '{}': {}", odata.service_root, e))?
            .join(reference.trim())
            .map_err(|_| invalid())?,
        Err(_) => return Err(invalid()),
    };
    let path = urlencoding::decode(url.path()).map_err(|_| invalid())?;

    let prefix = odata.route_prefix.trim_matches('/');
    let path = path.trim_start_matches('/');
    let relative = if prefix.is_empty() {
        path
    } else {
        let marker = format!("{}/", prefix);
        // the last occurrence, so a scheme-less `host/odata/...` joined onto the root still matches
        match path.rfind(&format!("/{}", marker)) {
            Some(i) => &path[i + marker.len() + 1..],
            None => path.strip_prefix(&marker).unwrap_or(path),
        }
    };

    let segments = split_segments(relative).map_err(|_| invalid())?;
    match segments.as_slice() {
        [segment] if segment.name == entity_set => match segment.key() {
            Some(Ok(key)) => Ok(key),
            _ => Err(invalid()),
        },
        _ => Err(invalid()),
    }
}

/// Maintains the `Person.Friends` relation through entity references.
pub struct AssociationLinkManager<'a, S: Store> {
    store: &'a S,
    odata: &'a ODataConfig,
}

impl<'a, S: Store> AssociationLinkManager<'a, S> {
    pub fn new(store: &'a S, odata: &'a ODataConfig) -> Self {
        Self { store, odata }
    }

    async fn friends_of(&self, owner: Key) -> AirVinylResult<Vec<Key>> {
        let person = self
            .store
            .get_person(owner, &[PersonRelation::Friends])
            .await?
            .ok_or_else(|| AirVinylError::not_found(format!("Person {} not found", owner)))?;

        Ok(person
            .friends
            .unwrap_or_default()
            .iter()
            .map(|friend| friend.person_id)
            .collect())
    }

    async fn ensure_target_exists(&self, target: Key) -> AirVinylResult<()> {
        if !self.store.person_exists(target).await? {
            return Err(AirVinylError::not_found(format!("Person {} not found", target)));
        }
        Ok(())
    }

    /// `POST People(k)/Friends/$ref`
    pub async fn create_link(&self, owner: Key, reference: &str) -> AirVinylResult<Key> {
        let friends = self.friends_of(owner).await?;
        let target = resolve_reference(reference, self.odata, PEOPLE)?;

        if friends.contains(&target) {
            return Err(already_linked(owner, target));
        }
        self.ensure_target_exists(target).await?;

        self.store.add_friend(owner, target).await?;
        log::info!("Linked person {} to friend {}", owner, target);
        Ok(target)
    }

    /// `PUT People(k)/Friends(r)/$ref`
    pub async fn replace_link(&self, owner: Key, current: Key, reference: &str) -> AirVinylResult<Key> {
        let friends = self.friends_of(owner).await?;
        if !friends.contains(&current) {
            return Err(not_linked(owner, current));
        }

        let target = resolve_reference(reference, self.odata, PEOPLE)?;
        if friends.contains(&target) {
            return Err(already_linked(owner, target));
        }
        self.ensure_target_exists(target).await?;

        self.store.replace_friend(owner, current, target).await?;
        log::info!("Replaced friend {} of person {} with {}", current, owner, target);
        Ok(target)
    }

    /// `DELETE People(k)/Friends(r)/$ref`
    pub async fn delete_link(&self, owner: Key, related: Key) -> AirVinylResult<()> {
        let friends = self.friends_of(owner).await?;
        if !friends.contains(&related) {
            return Err(not_linked(owner, related));
        }

        self.store.remove_friend(owner, related).await?;
        log::info!("Unlinked friend {} from person {}", related, owner);
        Ok(())
    }

    /// `DELETE People(k)/Friends/$ref?$id=<reference>`
    pub async fn delete_link_by_reference(&self, owner: Key, reference: &str) -> AirVinylResult<()> {
        // owner lookup first so a missing owner wins over a bad reference
        self.friends_of(owner).await?;
        let related = resolve_reference(reference, self.odata, PEOPLE)?;
        self.delete_link(owner, related).await
    }
}

fn already_linked(owner: Key, target: Key) -> AirVinylError {
    AirVinylError::Conflict(format!(
        "The person with {} id is already linked to person with id {}",
        owner, target
    ))
}

fn not_linked(owner: Key, related: Key) -> AirVinylError {
    AirVinylError::not_found(format!(
        "Person {} is not linked to person {}",
        owner, related
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Gender, NewPerson};
    use crate::store::MemoryStore;
    use chrono::DateTime;

    async fn store_with_people(count: usize) -> MemoryStore {
        let store = MemoryStore::new();
        for i in 0..count {
            store
                .insert_person(NewPerson {
                    email: None,
                    first_name: format!("Person{}", i + 1),
                    last_name: "Test".to_string(),
                    date_of_birth: DateTime::parse_from_rfc3339("1985-05-05T00:00:00+00:00")
                        .unwrap(),
                    gender: Gender::Female,
                    number_of_records_on_wish_list: 0,
                    amount_of_cash_to_spend: 0.0,
                    vinyl_records: Vec::new(),
                })
                .await
                .unwrap();
        }
        store
    }

    async fn friend_keys(store: &MemoryStore, owner: Key) -> Vec<Key> {
        store
            .get_person(owner, &[PersonRelation::Friends])
            .await
            .unwrap()
            .unwrap()
            .friends
            .unwrap()
            .iter()
            .map(|f| f.person_id)
            .collect()
    }

    #[test]
    fn test_resolve_reference_forms() {
        for reference in [
            "http://localhost:64951/odata/People(3)",
            "localhost/odata/People(3)",
            "/odata/People(PersonId=3)",
            "People(3)",
            "http://localhost/odata/People%283%29",
            "http://localhost/odata/People(3)?$format=json#top",
            "odata/People(3)",
        ] {
            assert_eq!(
                resolve_reference(reference, &ODataConfig::default(), PEOPLE).unwrap(),
                3,
                "{}",
                reference
            );
        }
    }

    #[test]
    fn test_resolve_reference_rejects_non_keyed_or_wrong_set() {
        for reference in [
            "http://localhost/odata/People",
            "http://localhost/odata/RecordStores(3)",
            "http://localhost/odata/People(3)/Friends",
            "http://localhost/odata/People(abc)",
            "http://localhost/odata/People(Foo=3)",
            "",
        ] {
            assert!(
                matches!(
                    resolve_reference(reference, &ODataConfig::default(), PEOPLE),
                    Err(AirVinylError::InvalidReference(_))
                ),
                "{}",
                reference
            );
        }
    }

    #[tokio::test]
    async fn test_create_link() {
        let store = store_with_people(3).await;
        let odata = ODataConfig::default();
        let links = AssociationLinkManager::new(&store, &odata);

        links.create_link(1, "http://localhost/odata/People(2)").await.unwrap();
        assert_eq!(friend_keys(&store, 1).await, vec![2]);

        // already linked
        assert!(matches!(
            links.create_link(1, "http://localhost/odata/People(2)").await,
            Err(AirVinylError::Conflict(_))
        ));
        // missing owner and missing target
        assert!(matches!(
            links.create_link(99, "http://localhost/odata/People(2)").await,
            Err(AirVinylError::NotFound(_))
        ));
        assert!(matches!(
            links.create_link(1, "http://localhost/odata/People(42)").await,
            Err(AirVinylError::NotFound(_))
        ));
        assert_eq!(friend_keys(&store, 1).await, vec![2]);
    }

    #[tokio::test]
    async fn test_replace_link() {
        let store = store_with_people(4).await;
        store.add_friend(1, 2).await.unwrap();
        store.add_friend(1, 3).await.unwrap();
        let odata = ODataConfig::default();
        let links = AssociationLinkManager::new(&store, &odata);

        // new target already linked
        assert!(matches!(
            links.replace_link(1, 2, "odata/People(3)").await,
            Err(AirVinylError::Conflict(_))
        ));
        // current link missing
        assert!(matches!(
            links.replace_link(1, 4, "odata/People(4)").await,
            Err(AirVinylError::NotFound(_))
        ));
        // new target missing leaves the old link in place
        assert!(matches!(
            links.replace_link(1, 2, "odata/People(42)").await,
            Err(AirVinylError::NotFound(_))
        ));
        assert_eq!(friend_keys(&store, 1).await, vec![2, 3]);

        links.replace_link(1, 2, "odata/People(4)").await.unwrap();
        assert_eq!(friend_keys(&store, 1).await, vec![3, 4]);
    }

    #[tokio::test]
    async fn test_delete_link() {
        let store = store_with_people(3).await;
        store.add_friend(1, 2).await.unwrap();
        store.add_friend(1, 3).await.unwrap();
        let odata = ODataConfig::default();
        let links = AssociationLinkManager::new(&store, &odata);

        links.delete_link(1, 2).await.unwrap();
        assert!(matches!(links.delete_link(1, 2).await, Err(AirVinylError::NotFound(_))));

        links
            .delete_link_by_reference(1, "http://localhost/odata/People(3)")
            .await
            .unwrap();
        assert!(friend_keys(&store, 1).await.is_empty());

        assert!(matches!(
            links.delete_link_by_reference(1, "http://localhost/odata/RecordStores(3)").await,
            Err(AirVinylError::InvalidReference(_))
        ));
    }
}
