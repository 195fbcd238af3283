use crate::api::handlers::{load_person, AppState};
use crate::api::payload::{json, no_content, ApiResult, ODataCollection, ODataReference};
use crate::error::AirVinylError;
use crate::logic::links::{AssociationLinkManager, EntityReference};
use crate::model::odata_path::PEOPLE;
use crate::model::{Key, PersonRelation, PersonTarget};
use crate::store::traits::Store;

fn link_manager<S: Store>(state: &AppState<S>) -> AssociationLinkManager<'_, S> {
    AssociationLinkManager::new(state.store.as_ref(), &state.odata)
}

/// `GET People(k)/Friends/$ref`
pub async fn list_friend_refs<S: Store>(state: &AppState<S>, target: PersonTarget) -> ApiResult {
    let person = load_person(state, state.person_key(target), &[PersonRelation::Friends]).await?;
    let references = person
        .friends
        .unwrap_or_default()
        .iter()
        .map(|friend| ODataReference {
            id: state
                .odata
                .resource_url(&format!("{}({})", PEOPLE, friend.person_id)),
        })
        .collect();

    Ok(json(ODataCollection::new(
        state.odata.context_url("Collection($ref)"),
        references,
    )))
}

/// `POST People(k)/Friends/$ref`
pub async fn create_friend_link<S: Store>(
    state: &AppState<S>,
    target: PersonTarget,
    reference: EntityReference,
) -> ApiResult {
    link_manager(state)
        .create_link(state.person_key(target), &reference.id)
        .await?;
    Ok(no_content())
}

/// `PUT People(k)/Friends(r)/$ref`
pub async fn replace_friend_link<S: Store>(
    state: &AppState<S>,
    target: PersonTarget,
    current: Key,
    reference: EntityReference,
) -> ApiResult {
    link_manager(state)
        .replace_link(state.person_key(target), current, &reference.id)
        .await?;
    Ok(no_content())
}

/// `DELETE People(k)/Friends(r)/$ref`
pub async fn delete_friend_link<S: Store>(
    state: &AppState<S>,
    target: PersonTarget,
    related: Key,
) -> ApiResult {
    link_manager(state)
        .delete_link(state.person_key(target), related)
        .await?;
    Ok(no_content())
}

/// `DELETE People(k)/Friends/$ref?$id=<url>`
pub async fn delete_friend_link_by_id<S: Store>(
    state: &AppState<S>,
    target: PersonTarget,
    id: Option<&String>,
) -> ApiResult {
    let reference = id.ok_or_else(|| {
        AirVinylError::validation("Deleting a link from a collection requires the $id parameter")
    })?;
    link_manager(state)
        .delete_link_by_reference(state.person_key(target), reference)
        .await?;
    Ok(no_content())
}
