use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    response::{Json, Response},
};
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::api::link_handlers;
use crate::api::payload::{
    created, json, no_content, plain_text, ApiResult, ODataCollection, ODataEntity, ODataValue,
    ServiceDocumentEntry,
};
use crate::api::record_store_handlers;
use crate::config::ODataConfig;
use crate::error::{AirVinylError, AirVinylResult};
use crate::logic::resolve::{PropertyOutcome, PropertyResolver, RawOutcome, Resolvable};
use crate::model::odata_path::{PEOPLE, RECORD_STORES, SINGLETON};
use crate::model::{
    Key, NewPerson, NewVinylRecord, Person, PersonPatch, PersonRelation, PersonTarget, Resource,
    VinylRecordPatch,
};
use crate::store::traits::{Page, PersonStore, Store, VinylRecordStore};

/// Shared handler state: the store handle plus service settings.
pub struct AppState<S> {
    pub store: Arc<S>,
    pub odata: Arc<ODataConfig>,
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            odata: Arc::clone(&self.odata),
        }
    }
}

impl<S: Store> AppState<S> {
    pub fn new(store: Arc<S>, odata: ODataConfig) -> Self {
        Self {
            store,
            odata: Arc::new(odata),
        }
    }

    pub fn person_key(&self, target: PersonTarget) -> Key {
        match target {
            PersonTarget::Key(key) => key,
            PersonTarget::Singleton => self.odata.singleton_person_id,
        }
    }

    /// Path of the person as addressed by the request: `People(7)` or `GetTim`
    fn person_path(&self, target: PersonTarget) -> String {
        match target {
            PersonTarget::Key(key) => format!("{}({})", PEOPLE, key),
            PersonTarget::Singleton => SINGLETON.to_string(),
        }
    }
}

pub type QueryParams = HashMap<String, String>;

/// Simple health check endpoint
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

/// `GET /odata`: entity sets and singletons exposed by the service
pub async fn service_document<S: Store>(State(state): State<AppState<S>>) -> Response {
    json(ODataValue {
        context: state.odata.context_url("").trim_end_matches('#').to_string(),
        value: vec![
            ServiceDocumentEntry {
                name: PEOPLE,
                kind: "EntitySet",
                url: PEOPLE,
            },
            ServiceDocumentEntry {
                name: RECORD_STORES,
                kind: "EntitySet",
                url: RECORD_STORES,
            },
            ServiceDocumentEntry {
                name: SINGLETON,
                kind: "Singleton",
                url: SINGLETON,
            },
        ],
    })
}

pub(crate) fn parse_body<T: DeserializeOwned>(body: &Bytes) -> AirVinylResult<T> {
    serde_json::from_slice(body)
        .map_err(|e| AirVinylError::validation(format!("Invalid request body: {}", e)))
}

fn unsupported(method: &str, path: &str) -> AirVinylError {
    AirVinylError::not_found(format!("No {} operation for '{}'", method, path))
}

pub async fn dispatch_get<S: Store>(
    State(state): State<AppState<S>>,
    Path(path): Path<String>,
    Query(params): Query<QueryParams>,
) -> ApiResult {
    match Resource::parse(&path)? {
        Resource::People => list_people(&state, &params).await,
        Resource::Person(target) => get_person(&state, target).await,
        Resource::PersonProperty {
            person,
            property,
            raw,
        } => get_person_property(&state, person, &property, raw).await,
        Resource::VinylRecords(person) => list_vinyl_records(&state, person).await,
        Resource::VinylRecord(person, record) => get_vinyl_record(&state, person, record).await,
        Resource::VinylRecordProperty {
            person,
            record,
            property,
            raw,
        } => get_vinyl_record_property(&state, person, record, &property, raw).await,
        Resource::FriendsRef(person) => link_handlers::list_friend_refs(&state, person).await,
        Resource::RecordStores => record_store_handlers::list_record_stores(&state, false).await,
        Resource::SpecializedRecordStores => {
            record_store_handlers::list_record_stores(&state, true).await
        }
        Resource::RecordStore(key) => {
            record_store_handlers::get_record_store(&state, key, false).await
        }
        Resource::SpecializedRecordStore(key) => {
            record_store_handlers::get_record_store(&state, key, true).await
        }
        Resource::RecordStoreProperty {
            key,
            specialized,
            property,
            raw,
        } => {
            record_store_handlers::get_record_store_property(&state, key, specialized, &property, raw)
                .await
        }
        Resource::IsHighRated {
            key,
            minimum_rating,
        } => record_store_handlers::is_high_rated(&state, key, minimum_rating).await,
        Resource::AreRatedBy { person_ids } => {
            record_store_handlers::are_rated_by(&state, &person_ids).await
        }
        Resource::HighRatedRecordStores { minimum_rating } => {
            record_store_handlers::high_rated_record_stores(&state, minimum_rating).await
        }
        _ => Err(unsupported("GET", &path)),
    }
}

pub async fn dispatch_post<S: Store>(
    State(state): State<AppState<S>>,
    Path(path): Path<String>,
    body: Bytes,
) -> ApiResult {
    match Resource::parse(&path)? {
        Resource::People => create_person(&state, parse_body(&body)?).await,
        Resource::VinylRecords(person) => {
            create_vinyl_record(&state, person, parse_body(&body)?).await
        }
        Resource::FriendsRef(person) => {
            link_handlers::create_friend_link(&state, person, parse_body(&body)?).await
        }
        Resource::RecordStores => {
            record_store_handlers::create_record_store(&state, parse_body(&body)?, false).await
        }
        Resource::SpecializedRecordStores => {
            record_store_handlers::create_record_store(&state, parse_body(&body)?, true).await
        }
        Resource::Rate(key) => record_store_handlers::rate(&state, key, parse_body(&body)?).await,
        Resource::RemoveRatings => {
            record_store_handlers::remove_ratings(&state, parse_body(&body)?).await
        }
        Resource::RemoveRecordStoreRatings => {
            record_store_handlers::remove_record_store_ratings(&state, parse_body(&body)?).await
        }
        _ => Err(unsupported("POST", &path)),
    }
}

pub async fn dispatch_put<S: Store>(
    State(state): State<AppState<S>>,
    Path(path): Path<String>,
    body: Bytes,
) -> ApiResult {
    match Resource::parse(&path)? {
        Resource::Person(target) => replace_person(&state, target, parse_body(&body)?).await,
        Resource::FriendRef(person, current) => {
            link_handlers::replace_friend_link(&state, person, current, parse_body(&body)?).await
        }
        _ => Err(unsupported("PUT", &path)),
    }
}

pub async fn dispatch_patch<S: Store>(
    State(state): State<AppState<S>>,
    Path(path): Path<String>,
    body: Bytes,
) -> ApiResult {
    match Resource::parse(&path)? {
        Resource::Person(target) => update_person(&state, target, parse_body(&body)?).await,
        Resource::VinylRecord(person, record) => {
            update_vinyl_record(&state, person, record, parse_body(&body)?).await
        }
        Resource::RecordStore(key) => {
            record_store_handlers::update_record_store(&state, key, parse_body(&body)?, false)
                .await
        }
        Resource::SpecializedRecordStore(key) => {
            record_store_handlers::update_record_store(&state, key, parse_body(&body)?, true).await
        }
        _ => Err(unsupported("PATCH", &path)),
    }
}

pub async fn dispatch_delete<S: Store>(
    State(state): State<AppState<S>>,
    Path(path): Path<String>,
    Query(params): Query<QueryParams>,
) -> ApiResult {
    match Resource::parse(&path)? {
        Resource::Person(PersonTarget::Key(key)) => delete_person(&state, key).await,
        Resource::Person(PersonTarget::Singleton) => Err(AirVinylError::validation(format!(
            "The singleton '{}' cannot be deleted",
            SINGLETON
        ))),
        Resource::VinylRecord(person, record) => delete_vinyl_record(&state, person, record).await,
        Resource::FriendRef(person, related) => {
            link_handlers::delete_friend_link(&state, person, related).await
        }
        Resource::FriendsRef(person) => {
            link_handlers::delete_friend_link_by_id(&state, person, params.get("$id")).await
        }
        Resource::RecordStore(key) => {
            record_store_handlers::delete_record_store(&state, key, false).await
        }
        Resource::SpecializedRecordStore(key) => {
            record_store_handlers::delete_record_store(&state, key, true).await
        }
        _ => Err(unsupported("DELETE", &path)),
    }
}

/// Render a property read as a value payload, a raw string or 204.
pub(crate) fn property_response<T: Resolvable>(
    entity: &T,
    property: &str,
    raw: bool,
    context: String,
) -> ApiResult {
    let missing = || AirVinylError::not_found(format!("Property '{}' not found", property));

    if raw {
        return match PropertyResolver::resolve_raw(entity, property) {
            RawOutcome::Raw(text) => Ok(plain_text(text)),
            RawOutcome::NoContent => Ok(no_content()),
            RawOutcome::NotFound => Err(missing()),
        };
    }

    match PropertyResolver::resolve(entity, property) {
        PropertyOutcome::Value { value, .. } => Ok(json(ODataValue { context, value })),
        PropertyOutcome::NoContent => Ok(no_content()),
        PropertyOutcome::NotFound => Err(missing()),
    }
}

fn query_usize(params: &QueryParams, name: &str, max: usize) -> AirVinylResult<Option<usize>> {
    let Some(raw) = params.get(name) else {
        return Ok(None);
    };
    let value: usize = raw.trim().parse().map_err(|_| {
        AirVinylError::validation(format!("'{}' is not a valid value for {}", raw, name))
    })?;
    if value > max {
        return Err(AirVinylError::validation(format!(
            "The limit of '{}' for {} was exceeded; the requested value was '{}'",
            max, name, value
        )));
    }
    Ok(Some(value))
}

fn query_bool(params: &QueryParams, name: &str) -> AirVinylResult<bool> {
    match params.get(name).map(|v| v.trim()) {
        None | Some("false") => Ok(false),
        Some("true") => Ok(true),
        Some(other) => Err(AirVinylError::validation(format!(
            "'{}' is not a valid value for {}",
            other, name
        ))),
    }
}

pub(crate) async fn load_person<S: Store>(
    state: &AppState<S>,
    key: Key,
    include: &[PersonRelation],
) -> AirVinylResult<Person> {
    state
        .store
        .get_person(key, include)
        .await?
        .ok_or_else(|| AirVinylError::not_found(format!("Person {} not found", key)))
}

/// `GET People` with `$top`, `$skip`, `$count` and server-driven paging
async fn list_people<S: Store>(state: &AppState<S>, params: &QueryParams) -> ApiResult {
    let odata = &state.odata;
    let top = query_usize(params, "$top", odata.max_top)?;
    let skip = query_usize(params, "$skip", odata.max_skip)?.unwrap_or(0);
    let with_count = query_bool(params, "$count")?;

    let total = state.store.count_people().await?;
    let available = total.saturating_sub(skip);
    let requested = top.map_or(available, |top| top.min(available));
    let take = requested.min(odata.page_size);

    let people = state.store.list_people(Page { skip, take }).await?;

    let mut payload = ODataCollection::new(odata.context_url(PEOPLE), people);
    if with_count {
        payload.count = Some(total);
    }
    if requested > take {
        let mut query = Vec::new();
        if let Some(top) = top {
            query.push(format!("$top={}", top - take));
        }
        query.push(format!("$skip={}", skip + take));
        if with_count {
            query.push("$count=true".to_string());
        }
        payload.next_link = Some(odata.resource_url(&format!("{}?{}", PEOPLE, query.join("&"))));
    }

    Ok(json(payload))
}

async fn get_person<S: Store>(state: &AppState<S>, target: PersonTarget) -> ApiResult {
    let person = load_person(state, state.person_key(target), &[]).await?;
    let context = match target {
        PersonTarget::Key(_) => state.odata.context_url(&format!("{}/$entity", PEOPLE)),
        PersonTarget::Singleton => state.odata.context_url(SINGLETON),
    };
    Ok(json(ODataEntity {
        context,
        entity: person,
    }))
}

async fn get_person_property<S: Store>(
    state: &AppState<S>,
    target: PersonTarget,
    property: &str,
    raw: bool,
) -> ApiResult {
    let include: Vec<PersonRelation> = PersonRelation::from_property(property).into_iter().collect();
    let person = load_person(state, state.person_key(target), &include).await?;
    let context = state
        .odata
        .context_url(&format!("{}/{}", state.person_path(target), property));
    property_response(&person, property, raw, context)
}

async fn create_person<S: Store>(state: &AppState<S>, person: NewPerson) -> ApiResult {
    person.validate().map_err(AirVinylError::ValidationFailed)?;

    let created_person = state.store.insert_person(person).await?;
    log::info!(
        "Created person {} ({})",
        created_person.person_id,
        created_person.full_name()
    );

    let location = state
        .odata
        .resource_url(&format!("{}({})", PEOPLE, created_person.person_id));
    Ok(created(
        location,
        ODataEntity {
            context: state.odata.context_url(&format!("{}/$entity", PEOPLE)),
            entity: created_person,
        },
    ))
}

async fn replace_person<S: Store>(
    state: &AppState<S>,
    target: PersonTarget,
    replacement: NewPerson,
) -> ApiResult {
    replacement
        .validate()
        .map_err(AirVinylError::ValidationFailed)?;

    let mut person = load_person(state, state.person_key(target), &[]).await?;
    replacement.apply_to(&mut person);
    save_person(state, &person).await?;

    log::info!("Replaced person {}", person.person_id);
    Ok(no_content())
}

async fn update_person<S: Store>(
    state: &AppState<S>,
    target: PersonTarget,
    patch: PersonPatch,
) -> ApiResult {
    patch.validate().map_err(AirVinylError::ValidationFailed)?;

    let mut person = load_person(state, state.person_key(target), &[]).await?;
    patch.apply_to(&mut person);
    save_person(state, &person).await?;

    log::info!("Updated person {}", person.person_id);
    Ok(no_content())
}

async fn save_person<S: Store>(state: &AppState<S>, person: &Person) -> AirVinylResult<()> {
    if !state.store.update_person(person).await? {
        return Err(AirVinylError::not_found(format!(
            "Person {} not found",
            person.person_id
        )));
    }
    Ok(())
}

async fn delete_person<S: Store>(state: &AppState<S>, key: Key) -> ApiResult {
    if !state.store.delete_person(key).await? {
        return Err(AirVinylError::not_found(format!("Person {} not found", key)));
    }
    log::info!("Deleted person {}", key);
    Ok(no_content())
}

async fn list_vinyl_records<S: Store>(state: &AppState<S>, target: PersonTarget) -> ApiResult {
    let key = state.person_key(target);
    let person = load_person(state, key, &[PersonRelation::VinylRecords]).await?;
    let context = state
        .odata
        .context_url(&format!("{}/VinylRecords", state.person_path(target)));
    Ok(json(ODataCollection::new(
        context,
        person.vinyl_records.unwrap_or_default(),
    )))
}

async fn get_vinyl_record<S: Store>(
    state: &AppState<S>,
    target: PersonTarget,
    record: Key,
) -> ApiResult {
    let key = state.person_key(target);
    let vinyl_record = load_vinyl_record(state, key, record).await?;
    let context = state
        .odata
        .context_url(&format!("{}/VinylRecords/$entity", state.person_path(target)));
    Ok(json(ODataEntity {
        context,
        entity: vinyl_record,
    }))
}

async fn load_vinyl_record<S: Store>(
    state: &AppState<S>,
    person: Key,
    record: Key,
) -> AirVinylResult<crate::model::VinylRecord> {
    state
        .store
        .get_vinyl_record(person, record)
        .await?
        .ok_or_else(|| {
            AirVinylError::not_found(format!(
                "Vinyl record {} not found for person {}",
                record, person
            ))
        })
}

async fn get_vinyl_record_property<S: Store>(
    state: &AppState<S>,
    target: PersonTarget,
    record: Key,
    property: &str,
    raw: bool,
) -> ApiResult {
    let vinyl_record = load_vinyl_record(state, state.person_key(target), record).await?;
    let context = state.odata.context_url(&format!(
        "{}/VinylRecords({})/{}",
        state.person_path(target),
        record,
        property
    ));
    property_response(&vinyl_record, property, raw, context)
}

async fn create_vinyl_record<S: Store>(
    state: &AppState<S>,
    target: PersonTarget,
    record: NewVinylRecord,
) -> ApiResult {
    record.validate().map_err(AirVinylError::ValidationFailed)?;

    let key = state.person_key(target);
    if !state.store.person_exists(key).await? {
        return Err(AirVinylError::not_found(format!("Person {} not found", key)));
    }

    let vinyl_record = state.store.insert_vinyl_record(key, record).await?;
    log::info!(
        "Added vinyl record {} to person {}",
        vinyl_record.vinyl_record_id,
        key
    );

    let location = state.odata.resource_url(&format!(
        "{}({})/VinylRecords({})",
        PEOPLE, key, vinyl_record.vinyl_record_id
    ));
    Ok(created(
        location,
        ODataEntity {
            context: state
                .odata
                .context_url(&format!("{}/VinylRecords/$entity", state.person_path(target))),
            entity: vinyl_record,
        },
    ))
}

async fn update_vinyl_record<S: Store>(
    state: &AppState<S>,
    target: PersonTarget,
    record: Key,
    patch: VinylRecordPatch,
) -> ApiResult {
    patch.validate().map_err(AirVinylError::ValidationFailed)?;

    let key = state.person_key(target);
    let mut vinyl_record = load_vinyl_record(state, key, record).await?;
    patch.apply_to(&mut vinyl_record);
    if !state.store.update_vinyl_record(&vinyl_record).await? {
        return Err(AirVinylError::not_found(format!(
            "Vinyl record {} not found for person {}",
            record, key
        )));
    }

    log::info!("Updated vinyl record {} of person {}", record, key);
    Ok(no_content())
}

async fn delete_vinyl_record<S: Store>(
    state: &AppState<S>,
    target: PersonTarget,
    record: Key,
) -> ApiResult {
    let key = state.person_key(target);
    if !state.store.delete_vinyl_record(key, record).await? {
        return Err(AirVinylError::not_found(format!(
            "Vinyl record {} not found for person {}",
            record, key
        )));
    }
    log::info!("Deleted vinyl record {} of person {}", record, key);
    Ok(no_content())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> QueryParams {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_query_limits() {
        let p = params(&[("$top", "10"), ("$skip", "16"), ("$count", "maybe")]);
        assert_eq!(query_usize(&p, "$top", 10).unwrap(), Some(10));
        assert!(query_usize(&p, "$skip", 15).is_err());
        assert!(query_usize(&params(&[("$top", "-1")]), "$top", 10).is_err());
        assert_eq!(query_usize(&p, "$missing", 10).unwrap(), None);

        assert!(query_bool(&p, "$count").is_err());
        assert!(query_bool(&params(&[("$count", "true")]), "$count").unwrap());
        assert!(!query_bool(&params(&[]), "$count").unwrap());
    }

    #[test]
    fn test_parse_body_reports_validation_failure() {
        let body = Bytes::from_static(b"{\"FirstName\": ");
        let result: AirVinylResult<PersonPatch> = parse_body(&body);
        assert!(matches!(result, Err(AirVinylError::ValidationFailed(_))));
    }
}
