use crate::api::handlers::{property_response, AppState};
use crate::api::payload::{created, json, no_content, ApiResult, ODataCollection, ODataEntity, ODataValue};
use crate::error::{AirVinylError, AirVinylResult};
use crate::logic::ratings::{ActionParameters, RatingService};
use crate::model::odata_path::RECORD_STORES;
use crate::model::{
    Key, NewRecordStore, RecordStore, RecordStoreKind, RecordStorePatch,
    SPECIALIZED_RECORD_STORE_TYPE,
};
use crate::store::traits::{RecordStoreCatalog, RecordStoreDraft, Store};

/// Entity set path, with the derived type cast when addressed through it
fn set_path(specialized: bool) -> String {
    if specialized {
        format!("{}/{}", RECORD_STORES, SPECIALIZED_RECORD_STORE_TYPE)
    } else {
        RECORD_STORES.to_string()
    }
}

async fn load_record_store<S: Store>(
    state: &AppState<S>,
    key: Key,
    specialized: bool,
    include_ratings: bool,
) -> AirVinylResult<RecordStore> {
    let missing = || AirVinylError::not_found(format!("Record store {} not found", key));

    let store = state
        .store
        .get_record_store(key, include_ratings)
        .await?
        .ok_or_else(missing)?;
    // a cast to the derived type only matches specialized stores
    if specialized && !store.is_specialized() {
        return Err(missing());
    }
    Ok(store)
}

pub async fn list_record_stores<S: Store>(state: &AppState<S>, specialized: bool) -> ApiResult {
    let mut stores = state.store.list_record_stores(false).await?;
    if specialized {
        stores.retain(|s| s.is_specialized());
    }
    Ok(json(ODataCollection::new(
        state.odata.context_url(&set_path(specialized)),
        stores,
    )))
}

pub async fn get_record_store<S: Store>(state: &AppState<S>, key: Key, specialized: bool) -> ApiResult {
    let store = load_record_store(state, key, specialized, false).await?;
    Ok(json(ODataEntity {
        context: state
            .odata
            .context_url(&format!("{}/$entity", set_path(specialized))),
        entity: store,
    }))
}

pub async fn get_record_store_property<S: Store>(
    state: &AppState<S>,
    key: Key,
    specialized: bool,
    property: &str,
    raw: bool,
) -> ApiResult {
    let store = load_record_store(state, key, specialized, property == "Ratings").await?;
    let entity_path = if specialized {
        format!("{}({})/{}", RECORD_STORES, key, SPECIALIZED_RECORD_STORE_TYPE)
    } else {
        format!("{}({})", RECORD_STORES, key)
    };
    let context = state
        .odata
        .context_url(&format!("{}/{}", entity_path, property));
    property_response(&store, property, raw, context)
}

pub async fn create_record_store<S: Store>(
    state: &AppState<S>,
    mut new_store: NewRecordStore,
    specialized: bool,
) -> ApiResult {
    if specialized && new_store.odata_type.is_none() {
        new_store.odata_type = Some(format!("#{}", SPECIALIZED_RECORD_STORE_TYPE));
    }
    let kind = new_store.validate().map_err(AirVinylError::ValidationFailed)?;
    if specialized && kind == RecordStoreKind::General {
        return Err(AirVinylError::validation(format!(
            "Only '{}' entities can be added through this path",
            SPECIALIZED_RECORD_STORE_TYPE
        )));
    }

    let store = state
        .store
        .insert_record_store(RecordStoreDraft {
            name: new_store.name,
            store_address: new_store.store_address,
            tags: new_store.tags,
            kind,
        })
        .await?;
    log::info!(
        "Created record store {} ({}) as {}",
        store.record_store_id,
        store.name,
        store.kind.type_name()
    );

    let location = state
        .odata
        .resource_url(&format!("{}({})", RECORD_STORES, store.record_store_id));
    Ok(created(
        location,
        ODataEntity {
            context: state
                .odata
                .context_url(&format!("{}/$entity", set_path(specialized))),
            entity: store,
        },
    ))
}

pub async fn update_record_store<S: Store>(
    state: &AppState<S>,
    key: Key,
    patch: RecordStorePatch,
    specialized: bool,
) -> ApiResult {
    let mut store = load_record_store(state, key, specialized, false).await?;
    patch
        .apply_to(&mut store)
        .map_err(AirVinylError::ValidationFailed)?;

    if !state.store.update_record_store(&store).await? {
        return Err(AirVinylError::not_found(format!("Record store {} not found", key)));
    }
    log::info!("Updated record store {}", key);
    Ok(no_content())
}

pub async fn delete_record_store<S: Store>(state: &AppState<S>, key: Key, specialized: bool) -> ApiResult {
    if specialized {
        load_record_store(state, key, true, false).await?;
    }
    if !state.store.delete_record_store(key).await? {
        return Err(AirVinylError::not_found(format!("Record store {} not found", key)));
    }
    log::info!("Deleted record store {} and its ratings", key);
    Ok(no_content())
}

/// `RecordStores(k)/AirVinyl.Functions.IsHighRatedFn(minimumRating=n)`
pub async fn is_high_rated<S: Store>(state: &AppState<S>, key: Key, minimum_rating: i32) -> ApiResult {
    let value = RatingService::new(state.store.as_ref())
        .is_high_rated(key, minimum_rating)
        .await?;
    Ok(json(ODataValue {
        context: state.odata.context_url("Edm.Boolean"),
        value,
    }))
}

/// `RecordStores/AirVinyl.Functions.AreRatedByFn(personIds=[..])`
pub async fn are_rated_by<S: Store>(state: &AppState<S>, person_ids: &[Key]) -> ApiResult {
    let stores = RatingService::new(state.store.as_ref())
        .are_rated_by(person_ids)
        .await?;
    Ok(json(ODataCollection::new(
        state.odata.context_url(RECORD_STORES),
        stores,
    )))
}

/// `GetHighRatedRecordStoresFn(minimumRating=n)`
pub async fn high_rated_record_stores<S: Store>(state: &AppState<S>, minimum_rating: i32) -> ApiResult {
    let stores = RatingService::new(state.store.as_ref())
        .high_rated_record_stores(minimum_rating)
        .await?;
    Ok(json(ODataCollection::new(
        state.odata.context_url(RECORD_STORES),
        stores,
    )))
}

/// `POST RecordStores(k)/AirVinyl.Actions.Rate`
pub async fn rate<S: Store>(state: &AppState<S>, key: Key, parameters: ActionParameters) -> ApiResult {
    let value = RatingService::new(state.store.as_ref())
        .rate(key, &parameters)
        .await?;
    Ok(json(ODataValue {
        context: state.odata.context_url("Edm.Boolean"),
        value,
    }))
}

/// `POST RecordStores/AirVinyl.Actions.RemoveRatings`
pub async fn remove_ratings<S: Store>(state: &AppState<S>, parameters: ActionParameters) -> ApiResult {
    let value = RatingService::new(state.store.as_ref())
        .remove_ratings(&parameters)
        .await?;
    Ok(json(ODataValue {
        context: state.odata.context_url("Edm.Boolean"),
        value,
    }))
}

/// `POST RemoveRecordStoreRatings`
pub async fn remove_record_store_ratings<S: Store>(
    state: &AppState<S>,
    parameters: ActionParameters,
) -> ApiResult {
    RatingService::new(state.store.as_ref())
        .remove_record_store_ratings(&parameters)
        .await?;
    Ok(no_content())
}
