use crate::api::auth::AdminUser;
use crate::api::error::ApiResult;
use crate::api::responses::{DeletedResponse, LocationView, location_view};
use crate::api::{ApiContext, read_state, write_state};
use crate::error::StoreError;
use crate::model::{DeviceCredentials, LocationId, LocationPatch, NewLocation};
use crate::state::AppState;
use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use serde::Deserialize;
use std::sync::{Arc, RwLock};
use time::OffsetDateTime;
use tracing::info;

#[derive(Debug, Deserialize)]
pub struct CreateLocationRequest {
    #[serde(flatten)]
    pub location: NewLocation,
    #[serde(default)]
    pub sensor: Option<DeviceCredentials>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateLocationRequest {
    #[serde(flatten)]
    pub patch: LocationPatch,
    #[serde(default)]
    pub sensor: Option<DeviceCredentials>,
}

pub async fn list_locations(
    State(context): State<ApiContext>,
) -> ApiResult<Json<Vec<LocationView>>> {
    build_location_list(&context.state).map(Json)
}

pub async fn get_location(
    State(context): State<ApiContext>,
    Path(id): Path<LocationId>,
) -> ApiResult<Json<LocationView>> {
    build_location(&context.state, id).map(Json)
}

pub async fn create_location(
    State(context): State<ApiContext>,
    _admin: AdminUser,
    body: Result<Json<CreateLocationRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<LocationView>)> {
    let Json(request) = body?;
    let view = build_create_location(&context.state, request, OffsetDateTime::now_utc())?;
    Ok((StatusCode::CREATED, Json(view)))
}

pub async fn update_location(
    State(context): State<ApiContext>,
    _admin: AdminUser,
    Path(id): Path<LocationId>,
    body: Result<Json<UpdateLocationRequest>, JsonRejection>,
) -> ApiResult<Json<LocationView>> {
    let Json(request) = body?;
    build_update_location(&context.state, id, request, OffsetDateTime::now_utc()).map(Json)
}

pub async fn delete_location(
    State(context): State<ApiContext>,
    _admin: AdminUser,
    Path(id): Path<LocationId>,
) -> ApiResult<Json<DeletedResponse>> {
    build_delete_location(&context.state, id).map(Json)
}

/// All locations ordered by name.
pub fn build_location_list(state: &Arc<RwLock<AppState>>) -> ApiResult<Vec<LocationView>> {
    let guard = read_state(state)?;
    let mut views: Vec<LocationView> = guard
        .locations()
        .map(|location| location_view(&guard, location))
        .collect();
    views.sort_by(|a, b| a.location.name.cmp(&b.location.name));
    Ok(views)
}

pub fn build_location(state: &Arc<RwLock<AppState>>, id: LocationId) -> ApiResult<LocationView> {
    let guard = read_state(state)?;
    let location = guard
        .location(id)
        .ok_or(StoreError::LocationNotFound(id))?;
    Ok(location_view(&guard, location))
}

/// Every new location starts with a quiet, empty sensor.
pub fn build_create_location(
    state: &Arc<RwLock<AppState>>,
    request: CreateLocationRequest,
    now: OffsetDateTime,
) -> ApiResult<LocationView> {
    let mut guard = write_state(state)?;
    let location = guard.insert_location(request.location)?;
    guard.insert_sensor(
        location.id,
        None,
        None,
        request.sensor.unwrap_or_default(),
        now,
    )?;
    info!(location_id = location.id, name = %location.name, "Location created");
    Ok(location_view(&guard, &location))
}

/// Device credentials in the request replace the sensor's, attaching a new
/// sensor when the location has none.
pub fn build_update_location(
    state: &Arc<RwLock<AppState>>,
    id: LocationId,
    request: UpdateLocationRequest,
    now: OffsetDateTime,
) -> ApiResult<LocationView> {
    let mut guard = write_state(state)?;
    let location = guard.update_location(id, request.patch)?;
    if let Some(device) = request.sensor
        && guard.update_device_credentials(id, device.clone()).is_none()
    {
        guard.insert_sensor(id, None, None, device, now)?;
    }
    Ok(location_view(&guard, &location))
}

pub fn build_delete_location(
    state: &Arc<RwLock<AppState>>,
    id: LocationId,
) -> ApiResult<DeletedResponse> {
    let mut guard = write_state(state)?;
    let location = guard.delete_location(id)?;
    info!(location_id = location.id, "Location deleted");
    Ok(DeletedResponse::ok())
}
