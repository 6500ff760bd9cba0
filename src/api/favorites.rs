use crate::api::auth::CurrentUser;
use crate::api::error::{ApiError, ApiResult};
use crate::api::responses::{DeletedResponse, FavoriteView, favorite_view};
use crate::api::{ApiContext, read_state, write_state};
use crate::model::LocationId;
use crate::state::AppState;
use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use serde::Deserialize;
use std::sync::{Arc, RwLock};
use time::OffsetDateTime;

#[derive(Debug, Deserialize)]
pub struct AddFavoriteRequest {
    pub location_id: LocationId,
}

#[derive(Debug, Deserialize)]
pub struct RemoveFavoriteQuery {
    pub location_id: Option<LocationId>,
}

pub async fn list_favorites(
    State(context): State<ApiContext>,
    user: CurrentUser,
) -> ApiResult<Json<Vec<FavoriteView>>> {
    build_favorite_list(&context.state, &user).map(Json)
}

pub async fn add_favorite(
    State(context): State<ApiContext>,
    user: CurrentUser,
    body: Result<Json<AddFavoriteRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<FavoriteView>)> {
    let Json(request) = body?;
    let view = build_add_favorite(
        &context.state,
        &user,
        request.location_id,
        OffsetDateTime::now_utc(),
    )?;
    Ok((StatusCode::CREATED, Json(view)))
}

pub async fn remove_favorite(
    State(context): State<ApiContext>,
    user: CurrentUser,
    query: Result<Query<RemoveFavoriteQuery>, QueryRejection>,
) -> ApiResult<Json<DeletedResponse>> {
    let Query(query) = query?;
    let location_id = query
        .location_id
        .ok_or_else(|| ApiError::Validation("location_id is required".to_string()))?;
    build_remove_favorite(&context.state, &user, location_id).map(Json)
}

/// The caller's favorites, newest first.
pub fn build_favorite_list(
    state: &Arc<RwLock<AppState>>,
    user: &CurrentUser,
) -> ApiResult<Vec<FavoriteView>> {
    let guard = read_state(state)?;
    Ok(guard
        .favorites_for(&user.id)
        .into_iter()
        .map(|favorite| favorite_view(&guard, favorite))
        .collect())
}

pub fn build_add_favorite(
    state: &Arc<RwLock<AppState>>,
    user: &CurrentUser,
    location_id: LocationId,
    now: OffsetDateTime,
) -> ApiResult<FavoriteView> {
    let mut guard = write_state(state)?;
    let favorite = guard.add_favorite(user.id.clone(), location_id, now)?;
    Ok(favorite_view(&guard, &favorite))
}

pub fn build_remove_favorite(
    state: &Arc<RwLock<AppState>>,
    user: &CurrentUser,
    location_id: LocationId,
) -> ApiResult<DeletedResponse> {
    let mut guard = write_state(state)?;
    guard.remove_favorite(&user.id, location_id)?;
    Ok(DeletedResponse::ok())
}
