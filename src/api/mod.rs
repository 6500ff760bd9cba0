use crate::api::error::ApiError;
use crate::simulation::random::RngSource;
use crate::state::AppState;
use crate::sync::FeedSource;
use axum::Router;
use axum::routing::{get, post};
use rand::rngs::StdRng;
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use time::UtcOffset;

pub mod admin;
pub mod auth;
pub mod error;
pub mod favorites;
pub mod health;
pub mod locations;
pub mod plans;
pub mod responses;
pub mod sensors;

pub type SharedRng = Arc<Mutex<RngSource<StdRng>>>;

/// Everything the handlers share.
#[derive(Clone)]
pub struct ApiContext {
    pub state: Arc<RwLock<AppState>>,
    pub rng: SharedRng,
    pub utc_offset: UtcOffset,
    pub feed_source: Option<FeedSource>,
    pub http: reqwest::Client,
}

impl ApiContext {
    pub fn new(state: Arc<RwLock<AppState>>, rng: SharedRng) -> Self {
        Self {
            state,
            rng,
            utc_offset: UtcOffset::UTC,
            feed_source: None,
            http: reqwest::Client::new(),
        }
    }
}

pub fn router(context: ApiContext) -> Router {
    Router::new()
        .route("/api/health", get(health::get_health))
        .route(
            "/api/locations",
            get(locations::list_locations).post(locations::create_location),
        )
        .route(
            "/api/locations/{id}",
            get(locations::get_location)
                .put(locations::update_location)
                .delete(locations::delete_location),
        )
        .route(
            "/api/sensors",
            get(sensors::list_sensors).post(sensors::create_sensor),
        )
        .route("/api/sensors/simulate", post(sensors::simulate))
        .route(
            "/api/sensors/{id}",
            get(sensors::get_sensor)
                .put(sensors::update_sensor)
                .delete(sensors::delete_sensor),
        )
        .route(
            "/api/favorites",
            get(favorites::list_favorites)
                .post(favorites::add_favorite)
                .delete(favorites::remove_favorite),
        )
        .route(
            "/api/plans",
            get(plans::list_plans).post(plans::create_plan),
        )
        .route(
            "/api/plans/{id}",
            get(plans::get_plan)
                .put(plans::update_plan)
                .delete(plans::delete_plan),
        )
        .route("/api/admin/sync-locations", post(admin::sync_locations))
        .route("/api/admin/sync-logs", get(admin::list_sync_logs))
        .with_state(context)
}

pub(crate) fn read_state(
    state: &Arc<RwLock<AppState>>,
) -> Result<RwLockReadGuard<'_, AppState>, ApiError> {
    state
        .read()
        .map_err(|_| ApiError::Internal("state lock poisoned while reading".to_string()))
}

pub(crate) fn write_state(
    state: &Arc<RwLock<AppState>>,
) -> Result<RwLockWriteGuard<'_, AppState>, ApiError> {
    state
        .write()
        .map_err(|_| ApiError::Internal("state lock poisoned while writing".to_string()))
}
