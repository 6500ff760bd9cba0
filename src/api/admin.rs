use crate::api::auth::AdminUser;
use crate::api::error::{ApiError, ApiResult};
use crate::api::responses::SyncResponse;
use crate::api::{ApiContext, read_state};
use crate::model::SyncLog;
use crate::simulation::random::RandomSource;
use crate::state::AppState;
use crate::sync::{FeedSource, run_feed_sync};
use axum::Json;
use axum::extract::State;
use std::sync::{Arc, Mutex, RwLock};
use time::OffsetDateTime;

pub async fn sync_locations(
    State(context): State<ApiContext>,
    _admin: AdminUser,
) -> ApiResult<Json<SyncResponse>> {
    let source = context
        .feed_source
        .as_ref()
        .ok_or_else(|| ApiError::Validation("location feed is not configured".to_string()))?;
    build_sync_response(
        &context.state,
        source,
        &context.http,
        &*context.rng,
        OffsetDateTime::now_utc(),
    )
    .await
    .map(Json)
}

pub async fn list_sync_logs(
    State(context): State<ApiContext>,
    _admin: AdminUser,
) -> ApiResult<Json<Vec<SyncLog>>> {
    build_sync_log_list(&context.state).map(Json)
}

pub async fn build_sync_response<R: RandomSource + ?Sized>(
    state: &Arc<RwLock<AppState>>,
    source: &FeedSource,
    client: &reqwest::Client,
    rng: &Mutex<R>,
    now: OffsetDateTime,
) -> ApiResult<SyncResponse> {
    let summary = run_feed_sync(state, source, client, rng, now).await?;
    Ok(SyncResponse {
        success: true,
        total: summary.total,
        created: summary.created,
        updated: summary.updated,
        skipped: summary.skipped,
    })
}

/// Newest entry first.
pub fn build_sync_log_list(state: &Arc<RwLock<AppState>>) -> ApiResult<Vec<SyncLog>> {
    let guard = read_state(state)?;
    Ok(guard.sync_logs().rev().cloned().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SyncStatus;
    use crate::simulation::random::ScriptedSource;
    use std::fs;
    use std::time::{SystemTime, UNIX_EPOCH};
    use time::macros::datetime;

    fn temp_path(name: &str) -> Result<std::path::PathBuf, Box<dyn std::error::Error>> {
        let unique = SystemTime::now().duration_since(UNIX_EPOCH)?.as_nanos();
        Ok(std::env::temp_dir().join(format!("quiet-spots-admin-{name}-{unique}.json")))
    }

    #[tokio::test]
    async fn sync_reports_counts_and_logs_newest_first() -> Result<(), Box<dyn std::error::Error>> {
        let path = temp_path("feed")?;
        fs::write(
            &path,
            r#"{"results":[
                {"id":1,"titel":"Boekentoren","adres":"Rozier 9, 9000 Gent","totale_capaciteit":200,"geo_punt":{"lat":51.0425,"lon":3.7255}},
                {"id":2,"titel":"Zonder punt"}
            ]}"#,
        )?;
        let source = FeedSource::File(path.clone());
        let client = reqwest::Client::new();
        let state = Arc::new(RwLock::new(AppState::new()));
        let rng = Mutex::new(ScriptedSource::default());

        let first =
            build_sync_response(&state, &source, &client, &rng, datetime!(2026-01-11 08:00 UTC))
                .await?;
        let second =
            build_sync_response(&state, &source, &client, &rng, datetime!(2026-01-11 09:00 UTC))
                .await?;
        let _ = fs::remove_file(&path);

        assert_eq!(
            first,
            SyncResponse {
                success: true,
                total: 2,
                created: 1,
                updated: 0,
                skipped: 1,
            }
        );
        assert_eq!(second.updated, 1);

        let logs = build_sync_log_list(&state)?;
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].created_at, datetime!(2026-01-11 09:00 UTC));
        assert_eq!(logs[0].message, "Created 0, Updated 1, Skipped 1");
        assert_eq!(logs[1].message, "Created 1, Updated 0, Skipped 1");
        Ok(())
    }

    #[tokio::test]
    async fn unreadable_feed_is_an_internal_error_and_logged()
    -> Result<(), Box<dyn std::error::Error>> {
        let path = temp_path("missing")?;
        let state = Arc::new(RwLock::new(AppState::new()));
        let rng = Mutex::new(ScriptedSource::default());

        let result = build_sync_response(
            &state,
            &FeedSource::File(path),
            &reqwest::Client::new(),
            &rng,
            datetime!(2026-01-11 08:00 UTC),
        )
        .await;

        assert!(matches!(result, Err(ApiError::Internal(_))));
        let logs = build_sync_log_list(&state)?;
        assert_eq!(logs[0].status, SyncStatus::Error);
        Ok(())
    }

    #[tokio::test]
    async fn handler_without_feed_is_a_validation_error() {
        let context = ApiContext::new(
            Arc::new(RwLock::new(AppState::new())),
            Arc::new(Mutex::new(crate::simulation::random::RngSource::seeded(1))),
        );
        let admin = AdminUser(crate::api::auth::CurrentUser {
            id: "admin-1".to_string(),
            role: crate::api::auth::Role::Admin,
        });

        let result = sync_locations(State(context), admin).await;

        assert!(matches!(result, Err(ApiError::Validation(_))));
    }
}
