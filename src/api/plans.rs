use crate::api::auth::CurrentUser;
use crate::api::error::ApiResult;
use crate::api::responses::{CreatePlanResponse, DeletedResponse, PlanView, plan_view};
use crate::api::{ApiContext, read_state, write_state};
use crate::error::StoreError;
use crate::model::{LocationId, NewPlan, PlanId, PlanPatch, validate_plan_window};
use crate::recommendation::{Candidate, evaluate};
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
pub struct CreatePlanRequest {
    pub location_id: LocationId,
    #[serde(with = "time::serde::rfc3339")]
    pub start_time: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub end_time: OffsetDateTime,
    #[serde(default)]
    pub notes: Option<String>,
}

pub async fn list_plans(
    State(context): State<ApiContext>,
    user: CurrentUser,
) -> ApiResult<Json<Vec<PlanView>>> {
    build_plan_list(&context.state, &user).map(Json)
}

pub async fn create_plan(
    State(context): State<ApiContext>,
    user: CurrentUser,
    body: Result<Json<CreatePlanRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<CreatePlanResponse>)> {
    let Json(request) = body?;
    let response = build_create_plan(&context.state, &user, request, OffsetDateTime::now_utc())?;
    Ok((StatusCode::CREATED, Json(response)))
}

pub async fn get_plan(
    State(context): State<ApiContext>,
    user: CurrentUser,
    Path(id): Path<PlanId>,
) -> ApiResult<Json<PlanView>> {
    let guard = read_state(&context.state)?;
    let plan = guard.plan_for(&user.id, id)?;
    Ok(Json(plan_view(&guard, plan)))
}

pub async fn update_plan(
    State(context): State<ApiContext>,
    user: CurrentUser,
    Path(id): Path<PlanId>,
    body: Result<Json<PlanPatch>, JsonRejection>,
) -> ApiResult<Json<PlanView>> {
    let Json(patch) = body?;
    build_update_plan(&context.state, &user, id, patch).map(Json)
}

pub async fn delete_plan(
    State(context): State<ApiContext>,
    user: CurrentUser,
    Path(id): Path<PlanId>,
) -> ApiResult<Json<DeletedResponse>> {
    let mut guard = write_state(&context.state)?;
    guard.delete_plan(&user.id, id)?;
    Ok(Json(DeletedResponse::ok()))
}

/// The caller's plans ordered by start time.
pub fn build_plan_list(
    state: &Arc<RwLock<AppState>>,
    user: &CurrentUser,
) -> ApiResult<Vec<PlanView>> {
    let guard = read_state(state)?;
    Ok(guard
        .plans_for(&user.id)
        .into_iter()
        .map(|plan| plan_view(&guard, plan))
        .collect())
}

/// Book a study session. The booking is accepted even when the location is
/// loud or crowded; the response then carries warnings and nearby alternatives.
pub fn build_create_plan(
    state: &Arc<RwLock<AppState>>,
    user: &CurrentUser,
    request: CreatePlanRequest,
    now: OffsetDateTime,
) -> ApiResult<CreatePlanResponse> {
    validate_plan_window(request.start_time, request.end_time, now)?;

    let mut guard = write_state(state)?;
    let recommendation = {
        let target = guard
            .location(request.location_id)
            .ok_or(StoreError::LocationNotFound(request.location_id))?;
        let target_status = guard.location_status(target.id);
        let candidates: Vec<Candidate<'_>> = guard
            .locations()
            .filter(|location| location.id != target.id)
            .map(|location| Candidate {
                location,
                status: guard.location_status(location.id),
            })
            .collect();
        evaluate(target, target_status.as_ref(), &candidates)
    };

    let plan = guard.insert_plan(
        NewPlan {
            user_id: user.id.clone(),
            location_id: request.location_id,
            start_time: request.start_time,
            end_time: request.end_time,
            notes: request.notes,
        },
        now,
    )?;
    info!(
        plan_id = plan.id,
        location_id = plan.location_id,
        warnings = recommendation.warnings.len(),
        alternatives = recommendation.alternatives.len(),
        "Study plan created"
    );

    Ok(CreatePlanResponse {
        plan: plan_view(&guard, &plan),
        warnings: recommendation.warnings,
        alternatives: recommendation.alternatives,
    })
}

pub fn build_update_plan(
    state: &Arc<RwLock<AppState>>,
    user: &CurrentUser,
    id: PlanId,
    patch: PlanPatch,
) -> ApiResult<PlanView> {
    let mut guard = write_state(state)?;
    let plan = guard.update_plan(&user.id, id, patch)?;
    Ok(plan_view(&guard, &plan))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::auth::Role;
    use crate::api::error::ApiError;
    use crate::api::test_support::{new_location, poisoned_state};
    use crate::model::{DeviceCredentials, Location};
    use crate::recommendation::Warning;
    use serde_json::json;
    use time::macros::datetime;

    const NOW: OffsetDateTime = datetime!(2026-01-11 12:00 UTC);
    // Degrees of latitude per meter.
    const DEGREES_PER_METER: f64 = 1.0 / 111_194.93;

    fn user(id: &str) -> CurrentUser {
        CurrentUser {
            id: id.to_string(),
            role: Role::User,
        }
    }

    fn add(
        state: &mut AppState,
        name: &str,
        meters_north: f64,
        capacity: i64,
        noise: i64,
        occupancy: i64,
    ) -> Location {
        let location = state
            .insert_location(new_location(
                name,
                51.05 + meters_north * DEGREES_PER_METER,
                3.72,
                capacity,
            ))
            .expect("insert location");
        state
            .insert_sensor(
                location.id,
                Some(noise),
                Some(occupancy),
                DeviceCredentials::default(),
                NOW,
            )
            .expect("insert sensor");
        location
    }

    fn request(location_id: LocationId) -> CreatePlanRequest {
        CreatePlanRequest {
            location_id,
            start_time: datetime!(2026-01-12 09:00 UTC),
            end_time: datetime!(2026-01-12 12:00 UTC),
            notes: Some("exam prep".to_string()),
        }
    }

    #[test]
    fn booking_loud_full_location_suggests_nearest_alternatives()
    -> Result<(), Box<dyn std::error::Error>> {
        let mut app_state = AppState::new();
        let a = add(&mut app_state, "Aula", 0.0, 100, 85, 95);
        let b = add(&mut app_state, "Bib", 200.0, 50, 20, 10);
        let c = add(&mut app_state, "Campus", 50.0, 50, 30, 5);
        let state = Arc::new(RwLock::new(app_state));

        let response = build_create_plan(&state, &user("student"), request(a.id), NOW)?;

        assert_eq!(response.warnings, vec![Warning::Loud, Warning::Full]);
        let ids: Vec<LocationId> = response.alternatives.iter().map(|alt| alt.id).collect();
        assert_eq!(ids, vec![c.id, b.id]);
        assert_eq!(response.plan.plan.location_id, a.id);
        assert_eq!(response.plan.plan.user_id, "student");

        let value = serde_json::to_value(&response)?;
        assert_eq!(
            value["warnings"],
            json!([
                "This location is currently loud",
                "This location is currently full (no seats available)"
            ])
        );
        assert_eq!(value["alternatives"][0]["name"], "Campus");
        assert_eq!(value["plan"]["location"]["plan_count"], 1);
        Ok(())
    }

    #[test]
    fn booking_calm_location_has_no_alternatives() -> Result<(), Box<dyn std::error::Error>> {
        let mut app_state = AppState::new();
        let a = add(&mut app_state, "Aula", 0.0, 100, 20, 10);
        add(&mut app_state, "Bib", 200.0, 50, 20, 10);
        let state = Arc::new(RwLock::new(app_state));

        let response = build_create_plan(&state, &user("student"), request(a.id), NOW)?;

        assert!(response.warnings.is_empty());
        assert!(response.alternatives.is_empty());
        Ok(())
    }

    #[test]
    fn plan_in_the_past_is_rejected() {
        let mut app_state = AppState::new();
        let a = add(&mut app_state, "Aula", 0.0, 100, 20, 10);
        let state = Arc::new(RwLock::new(app_state));
        let mut past = request(a.id);
        past.start_time = datetime!(2026-01-11 08:00 UTC);

        let result = build_create_plan(&state, &user("student"), past, NOW);

        match result {
            Err(ApiError::Validation(message)) => {
                assert_eq!(message, "cannot create plan in the past");
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn end_before_start_is_rejected_before_lookup() {
        let state = Arc::new(RwLock::new(AppState::new()));
        let mut inverted = request(404);
        inverted.end_time = datetime!(2026-01-12 08:00 UTC);

        let result = build_create_plan(&state, &user("student"), inverted, NOW);

        assert!(matches!(result, Err(ApiError::Validation(_))));
    }

    #[test]
    fn booking_missing_location_is_not_found() {
        let state = Arc::new(RwLock::new(AppState::new()));

        let result = build_create_plan(&state, &user("student"), request(404), NOW);

        assert!(matches!(result, Err(ApiError::NotFound(_))));
    }

    #[test]
    fn plans_are_private_to_their_owner() -> Result<(), Box<dyn std::error::Error>> {
        let mut app_state = AppState::new();
        let a = add(&mut app_state, "Aula", 0.0, 100, 20, 10);
        let state = Arc::new(RwLock::new(app_state));
        let created = build_create_plan(&state, &user("owner"), request(a.id), NOW)?;

        let result = build_update_plan(
            &state,
            &user("intruder"),
            created.plan.plan.id,
            PlanPatch {
                notes: Some("mine now".to_string()),
                ..PlanPatch::default()
            },
        );

        assert!(matches!(result, Err(ApiError::NotFound(_))));
        assert!(build_plan_list(&state, &user("intruder"))?.is_empty());
        assert_eq!(build_plan_list(&state, &user("owner"))?.len(), 1);
        Ok(())
    }

    #[test]
    fn update_revalidates_merged_window() -> Result<(), Box<dyn std::error::Error>> {
        let mut app_state = AppState::new();
        let a = add(&mut app_state, "Aula", 0.0, 100, 20, 10);
        let state = Arc::new(RwLock::new(app_state));
        let owner = user("owner");
        let created = build_create_plan(&state, &owner, request(a.id), NOW)?;

        let result = build_update_plan(
            &state,
            &owner,
            created.plan.plan.id,
            PlanPatch {
                end_time: Some(datetime!(2026-01-12 08:00 UTC)),
                ..PlanPatch::default()
            },
        );

        match result {
            Err(ApiError::Validation(message)) => {
                assert_eq!(message, "end time must be after start time");
            }
            other => panic!("expected validation error, got {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn plans_return_internal_error_when_lock_poisoned() {
        let state = poisoned_state();

        let result = build_create_plan(&state, &user("student"), request(1), NOW);

        assert!(matches!(result, Err(ApiError::Internal(_))));
    }
}
