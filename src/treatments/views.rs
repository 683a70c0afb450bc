use super::models::{Treatment, router as crudrouter};
use super::services;
use crate::common::auth::Role;
use crate::common::errors::{BusinessError, DbErrorExt};
use crate::common::state::AppState;
use axum::extract::{Path, State};
use axum::response::Json;
use axum::routing::{get, post};
use axum_keycloak_auth::{PassthroughMode, layer::KeycloakAuthLayer};
use chrono::NaiveDate;
use crudcrate::CRUDResource;
use rust_decimal::Decimal;
use serde::Deserialize;
use utoipa::ToSchema;
use utoipa_axum::router::OpenApiRouter;
use uuid::Uuid;

pub fn router(state: &AppState) -> OpenApiRouter {
    let mut mutating_router = crudrouter(&state.db.clone())
        .route(
            "/{id}/finish",
            post(finish_treatment).with_state(state.clone()),
        )
        .route(
            "/{id}/loads",
            get(get_treatment_loads).with_state(state.clone()),
        );

    if let Some(instance) = state.keycloak_auth_instance.clone() {
        mutating_router = mutating_router.layer(
            KeycloakAuthLayer::<Role>::builder()
                .instance(instance)
                .passthrough_mode(PassthroughMode::Block)
                .persist_raw_claims(false)
                .expected_audiences(vec![String::from("account")])
                .required_roles(vec![Role::Administrator])
                .build(),
        );
    } else if !state.config.tests_running {
        println!(
            "Warning: Mutating routes of {} router are not protected",
            Treatment::RESOURCE_NAME_PLURAL
        );
    }

    mutating_router
}

#[derive(Deserialize, ToSchema)]
pub struct FinishTreatmentRequest {
    pub finish_date: NaiveDate,
    /// Measured water rate in L/ha. Spraying only; triggers a recalculation
    /// of every line item against the water that actually went out.
    pub real_water_per_ha: Option<Decimal>,
}

/// Close a treatment: record the finish date and, for spraying, the measured
/// water rate, then settle doses and costs against it.
#[utoipa::path(
    post,
    path = "/treatments/{id}/finish",
    params(
        ("id" = Uuid, Path, description = "Treatment ID")
    ),
    request_body = FinishTreatmentRequest,
    responses(
        (status = 200, description = "Treatment completed and recalculated", body = Treatment),
        (status = 400, description = "Invalid finish data"),
        (status = 404, description = "Treatment not found")
    ),
    tag = "treatments",
    summary = "Finish a treatment"
)]
pub async fn finish_treatment(
    Path(id): Path<Uuid>,
    State(app_state): State<AppState>,
    Json(payload): Json<FinishTreatmentRequest>,
) -> Result<Json<Treatment>, BusinessError> {
    services::finish_treatment(
        &app_state.db,
        id,
        payload.finish_date,
        payload.real_water_per_ha,
    )
    .await
    .map_err(|e| e.to_business_error("treatment"))?;

    let treatment = Treatment::get_one(&app_state.db, id)
        .await
        .map_err(|e| e.to_business_error("treatment"))?;
    Ok(Json(treatment))
}

/// Tank loads for a spraying treatment plus the product quantities to mix
/// into a full tank and into the partial one.
#[utoipa::path(
    get,
    path = "/treatments/{id}/loads",
    params(
        ("id" = Uuid, Path, description = "Treatment ID")
    ),
    responses(
        (status = 200, description = "Machine load plan", body = services::LoadPlan),
        (status = 404, description = "Treatment not found")
    ),
    tag = "treatments",
    summary = "Get the machine load plan"
)]
pub async fn get_treatment_loads(
    Path(id): Path<Uuid>,
    State(app_state): State<AppState>,
) -> Result<Json<services::LoadPlan>, BusinessError> {
    let plan = services::load_plan_details(&app_state.db, id)
        .await
        .map_err(|e| e.to_business_error("treatment"))?;
    Ok(Json(plan))
}
