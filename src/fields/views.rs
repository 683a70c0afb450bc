use super::models::{Field, router as crudrouter};
use super::services::{self, DateRange, FarmCosts, FieldCosts};
use crate::common::auth::Role;
use crate::common::errors::{BusinessError, DbErrorExt};
use crate::common::state::AppState;
use axum::extract::{Path, Query, State};
use axum::response::Json;
use axum::routing::get;
use axum_keycloak_auth::{PassthroughMode, layer::KeycloakAuthLayer};
use chrono::NaiveDate;
use crudcrate::CRUDResource;
use sea_orm::EntityTrait;
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};
use utoipa_axum::router::OpenApiRouter;
use uuid::Uuid;

pub fn router(state: &AppState) -> OpenApiRouter {
    let mut mutating_router = crudrouter(&state.db.clone())
        .route("/costs", get(get_farm_costs).with_state(state.clone()))
        .route(
            "/{id}/costs",
            get(get_field_costs).with_state(state.clone()),
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
            Field::RESOURCE_NAME_PLURAL
        );
    }

    mutating_router
}

#[derive(Debug, Deserialize, IntoParams, ToSchema)]
pub struct CostRangeQuery {
    /// Start of the window; defaults to 365 days before today.
    pub date_from: Option<NaiveDate>,
    /// End of the window; defaults to today.
    pub date_to: Option<NaiveDate>,
}

/// Spend on one field in the window, with the category/product breakdown.
#[utoipa::path(
    get,
    path = "/fields/{id}/costs",
    params(
        ("id" = Uuid, Path, description = "Field ID"),
        CostRangeQuery
    ),
    responses(
        (status = 200, description = "Cost breakdown for the field", body = FieldCosts),
        (status = 404, description = "Field not found")
    ),
    tag = "fields",
    summary = "Get field treatment costs"
)]
pub async fn get_field_costs(
    Path(id): Path<Uuid>,
    Query(query): Query<CostRangeQuery>,
    State(app_state): State<AppState>,
) -> Result<Json<FieldCosts>, BusinessError> {
    let field = super::models::Entity::find_by_id(id)
        .one(&app_state.db)
        .await
        .map_err(|e| e.to_business_error("field"))?
        .ok_or_else(|| BusinessError::NotFound {
            resource: "field".to_string(),
            id: id.to_string(),
        })?;

    let range = DateRange::resolve(query.date_from, query.date_to);
    let report = services::cost_breakdown(&app_state.db, &field, range)
        .await
        .map_err(|e| e.to_business_error("field"))?;
    Ok(Json(report))
}

/// Spend across all fields in the window.
#[utoipa::path(
    get,
    path = "/fields/costs",
    params(CostRangeQuery),
    responses(
        (status = 200, description = "Cost breakdown per field with the farm total", body = FarmCosts)
    ),
    tag = "fields",
    summary = "Get farm-wide treatment costs"
)]
pub async fn get_farm_costs(
    Query(query): Query<CostRangeQuery>,
    State(app_state): State<AppState>,
) -> Result<Json<FarmCosts>, BusinessError> {
    let range = DateRange::resolve(query.date_from, query.date_to);
    let report = services::farm_costs(&app_state.db, range)
        .await
        .map_err(|e| e.to_business_error("field"))?;
    Ok(Json(report))
}
