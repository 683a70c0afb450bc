use super::models::{Product, router as crudrouter};
use crate::common::auth::Role;
use crate::common::state::AppState;
use crate::treatments::models::ApplicationType;
use axum::extract::{Path, State};
use axum::response::Json;
use axum::routing::get;
use axum_keycloak_auth::{PassthroughMode, layer::KeycloakAuthLayer};
use crudcrate::CRUDResource;
use sea_orm::EntityTrait;
use serde_json::{Value, json};
use utoipa_axum::router::OpenApiRouter;

pub fn router(state: &AppState) -> OpenApiRouter {
    let mut mutating_router = crudrouter(&state.db.clone()).route(
        "/by_application/{application_type}",
        get(get_products_by_application).with_state(state.clone()),
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
            Product::RESOURCE_NAME_PLURAL
        );
    }

    mutating_router
}

/// Products usable for one application method, with the matching dose pair.
/// Feeds the treatment form's product picker.
#[utoipa::path(
    get,
    path = "/products/by_application/{application_type}",
    params(
        ("application_type" = ApplicationType, Path, description = "spraying or fertigation")
    ),
    responses(
        (status = 200, description = "Products supporting this application type"),
        (status = 500, description = "Internal server error")
    ),
    tag = "products",
    summary = "Get products by application type"
)]
pub async fn get_products_by_application(
    Path(application_type): Path<ApplicationType>,
    State(app_state): State<AppState>,
) -> Result<Json<Value>, (axum::http::StatusCode, String)> {
    let products = super::models::Entity::find()
        .all(&app_state.db)
        .await
        .map_err(|e| {
            (
                axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                format!("Database error: {e}"),
            )
        })?;

    let products_data: Vec<Value> = products
        .iter()
        .filter_map(|product| {
            product
                .dose_pair(application_type)
                .map(|(dose, dose_type)| {
                    json!({
                        "id": product.id,
                        "name": product.name,
                        "price": product.price,
                        "dose": dose,
                        "dose_type": dose_type,
                        "dose_type_display": dose_type.label(),
                    })
                })
        })
        .collect();

    Ok(Json(json!(products_data)))
}
