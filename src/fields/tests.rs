use crate::config::test_helpers::setup_test_app;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use chrono::{Duration, Utc};
use serde_json::{Value, json};
use tower::ServiceExt;

async fn extract_response_body(response: axum::response::Response) -> (StatusCode, Value) {
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("Failed to read response body");
    let body: Value = serde_json::from_slice(&bytes)
        .unwrap_or_else(|_| json!({"error": "Invalid JSON response"}));

    (status, body)
}

async fn post_json(app: &axum::Router, uri: &str, payload: &Value) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(payload.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    extract_response_body(response).await
}

async fn get_json(app: &axum::Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("GET")
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    extract_response_body(response).await
}

fn as_f64(value: &Value) -> f64 {
    value
        .as_str()
        .map(|s| s.parse::<f64>().unwrap())
        .or_else(|| value.as_f64())
        .unwrap_or_else(|| panic!("Not a numeric value: {value:?}"))
}

async fn create_field(app: &axum::Router, area: f64) -> String {
    let (status, body) = post_json(
        app,
        "/api/fields",
        &json!({
            "name": format!("Parcel {}", uuid::Uuid::new_v4()),
            "area": area,
            "crop": "apple",
            "planting_year": 2018
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "Failed to create field: {body:?}");
    body["id"].as_str().unwrap().to_string()
}

async fn create_category(app: &axum::Router, name: &str) -> String {
    let (status, body) = post_json(
        app,
        "/api/product_types",
        &json!({ "name": format!("{name} {}", uuid::Uuid::new_v4()) }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body:?}");
    body["id"].as_str().unwrap().to_string()
}

async fn create_product(
    app: &axum::Router,
    category_id: &str,
    price: f64,
    dose: f64,
    dose_type: &str,
) -> String {
    let (status, body) = post_json(
        app,
        "/api/products",
        &json!({
            "name": format!("Product {}", uuid::Uuid::new_v4()),
            "product_type_id": category_id,
            "price": price,
            "spraying_dose": dose,
            "spraying_dose_type": dose_type
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body:?}");
    body["id"].as_str().unwrap().to_string()
}

async fn create_treatment_on(
    app: &axum::Router,
    field_id: &str,
    date: chrono::NaiveDate,
    product_ids: &[&str],
) -> String {
    let products: Vec<Value> = product_ids
        .iter()
        .map(|id| json!({ "product_id": id }))
        .collect();
    let (status, body) = post_json(
        app,
        "/api/treatments",
        &json!({
            "name": format!("Treatment {}", uuid::Uuid::new_v4()),
            "application_type": "spraying",
            "date": date,
            "field_id": field_id,
            "water_per_ha": 400,
            "products": products
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "Failed to create treatment: {body:?}");
    body["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn field_crud_and_validation() {
    let app = setup_test_app().await;

    let field_id = create_field(&app, 3.5).await;
    let (status, body) = get_json(&app, &format!("/api/fields/{field_id}")).await;
    assert_eq!(status, StatusCode::OK, "{body:?}");
    assert!((as_f64(&body["area"]) - 3.5).abs() < 1e-9);
    assert_eq!(body["crop"], "apple");

    // Zero or negative area is rejected
    let (status, body) = post_json(
        &app,
        "/api/fields",
        &json!({
            "name": "Bad parcel",
            "area": 0.0,
            "crop": "pear",
            "planting_year": 2020
        }),
    )
    .await;
    assert!(!status.is_success(), "Zero area must be rejected: {body:?}");
}

#[tokio::test]
async fn field_detail_counts_treatments_by_status() {
    let app = setup_test_app().await;
    let field_id = create_field(&app, 4.0).await;
    let category = create_category(&app, "Fungicide").await;
    let product = create_product(&app, &category, 10.0, 3.0, "l_per_ha").await;

    let today = Utc::now().date_naive();
    create_treatment_on(&app, &field_id, today + Duration::days(5), &[&product]).await;
    create_treatment_on(&app, &field_id, today - Duration::days(5), &[&product]).await;

    let (status, body) = get_json(&app, &format!("/api/fields/{field_id}")).await;
    assert_eq!(status, StatusCode::OK, "{body:?}");
    let counts = &body["treatment_counts"];
    assert_eq!(counts["pending"], 1);
    assert_eq!(counts["delayed"], 1);
    assert_eq!(counts["completed"], 0);
}

#[tokio::test]
async fn field_costs_aggregate_line_item_prices() {
    let app = setup_test_app().await;
    let field_id = create_field(&app, 5.0).await;
    let fungicides = create_category(&app, "Fungicide").await;
    let fertilizers = create_category(&app, "Fertilizer").await;

    // 3 L/ha at 10.00 on 5 ha = 150.00; 1.4 kg/ha at 25.00 on 5 ha = 175.00
    let captan = create_product(&app, &fungicides, 10.0, 3.0, "l_per_ha").await;
    let nitrate = create_product(&app, &fertilizers, 25.0, 1.4, "kg_per_ha").await;

    let today = Utc::now().date_naive();
    create_treatment_on(&app, &field_id, today - Duration::days(10), &[&captan, &nitrate]).await;

    let (status, body) = get_json(&app, &format!("/api/fields/{field_id}/costs")).await;
    assert_eq!(status, StatusCode::OK, "{body:?}");

    assert_eq!(body["total_cost"], "325.00");
    assert_eq!(body["cost_per_ha"], "65.00");

    let categories = body["categories"].as_array().unwrap();
    assert_eq!(categories.len(), 2);
    // Sorted by descending spend: fertilizer first
    assert!((as_f64(&categories[0]["total"]) - 175.0).abs() < 1e-9);
    assert!((as_f64(&categories[1]["total"]) - 150.0).abs() < 1e-9);

    let share_sum = as_f64(&categories[0]["percentage"]) + as_f64(&categories[1]["percentage"]);
    assert!(
        (share_sum - 100.0).abs() < 0.02,
        "Category shares should sum to ~100, got {share_sum}"
    );

    // A single product owns its whole category
    let products = categories[0]["products"].as_array().unwrap();
    assert_eq!(products.len(), 1);
    assert_eq!(products[0]["percentage"], "100.00");
}

#[tokio::test]
async fn field_costs_honor_the_date_window() {
    let app = setup_test_app().await;
    let field_id = create_field(&app, 5.0).await;
    let category = create_category(&app, "Fungicide").await;
    let product = create_product(&app, &category, 10.0, 3.0, "l_per_ha").await;

    let today = Utc::now().date_naive();
    // One recent treatment, one outside the default trailing year
    create_treatment_on(&app, &field_id, today - Duration::days(10), &[&product]).await;
    create_treatment_on(&app, &field_id, today - Duration::days(400), &[&product]).await;

    let (status, body) = get_json(&app, &format!("/api/fields/{field_id}/costs")).await;
    assert_eq!(status, StatusCode::OK, "{body:?}");
    assert_eq!(body["total_cost"], "150.00");

    // Widening the window picks up the old treatment too
    let from = today - Duration::days(500);
    let (status, body) = get_json(
        &app,
        &format!("/api/fields/{field_id}/costs?date_from={from}"),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body:?}");
    assert_eq!(body["total_cost"], "300.00");
}

#[tokio::test]
async fn farm_costs_cover_all_fields() {
    let app = setup_test_app().await;
    let field_a = create_field(&app, 5.0).await;
    let field_b = create_field(&app, 2.0).await;
    let category = create_category(&app, "Fungicide").await;
    let product = create_product(&app, &category, 10.0, 3.0, "l_per_ha").await;

    let today = Utc::now().date_naive();
    create_treatment_on(&app, &field_a, today - Duration::days(3), &[&product]).await;
    create_treatment_on(&app, &field_b, today - Duration::days(3), &[&product]).await;

    let (status, body) = get_json(&app, "/api/fields/costs").await;
    assert_eq!(status, StatusCode::OK, "{body:?}");

    // 150.00 on 5 ha plus 60.00 on 2 ha
    assert_eq!(body["total_cost"], "210.00");
    let fields = body["fields"].as_array().unwrap();
    assert_eq!(fields.len(), 2);
    assert!((as_f64(&fields[0]["total_cost"]) - 150.0).abs() < 1e-9);
    assert!((as_f64(&fields[1]["total_cost"]) - 60.0).abs() < 1e-9);
}

#[tokio::test]
async fn resizing_a_field_recalculates_its_treatments() {
    let app = setup_test_app().await;
    let field_id = create_field(&app, 5.0).await;
    let category = create_category(&app, "Fungicide").await;
    let product = create_product(&app, &category, 10.0, 3.0, "l_per_ha").await;

    let today = Utc::now().date_naive();
    let treatment_id =
        create_treatment_on(&app, &field_id, today + Duration::days(3), &[&product]).await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("PUT")
                .uri(format!("/api/fields/{field_id}"))
                .header("content-type", "application/json")
                .body(Body::from(json!({ "area": 10.0 }).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let (status, body) = extract_response_body(response).await;
    assert_eq!(status, StatusCode::OK, "{body:?}");

    let (status, body) = get_json(&app, &format!("/api/treatments/{treatment_id}")).await;
    assert_eq!(status, StatusCode::OK, "{body:?}");
    let item = &body["products"].as_array().unwrap()[0];
    // 3 L/ha now covers 10 ha
    assert!((as_f64(&item["total_dose"]) - 30.0).abs() < 1e-9);
    assert_eq!(item["total_price"], "300.00");
}
