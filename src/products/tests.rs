use crate::config::test_helpers::setup_test_app;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
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

async fn post_product(app: &axum::Router, payload: &Value) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/products")
                .header("content-type", "application/json")
                .body(Body::from(payload.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    extract_response_body(response).await
}

#[tokio::test]
async fn product_with_both_dose_pairs_is_accepted() {
    let app = setup_test_app().await;

    let (status, body) = post_product(
        &app,
        &json!({
            "name": "Dual-use product",
            "price": 12.5,
            "spraying_dose": 2.0,
            "spraying_dose_type": "l_per_1000l",
            "fertigation_dose": 1.0,
            "fertigation_dose_type": "kg_per_ha"
        }),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED, "{body:?}");
    assert_eq!(body["spraying_dose_type"], "l_per_1000l");
    assert_eq!(body["fertigation_dose_type"], "kg_per_ha");
}

#[tokio::test]
async fn dose_and_dose_type_must_come_together() {
    let app = setup_test_app().await;

    let (status, body) = post_product(
        &app,
        &json!({
            "name": "Half a pair",
            "price": 5.0,
            "spraying_dose": 2.0
        }),
    )
    .await;
    assert!(
        !status.is_success(),
        "A dose without its type must be rejected: {body:?}"
    );

    let (status, body) = post_product(
        &app,
        &json!({
            "name": "The other half",
            "price": 5.0,
            "spraying_dose_type": "pct"
        }),
    )
    .await;
    assert!(
        !status.is_success(),
        "A dose type without a dose must be rejected: {body:?}"
    );
}

#[tokio::test]
async fn product_needs_at_least_one_dose_pair() {
    let app = setup_test_app().await;

    let (status, body) = post_product(
        &app,
        &json!({
            "name": "No doses at all",
            "price": 5.0
        }),
    )
    .await;
    assert!(!status.is_success(), "{body:?}");
}

#[tokio::test]
async fn fertigation_dose_must_be_per_hectare() {
    let app = setup_test_app().await;

    let (status, body) = post_product(
        &app,
        &json!({
            "name": "Fertigation by water volume",
            "price": 5.0,
            "fertigation_dose": 2.0,
            "fertigation_dose_type": "l_per_1000l"
        }),
    )
    .await;
    assert!(
        !status.is_success(),
        "Fertigation doses are plot-wide, water-based types must fail: {body:?}"
    );
}

#[tokio::test]
async fn negative_price_is_rejected() {
    let app = setup_test_app().await;

    let (status, body) = post_product(
        &app,
        &json!({
            "name": "Negative price",
            "price": -1.0,
            "spraying_dose": 2.0,
            "spraying_dose_type": "l_per_ha"
        }),
    )
    .await;
    assert!(!status.is_success(), "{body:?}");
}

#[tokio::test]
async fn update_cannot_remove_the_last_dose_pair() {
    let app = setup_test_app().await;

    let (status, body) = post_product(
        &app,
        &json!({
            "name": "Spraying only",
            "price": 5.0,
            "spraying_dose": 2.0,
            "spraying_dose_type": "l_per_ha"
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body:?}");
    let product_id = body["id"].as_str().unwrap().to_string();

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("PUT")
                .uri(format!("/api/products/{product_id}"))
                .header("content-type", "application/json")
                .body(Body::from(
                    json!({ "spraying_dose": null, "spraying_dose_type": null }).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    let (status, body) = extract_response_body(response).await;
    assert!(
        !status.is_success(),
        "Clearing the only dose pair must be rejected: {body:?}"
    );
}

#[tokio::test]
async fn partial_update_keeps_the_dose_configuration() {
    let app = setup_test_app().await;

    let (status, body) = post_product(
        &app,
        &json!({
            "name": "Price change only",
            "price": 5.0,
            "spraying_dose": 2.0,
            "spraying_dose_type": "l_per_ha"
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body:?}");
    let product_id = body["id"].as_str().unwrap().to_string();

    // A PUT carrying only the price must not be rejected for the fields it
    // leaves out.
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("PUT")
                .uri(format!("/api/products/{product_id}"))
                .header("content-type", "application/json")
                .body(Body::from(json!({ "price": 12.5 }).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let (status, body) = extract_response_body(response).await;
    assert_eq!(status, StatusCode::OK, "{body:?}");
    assert_eq!(body["spraying_dose_type"], "l_per_ha");

    let price: f64 = body["price"]
        .as_str()
        .map(|s| s.parse().unwrap())
        .or_else(|| body["price"].as_f64())
        .unwrap();
    assert!((price - 12.5).abs() < 1e-9);
}

#[tokio::test]
async fn by_application_lists_only_matching_products() {
    let app = setup_test_app().await;

    let (status, _body) = post_product(
        &app,
        &json!({
            "name": "Spray-only A",
            "price": 10.0,
            "spraying_dose": 3.0,
            "spraying_dose_type": "l_per_ha"
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _body) = post_product(
        &app,
        &json!({
            "name": "Fertigation-only B",
            "price": 8.0,
            "fertigation_dose": 1.5,
            "fertigation_dose_type": "kg_per_ha"
        }),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/api/products/by_application/fertigation")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let (status, body) = extract_response_body(response).await;
    assert_eq!(status, StatusCode::OK, "{body:?}");

    let products = body.as_array().unwrap();
    assert_eq!(products.len(), 1);
    assert_eq!(products[0]["name"], "Fertigation-only B");
    assert_eq!(products[0]["dose_type"], "kg_per_ha");
    assert_eq!(products[0]["dose_type_display"], "kg/ha");
}
