//! Server API tests

use super::*;
use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use http_body_util::BodyExt;
use pulse_core::Tone;
use serde_json::{json, Value};
use tower::ServiceExt;

const ALL_PERMISSIONS: &str = "manage_money,manage_sales,view_reports,manage_organization";

fn setup_test_app() -> (Router, Database, i64) {
    let db = Database::in_memory().unwrap();
    let org = db
        .create_organization("Acme", "USD", Tone::Friendly, chrono::Utc::now())
        .unwrap();
    let config = ServerConfig {
        require_auth: false,
        allowed_origins: vec![],
        ..Default::default()
    };
    let app = create_router_with_ai(db.clone(), config, None).unwrap();
    (app, db, org)
}

fn api_request(method: &str, uri: &str, org: i64, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(ORGANIZATION_HEADER, org.to_string())
        .header(USER_HEADER, "7")
        .header(PERMISSIONS_HEADER, ALL_PERMISSIONS);
    match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let json = get_body_json(response).await;
    (status, json)
}

async fn get_body_json(response: axum::response::Response) -> Value {
    let body = response.into_body();
    let bytes = body.collect().await.unwrap().to_bytes();
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(&bytes).unwrap()
}

// ========== Authentication Tests ==========

fn auth_app(keys: &[&str]) -> Router {
    let db = Database::in_memory().unwrap();
    let config = ServerConfig {
        require_auth: true,
        api_keys: keys.iter().map(|k| k.to_string()).collect(),
        ..Default::default()
    };
    create_router_with_ai(db, config, None).unwrap()
}

#[tokio::test]
async fn test_auth_required_without_key() {
    let app = auth_app(&["secret-key"]);
    let (status, json) = send(&app, api_request("GET", "/api/state", 1, None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["error"], "Authentication required");
}

#[tokio::test]
async fn test_auth_with_valid_api_key() {
    let app = auth_app(&["secret-key"]);
    let mut request = api_request("GET", "/api/state", 1, None);
    request
        .headers_mut()
        .insert("authorization", "Bearer secret-key".parse().unwrap());
    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_auth_with_wrong_api_key() {
    let app = auth_app(&["secret-key"]);
    let mut request = api_request("GET", "/api/state", 1, None);
    request
        .headers_mut()
        .insert("authorization", "Bearer secret-kez".parse().unwrap());
    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[test]
fn test_validate_api_key() {
    let keys = vec!["alpha".to_string(), "beta-key".to_string()];
    assert!(validate_api_key("alpha", &keys));
    assert!(validate_api_key("beta-key", &keys));
    assert!(!validate_api_key("alph", &keys));
    assert!(!validate_api_key("", &keys));
    assert!(!validate_api_key("alpha", &[]));
}

// ========== Organization Context Tests ==========

#[tokio::test]
async fn test_missing_organization_header() {
    let (app, _, _) = setup_test_app();
    let request = Request::builder()
        .uri("/api/state")
        .body(Body::empty())
        .unwrap();
    let (status, json) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "Missing x-organization-id header");
}

#[tokio::test]
async fn test_unknown_permission_rejected() {
    let (app, _, org) = setup_test_app();
    let request = Request::builder()
        .uri("/api/state")
        .header(ORGANIZATION_HEADER, org.to_string())
        .header(PERMISSIONS_HEADER, "view_reports, launch_rockets")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[test]
fn test_org_context_from_headers() {
    let mut headers = HeaderMap::new();
    headers.insert(ORGANIZATION_HEADER, "12".parse().unwrap());
    headers.insert(PERMISSIONS_HEADER, "manage_sales,view_reports".parse().unwrap());

    let ctx = org_context(&headers).unwrap();
    assert_eq!(ctx.organization_id, 12);
    assert_eq!(ctx.user_id, 0);
    assert!(ctx.can(Permission::ManageSales));
    assert!(ctx.can(Permission::ViewReports));
    assert!(!ctx.can(Permission::ManageMoney));
}

// ========== State and Cycle Tests ==========

#[tokio::test]
async fn test_state_before_first_cycle_is_neutral() {
    let (app, _, org) = setup_test_app();
    let (status, json) = send(&app, api_request("GET", "/api/state", org, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["mood"], "neutral");
    assert!(json["last_cycle_at"].is_null());
}

#[tokio::test]
async fn test_cycle_creates_insights() {
    let (app, db, org) = setup_test_app();
    db.create_stock_item(org, "Flour", None, 0.0, 5.0, 1.0).unwrap();

    let (status, json) = send(&app, api_request("POST", "/api/cycle", org, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(!json["last_cycle_at"].is_null());

    let (status, json) = send(
        &app,
        api_request("GET", "/api/insights?status=active", org, None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let titles: Vec<&str> = json
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|i| i["title"].as_str())
        .collect();
    assert!(titles.contains(&"Items out of stock"), "titles: {:?}", titles);

    // Cycle is audited
    let audit = db.list_audit_log(org, 10).unwrap();
    assert!(audit.iter().any(|e| e.action == "cycle"));
}

// ========== Insight Tests ==========

async fn cycled_insight(app: &Router, db: &Database, org: i64) -> i64 {
    db.create_stock_item(org, "Flour", None, 0.0, 5.0, 1.0).unwrap();
    send(app, api_request("POST", "/api/cycle", org, None)).await;
    db.list_active_insights(org).unwrap()[0].id
}

#[tokio::test]
async fn test_dismiss_insight() {
    let (app, db, org) = setup_test_app();
    let id = cycled_insight(&app, &db, org).await;

    let uri = format!("/api/insights/{}/dismiss", id);
    let (status, json) = send(&app, api_request("POST", &uri, org, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "dismissed");

    // Only active insights can be closed
    let (status, _) = send(&app, api_request("POST", &uri, org, None)).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_complete_insight_of_other_organization() {
    let (app, db, org) = setup_test_app();
    let id = cycled_insight(&app, &db, org).await;
    let other = db
        .create_organization("Globex", "USD", Tone::Formal, chrono::Utc::now())
        .unwrap();

    let uri = format!("/api/insights/{}/complete", id);
    let (status, _) = send(&app, api_request("POST", &uri, other, None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let insight = db.get_insight(org, id).unwrap().unwrap();
    assert_eq!(insight.status, pulse_core::models::InsightStatus::Active);
}

#[tokio::test]
async fn test_list_insights_invalid_status() {
    let (app, _, org) = setup_test_app();
    let (status, _) = send(
        &app,
        api_request("GET", "/api/insights?status=snoozed", org, None),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// ========== Prediction Tests ==========

#[tokio::test]
async fn test_generate_and_backfill_prediction() {
    let (app, db, org) = setup_test_app();
    db.create_account(org, "Operating", 10_000.0).unwrap();

    let (status, json) = send(
        &app,
        api_request("POST", "/api/predictions/generate", org, None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let predictions = json.as_array().unwrap();
    let cash = predictions
        .iter()
        .find(|p| p["prediction_type"] == "cash_flow")
        .expect("cash forecast");
    let id = cash["id"].as_i64().unwrap();

    let uri = format!("/api/predictions/{}/actual", id);
    let (status, json) = send(
        &app,
        api_request("POST", &uri, org, Some(json!({ "actual": 10_000.0 }))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["actual_value"], 10_000.0);
    assert_eq!(json["accuracy"], 1.0);

    let (status, json) = send(
        &app,
        api_request("GET", "/api/predictions?type=cash_flow", org, None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(!json.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_backfill_unknown_prediction() {
    let (app, _, org) = setup_test_app();
    let (status, _) = send(
        &app,
        api_request(
            "POST",
            "/api/predictions/999/actual",
            org,
            Some(json!({ "actual": 1.0 })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ========== Chat and Action Tests ==========

async fn propose_invoice(app: &Router, org: i64) -> i64 {
    let (status, json) = send(
        app,
        api_request(
            "POST",
            "/api/chat",
            org,
            Some(json!({ "message": "create an invoice for Globex for $500" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["action"]["requires_confirmation"], true);
    json["action"]["action_id"].as_i64().unwrap()
}

#[tokio::test]
async fn test_chat_action_lifecycle() {
    let (app, db, org) = setup_test_app();
    let id = propose_invoice(&app, org).await;

    let (status, json) = send(
        &app,
        api_request("POST", &format!("/api/actions/{}/confirm", id), org, None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "confirmed");

    let execute = format!("/api/actions/{}/execute", id);
    let (status, json) = send(&app, api_request("POST", &execute, org, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "executed");
    assert_eq!(json["result"]["number"], "INV-0001");

    // Second execution is refused
    let (status, _) = send(&app, api_request("POST", &execute, org, None)).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let rate = format!("/api/actions/{}/rate", id);
    let (status, _) = send(
        &app,
        api_request("POST", &rate, org, Some(json!({ "rating": 9 }))),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, json) = send(
        &app,
        api_request("POST", &rate, org, Some(json!({ "rating": 4 }))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["rating"], 4);

    assert!(db.find_invoice_by_number(org, "INV-0001").unwrap().is_some());
}

#[tokio::test]
async fn test_cancel_action() {
    let (app, _, org) = setup_test_app();
    let id = propose_invoice(&app, org).await;

    let (status, json) = send(
        &app,
        api_request("POST", &format!("/api/actions/{}/cancel", id), org, None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "cancelled");

    let (status, json) = send(
        &app,
        api_request("GET", "/api/actions?status=cancelled", org, None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_get_action_of_other_organization() {
    let (app, db, org) = setup_test_app();
    let id = propose_invoice(&app, org).await;
    let other = db
        .create_organization("Globex", "USD", Tone::Formal, chrono::Utc::now())
        .unwrap();

    let (status, _) = send(
        &app,
        api_request("GET", &format!("/api/actions/{}", id), other, None),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_chat_without_permission_explains() {
    let (app, db, org) = setup_test_app();
    let request = Request::builder()
        .method("POST")
        .uri("/api/chat")
        .header(ORGANIZATION_HEADER, org.to_string())
        .header(PERMISSIONS_HEADER, "view_reports")
        .header("content-type", "application/json")
        .body(Body::from(
            json!({ "message": "create an invoice for Globex for $500" }).to_string(),
        ))
        .unwrap();

    let (status, json) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert!(json.get("action").is_none());
    assert!(json["content"]
        .as_str()
        .unwrap()
        .contains("don't have permission"));
    assert!(db.list_actions(org, None, 10).unwrap().is_empty());
}

#[tokio::test]
async fn test_chat_empty_message() {
    let (app, _, org) = setup_test_app();
    let (status, _) = send(
        &app,
        api_request("POST", "/api/chat", org, Some(json!({ "message": "   " }))),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_chat_without_data_is_explicit() {
    let (app, _, org) = setup_test_app();
    let (status, json) = send(
        &app,
        api_request(
            "POST",
            "/api/chat",
            org,
            Some(json!({ "message": "how much cash do we have?" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(!json["content"].as_str().unwrap().contains('$'));
}

#[tokio::test]
async fn test_suggestions_empty() {
    let (app, _, org) = setup_test_app();
    let (status, json) = send(&app, api_request("GET", "/api/suggestions", org, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json, json!([]));
}

// ========== Error Mapping Tests ==========

#[test]
fn test_engine_errors_map_to_status() {
    use pulse_core::Error;

    let cases = [
        (Error::Validation("x".into()), StatusCode::UNPROCESSABLE_ENTITY),
        (Error::PermissionDenied("x".into()), StatusCode::FORBIDDEN),
        (Error::InvalidState("x".into()), StatusCode::CONFLICT),
        (Error::NotFound("x".into()), StatusCode::NOT_FOUND),
        (Error::Config("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
    ];
    for (err, expected) in cases {
        assert_eq!(AppError::from(err).status(), expected);
    }
}

#[tokio::test]
async fn test_internal_errors_are_sanitized() {
    let err = AppError::from(pulse_core::Error::Encryption("bad key material".into()));
    let response = err.into_response();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let json = get_body_json(response).await;
    assert_eq!(json["error"], "An internal error occurred");
}

// ========== Security Header Tests ==========

#[tokio::test]
async fn test_security_headers() {
    let (app, _, org) = setup_test_app();
    let response = app
        .oneshot(api_request("GET", "/api/state", org, None))
        .await
        .unwrap();

    let headers = response.headers();
    assert_eq!(headers.get("x-content-type-options").unwrap(), "nosniff");
    assert_eq!(headers.get("x-frame-options").unwrap(), "DENY");
    assert!(headers.get("content-security-policy").is_some());
}
