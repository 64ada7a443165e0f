//! Integration tests for camtrap-study API endpoints
//!
//! Each test gets a fresh root folder in a temp dir with the fixture dataset
//! imported once through the study store.

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use camtrap_study::importer::ImportOptions;
use camtrap_study::store::StudyStore;
use camtrap_study::{build_router, AppState};
use serde_json::{json, Value};
use std::path::PathBuf;
use tempfile::TempDir;
use tower::util::ServiceExt; // for `oneshot` method

fn fixture_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/camtrap-dp")
}

/// Test helper: app over a temp root folder holding one imported study
async fn setup_app() -> (TempDir, Router, String) {
    let tmp = tempfile::tempdir().unwrap();
    let store = StudyStore::new(tmp.path().to_path_buf()).unwrap();
    let summary = store
        .import_study(&fixture_dir(), &ImportOptions::default())
        .await
        .expect("Fixture should import");

    let app = build_router(AppState::new(store, ImportOptions::default()));
    (tmp, app, summary.study_id)
}

fn test_request(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// Test helper: Extract JSON body from response
async fn extract_json(body: Body) -> Value {
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .expect("Should read body");
    serde_json::from_slice(&bytes).expect("Should parse JSON")
}

async fn get_json(app: &Router, uri: &str) -> (StatusCode, Value) {
    let response = app.clone().oneshot(test_request("GET", uri)).await.unwrap();
    let status = response.status();
    (status, extract_json(response.into_body()).await)
}

fn counts(periods: &Value) -> Vec<i64> {
    periods
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["count"].as_i64().unwrap())
        .collect()
}

// =============================================================================
// Health Endpoint Tests
// =============================================================================

#[tokio::test]
async fn test_health_endpoint() {
    let (_tmp, app, _id) = setup_app().await;

    let (status, body) = get_json(&app, "/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "camtrap-study");
    assert!(body["version"].is_string());
}

// =============================================================================
// Study Management Tests
// =============================================================================

#[tokio::test]
async fn test_list_and_get_study() {
    let (_tmp, app, id) = setup_app().await;

    let (status, body) = get_json(&app, "/api/studies").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);
    assert_eq!(body[0]["study_id"], id.as_str());

    let (status, body) = get_json(&app, &format!("/api/studies/{}", id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["title"], "Alpine foothills camera trap survey, winter 2023");
    assert_eq!(body["overview"]["observation_count"], 11);
    assert_eq!(body["overview"]["first_observation"], "2023-01-02T06:15:00Z");
    assert_eq!(body["overview"]["last_observation"], "2023-01-25T10:00:00Z");
}

#[tokio::test]
async fn test_import_over_http() {
    let (_tmp, app, _id) = setup_app().await;

    let request = json_request(
        "POST",
        "/api/studies/import",
        json!({ "path": fixture_dir() }),
    );
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let body = extract_json(response.into_body()).await;
    assert!(body["study_id"].is_string());
    assert_eq!(body["tables"].as_array().unwrap().len(), 3);

    let (_, list) = get_json(&app, "/api/studies").await;
    assert_eq!(list.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_import_rejects_bad_requests() {
    let (tmp, app, _id) = setup_app().await;

    let missing = tmp.path().join("no-such-dataset");
    let request = json_request("POST", "/api/studies/import", json!({ "path": missing }));
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = extract_json(response.into_body()).await;
    assert!(body["error"].is_string());

    let request = Request::builder()
        .method("POST")
        .uri("/api/studies/import")
        .header("content-type", "application/json")
        .body(Body::from("{\"dir\": 1}"))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Failed imports leave no study behind
    let (_, list) = get_json(&app, "/api/studies").await;
    assert_eq!(list.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_rename_and_delete_study() {
    let (_tmp, app, id) = setup_app().await;
    let uri = format!("/api/studies/{}", id);

    let response = app
        .clone()
        .oneshot(json_request("PATCH", &uri, json!({ "title": "Winter 2023" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["title"], "Winter 2023");

    let response = app
        .clone()
        .oneshot(json_request("PATCH", &uri, json!({ "title": "" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app.clone().oneshot(test_request("DELETE", &uri)).await.unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let (status, body) = get_json(&app, &uri).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains(&id));
}

#[tokio::test]
async fn test_unknown_and_invalid_study_ids() {
    let (_tmp, app, _id) = setup_app().await;

    let unknown = uuid::Uuid::new_v4();
    let (status, body) = get_json(&app, &format!("/api/studies/{}/species", unknown)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].is_string());

    let (status, _) = get_json(&app, "/api/studies/not-a-uuid/species").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// =============================================================================
// Query Endpoint Tests
// =============================================================================

#[tokio::test]
async fn test_species_and_deployments() {
    let (_tmp, app, id) = setup_app().await;

    let (status, body) = get_json(&app, &format!("/api/studies/{}/species", id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 4);
    assert_eq!(body[0], json!({ "scientific_name": "Vulpes vulpes", "count": 6 }));

    let (status, body) = get_json(&app, &format!("/api/studies/{}/deployments", id)).await;
    assert_eq!(status, StatusCode::OK);
    let ids: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["deployment_id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["dep1", "dep2", "dep4", "dep3"]);
    assert_eq!(body[2]["latitude"], Value::Null);
}

#[tokio::test]
async fn test_activity_endpoints() {
    let (_tmp, app, id) = setup_app().await;

    let (status, body) = get_json(
        &app,
        &format!("/api/studies/{}/activity/deployments?periods=5", id),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["period_count"], 5);
    assert_eq!(body["percentile_90_count"], 2);
    assert_eq!(counts(&body["rows"][0]["periods"]), vec![2, 0, 0, 1, 0]);

    let (status, body) = get_json(
        &app,
        &format!("/api/studies/{}/activity/locations?periods=5", id),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["rows"][0]["id"], "loc1");
    assert_eq!(counts(&body["rows"][0]["periods"]), vec![2, 0, 0, 1, 2]);

    let (status, body) =
        get_json(&app, &format!("/api/studies/{}/activity/deployments", id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["period_count"], 20);
}

#[tokio::test]
async fn test_activity_rejects_bad_periods() {
    let (_tmp, app, id) = setup_app().await;

    let (status, body) = get_json(
        &app,
        &format!("/api/studies/{}/activity/deployments?periods=0", id),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("periods"));

    let (status, body) = get_json(
        &app,
        &format!("/api/studies/{}/activity/locations?periods=many", id),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_timeseries_endpoints() {
    let (_tmp, app, id) = setup_app().await;

    let (status, body) =
        get_json(&app, &format!("/api/studies/{}/timeseries/top?limit=2", id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["species"].as_array().unwrap().len(), 2);
    assert_eq!(body["weeks"].as_array().unwrap().len(), 4);
    assert_eq!(body["weeks"][0]["week_start"], "2023-01-02");
    assert_eq!(body["weeks"][0]["counts"]["Vulpes vulpes"], 3);

    let (status, body) = get_json(
        &app,
        &format!(
            "/api/studies/{}/timeseries?species=Sus%20scrofa,Panthera%20leo",
            id
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["species"][0]["count"], 1);
    assert_eq!(body["species"][1]["scientific_name"], "Panthera leo");
    assert_eq!(body["species"][1]["count"], 0);

    let (status, _) = get_json(&app, &format!("/api/studies/{}/timeseries", id)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_heatmap_endpoint() {
    let (_tmp, app, id) = setup_app().await;

    let (status, body) = get_json(
        &app,
        &format!(
            "/api/studies/{}/heatmap?species=Vulpes%20vulpes&start_hour=22&end_hour=7",
            id
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let points = body.as_array().unwrap();
    assert_eq!(points.len(), 2);
    assert_eq!(points[0]["latitude"], 46.5);
    assert_eq!(points[0]["count"], 3);
    assert_eq!(points[1]["count"], 1);

    let (status, _) = get_json(
        &app,
        &format!(
            "/api/studies/{}/heatmap?start_date=2023-02-01&end_date=2023-01-01",
            id
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = get_json(
        &app,
        &format!("/api/studies/{}/heatmap?start_date=yesterday", id),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = get_json(&app, &format!("/api/studies/{}/heatmap?start_hour=24", id)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_heatmap_blank_parameters_mean_unfiltered() {
    let (_tmp, app, id) = setup_app().await;

    let (status, body) = get_json(
        &app,
        &format!(
            "/api/studies/{}/heatmap?species=&start_date=&end_date=&start_hour=&end_hour=",
            id
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let total: i64 = body
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["count"].as_i64().unwrap())
        .sum();
    // Every species observation except the one at the deployment without coordinates
    assert_eq!(total, 9);

    let (status, body) =
        get_json(&app, &format!("/api/studies/{}/media?start_hour=&end_hour=", id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 9);

    let (status, body) =
        get_json(&app, &format!("/api/studies/{}/heatmap?start_hour=dusk", id)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("start_hour"));
}

#[tokio::test]
async fn test_daily_activity_endpoint() {
    let (_tmp, app, id) = setup_app().await;

    let (status, body) = get_json(
        &app,
        &format!("/api/studies/{}/daily-activity?species=Vulpes%20vulpes", id),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let buckets = body.as_array().unwrap();
    assert_eq!(buckets.len(), 24);
    assert_eq!(buckets[6]["hour"], 6);
    assert_eq!(buckets[6]["counts"]["Vulpes vulpes"], 1);

    let (status, _) = get_json(&app, &format!("/api/studies/{}/daily-activity", id)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_media_endpoint() {
    let (_tmp, app, id) = setup_app().await;

    let (status, body) = get_json(&app, &format!("/api/studies/{}/media?limit=3", id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 9);
    assert_eq!(body["has_more"], true);
    let ids: Vec<&str> = body["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["media_id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["m9", "m7", "m6"]);

    let (status, body) = get_json(
        &app,
        &format!("/api/studies/{}/media?species=Capreolus%20capreolus", id),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 2);
    assert_eq!(body["has_more"], false);
}
