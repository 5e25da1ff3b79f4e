use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use binsift::api::create_app;
use binsift::search::SearchConfig;
use binsift::storage::{MemoryDocumentRepository, MemoryEmbeddingStore};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt; // for oneshot

fn app() -> Router {
    let config = SearchConfig {
        dimension: 8,
        ..SearchConfig::default()
    };
    create_app(
        config,
        Arc::new(MemoryEmbeddingStore::new(8).unwrap()),
        Arc::new(MemoryDocumentRepository::new()),
    )
    .unwrap()
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = serde_json::from_slice(&bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
    (status, value)
}

async fn seed(app: &Router) {
    for (id, status, views) in [(1, "published", "10"), (2, "published", "50"), (3, "draft", "99")] {
        let (code, _) = send(
            app,
            "PUT",
            &format!("/v1/documents/{}", id),
            Some(json!({
                "kind": "post",
                "status": status,
                "attributes": {"title": format!("post {}", id)},
                "metadata": {"views": views}
            })),
        )
        .await;
        assert_eq!(code, StatusCode::OK);
    }

    let (code, body) = send(
        app,
        "PUT",
        "/v1/documents/1/embeddings",
        Some(json!({"chunks": [
            {"vector": [1.0, -1.0, 1.0, -1.0, 1.0, -1.0, 1.0, -1.0]},
            {"vector": [1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0]}
        ]})),
    )
    .await;
    assert_eq!(code, StatusCode::OK);
    assert_eq!(body[0]["binary_code"], "AA");
    assert_eq!(body[1]["sequence_no"], 1);

    for doc in [2, 3] {
        let (code, _) = send(
            app,
            "POST",
            "/v1/embeddings",
            Some(json!({
                "document_id": doc,
                "sequence_no": 0,
                "vector": [-1.0, -1.0, 1.0, -1.0, 1.0, -1.0, 1.0, -1.0]
            })),
        )
        .await;
        assert_eq!(code, StatusCode::OK);
    }
}

#[tokio::test]
async fn test_health_reports_counts() {
    let app = app();
    seed(&app).await;

    let (status, body) = send(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["embeddings"], 4);
    assert_eq!(body["documents"], 3);
}

#[tokio::test]
async fn test_search_flow() {
    let app = app();
    seed(&app).await;

    let query = json!([1.0, -1.0, 1.0, -1.0, 1.0, -1.0, 1.0, -1.0]);

    let (status, body) = send(
        &app,
        "POST",
        "/v1/search",
        Some(json!({"vector": query, "top_k": 1})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    let results = body["results"].as_array().unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0]["document_id"], 1);
    assert!((results[0]["similarity"].as_f64().unwrap() - 1.0).abs() < 1e-5);

    // Draft document 3 is outside the default scope
    let (_, body) = send(&app, "POST", "/v1/search", Some(json!({"vector": query}))).await;
    let documents: Vec<u64> = body["results"]
        .as_array()
        .unwrap()
        .iter()
        .map(|hit| hit["document_id"].as_u64().unwrap())
        .collect();
    assert_eq!(documents.len(), 3);
    assert!(!documents.contains(&3));

    let (status, body) = send(
        &app,
        "POST",
        "/v1/search",
        Some(json!({
            "vector": query,
            "filter_groups": {
                "views": [{"field_name": "views", "operator": ">=", "compare_value": 20, "target": "metadata"}]
            }
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    let results = body["results"].as_array().unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0]["document_id"], 2);

    let (status, body) = send(
        &app,
        "POST",
        "/v1/search",
        Some(json!({
            "vector": query,
            "top_k": 2,
            "sort": [{"field_name": "views", "direction": "DESC", "target": "metadata", "cast": "number"}]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    let results = body["results"].as_array().unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0]["document_id"], 2);
    assert_eq!(results[1]["document_id"], 1);
}

#[tokio::test]
async fn test_invalid_search_requests_are_rejected() {
    let app = app();
    seed(&app).await;
    let query = json!([1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 1.0]);

    let cases = [
        json!({"vector": [1.0, 1.0]}),
        json!({"vector": query, "top_k": 0}),
        json!({"vector": query, "filter_groups": {
            "g": [{"field_name": "views", "operator": "BETWEEN", "compare_value": 1}]
        }}),
        json!({"vector": query, "filter_groups": {
            "g": [{"field_name": "title; drop", "operator": "=", "compare_value": "x"}]
        }}),
        json!({"vector": query, "sort": [{"field_name": "views", "direction": "DESC", "target": "metadata"}]}),
        json!({"vector": query, "sort": [{"field_name": "title", "direction": "SIDEWAYS"}]}),
    ];

    for case in cases {
        let (status, body) = send(&app, "POST", "/v1/search", Some(case.clone())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{} -> {}", case, body);
    }
}

#[tokio::test]
async fn test_embedding_crud() {
    let app = app();
    seed(&app).await;

    let (status, body) = send(&app, "GET", "/v1/documents/1/embeddings", None).await;
    assert_eq!(status, StatusCode::OK);
    let id = body[0]["id"].as_u64().unwrap();

    let (status, body) = send(&app, "GET", &format!("/v1/embeddings/{}", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["document_id"], 1);

    let (status, body) = send(&app, "GET", "/v1/embeddings?offset=1&limit=2", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 2);

    let (status, body) = send(
        &app,
        "POST",
        "/v1/embeddings",
        Some(json!({"document_id": 1, "sequence_no": 5, "vector": [1.0, 2.0]})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{}", body);

    let (status, body) = send(&app, "DELETE", &format!("/v1/embeddings/{}", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["deleted"], true);

    let (status, _) = send(&app, "GET", &format!("/v1/embeddings/{}", id), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, body) = send(&app, "DELETE", &format!("/v1/embeddings/{}", id), None).await;
    assert_eq!(body["deleted"], false);
}

#[tokio::test]
async fn test_document_lifecycle() {
    let app = app();
    seed(&app).await;

    let (status, body) = send(&app, "GET", "/v1/documents/2", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["metadata"]["views"], "50");
    assert_eq!(body["attributes"]["title"], "post 2");

    let (status, body) = send(&app, "DELETE", "/v1/documents/1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["deleted"], true);
    assert_eq!(body["embeddings_removed"], 2);

    let (status, _) = send(&app, "GET", "/v1/documents/1", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, body) = send(&app, "GET", "/v1/documents/1/embeddings", None).await;
    assert_eq!(body, json!([]));

    let (_, body) = send(&app, "GET", "/health", None).await;
    assert_eq!(body["embeddings"], 2);
    assert_eq!(body["documents"], 2);
}
