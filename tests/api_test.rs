//! HTTP API tests driving the router in-process over in-memory storage and
//! queue.

mod fixtures;
mod helpers;

use agri_diagnose::models::job::JobStatus;
use agri_diagnose::services::queue::JobQueue;
use axum::http::StatusCode;
use fixtures::*;
use helpers::*;
use serde_json::json;
use uuid::Uuid;

#[tokio::test]
async fn test_service_info() {
    let app = test_app();
    let (status, body) = send(&app.router, get_request("/")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "agri-diagnose");
    assert_eq!(body["status"], "operational");
}

#[tokio::test]
async fn test_health_with_in_memory_backends() {
    let app = test_app();
    let (status, body) = send(&app.router, get_request("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["checks"]["redis"]["status"], "ok");
    assert_eq!(body["checks"]["storage"]["status"], "ok");
}

#[tokio::test]
async fn test_upload_png_returns_public_url() {
    let app = test_app();
    let (status, body) = send(
        &app.router,
        multipart_request("file", "tomato leaf.png", "image/png", PNG_BYTES),
    )
    .await;

    assert_eq!(status, StatusCode::OK, "{body}");
    let filename = body["filename"].as_str().unwrap();
    assert!(filename.ends_with("_tomato_leaf.png"), "{filename}");
    assert_eq!(body["original_filename"], "tomato leaf.png");
    assert_eq!(body["content_type"], "image/png");
    assert!(body["url"].as_str().unwrap().ends_with(filename));

    let (stored, content_type) = app.storage.get(filename).await.unwrap();
    assert_eq!(stored, PNG_BYTES);
    assert_eq!(content_type, "image/png");
}

#[tokio::test]
async fn test_upload_jpeg_with_legacy_jpg_type() {
    let app = test_app();
    let (status, _) = send(
        &app.router,
        multipart_request("file", "leaf.jpg", "image/jpg", JPEG_BYTES),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(app.storage.len().await, 1);
}

#[tokio::test]
async fn test_upload_rejects_pdf_without_touching_storage() {
    let app = test_app();
    let (status, body) = send(
        &app.router,
        multipart_request("file", "report.pdf", "application/pdf", PDF_BYTES),
    )
    .await;

    assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
    assert_eq!(body["error"], "unsupported_media_type");
    assert!(app.storage.is_empty().await);
}

#[tokio::test]
async fn test_upload_rejects_mislabelled_content() {
    let app = test_app();
    let (status, body) = send(
        &app.router,
        multipart_request("file", "fake.png", "image/png", PDF_BYTES),
    )
    .await;
    assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
    assert_eq!(body["error"], "unsupported_media_type");
    assert!(app.storage.is_empty().await);
}

#[tokio::test]
async fn test_upload_rejects_empty_file() {
    let app = test_app();
    let (status, body) = send(
        &app.router,
        multipart_request("file", "empty.png", "image/png", b""),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "empty_payload");
    assert!(app.storage.is_empty().await);
}

#[tokio::test]
async fn test_upload_rejects_oversized_file() {
    let app = test_app_with_limit(1024);
    let mut data = PNG_BYTES.to_vec();
    data.resize(2048, 0);

    let (status, body) = send(
        &app.router,
        multipart_request("file", "big.png", "image/png", &data),
    )
    .await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body["error"], "payload_too_large");
    assert!(app.storage.is_empty().await);
}

#[tokio::test]
async fn test_upload_requires_file_field() {
    let app = test_app();
    let (status, body) = send(
        &app.router,
        multipart_request("image", "leaf.png", "image/png", PNG_BYTES),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "bad_request");
}

#[tokio::test]
async fn test_submit_is_immediately_pollable_as_pending() {
    let app = test_app();
    let (status, body) = send(
        &app.router,
        json_request(
            "POST",
            "/api/v1/diagnose",
            json!({
                "image_url": "http://minio:9000/smart-agriculture/leaf.png",
                "crop_type": "tomato",
                "location": "plot 7"
            }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["status"], "Pending");
    let job_id = body["job_id"].as_str().unwrap().to_string();

    let (status, polled) =
        send(&app.router, get_request(&format!("/api/v1/diagnose/{job_id}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(polled["job_id"], job_id.as_str());
    assert_eq!(polled["status"], "Pending");
    assert!(polled["result"].is_null());

    let record = app.queue.get(job_id.parse().unwrap()).await.unwrap().unwrap();
    assert_eq!(record.status, JobStatus::Pending);
    assert_eq!(record.location.as_deref(), Some("plot 7"));
    assert_eq!(app.queue.queue_depth().await.unwrap(), 1);
}

#[tokio::test]
async fn test_submit_rejects_invalid_requests() {
    let app = test_app();
    for body in [
        json!({ "image_url": "ftp://example.com/leaf.png" }),
        json!({ "image_url": "" }),
        json!({ "image_url": "https://example.com/leaf.png", "crop_type": "x".repeat(101) }),
        json!({ "crop_type": "tomato" }),
        json!({ "image_url": "https://example.com/leaf.png", "crop_type": "   " }),
        json!({ "image_url": "https://example.com/leaf.png", "location": "\t" }),
    ] {
        let (status, response) =
            send(&app.router, json_request("POST", "/api/v1/diagnose", body.clone())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
        assert_eq!(response["error"], "bad_request");
    }
    assert_eq!(app.queue.queue_depth().await.unwrap(), 0);
}

#[tokio::test]
async fn test_unknown_job_is_not_found() {
    let app = test_app();
    let (status, body) = send(
        &app.router,
        get_request(&format!("/api/v1/diagnose/{}", Uuid::new_v4())),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");

    let (status, _) = send(&app.router, get_request("/api/v1/diagnose/not-a-uuid")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_taxonomy_listing() {
    let app = test_app();
    let (status, body) = send(&app.router, get_request("/api/v1/taxonomy")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["metadata"]["version"], "1.0.0");
    assert_eq!(body["entries"].as_array().unwrap().len(), 9);
}

#[tokio::test]
async fn test_taxonomy_by_id() {
    let app = test_app();
    let (status, body) = send(&app.router, get_request("/api/v1/taxonomy/3")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["model_label"], "spider_mite");
    assert_eq!(body["action_policy"], "RETRIEVE");

    let (status, body) = send(&app.router, get_request("/api/v1/taxonomy/999")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");
}

#[tokio::test]
async fn test_taxonomy_search_by_name_and_label() {
    let app = test_app();

    let (status, body) =
        send(&app.router, get_request("/api/v1/taxonomy/search?q=Late%20Blight")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);
    assert_eq!(body[0]["model_label"], "late_blight");

    let (status, body) =
        send(&app.router, get_request("/api/v1/taxonomy/search?q=aphid_complex")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["canonical_name"], "Aphids");

    let (status, body) = send(&app.router, get_request("/api/v1/taxonomy/search?q=banana")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");
}

#[tokio::test]
async fn test_taxonomy_search_validates_query() {
    let app = test_app();
    let (status, _) = send(&app.router, get_request("/api/v1/taxonomy/search?q=")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let long = "a".repeat(101);
    let uri = format!("/api/v1/taxonomy/search?q={long}");
    let (status, _) = send(&app.router, get_request(&uri)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app.router, get_request("/api/v1/taxonomy/search")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
