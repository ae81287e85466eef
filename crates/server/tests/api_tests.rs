//! Integration tests for HTTP API endpoints.

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::{MIB, TestServer, seeded_bytes, split_into_chunks};
use serde_json::{Value, json};
use tower::ServiceExt;

fn initiate_body(total_size: u64) -> Value {
    json!({
        "file_name": "scan.pdf",
        "total_size": total_size,
        "content_type": "application/pdf",
        "encrypted_key": "wrapped",
        "iv": "nonce"
    })
}

/// Initiate an upload as `owner` and return its session id.
async fn initiate(server: &TestServer, owner: &str, total_size: u64) -> String {
    let (status, body) = server
        .json("POST", "/v1/uploads", Some(owner), initiate_body(total_size))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body["session_id"].as_str().unwrap().to_string()
}

async fn put_part(
    server: &TestServer,
    owner: &str,
    session_id: &str,
    part_number: u32,
    data: bytes::Bytes,
) -> (StatusCode, Value) {
    server
        .request(
            "PUT",
            &format!("/v1/uploads/{session_id}/parts/{part_number}"),
            Some(owner),
            Body::from(data),
        )
        .await
}

#[tokio::test]
async fn test_health_is_unauthenticated() {
    let server = TestServer::new().await;

    let (status, body) = server
        .request("GET", "/v1/health", None, Body::empty())
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn test_missing_or_malformed_owner_is_unauthorized() {
    let server = TestServer::new().await;

    let (status, body) = server
        .json("POST", "/v1/uploads", None, initiate_body(10))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "unauthorized");

    let (status, body) = server
        .json("POST", "/v1/uploads", Some("../etc"), initiate_body(10))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "unauthorized");

    let (status, _) = server
        .request("GET", "/v1/usage", None, Body::empty())
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(server.gateway().creates(), 0);
}

#[tokio::test]
async fn test_full_upload_flow_over_http() {
    let server = TestServer::filesystem().await;
    let payload = seeded_bytes(42, (12 * MIB) as usize);

    let (status, initiated) = server
        .json(
            "POST",
            "/v1/uploads",
            Some("alice"),
            initiate_body(payload.len() as u64),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(initiated["total_parts"], 3);
    assert_eq!(initiated["part_size"], 5 * MIB);
    assert!(initiated["upload_id"].is_string());
    assert!(initiated["expires_at"].is_string());
    let session_id = initiated["session_id"].as_str().unwrap().to_string();

    let parts = split_into_chunks(&payload, (5 * MIB) as usize);
    for (idx, part) in parts.into_iter().enumerate() {
        let part_number = idx as u32 + 1;
        let (status, body) = put_part(&server, "alice", &session_id, part_number, part).await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["part_number"], part_number);
        assert!(body["etag"].is_string());

        if part_number == 1 {
            let (status, progress) = server
                .request(
                    "GET",
                    &format!("/v1/uploads/{session_id}"),
                    Some("alice"),
                    Body::empty(),
                )
                .await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(progress["status"], "in_progress");
            assert_eq!(progress["missing_parts"], json!([2, 3]));
            assert_eq!(progress["uploaded_bytes"], 5 * MIB);
        }
    }

    let (status, completed) = server
        .request(
            "POST",
            &format!("/v1/uploads/{session_id}/complete"),
            Some("alice"),
            Body::empty(),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{completed}");
    assert_eq!(completed["status"], "completed");
    assert_eq!(completed["file"]["size"], 12 * MIB);
    assert_eq!(completed["file"]["original_filename"], "scan.pdf");
    assert_eq!(completed["file"]["encrypted_key"], "wrapped");
    assert_eq!(completed["file"]["iv"], "nonce");
    assert_eq!(completed["file"]["algorithm"], "AES/GCM/NoPadding");
    let file_id = completed["file"]["file_id"].as_str().unwrap().to_string();

    let (status, file) = server
        .request(
            "GET",
            &format!("/v1/files/{file_id}"),
            Some("alice"),
            Body::empty(),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(file["content_type"], "application/pdf");

    let (status, usage) = server
        .request("GET", "/v1/usage", Some("alice"), Body::empty())
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(usage["owner_id"], "alice");
    assert_eq!(usage["used_bytes"], 12 * MIB);
    assert_eq!(usage["reserved_bytes"], 0);

    let (status, _) = server
        .request(
            "DELETE",
            &format!("/v1/files/{file_id}"),
            Some("alice"),
            Body::empty(),
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = server
        .request(
            "GET",
            &format!("/v1/files/{file_id}"),
            Some("alice"),
            Body::empty(),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "not_found");

    // Completing again after the delete is still a no-op success.
    let (status, repeated) = server
        .request(
            "POST",
            &format!("/v1/uploads/{session_id}/complete"),
            Some("alice"),
            Body::empty(),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{repeated}");
    assert_eq!(repeated["status"], "completed");
    assert!(repeated.get("file").is_none());

    let (_, usage) = server
        .request("GET", "/v1/usage", Some("alice"), Body::empty())
        .await;
    assert_eq!(usage["used_bytes"], 0);
}

#[tokio::test]
async fn test_quota_rejection_maps_to_413() {
    let server = TestServer::with_config(|config| {
        config.upload.quota_bytes = 10 * MIB;
    })
    .await;

    let (status, body) = server
        .json("POST", "/v1/uploads", Some("alice"), initiate_body(11 * MIB))
        .await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body["code"], "quota_exceeded");
    assert!(body["message"].as_str().unwrap().contains("quota"));
    assert_eq!(server.gateway().creates(), 0);
}

#[tokio::test]
async fn test_initiate_validation_errors() {
    let server = TestServer::new().await;

    let (status, body) = server
        .json("POST", "/v1/uploads", Some("alice"), initiate_body(0))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "bad_request");

    let (status, _) = server
        .request(
            "POST",
            "/v1/uploads",
            Some("alice"),
            Body::from("{not json"),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = server
        .json(
            "POST",
            "/v1/uploads",
            Some("alice"),
            json!({"file_name": "", "total_size": 5, "content_type": "text/plain"}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_upload_error_codes() {
    let server = TestServer::new().await;
    let session_id = initiate(&server, "alice", 10 * MIB).await;

    // Part number outside the plan.
    let (status, body) =
        put_part(&server, "alice", &session_id, 3, bytes::Bytes::from_static(b"x")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "invalid_part");

    // Malformed ids.
    let (status, body) = server
        .request("GET", "/v1/uploads/not-a-uuid", Some("alice"), Body::empty())
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "bad_request");

    // Someone else's session.
    let (status, body) = server
        .request(
            "GET",
            &format!("/v1/uploads/{session_id}"),
            Some("bob"),
            Body::empty(),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "not_found");

    // Completing with a part missing.
    let (status, _) = put_part(
        &server,
        "alice",
        &session_id,
        1,
        seeded_bytes(1, (5 * MIB) as usize),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = server
        .request(
            "POST",
            &format!("/v1/uploads/{session_id}/complete"),
            Some("alice"),
            Body::empty(),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "missing_parts");
    assert_eq!(body["message"], "missing parts: uploaded 1 of 2");

    // Abort, then the session refuses parts.
    let (status, _) = server
        .request(
            "DELETE",
            &format!("/v1/uploads/{session_id}"),
            Some("alice"),
            Body::empty(),
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = put_part(
        &server,
        "alice",
        &session_id,
        2,
        seeded_bytes(2, (5 * MIB) as usize),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "invalid_state");
}

#[tokio::test]
async fn test_part_route_rejections_are_json() {
    let server = TestServer::new().await;
    let session_id = initiate(&server, "alice", 30 * MIB).await;

    // A body over server.max_part_body_bytes.
    let limit = server.state.config.server.max_part_body_bytes;
    let (status, body) = put_part(
        &server,
        "alice",
        &session_id,
        1,
        seeded_bytes(3, (limit + 1) as usize),
    )
    .await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body["code"], "part_too_large");
    assert_eq!(server.gateway().part_uploads(), 0);

    // A part number that is not a number.
    let (status, body) = server
        .request(
            "PUT",
            &format!("/v1/uploads/{session_id}/parts/abc"),
            Some("alice"),
            Body::from("data"),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "invalid_part");
    assert!(body["message"].as_str().unwrap().contains("abc"));

    // Exactly at the limit is accepted.
    let (status, body) = put_part(
        &server,
        "alice",
        &session_id,
        1,
        seeded_bytes(4, limit as usize),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
}

#[tokio::test]
async fn test_remote_failure_maps_to_502() {
    let server = TestServer::new().await;
    server.gateway().set_fail_create(true);

    let (status, body) = server
        .json("POST", "/v1/uploads", Some("alice"), initiate_body(MIB))
        .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["code"], "remote_error");

    let (_, usage) = server
        .request("GET", "/v1/usage", Some("alice"), Body::empty())
        .await;
    assert_eq!(usage["reserved_bytes"], 0);
}

#[tokio::test]
async fn test_expired_upload_maps_to_410() {
    use time::{Duration, OffsetDateTime};
    use vault_core::SessionId;
    use vault_metadata::repos::UploadSessionRepo;

    let server = TestServer::new().await;
    let session_id = initiate(&server, "alice", MIB).await;
    let parsed = SessionId::parse(&session_id).unwrap();
    server
        .state
        .metadata
        .set_expires_at(
            *parsed.as_uuid(),
            OffsetDateTime::now_utc() - Duration::seconds(1),
        )
        .await
        .unwrap();

    let (status, body) = server
        .request(
            "GET",
            &format!("/v1/uploads/{session_id}"),
            Some("alice"),
            Body::empty(),
        )
        .await;
    assert_eq!(status, StatusCode::GONE);
    assert_eq!(body["code"], "upload_expired");
}

#[tokio::test]
async fn test_usage_reports_reservations() {
    let server = TestServer::new().await;
    initiate(&server, "alice", 4 * MIB).await;

    let (status, usage) = server
        .request("GET", "/v1/usage", Some("alice"), Body::empty())
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(usage["used_bytes"], 0);
    assert_eq!(usage["reserved_bytes"], 4 * MIB);
    assert_eq!(usage["quota_bytes"], server.state.config.upload.quota_bytes);
    assert_eq!(usage["usage_percentage"], 0.0);
}

#[tokio::test]
async fn test_trace_id_is_accepted() {
    let server = TestServer::new().await;
    let request = Request::builder()
        .method("GET")
        .uri("/v1/usage")
        .header("x-vault-owner", "alice")
        .header("x-trace-id", "trace-123")
        .body(Body::empty())
        .unwrap();

    let response = server.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let server = TestServer::new().await;
    initiate(&server, "alice", MIB).await;

    let request = Request::builder()
        .method("GET")
        .uri("/metrics")
        .body(Body::empty())
        .unwrap();
    let response = server.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("vault_upload_sessions_created_total"));
}

#[tokio::test]
async fn test_metrics_endpoint_can_be_disabled() {
    let server = TestServer::with_config(|config| {
        config.server.metrics_enabled = false;
    })
    .await;

    let (status, _) = server
        .request("GET", "/metrics", None, Body::empty())
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
