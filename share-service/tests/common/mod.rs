//! Test helper module for share-service integration tests.
//!
//! Builds the real router over the in-memory store so tests exercise the
//! full HTTP surface without external services.

#![allow(dead_code)]

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use std::sync::Arc;
use tower::util::ServiceExt;

use share_service::{
    build_router,
    config::{
        AccessCodeConfig, DatabaseConfig, Environment, SecurityConfig, ShareConfig,
        ShareLinkConfig,
    },
    services::{InvitationStore, MemoryInvitationStore},
    AppState,
};

pub const TEST_ORIGIN: &str = "http://localhost:3000";

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub store: Arc<MemoryInvitationStore>,
}

impl TestApp {
    pub fn spawn() -> Self {
        let config = test_config();
        let store = Arc::new(MemoryInvitationStore::new());
        let state = AppState {
            config,
            store: store.clone(),
        };
        let router = build_router(state.clone());
        TestApp {
            router,
            state,
            store,
        }
    }

    /// POST a JSON body and return (status, parsed response body).
    pub async fn post_json(
        &self,
        uri: &str,
        body: serde_json::Value,
    ) -> (StatusCode, serde_json::Value) {
        let response = self
            .router
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(uri)
                    .header("Content-Type", "application/json")
                    .body(Body::from(body.to_string()))
                    .expect("request"),
            )
            .await
            .expect("response");

        read_json(response).await
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = self
            .router
            .clone()
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri(uri)
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");

        read_json(response).await
    }

    pub async fn delete(&self, uri: &str) -> StatusCode {
        let response = self
            .router
            .clone()
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri(uri)
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");

        response.status()
    }

    /// Create one private project-scope invitation and return its token.
    pub async fn seed_invitation(&self, project_id: &str, email: &str) -> String {
        let (status, _) = self
            .post_json(
                "/invitations",
                serde_json::json!({
                    "project_id": project_id,
                    "emails": [email],
                    "resource_type": "project",
                    "resource_id": null,
                    "is_private": true,
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);

        let invitations = self
            .store
            .list_by_project(project_id)
            .await
            .expect("list invitations");
        invitations
            .into_iter()
            .find(|inv| inv.email == email)
            .map(|inv| inv.token)
            .expect("seeded invitation")
    }
}

pub fn test_config() -> ShareConfig {
    ShareConfig {
        environment: Environment::Dev,
        service_name: "share-service-test".to_string(),
        service_version: "0.1.0".to_string(),
        log_level: "debug".to_string(),
        port: 0,
        database: DatabaseConfig {
            url: "postgres://localhost/share_test".to_string(),
            max_connections: 5,
            min_connections: 1,
        },
        share: ShareLinkConfig {
            public_origin: TEST_ORIGIN.to_string(),
            invitation_ttl_days: 30,
        },
        access_code: AccessCodeConfig {
            expiry_minutes: 30,
            send_limit: 3,
            send_window_seconds: 900,
        },
        security: SecurityConfig {
            allowed_origins: vec![TEST_ORIGIN.to_string()],
        },
    }
}

async fn read_json(response: axum::response::Response) -> (StatusCode, serde_json::Value) {
    let status = response.status();
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body")
        .to_bytes();
    let json = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("json body")
    };
    (status, json)
}
