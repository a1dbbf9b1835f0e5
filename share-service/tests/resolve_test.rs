//! Access-resolution endpoint tests: the server-side facts the client guard
//! builds its allow/deny/verify decision from.

mod common;

use axum::http::StatusCode;
use common::TestApp;
use share_service::services::InvitationStore;

#[tokio::test]
async fn open_resources_resolve_as_open() {
    let app = TestApp::spawn();
    let (status, _) = app
        .post_json(
            "/invitations",
            serde_json::json!({
                "project_id": "P1",
                "emails": ["a@x.com"],
                "resource_type": "project",
                "resource_id": null,
                "is_private": false,
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = app
        .get("/access/resolve?project_id=P1&resource_type=project")
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["access_level"], "open");
}

#[tokio::test]
async fn unshared_resources_default_to_open() {
    let app = TestApp::spawn();
    let (status, body) = app
        .get("/access/resolve?project_id=UNKNOWN&resource_type=project")
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["access_level"], "open");
    assert_eq!(body["token_valid"], false);
}

#[tokio::test]
async fn valid_token_with_unbound_device_needs_verification() {
    let app = TestApp::spawn();
    let token = app.seed_invitation("P1", "a@x.com").await;

    let (status, body) = app
        .get(&format!(
            "/access/resolve?project_id=P1&resource_type=project&token={token}&device_id=dev1"
        ))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["access_level"], "token_required");
    assert_eq!(body["token_valid"], true);
    assert_eq!(body["device_bound"], false);
}

#[tokio::test]
async fn bound_device_resolves_as_bound() {
    let app = TestApp::spawn();
    let token = app.seed_invitation("P1", "a@x.com").await;
    app.store.bind_device(&token, "dev1").await.unwrap();

    let (status, body) = app
        .get(&format!(
            "/access/resolve?project_id=P1&resource_type=project&token={token}&device_id=dev1"
        ))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["token_valid"], true);
    assert_eq!(body["device_bound"], true);
}

#[tokio::test]
async fn unknown_or_revoked_tokens_do_not_resolve() {
    let app = TestApp::spawn();
    let token = app.seed_invitation("P1", "a@x.com").await;

    let (_, body) = app
        .get("/access/resolve?project_id=P1&resource_type=project&token=ffffffffffffffffffffffffffffffff")
        .await;
    assert_eq!(body["token_valid"], false);

    assert_eq!(
        app.delete(&format!("/invitations/{token}")).await,
        StatusCode::NO_CONTENT
    );
    let (_, body) = app
        .get(&format!(
            "/access/resolve?project_id=P1&resource_type=project&token={token}"
        ))
        .await;
    assert_eq!(body["token_valid"], false);
}

#[tokio::test]
async fn file_scoped_invitations_do_not_cover_other_files() {
    let app = TestApp::spawn();
    let (status, _) = app
        .post_json(
            "/invitations",
            serde_json::json!({
                "project_id": "P1",
                "emails": ["a@x.com"],
                "resource_type": "file",
                "resource_id": "F1",
                "is_private": true,
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let invitations = app.store.list_by_project("P1").await.unwrap();
    let token = &invitations[0].token;

    let (_, body) = app
        .get(&format!(
            "/access/resolve?project_id=P1&resource_type=file&resource_id=F1&token={token}"
        ))
        .await;
    assert_eq!(body["token_valid"], true);

    let (_, body) = app
        .get(&format!(
            "/access/resolve?project_id=P1&resource_type=file&resource_id=F2&token={token}"
        ))
        .await;
    assert_eq!(body["token_valid"], false);
}

#[tokio::test]
async fn project_scoped_invitations_cover_files_in_the_project() {
    let app = TestApp::spawn();
    let token = app.seed_invitation("P1", "a@x.com").await;

    let (_, body) = app
        .get(&format!(
            "/access/resolve?project_id=P1&resource_type=file&resource_id=F1&token={token}"
        ))
        .await;
    assert_eq!(body["token_valid"], true);
    // File visits inherit the project's access level when the file itself
    // has no entry.
    assert_eq!(body["access_level"], "token_required");
}
