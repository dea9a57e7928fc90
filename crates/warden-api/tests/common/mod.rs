//! Shared test helpers for API integration tests.
#![allow(dead_code)]

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use sqlx::PgPool;
use tower::ServiceExt;
use warden_event_store::pg_event_repository::PgEventRepository;
use warden_org::application::command_handlers::handle_setup_org;
use warden_org::domain::commands::{AddOrg, SetupOrg};
use warden_user::domain::commands::AddHumanUser;

use warden_api::config::Config;

/// Build the full app router over a real `PgEventRepository`, the same way
/// `main.rs` does.
pub fn build_test_app(pool: PgPool) -> Router {
    warden_api::app_with_pool(pool, &Config::default())
}

/// Sets up `org_id` named `name` with one admin user `user_id` / `username`.
pub async fn setup_org(pool: &PgPool, org_id: &str, name: &str, user_id: &str, username: &str) {
    let command = SetupOrg {
        org: AddOrg {
            org_id: org_id.into(),
            editor_user: "system".into(),
            name: name.into(),
        },
        admin: AddHumanUser {
            user_id: user_id.into(),
            resource_owner: org_id.into(),
            editor_user: "system".into(),
            username: username.into(),
            first_name: "Gigi".into(),
            last_name: "Giraffe".into(),
            email: format!("{username}@example.com"),
            phone: None,
        },
    };
    let repo = PgEventRepository::new(pool.clone());
    handle_setup_org(&command, &repo).await.unwrap();
}

/// Send a GET request and return the response.
pub async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body_bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body_bytes).unwrap();

    (status, json)
}
