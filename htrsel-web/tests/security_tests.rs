//! Session and access-control tests
//!
//! Everything except `/login`, `/logout` and `/health` requires a session;
//! this includes the media files.

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    response::Response,
    Router,
};
use htrsel_common::config::TomlConfig;
use htrsel_common::db::init::init_database;
use htrsel_common::db::models::Role;
use htrsel_common::db::users;
use htrsel_web::{build_router, AppState, PageSettings};
use sqlx::SqlitePool;
use std::fs;
use tempfile::TempDir;
use tower::util::ServiceExt;

async fn setup(settings: PageSettings) -> (TempDir, SqlitePool, Router) {
    let dir = tempfile::tempdir().unwrap();
    let media = dir.path().join("media");
    fs::create_dir_all(&media).unwrap();
    fs::write(media.join("p1.png"), b"page").unwrap();
    let pool = init_database(&dir.path().join("htrsel.db")).await.unwrap();
    users::create_user(&pool, "alice", "correct horse", false, &[Role::Verifier])
        .await
        .unwrap();
    let state = AppState::new(pool.clone(), TomlConfig::default(), media, settings);
    (dir, pool, build_router(state))
}

async fn send(router: &Router, request: Request<Body>) -> Response {
    router.clone().oneshot(request).await.unwrap()
}

fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::empty()).unwrap()
}

fn login_request(username: &str, password: &str, next: &str) -> Request<Body> {
    let body = format!(
        "username={}&password={}&next={}",
        urlencoding::encode(username),
        urlencoding::encode(password),
        urlencoding::encode(next)
    );
    Request::builder()
        .method("POST")
        .uri("/login")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(body))
        .unwrap()
}

fn session_cookie(response: &Response) -> Option<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .find(|v| v.starts_with("htrsel_session="))
        .and_then(|v| v.split(';').next())
        .map(str::to_string)
}

#[tokio::test]
async fn test_protected_pages_redirect_to_login() {
    let (_dir, _pool, router) = setup(PageSettings::default()).await;

    for uri in ["/admin", "/admin/documents?p=2", "/compare/1", "/media/p1.png"] {
        let response = send(&router, get(uri, None)).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER, "{}", uri);
        let location = response.headers()[header::LOCATION].to_str().unwrap();
        assert_eq!(location, format!("/login?next={}", urlencoding::encode(uri)));
    }
}

#[tokio::test]
async fn test_bad_password_is_rejected() {
    let (_dir, _pool, router) = setup(PageSettings::default()).await;
    let response = send(&router, login_request("alice", "wrong", "/admin")).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(session_cookie(&response).is_none());
}

#[tokio::test]
async fn test_login_session_and_logout() {
    let (_dir, _pool, router) = setup(PageSettings::default()).await;

    let response = send(&router, login_request("alice", "correct horse", "/admin/segments")).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(response.headers()[header::LOCATION], "/admin/segments");
    let cookie = session_cookie(&response).expect("Should set a session cookie");

    let response = send(&router, get("/media/p1.png", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::OK);

    let logout = Request::builder()
        .method("POST")
        .uri("/logout")
        .header(header::COOKIE, &cookie)
        .body(Body::empty())
        .unwrap();
    let response = send(&router, logout).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    let response = send(&router, get("/admin", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
}

#[tokio::test]
async fn test_login_ignores_offsite_next() {
    let (_dir, _pool, router) = setup(PageSettings::default()).await;
    let response = send(&router, login_request("alice", "correct horse", "//evil.example/")).await;
    assert_eq!(response.headers()[header::LOCATION], "/admin");
}

#[tokio::test]
async fn test_expired_session_is_refused() {
    let settings = PageSettings {
        session_timeout_seconds: -1,
        ..PageSettings::default()
    };
    let (_dir, pool, router) = setup(settings).await;
    let id = users::find_user_id(&pool, "alice").await.unwrap().unwrap();
    let token = users::create_session(&pool, id).await.unwrap();

    let cookie = format!("htrsel_session={}", token);
    let response = send(&router, get("/admin", Some(&cookie))).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert!(users::session_user(&pool, &token, 3600).await.unwrap().is_none());
}

#[tokio::test]
async fn test_media_does_not_escape_root() {
    let (dir, pool, router) = setup(PageSettings::default()).await;
    fs::write(dir.path().join("secret.txt"), b"top secret").unwrap();
    let id = users::find_user_id(&pool, "alice").await.unwrap().unwrap();
    let token = users::create_session(&pool, id).await.unwrap();

    let cookie = format!("htrsel_session={}", token);
    let response = send(&router, get("/media/../secret.txt", Some(&cookie))).await;
    assert_ne!(response.status(), StatusCode::OK);
}
