//! Session login for the admin pages
//!
//! A successful login stores a random token in the `sessions` table and in
//! an HttpOnly cookie. The middleware resolves the cookie to a [`User`] and
//! places it in the request extensions; handlers take `Extension<User>`.

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{Html, IntoResponse, Redirect, Response},
    Form,
};
use htrsel_common::db::models::User;
use htrsel_common::db::users;
use serde::Deserialize;
use tracing::{info, warn};

use crate::error::ApiError;
use crate::html::{self, cookie_value, escape};
use crate::AppState;

pub const SESSION_COOKIE: &str = "htrsel_session";

async fn current_user(state: &AppState, headers: &HeaderMap) -> Result<Option<User>, ApiError> {
    let Some(token) = cookie_value(headers, SESSION_COOKIE) else {
        return Ok(None);
    };
    Ok(users::session_user(&state.db, &token, state.settings.session_timeout_seconds).await?)
}

/// Only same-site absolute paths are accepted as login targets
fn safe_next(next: Option<&str>) -> String {
    match next {
        Some(n) if n.starts_with('/') && !n.starts_with("//") => n.to_string(),
        _ => "/admin".to_string(),
    }
}

/// Authentication middleware
///
/// Requests without a valid session are redirected to the login page.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    match current_user(&state, request.headers()).await? {
        Some(user) => {
            request.extensions_mut().insert(user);
            Ok(next.run(request).await)
        }
        None => {
            let target = request
                .uri()
                .path_and_query()
                .map(|pq| pq.as_str().to_string())
                .unwrap_or_else(|| "/admin".to_string());
            Ok(Redirect::to(&format!("/login?next={}", urlencoding::encode(&target))).into_response())
        }
    }
}

fn login_page(next: &str, error: Option<&str>) -> String {
    let errors = error
        .map(|e| format!(r#"<div class="errors">{}</div>"#, escape(e)))
        .unwrap_or_default();
    let body = format!(
        r#"{errors}
<form method="post" action="/login">
<input type="hidden" name="next" value="{next}">
<p><label>Username <input name="username" autofocus required></label></p>
<p><label>Password <input name="password" type="password" required></label></p>
<p><button type="submit">Log in</button></p>
</form>"#,
        errors = errors,
        next = escape(next),
    );
    html::layout("Log in", None, None, &body)
}

#[derive(Debug, Deserialize)]
pub struct LoginQuery {
    pub next: Option<String>,
}

/// GET /login
pub async fn login_form(axum::extract::Query(query): axum::extract::Query<LoginQuery>) -> Html<String> {
    Html(login_page(&safe_next(query.next.as_deref()), None))
}

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
    pub next: Option<String>,
}

/// POST /login
pub async fn login(State(state): State<AppState>, Form(form): Form<LoginForm>) -> Result<Response, ApiError> {
    let next = safe_next(form.next.as_deref());

    let Some(user) = users::verify_credentials(&state.db, &form.username, &form.password).await? else {
        warn!(username = %form.username, "Failed login");
        let page = login_page(&next, Some("Please enter a correct username and password."));
        return Ok((StatusCode::UNAUTHORIZED, Html(page)).into_response());
    };

    let token = users::create_session(&state.db, user.id).await?;
    info!(user_id = user.id, username = %user.username, "Logged in");

    let cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        SESSION_COOKIE, token, state.settings.session_timeout_seconds
    );
    let mut response = Redirect::to(&next).into_response();
    let value = HeaderValue::from_str(&cookie).map_err(|e| ApiError::Internal(e.to_string()))?;
    response.headers_mut().append(header::SET_COOKIE, value);
    Ok(response)
}

/// POST /logout
pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Result<Response, ApiError> {
    if let Some(token) = cookie_value(&headers, SESSION_COOKIE) {
        users::delete_session(&state.db, &token).await?;
    }
    let mut response = Redirect::to("/login").into_response();
    response.headers_mut().append(
        header::SET_COOKIE,
        HeaderValue::from_static("htrsel_session=; Path=/; Max-Age=0; HttpOnly; SameSite=Lax"),
    );
    Ok(response)
}
