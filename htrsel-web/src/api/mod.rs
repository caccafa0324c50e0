//! HTTP handlers for htrsel-web

pub mod auth;
pub mod documents;
pub mod health;
pub mod notebooks;
pub mod segments;
pub mod wizard;

use axum::extract::Extension;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Redirect, Response};
use htrsel_common::db::models::User;

use crate::html;

/// GET /
pub async fn root_redirect() -> Redirect {
    Redirect::to("/admin")
}

/// GET /admin
pub async fn admin_index(Extension(user): Extension<User>, headers: HeaderMap) -> Response {
    let roles: Vec<&str> = user.roles.iter().map(|r| r.group_name()).collect();
    let role_line = if user.is_superuser {
        "superuser".to_string()
    } else if roles.is_empty() {
        "no role".to_string()
    } else {
        roles.join(", ")
    };

    let body = format!(
        r#"<p>Signed in as <strong>{}</strong> ({}).</p>
<ul>
<li><a href="/admin/notebooks">Notebooks</a></li>
<li><a href="/admin/documents">Documents</a></li>
<li><a href="/admin/segments">Line segments</a></li>
<li><a href="/segments">Segment folders</a></li>
</ul>"#,
        html::escape(&user.username),
        html::escape(&role_line)
    );
    html::render("Site administration", Some(&user), &headers, &body).into_response()
}
