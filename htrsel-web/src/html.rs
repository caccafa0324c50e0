//! Server-rendered HTML helpers
//!
//! Pages are assembled with `format!`; every interpolated value goes through
//! [`escape`]. Query strings are kept as ordered pairs so list filters can be
//! carried from page to page unchanged.

use std::fmt::Display;
use std::str::FromStr;

use axum::{
    async_trait,
    extract::{self, rejection::QueryRejection, FromRequestParts},
    http::{header, request::Parts, HeaderMap, HeaderValue},
    response::{Html, IntoResponse, Redirect, Response},
};
use htrsel_common::db::models::User;
use serde::{de, Deserialize, Deserializer};

/// Cookie carrying a one-shot message across a redirect
pub const FLASH_COOKIE: &str = "htrsel_flash";

/// Longest encoded flash value; browsers drop cookies past about 4 KB
pub const FLASH_MAX_ENCODED: usize = 3000;

/// Escape text for HTML element and attribute content
pub fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}

/// URL of a file under the media root
pub fn media_url(relative: &str) -> String {
    let encoded: Vec<String> = relative
        .split('/')
        .map(|part| urlencoding::encode(part).into_owned())
        .collect();
    format!("/media/{}", encoded.join("/"))
}

/// An ordered query string (or form body)
///
/// Extracted through axum's `Query<Vec<(String, String)>>`, which keeps
/// pair order and repeated keys such as `ids`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    pairs: Vec<(String, String)>,
}

impl From<Vec<(String, String)>> for Query {
    fn from(pairs: Vec<(String, String)>) -> Self {
        Self { pairs }
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Query
where
    S: Send + Sync,
{
    type Rejection = QueryRejection;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let extract::Query(pairs) = extract::Query::<Vec<(String, String)>>::from_request_parts(parts, state).await?;
        Ok(Self::from(pairs))
    }
}

impl Query {
    #[cfg(test)]
    pub(crate) fn of(pairs: &[(&str, &str)]) -> Self {
        Self::from(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<Vec<_>>(),
        )
    }

    /// First non-empty value of `key`
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, v)| k == key && !v.is_empty())
            .map(|(_, v)| v.as_str())
    }

    pub fn get_all(&self, key: &str) -> Vec<&str> {
        self.pairs
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.pairs.iter().any(|(k, _)| k == key)
    }

    /// Integer ids posted under `key`; unparsable values are dropped
    pub fn ids(&self, key: &str) -> Vec<i64> {
        self.get_all(key)
            .into_iter()
            .filter_map(|v| v.trim().parse().ok())
            .collect()
    }

    pub fn without(&self, keys: &[&str]) -> Self {
        Self {
            pairs: self
                .pairs
                .iter()
                .filter(|(k, _)| !keys.contains(&k.as_str()))
                .cloned()
                .collect(),
        }
    }

    /// Replace every `key` with a single value
    pub fn with(&self, key: &str, value: &str) -> Self {
        let mut next = self.without(&[key]);
        next.pairs.push((key.to_string(), value.to_string()));
        next
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn encode(&self) -> String {
        self.pairs
            .iter()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&")
    }

    /// `?{encoded}`, or nothing when empty
    pub fn suffix(&self) -> String {
        if self.is_empty() {
            String::new()
        } else {
            format!("?{}", self.encode())
        }
    }
}

/// Value of a cookie from the request headers
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|c| c.trim().split_once('='))
        .find(|(n, _)| *n == name)
        .map(|(_, v)| v.to_string())
        .filter(|v| !v.is_empty())
}

/// Message stored by the previous request, if any
pub fn take_flash(headers: &HeaderMap) -> Option<String> {
    cookie_value(headers, FLASH_COOKIE)
        .and_then(|value| urlencoding::decode(&value).ok().map(|m| m.into_owned()))
        .filter(|m| !m.is_empty())
}

/// Encoded flash value, cut at a character boundary with an ellipsis
/// when it would not fit in a cookie
fn flash_value(message: &str) -> String {
    let encoded = urlencoding::encode(message);
    if encoded.len() <= FLASH_MAX_ENCODED {
        return encoded.into_owned();
    }
    let ellipsis = urlencoding::encode("\u{2026}");
    let mut out = String::with_capacity(FLASH_MAX_ENCODED);
    let mut buf = [0u8; 4];
    for c in message.chars() {
        let piece = urlencoding::encode(c.encode_utf8(&mut buf));
        if out.len() + piece.len() + ellipsis.len() > FLASH_MAX_ENCODED {
            break;
        }
        out.push_str(&piece);
    }
    out.push_str(&ellipsis);
    out
}

/// 303 redirect that shows `message` on the next page
pub fn redirect_with_message(location: &str, message: &str) -> Response {
    let mut response = Redirect::to(location).into_response();
    let cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax",
        FLASH_COOKIE,
        flash_value(message)
    );
    if let Ok(value) = HeaderValue::from_str(&cookie) {
        response.headers_mut().append(header::SET_COOKIE, value);
    }
    response
}

const STYLE: &str = r#"
    body { font-family: system-ui, -apple-system, sans-serif; margin: 0; color: #333; }
    header { background: #264b5d; color: #fff; padding: 10px 20px; display: flex; justify-content: space-between; }
    header a, header button { color: #fff; background: none; border: none; cursor: pointer; font-size: 14px; }
    main { padding: 20px; }
    nav.crumbs a { margin-right: 12px; }
    .messages { background: #dfd; border: 1px solid #9c9; padding: 8px 12px; margin-bottom: 16px; }
    .errors { background: #fdd; border: 1px solid #c99; padding: 8px 12px; margin-bottom: 16px; }
    table { border-collapse: collapse; width: 100%; }
    th, td { border-bottom: 1px solid #ddd; padding: 6px 8px; text-align: left; }
    th { background: #f4f4f4; }
    .layout { display: flex; gap: 20px; }
    .layout > .content { flex: 1; }
    .filters { width: 220px; font-size: 14px; }
    .filters h3 { margin: 12px 0 4px; font-size: 14px; }
    .filters a.selected { font-weight: bold; }
    .filters ul { list-style: none; padding-left: 8px; margin: 0; }
    .paginator a, .paginator strong { margin-right: 6px; }
    .yes { color: #2a2; } .no { color: #c22; }
    img.line { max-width: 100%; border: 1px solid #ccc; }
    textarea.rtl { direction: rtl; width: 100%; font-size: 20px; }
    .compare { display: flex; gap: 20px; }
    .compare > div { flex: 1; }
"#;

/// Wrap page content in the admin layout
pub fn layout(title: &str, user: Option<&User>, flash: Option<&str>, body: &str) -> String {
    let account = match user {
        Some(user) => format!(
            r#"<span>{} &middot; <form method="post" action="/logout" style="display:inline"><button type="submit">Log out</button></form></span>"#,
            escape(&user.username)
        ),
        None => String::new(),
    };
    let messages = flash
        .map(|m| format!(r#"<div class="messages">{}</div>"#, escape(m)))
        .unwrap_or_default();

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>{title} | Segment selector</title>
    <style>{style}</style>
</head>
<body>
<header><a href="/admin">Segment selector</a>{account}</header>
<main>
<nav class="crumbs"><a href="/admin/notebooks">Notebooks</a><a href="/admin/documents">Documents</a><a href="/admin/segments">Line segments</a><a href="/segments">Segment folders</a></nav>
<h1>{title}</h1>
{messages}
{body}
</main>
</body>
</html>"#,
        title = escape(title),
        style = STYLE,
        account = account,
        messages = messages,
        body = body,
    )
}

/// Render a full page, consuming any pending flash message
pub fn render(title: &str, user: Option<&User>, headers: &HeaderMap, body: &str) -> Response {
    let flash = take_flash(headers);
    let mut response = Html(layout(title, user, flash.as_deref(), body)).into_response();
    if flash.is_some() {
        let clear = format!("{}=; Path=/; Max-Age=0; HttpOnly; SameSite=Lax", FLASH_COOKIE);
        if let Ok(value) = HeaderValue::from_str(&clear) {
            response.headers_mut().append(header::SET_COOKIE, value);
        }
    }
    response
}

/// Check mark cell for a boolean column
pub fn yes_no(value: bool) -> &'static str {
    if value {
        r#"<span class="yes" title="yes">&#10004;</span>"#
    } else {
        r#"<span class="no" title="no">&#10008;</span>"#
    }
}

/// `<option>` list with one entry selected
pub fn options<'a, I>(items: I, selected: Option<&str>) -> String
where
    I: IntoIterator<Item = (String, &'a str)>,
{
    items
        .into_iter()
        .map(|(value, label)| {
            let sel = if Some(value.as_str()) == selected { " selected" } else { "" };
            format!(
                r#"<option value="{}"{}>{}</option>"#,
                escape(&value),
                sel,
                escape(label)
            )
        })
        .collect()
}

/// One filter group of a list sidebar
///
/// Links drop the page number and keep every other parameter.
pub fn filter_block(title: &str, key: &str, choices: &[(String, String)], base: &str, query: &Query) -> String {
    let current = query.get(key);
    let mut out = format!("<h3>By {}</h3><ul>", escape(title));

    let all = format!("{}{}", base, query.without(&[key, "p"]).suffix());
    out.push_str(&format!(
        r#"<li><a href="{}"{}>All</a></li>"#,
        escape(&all),
        if current.is_none() { r#" class="selected""# } else { "" }
    ));
    for (value, label) in choices {
        let target = format!("{}{}", base, query.without(&["p"]).with(key, value).suffix());
        out.push_str(&format!(
            r#"<li><a href="{}"{}>{}</a></li>"#,
            escape(&target),
            if current == Some(value.as_str()) { r#" class="selected""# } else { "" },
            escape(label)
        ));
    }
    out.push_str("</ul>");
    out
}

/// Yes/No choices for boolean filters
pub fn yes_no_choices() -> Vec<(String, String)> {
    vec![("yes".to_string(), "Yes".to_string()), ("no".to_string(), "No".to_string())]
}

/// Form field where an empty value means "not set"
pub fn empty_as_none<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
    T::Err: Display,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => value.parse().map(Some).map_err(de::Error::custom),
    }
}

/// `yes` / `no` query value as a bool
pub fn parse_yes_no(value: Option<&str>) -> Option<bool> {
    match value {
        Some("yes") => Some(true),
        Some("no") => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::FromRequest;

    #[test]
    fn escapes_markup() {
        assert_eq!(escape(r#"<a href="x">'&'</a>"#), "&lt;a href=&quot;x&quot;&gt;&#x27;&amp;&#x27;&lt;/a&gt;");
    }

    #[test]
    fn query_keeps_order_and_repeats() {
        let q = Query::of(&[
            ("verification", "unchecked"),
            ("p", "2"),
            ("ids", "1"),
            ("ids", "x"),
            ("ids", "3"),
            ("name", "a b&c"),
        ]);
        assert_eq!(q.get("name"), Some("a b&c"));
        assert_eq!(q.ids("ids"), vec![1, 3]);
        assert_eq!(q.without(&["p", "ids"]).encode(), "verification=unchecked&name=a%20b%26c");
        assert_eq!(q.with("p", "3").get("p"), Some("3"));
        assert_eq!(Query::default().suffix(), "");
    }

    #[tokio::test]
    async fn query_is_extracted_from_the_uri() {
        let request = axum::http::Request::builder()
            .uri("/admin/segments?ids=2&ids=5&name=a+b%26c&empty=")
            .body(())
            .unwrap();
        let (mut parts, _) = request.into_parts();
        let q = Query::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(q.ids("ids"), vec![2, 5]);
        assert_eq!(q.get("name"), Some("a b&c"));
        assert!(q.contains("empty"));
    }

    #[derive(Debug, Deserialize)]
    struct PageForm {
        #[serde(default, deserialize_with = "empty_as_none")]
        page: Option<i64>,
    }

    async fn page_form(body: &'static str) -> Option<Option<i64>> {
        let request = axum::http::Request::builder()
            .method("POST")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(axum::body::Body::from(body))
            .unwrap();
        extract::Form::<PageForm>::from_request(request, &())
            .await
            .ok()
            .map(|extract::Form(form)| form.page)
    }

    #[tokio::test]
    async fn empty_form_fields_are_none() {
        assert_eq!(page_form("page=").await, Some(None));
        assert_eq!(page_form("").await, Some(None));
        assert_eq!(page_form("page=+12+").await, Some(Some(12)));
        assert_eq!(page_form("page=twelve").await, None);
    }

    #[test]
    fn empty_values_are_absent() {
        let q = Query::of(&[("document_id", ""), ("transcribed", "yes")]);
        assert_eq!(q.get("document_id"), None);
        assert!(q.contains("document_id"));
    }

    #[test]
    fn long_flash_messages_are_truncated() {
        let stderr = "\u{05d0}".repeat(2000);
        let response = redirect_with_message("/compare/1", &format!("Recreating blla failed: {}", stderr));
        let cookie = response.headers()[header::SET_COOKIE].to_str().unwrap().to_string();
        let value = cookie
            .strip_prefix("htrsel_flash=")
            .and_then(|v| v.split(';').next())
            .unwrap();
        assert!(value.len() <= FLASH_MAX_ENCODED);

        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_str(&format!("htrsel_flash={}", value)).unwrap());
        let message = take_flash(&headers).unwrap();
        assert!(message.starts_with("Recreating blla failed: \u{05d0}"));
        assert!(message.ends_with('\u{2026}'));

        assert_eq!(flash_value("Done!"), "Done%21");
    }

    #[test]
    fn media_urls_are_encoded() {
        assert_eq!(media_url("p 1_validated/1.png"), "/media/p%201_validated/1.png");
    }

    #[test]
    fn flash_cookie_is_read() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("htrsel_session=abc; htrsel_flash=Done%21"),
        );
        assert_eq!(take_flash(&headers).as_deref(), Some("Done!"));
    }
}
