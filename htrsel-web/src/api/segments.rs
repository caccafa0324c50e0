//! Line segment list, actions and the transcription/verification form
//!
//! The list query string (`document_id`, `transcribed`, `verification`, `p`)
//! travels with every link into the change form and back, so "save and
//! next" walks the same scope the operator was looking at.

use axum::{
    extract::{Extension, Form, Path, State},
    http::HeaderMap,
    response::Response,
};
use htrsel_common::db::documents;
use htrsel_common::db::models::{LineSegment, User, VerifiedState};
use htrsel_common::db::segments::{self, NextKind, SegmentEdit, SegmentFilter};
use htrsel_common::db::users;
use htrsel_common::roles::segment_ordering;
use htrsel_common::symbols::convert_symbols;
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{not_found, ApiError};
use crate::html::{self, escape, filter_block, parse_yes_no, redirect_with_message, yes_no, Query};
use crate::pagination::{calculate_pagination, parse_page};
use crate::AppState;

const LIST_PATH: &str = "/admin/segments";

/// Filters (and save-and-next scope) from the query string
pub fn segment_filter(query: &Query) -> SegmentFilter {
    SegmentFilter {
        document_id: query.get("document_id").and_then(|v| v.parse().ok()),
        transcribed: parse_yes_no(query.get("transcribed")),
        verification: query.get("verification").and_then(VerifiedState::from_key),
    }
}

fn verification_choices() -> Vec<(String, String)> {
    VerifiedState::ALL
        .iter()
        .map(|s| (s.key().to_string(), s.label().to_string()))
        .collect()
}

/// GET /admin/segments
pub async fn list_segments(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    query: Query,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let filter = segment_filter(&query);
    let total = segments::count_segments(&state.db, &filter).await?;
    let pagination = calculate_pagination(total, parse_page(query.get("p")), state.settings.segment_page_size);
    let rows = segments::list_segments(
        &state.db,
        &filter,
        &segment_ordering(&user),
        pagination.page_size,
        pagination.offset,
    )
    .await?;

    let mut table = String::from(
        r#"<table><thead><tr><th><input type="checkbox" disabled></th><th>ID</th><th>Document</th><th>Order</th><th>Transcribed</th><th>Verification</th></tr></thead><tbody>"#,
    );
    for row in &rows {
        let seg = &row.segment;
        table.push_str(&format!(
            r#"<tr><td><input type="checkbox" name="ids" value="{id}"></td><td><a href="{href}">{id}</a></td><td><a href="/admin/documents/{doc}">{label}</a></td><td>{order}</td><td>{transcribed}</td><td>{verification}</td></tr>"#,
            id = seg.id,
            href = escape(&format!("{}/{}{}", LIST_PATH, seg.id, query.suffix())),
            doc = seg.document_id,
            label = escape(&row.document_label),
            order = seg.order,
            transcribed = yes_no(seg.transcribed),
            verification = seg.verification.label(),
        ));
    }
    table.push_str("</tbody></table>");

    let sidebar = [
        filter_block("transcribed", "transcribed", &html::yes_no_choices(), LIST_PATH, &query),
        filter_block("verification", "verification", &verification_choices(), LIST_PATH, &query),
    ]
    .concat();
    let scope = match filter.document_id {
        Some(id) => format!(
            r#"<p>Document {} &middot; <a href="{}">all documents</a></p>"#,
            id,
            escape(&format!("{}{}", LIST_PATH, query.without(&["document_id", "p"]).suffix()))
        ),
        None => String::new(),
    };

    let body = format!(
        r#"{scope}
<div class="layout">
<div class="content">
<form method="post" action="{action}">
<p><label>Action: <select name="action">
<option value="">---------</option>
<option value="mark_unchecked">Mark selected line segments as unchecked</option>
<option value="convert_symbols">Convert symbols in selected line segments</option>
</select></label> <button type="submit">Go</button></p>
{table}
</form>
{paginator}
</div>
<div class="filters"><h2>Filter</h2>{sidebar}</div>
</div>"#,
        scope = scope,
        action = escape(&format!("{}/action{}", LIST_PATH, query.suffix())),
        table = table,
        paginator = pagination.links(LIST_PATH, &query, total),
        sidebar = sidebar,
    );
    Ok(html::render("Line segments", Some(&user), &headers, &body))
}

/// POST /admin/segments/action
pub async fn segment_action(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    query: Query,
    Form(form): Form<Vec<(String, String)>>,
) -> Result<Response, ApiError> {
    let form = Query::from(form);
    let back = format!("{}{}", LIST_PATH, query.suffix());

    let ids = form.ids("ids");
    if ids.is_empty() {
        return Ok(redirect_with_message(
            &back,
            "Items must be selected in order to perform actions on them. No items have been changed.",
        ));
    }

    let message = match form.get("action") {
        Some("mark_unchecked") => {
            let n = segments::mark_unchecked(&state.db, &ids).await?;
            format!("{} line segments marked as unchecked.", n)
        }
        Some("convert_symbols") => {
            let mut changed = 0;
            for seg in segments::get_segments(&state.db, &ids).await? {
                let converted = convert_symbols(&seg.transcription, &state.config.symbols);
                if converted != seg.transcription {
                    segments::update_transcription(&state.db, seg.id, &converted).await?;
                    changed += 1;
                }
            }
            format!("{} line segments were updated with converted symbols.", changed)
        }
        _ => "No action selected.".to_string(),
    };

    info!(user = %user.username, action = form.get("action").unwrap_or(""), "{}", message);
    Ok(redirect_with_message(&back, &message))
}

async fn attribution(state: &AppState, user_id: Option<i64>) -> Result<String, ApiError> {
    Ok(match user_id {
        Some(id) => users::username(&state.db, id).await?.unwrap_or_else(|| format!("user {}", id)),
        None => "-".to_string(),
    })
}

fn change_url(id: i64, query: &Query) -> String {
    format!("{}/{}{}", LIST_PATH, id, query.suffix())
}

/// GET /admin/segments/:id
pub async fn change_segment_form(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(id): Path<i64>,
    query: Query,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let seg = segments::get_segment(&state.db, id)
        .await?
        .ok_or_else(|| not_found("Line segment", id))?;
    let document = documents::get_document(&state.db, seg.document_id).await?;

    let scope = segment_filter(&query);
    let next_untranscribed = segments::next_segment(&state.db, &scope, id, NextKind::Untranscribed).await?;
    let next_unverified = segments::next_segment(&state.db, &scope, id, NextKind::Unverified).await?;

    let verification_options = html::options(
        VerifiedState::ALL.iter().map(|s| (s.key().to_string(), s.label())),
        Some(seg.verification.key()),
    );
    let page_image = document
        .as_ref()
        .and_then(|d| d.file.as_deref())
        .map(|f| {
            format!(
                r#"<details><summary>Page image</summary><img class="line" src="{}" alt="page"></details>"#,
                escape(&html::media_url(f))
            )
        })
        .unwrap_or_default();
    let document_label = document
        .as_ref()
        .map(|d| d.display_name())
        .unwrap_or_else(|| format!("Document ({})", seg.document_id));

    let body = format!(
        r#"<p><a href="{back}">Back to list</a> &middot; {doc_label}</p>
<p><img class="line" src="{image}" alt="line {order}"></p>
<form method="post" action="{action}">
<p><textarea class="rtl" name="transcription" dir="rtl" rows="3">{transcription}</textarea></p>
<p><label>Verification <select name="verification">{verification_options}</select></label></p>
<p>Next untranscribed: {has_next_untranscribed} &middot; Next unverified: {has_next_unverified}</p>
<p>
<button type="submit" name="_save" value="1">Save</button>
<button type="submit" name="_continue" value="1">Save and continue editing</button>
<button type="submit" name="save_and_next" value="1">Save and next</button>
</p>
</form>
{page_image}
<details><summary>Advanced</summary>
<p>File: {file}</p>
<p>Order: {order}</p>
<p>Last transcribed by: {transcriber}</p>
<p>Last verified by: {verifier}</p>
</details>"#,
        back = escape(&format!("{}{}", LIST_PATH, query.suffix())),
        doc_label = escape(&document_label),
        image = escape(&html::media_url(&seg.file)),
        order = seg.order,
        action = escape(&change_url(id, &query)),
        transcription = escape(&seg.transcription),
        verification_options = verification_options,
        has_next_untranscribed = yes_no(next_untranscribed.is_some()),
        has_next_unverified = yes_no(next_unverified.is_some()),
        page_image = page_image,
        file = escape(&seg.file),
        transcriber = escape(&attribution(&state, seg.last_transcribed_by).await?),
        verifier = escape(&attribution(&state, seg.last_verified_by).await?),
    );

    Ok(html::render(
        &format!("Change line segment {}", id),
        Some(&user),
        &headers,
        &body,
    ))
}

/// Where "save and next" goes after saving `saved`
pub async fn save_and_next_target(
    state: &AppState,
    saved: &LineSegment,
    query: &Query,
) -> Result<Result<i64, &'static str>, ApiError> {
    let scope = segment_filter(query);
    let (kind, exhausted) = if saved.transcribed {
        (NextKind::Unverified, "No more unverified line segments.")
    } else {
        (NextKind::Untranscribed, "No more non-transcribed line segments.")
    };
    Ok(segments::next_segment(&state.db, &scope, saved.id, kind)
        .await?
        .ok_or(exhausted))
}

/// Fields of the line segment change form
#[derive(Debug, Deserialize)]
pub struct SegmentForm {
    #[serde(default)]
    pub transcription: String,
    pub verification: Option<String>,
    pub save_and_next: Option<String>,
    #[serde(rename = "_continue")]
    pub continue_editing: Option<String>,
}

/// POST /admin/segments/:id
pub async fn change_segment(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(id): Path<i64>,
    query: Query,
    Form(form): Form<SegmentForm>,
) -> Result<Response, ApiError> {

    let current = segments::get_segment(&state.db, id)
        .await?
        .ok_or_else(|| not_found("Line segment", id))?;
    let verification = match form.verification.as_deref() {
        Some(key) => VerifiedState::from_key(key)
            .ok_or_else(|| ApiError::BadRequest(format!("Unknown verification state '{}'", key)))?,
        None => current.verification,
    };
    let edit = SegmentEdit {
        // Textareas submit CRLF line breaks
        transcription: form.transcription.replace("\r\n", "\n"),
        verification,
    };

    let updated = segments::apply_edit(&current, &edit, Some(user.id));
    segments::save_segment(&state.db, &updated).await?;
    info!(
        user = %user.username,
        segment_id = id,
        transcribed = updated.transcribed,
        verification = updated.verification.key(),
        "Line segment saved"
    );
    let saved_message = format!("The line segment “{}” was changed successfully.", id);

    if form.save_and_next.is_some() {
        return Ok(match save_and_next_target(&state, &updated, &query).await? {
            Ok(next) => {
                debug!(segment_id = id, next, "Save and next");
                redirect_with_message(&change_url(next, &query), &saved_message)
            }
            Err(exhausted) => redirect_with_message(&change_url(id, &query), exhausted),
        });
    }
    if form.continue_editing.is_some() {
        return Ok(redirect_with_message(&change_url(id, &query), &saved_message));
    }
    Ok(redirect_with_message(
        &format!("{}{}", LIST_PATH, query.suffix()),
        &saved_message,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_from_query() {
        let q = Query::of(&[
            ("document_id", "7"),
            ("transcribed", "yes"),
            ("verification", "unchecked"),
            ("p", "3"),
        ]);
        let f = segment_filter(&q);
        assert_eq!(f.document_id, Some(7));
        assert_eq!(f.transcribed, Some(true));
        assert_eq!(f.verification, Some(VerifiedState::Unchecked));
        assert!(segment_filter(&Query::of(&[("document_id", "x")])).is_empty());
    }

    #[test]
    fn change_url_keeps_filters() {
        let q = Query::of(&[("document_id", "7"), ("p", "2")]);
        assert_eq!(change_url(5, &q), "/admin/segments/5?document_id=7&p=2");
    }
}
