//! Document list, actions, add/change forms and delete

use axum::{
    extract::{Extension, Form, Multipart, Path, State},
    http::HeaderMap,
    response::{IntoResponse, Response},
};
use htrsel_common::db::documents::{self, DocumentFilter, DocumentRow};
use htrsel_common::db::models::{Document, User, VerifiedState};
use htrsel_common::db::notebooks;
use htrsel_common::media;
use htrsel_common::roles::{columns_for, DocumentColumn};
use htrsel_common::segmenter::{segment_document, SegmentReport};
use htrsel_common::sync::sync_validated;
use serde::Deserialize;
use tracing::{info, warn};

use crate::error::{not_found, ApiError};
use crate::html::{self, escape, filter_block, parse_yes_no, redirect_with_message, yes_no, Query};
use crate::pagination::{calculate_pagination, parse_page};
use crate::AppState;

const LIST_PATH: &str = "/admin/documents";

const NOTHING_SELECTED: &str =
    "Items must be selected in order to perform actions on them. No items have been changed.";

/// Document list filters from the query string
pub fn document_filter(query: &Query) -> DocumentFilter {
    DocumentFilter {
        has_linesegments: parse_yes_no(query.get("has_linesegments")),
        is_transcribed: parse_yes_no(query.get("is_transcribed")),
        verification: query.get("verification").and_then(VerifiedState::from_key),
        notebook_id: query.get("notebook_id").and_then(|v| v.parse().ok()),
    }
}

fn list_url(query: &Query) -> String {
    format!("{}{}", LIST_PATH, query.suffix())
}

fn cell(column: DocumentColumn, row: &DocumentRow, query: &Query) -> String {
    let doc = &row.document;
    match column {
        DocumentColumn::Id => format!(r#"<a href="/admin/documents/{0}">{0}</a>"#, doc.id),
        DocumentColumn::DisplayName => escape(&doc.display_name()),
        DocumentColumn::Notebook => escape(doc.notebook_name.as_deref().unwrap_or("-")),
        DocumentColumn::Page => doc.page.map(|p| p.to_string()).unwrap_or_else(|| "-".to_string()),
        DocumentColumn::Compare => format!(r#"<a href="/compare/{}">Compare</a>"#, doc.id),
        DocumentColumn::Segments => format!(
            r#"<a href="/admin/segments?document_id={}">Segments ({})</a>"#,
            doc.id,
            row.status.segment_count()
        ),
        DocumentColumn::Segment => format!(
            r#"<a href="{}">Segment</a>"#,
            escape(&format!("/segmenter/{}{}", doc.id, query.suffix()))
        ),
        DocumentColumn::Finalize => {
            let carried = query.without(&["p", "_changelist_filters"]);
            format!(
                r#"<a href="{}">Finalize</a>"#,
                escape(&format!("/finalize_admin/{}{}", doc.id, carried.suffix()))
            )
        }
        DocumentColumn::HasLinesegments => yes_no(row.status.has_linesegments()).to_string(),
        DocumentColumn::IsTranscribed => yes_no(row.status.is_transcribed()).to_string(),
        DocumentColumn::IsVerified => yes_no(row.status.is_verified()).to_string(),
    }
}

/// GET /admin/documents
pub async fn list_documents(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    query: Query,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let filter = document_filter(&query);
    let rows = documents::filtered_documents(&state.db, &filter).await?;
    let total = rows.len() as i64;
    let pagination = calculate_pagination(total, parse_page(query.get("p")), state.settings.document_page_size);
    let columns = columns_for(&user);

    let mut table = String::from(r#"<table><thead><tr><th><input type="checkbox" disabled></th>"#);
    for col in &columns {
        table.push_str(&format!("<th>{}</th>", col.header()));
    }
    table.push_str("</tr></thead><tbody>");
    for row in rows
        .iter()
        .skip(pagination.offset as usize)
        .take(pagination.page_size as usize)
    {
        table.push_str(&format!(
            r#"<tr><td><input type="checkbox" name="ids" value="{}"></td>"#,
            row.document.id
        ));
        for col in &columns {
            table.push_str(&format!("<td>{}</td>", cell(*col, row, &query)));
        }
        table.push_str("</tr>");
    }
    table.push_str("</tbody></table>");

    let notebook_choices: Vec<(String, String)> = notebooks::all_notebooks(&state.db)
        .await?
        .into_iter()
        .map(|nb| (nb.id.to_string(), nb.name))
        .collect();
    let verification_choices: Vec<(String, String)> = [
        VerifiedState::Accepted,
        VerifiedState::Rejected,
        VerifiedState::Unchecked,
    ]
    .iter()
    .map(|s| (s.key().to_string(), s.label().to_string()))
    .collect();

    let sidebar = [
        filter_block("has line segments", "has_linesegments", &html::yes_no_choices(), LIST_PATH, &query),
        filter_block("transcribed", "is_transcribed", &html::yes_no_choices(), LIST_PATH, &query),
        filter_block("verification", "verification", &verification_choices, LIST_PATH, &query),
        filter_block("notebook", "notebook_id", &notebook_choices, LIST_PATH, &query),
    ]
    .concat();

    let body = format!(
        r#"<p><a href="/admin/documents/add">Add document</a></p>
<div class="layout">
<div class="content">
<form method="post" action="{action}">
<p><label>Action: <select name="action">
<option value="">---------</option>
<option value="segment_documents">Segment selected documents</option>
<option value="sync_validated">Send validated lines to remote</option>
<option value="delete_selected">Delete selected documents</option>
</select></label> <button type="submit">Go</button></p>
{table}
</form>
{paginator}
</div>
<div class="filters"><h2>Filter</h2>{sidebar}</div>
</div>"#,
        action = escape(&format!("{}/action{}", LIST_PATH, query.suffix())),
        table = table,
        paginator = pagination.links(LIST_PATH, &query, total),
        sidebar = sidebar,
    );

    Ok(html::render("Documents", Some(&user), &headers, &body))
}

/// Remove files then rows; returns how many rows were deleted
async fn delete_with_files(state: &AppState, docs: &[Document]) -> Result<usize, ApiError> {
    let models: Vec<&str> = state
        .config
        .segmentation
        .models
        .iter()
        .map(|m| m.name.as_str())
        .collect();
    let mut deleted = 0;
    for doc in docs {
        media::cleanup_document_files(&state.media_root, doc, &models);
        if documents::delete_document(&state.db, doc.id).await? {
            deleted += 1;
        }
    }
    Ok(deleted)
}

/// POST /admin/documents/action
pub async fn document_action(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    query: Query,
    Form(form): Form<Vec<(String, String)>>,
) -> Result<Response, ApiError> {
    let form = Query::from(form);
    let back = list_url(&query);

    let ids = form.ids("ids");
    if ids.is_empty() {
        return Ok(redirect_with_message(&back, NOTHING_SELECTED));
    }
    let docs = documents::get_documents(&state.db, &ids).await?;

    let message = match form.get("action") {
        Some("segment_documents") => {
            let mut report = SegmentReport::default();
            for doc in &docs {
                if doc.file.is_none() {
                    warn!(document_id = doc.id, "Document has no file; not segmented");
                    report.failed += 1;
                    continue;
                }
                segment_document(&state.media_root, &state.config.segmentation, doc, &mut report).await;
            }
            format!(
                "Segmentation finished for {} document(s): {} model runs succeeded, {} failed.",
                docs.len(),
                report.succeeded,
                report.failed
            )
        }
        Some("sync_validated") => match state.config.sync.target.as_deref() {
            Some(target) => sync_validated(&state.media_root, target, &docs).await.message(),
            None => "Remote sync is not configured (set sync.target in config.toml).".to_string(),
        },
        Some("delete_selected") => {
            let deleted = delete_with_files(&state, &docs).await?;
            format!("Successfully deleted {} document(s).", deleted)
        }
        _ => "No action selected.".to_string(),
    };

    info!(user = %user.username, action = form.get("action").unwrap_or(""), "{}", message);
    Ok(redirect_with_message(&back, &message))
}

async fn notebook_select(state: &AppState, selected: Option<i64>) -> Result<String, ApiError> {
    let selected = selected.map(|id| id.to_string());
    let mut items = vec![(String::new(), "---------")];
    let notebooks = notebooks::all_notebooks(&state.db).await?;
    items.extend(notebooks.iter().map(|nb| (nb.id.to_string(), nb.name.as_str())));
    Ok(format!(
        r#"<select name="notebook_id">{}</select>"#,
        html::options(items, selected.as_deref())
    ))
}

/// GET /admin/documents/add
pub async fn add_document_form(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let body = format!(
        r#"<form method="post" action="/admin/documents/add" enctype="multipart/form-data">
<p><label>File <input type="file" name="file" accept="image/*"></label></p>
<p><label>Notebook {}</label></p>
<p><label>Page <input type="number" name="page" min="0"></label></p>
<p><button type="submit">Save</button></p>
</form>"#,
        notebook_select(&state, None).await?
    );
    Ok(html::render("Add document", Some(&user), &headers, &body))
}

fn optional_id(value: &str, field: &str) -> Result<Option<i64>, ApiError> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(None);
    }
    value
        .parse()
        .map(Some)
        .map_err(|_| ApiError::BadRequest(format!("{} must be a whole number", field)))
}

/// POST /admin/documents/add (multipart)
pub async fn add_document(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    mut multipart: Multipart,
) -> Result<Response, ApiError> {
    let mut stored: Option<String> = None;
    let mut notebook_id = None;
    let mut page = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(e.to_string()))?
    {
        match field.name().unwrap_or("") {
            "file" => {
                let file_name = field.file_name().unwrap_or("").to_string();
                let bytes = field.bytes().await.map_err(|e| ApiError::BadRequest(e.to_string()))?;
                if !file_name.is_empty() && !bytes.is_empty() {
                    stored = Some(media::save_upload(&state.media_root, &file_name, &bytes)?);
                }
            }
            "notebook_id" => {
                let text = field.text().await.map_err(|e| ApiError::BadRequest(e.to_string()))?;
                notebook_id = optional_id(&text, "Notebook")?;
            }
            "page" => {
                let text = field.text().await.map_err(|e| ApiError::BadRequest(e.to_string()))?;
                page = optional_id(&text, "Page")?;
            }
            _ => {}
        }
    }

    if let Some(id) = notebook_id {
        if notebooks::get_notebook(&state.db, id).await?.is_none() {
            return Err(not_found("Notebook", id));
        }
    }

    let id = documents::insert_document(&state.db, stored.as_deref(), notebook_id, page).await?;
    info!(user = %user.username, document_id = id, file = ?stored, "Document added");
    Ok(redirect_with_message(
        LIST_PATH,
        &format!("The document {} was added successfully.", id),
    ))
}

/// GET /admin/documents/:id
pub async fn change_document_form(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let doc = documents::get_document(&state.db, id)
        .await?
        .ok_or_else(|| not_found("Document", id))?;
    let status = documents::document_status(&state.db, id).await?;

    let image = doc
        .file
        .as_deref()
        .map(|f| format!(r#"<p><img class="line" src="{}" alt="page" style="max-height:400px"></p>"#, escape(&html::media_url(f))))
        .unwrap_or_else(|| "<p>No file.</p>".to_string());

    let body = format!(
        r#"{image}
<p>File: {file}</p>
<form method="post" action="/admin/documents/{id}">
<p><label>Notebook {notebook}</label></p>
<p><label>Page <input type="number" name="page" min="0" value="{page}"></label></p>
<p><button type="submit">Save</button></p>
</form>
<p><a href="/admin/segments?document_id={id}">Line segments ({count})</a> &middot; <a href="/compare/{id}">Compare</a></p>
<form method="post" action="/admin/documents/{id}/delete" onsubmit="return confirm('Delete this document and its files?');">
<button type="submit">Delete</button>
</form>"#,
        image = image,
        file = escape(doc.file.as_deref().unwrap_or("-")),
        id = id,
        notebook = notebook_select(&state, doc.notebook_id).await?,
        page = doc.page.map(|p| p.to_string()).unwrap_or_default(),
        count = status.segment_count(),
    );
    Ok(html::render(&doc.display_name(), Some(&user), &headers, &body))
}

/// Fields of the document change form
#[derive(Debug, Deserialize)]
pub struct DocumentForm {
    #[serde(default, deserialize_with = "html::empty_as_none")]
    pub notebook_id: Option<i64>,
    #[serde(default, deserialize_with = "html::empty_as_none")]
    pub page: Option<i64>,
}

/// POST /admin/documents/:id
pub async fn change_document(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(id): Path<i64>,
    Form(form): Form<DocumentForm>,
) -> Result<Response, ApiError> {
    if !documents::update_document(&state.db, id, form.notebook_id, form.page).await? {
        return Err(not_found("Document", id));
    }
    info!(user = %user.username, document_id = id, "Document changed");
    Ok(redirect_with_message(
        LIST_PATH,
        &format!("The document {} was changed successfully.", id),
    ))
}

/// POST /admin/documents/:id/delete
pub async fn delete_document(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(id): Path<i64>,
) -> Result<Response, ApiError> {
    let doc = documents::get_document(&state.db, id)
        .await?
        .ok_or_else(|| not_found("Document", id))?;
    delete_with_files(&state, std::slice::from_ref(&doc)).await?;

    info!(user = %user.username, document_id = id, "Document deleted");
    Ok(redirect_with_message(
        LIST_PATH,
        &format!("The document “{}” was deleted successfully.", doc.display_name()),
    )
    .into_response())
}
