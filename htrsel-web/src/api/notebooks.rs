//! Notebook list, export and rasterisation actions

use axum::{
    extract::{Extension, Form, Multipart, Path, State},
    http::HeaderMap,
    response::Response,
};
use htrsel_common::db::models::User;
use htrsel_common::db::notebooks;
use htrsel_common::export::export_notebooks;
use htrsel_common::media;
use htrsel_common::rasterize::convert_notebook;
use tracing::{info, warn};

use crate::error::{not_found, ApiError};
use crate::html::{self, escape, redirect_with_message, Query};
use crate::pagination::{calculate_pagination, parse_page};
use crate::AppState;

const LIST_PATH: &str = "/admin/notebooks";

/// GET /admin/notebooks
pub async fn list_notebooks(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    query: Query,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let total = notebooks::count_notebooks(&state.db).await?;
    let pagination = calculate_pagination(total, parse_page(query.get("p")), state.settings.document_page_size);
    let rows = notebooks::list_notebooks(&state.db, pagination.page_size, pagination.offset).await?;

    let mut table = String::from(
        r#"<table><thead><tr><th><input type="checkbox" disabled></th><th>Name</th><th>File</th><th>Documents</th><th></th></tr></thead><tbody>"#,
    );
    for nb in &rows {
        let file = match &nb.file {
            Some(f) => format!(r#"<a href="{}">{}</a>"#, escape(&html::media_url(f)), escape(f)),
            None => "-".to_string(),
        };
        table.push_str(&format!(
            r#"<tr><td><input type="checkbox" name="ids" value="{id}"></td><td>{name}</td><td>{file}</td><td><a href="/admin/documents?notebook_id={id}">Documents</a></td><td><button type="submit" formaction="/admin/notebooks/{id}/delete" onclick="return confirm('Delete this notebook?');">Delete</button></td></tr>"#,
            id = nb.id,
            name = escape(&nb.name),
            file = file,
        ));
    }
    table.push_str("</tbody></table>");

    let body = format!(
        r#"<p><a href="/admin/notebooks/add">Add notebook</a></p>
<form method="post" action="{action}">
<p><label>Action: <select name="action">
<option value="">---------</option>
<option value="export">Export dataset for selected notebooks</option>
<option value="convert_to_documents">Convert selected notebooks to documents</option>
</select></label> <button type="submit">Go</button></p>
{table}
</form>
{paginator}"#,
        action = escape(&format!("{}/action{}", LIST_PATH, query.suffix())),
        table = table,
        paginator = pagination.links(LIST_PATH, &query, total),
    );
    Ok(html::render("Notebooks", Some(&user), &headers, &body))
}

/// POST /admin/notebooks/action
pub async fn notebook_action(
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
    let selected = notebooks::get_notebooks(&state.db, &ids).await?;

    let message = match form.get("action") {
        Some("export") => export_notebooks(&state.db, &state.media_root, &selected)
            .await?
            .message(),
        Some("convert_to_documents") => convert_selected(&state, &selected).await,
        _ => "No action selected.".to_string(),
    };

    info!(user = %user.username, action = form.get("action").unwrap_or(""), "{}", message);
    Ok(redirect_with_message(&back, &message))
}

async fn convert_selected(state: &AppState, selected: &[htrsel_common::db::Notebook]) -> String {
    let Some(command) = state.config.notebook.rasterize_command.as_deref() else {
        return "Notebook conversion is not configured (set notebook.rasterize_command in config.toml).".to_string();
    };

    let mut created = 0;
    let mut skipped = Vec::new();
    for nb in selected {
        if nb.file.is_none() {
            skipped.push(nb.name.clone());
            continue;
        }
        match convert_notebook(&state.db, &state.media_root, nb, command).await {
            Ok(n) => created += n,
            Err(e) => {
                warn!(notebook_id = nb.id, "Notebook conversion failed: {}", e);
                skipped.push(nb.name.clone());
            }
        }
    }

    let mut message = format!("Created {} document(s) from {} notebook(s).", created, selected.len() - skipped.len());
    if !skipped.is_empty() {
        message.push_str(&format!(" Skipped: {}.", skipped.join(", ")));
    }
    message
}

/// GET /admin/notebooks/add
pub async fn add_notebook_form(Extension(user): Extension<User>, headers: HeaderMap) -> Response {
    let body = r#"<form method="post" action="/admin/notebooks/add" enctype="multipart/form-data">
<p><label>Name <input type="text" name="name" maxlength="250" required></label></p>
<p><label>File <input type="file" name="file"></label></p>
<p><button type="submit">Save</button></p>
</form>"#;
    html::render("Add notebook", Some(&user), &headers, body)
}

/// POST /admin/notebooks/add (multipart)
pub async fn add_notebook(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    mut multipart: Multipart,
) -> Result<Response, ApiError> {
    let mut name = String::new();
    let mut upload: Option<(String, Vec<u8>)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(e.to_string()))?
    {
        match field.name().unwrap_or("") {
            "name" => name = field.text().await.map_err(|e| ApiError::BadRequest(e.to_string()))?,
            "file" => {
                let file_name = field.file_name().unwrap_or("").to_string();
                let bytes = field.bytes().await.map_err(|e| ApiError::BadRequest(e.to_string()))?;
                if !file_name.is_empty() && !bytes.is_empty() {
                    upload = Some((file_name, bytes.to_vec()));
                }
            }
            _ => {}
        }
    }

    if name.trim().is_empty() {
        return Err(ApiError::BadRequest("Notebook name is required".to_string()));
    }
    // Store the file only once the name is known to be usable
    let stored = match upload {
        Some((file_name, bytes)) => Some(media::save_upload(&state.media_root, &file_name, &bytes)?),
        None => None,
    };

    let id = notebooks::insert_notebook(&state.db, &name, stored.as_deref()).await?;
    info!(user = %user.username, notebook_id = id, file = ?stored, "Notebook added");
    Ok(redirect_with_message(
        LIST_PATH,
        &format!("The notebook “{}” was added successfully.", name.trim()),
    ))
}

/// POST /admin/notebooks/:id/delete
pub async fn delete_notebook(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(id): Path<i64>,
) -> Result<Response, ApiError> {
    let nb = notebooks::get_notebook(&state.db, id)
        .await?
        .ok_or_else(|| not_found("Notebook", id))?;
    notebooks::delete_notebook(&state.db, id).await?;

    info!(user = %user.username, notebook_id = id, "Notebook deleted");
    Ok(redirect_with_message(
        LIST_PATH,
        &format!("The notebook “{}” was deleted successfully.", nb.name),
    ))
}
