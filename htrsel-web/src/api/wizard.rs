//! Comparison/accept wizard, model re-runs, finalisation and the
//! interactive segmenter launcher

use axum::{
    extract::{Extension, Form, Path, Query, State},
    http::HeaderMap,
    response::Response,
};
use htrsel_common::db::documents;
use htrsel_common::db::models::{Document, User};
use htrsel_common::media;
use htrsel_common::segmenter::{launch_interactive, run_model};
use htrsel_common::wizard::{finalize_document, CompareView, Side, DEFAULT_MODEL1, DEFAULT_MODEL2};
use serde::Deserialize;
use tracing::{info, warn};

use crate::error::{not_found, ApiError};
use crate::html::{self, escape, redirect_with_message, Query as ListQuery};
use crate::AppState;

async fn load_document(state: &AppState, id: i64) -> Result<(Document, String), ApiError> {
    let doc = documents::get_document(&state.db, id)
        .await?
        .ok_or_else(|| not_found("Document", id))?;
    let basename = doc
        .basename()
        .ok_or_else(|| ApiError::BadRequest(format!("Document {} has no file", id)))?;
    Ok((doc, basename))
}

/// Model names and indices carried by every wizard request
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct WizardParams {
    pub model1: String,
    pub model2: String,
    pub idx1: i64,
    pub idx2: i64,
}

impl Default for WizardParams {
    fn default() -> Self {
        Self {
            model1: DEFAULT_MODEL1.to_string(),
            model2: DEFAULT_MODEL2.to_string(),
            idx1: 0,
            idx2: 0,
        }
    }
}

/// `accept1` / `accept2` links on the compare page
#[derive(Debug, Default, Deserialize)]
pub struct AcceptParams {
    pub accept1: Option<String>,
    pub accept2: Option<String>,
}

impl AcceptParams {
    fn side(&self) -> Option<Side> {
        if self.accept1.is_some() {
            Some(Side::First)
        } else if self.accept2.is_some() {
            Some(Side::Second)
        } else {
            None
        }
    }
}

/// Which column's model a recreate form re-runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecreateTarget {
    Model1,
    Model2,
}

#[derive(Debug, Deserialize)]
pub struct RecreateForm {
    pub recreate: RecreateTarget,
    #[serde(default, deserialize_with = "html::empty_as_none")]
    pub padding: Option<u32>,
}

impl WizardParams {
    fn query(&self, idx1: i64, idx2: i64) -> ListQuery {
        ListQuery::default()
            .with("model1", &self.model1)
            .with("model2", &self.model2)
            .with("idx1", &idx1.to_string())
            .with("idx2", &idx2.to_string())
    }

    /// Compare URL for `document_id` at the given indices
    pub fn url(&self, document_id: i64, idx1: i64, idx2: i64) -> String {
        format!("/compare/{}{}", document_id, self.query(idx1, idx2).suffix())
    }
}

fn candidate_column(view: &CompareView, side: Side, params: &WizardParams, id: i64, padding: u32) -> String {
    let (label, model, files, idx, accept_key, recreate) = match side {
        Side::First => ("Model 1", &view.model1, &view.files1, view.idx1, "accept1", "model1"),
        Side::Second => ("Model 2", &view.model2, &view.files2, view.idx2, "accept2", "model2"),
    };
    let step = |delta: i64| {
        let target = idx as i64 + delta;
        match side {
            Side::First => params.url(id, target, view.idx2 as i64),
            Side::Second => params.url(id, view.idx1 as i64, target),
        }
    };

    let current = match view.current_path(side) {
        Some(path) => {
            let accept = format!(
                "/compare/{}{}",
                id,
                params
                    .query(view.idx1 as i64, view.idx2 as i64)
                    .with(accept_key, "1")
                    .suffix()
            );
            format!(
                r#"<p><img class="line" src="{src}" alt="candidate"></p>
<p>{pos} of {len} &middot; <a href="{prev}">&larr; previous</a> &middot; <a href="{next}">next &rarr;</a></p>
<p><a href="{accept}"><strong>Accept this line</strong></a></p>"#,
                src = escape(&html::media_url(&path)),
                pos = idx + 1,
                len = files.len(),
                prev = escape(&step(-1)),
                next = escape(&step(1)),
                accept = escape(&accept),
            )
        }
        None => "<p>No candidate lines.</p>".to_string(),
    };

    format!(
        r#"<div>
<h2>{label}: {model}</h2>
{current}
<form method="post" action="{recreate_action}">
<input type="hidden" name="recreate" value="{recreate}">
<label>Padding <input type="number" name="padding" min="0" value="{padding}"></label>
<button type="submit">Recreate {model}</button>
</form>
</div>"#,
        label = label,
        model = escape(model),
        current = current,
        recreate_action = escape(&format!(
            "/recreate/{}{}",
            id,
            params.query(view.idx1 as i64, view.idx2 as i64).suffix()
        )),
        recreate = recreate,
        padding = padding,
    )
}

/// GET /compare/:id
pub async fn compare(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(id): Path<i64>,
    Query(params): Query<WizardParams>,
    Query(accept): Query<AcceptParams>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let (doc, basename) = load_document(&state, id).await?;
    let view = CompareView::load(
        &state.media_root,
        &basename,
        &params.model1,
        &params.model2,
        params.idx1,
        params.idx2,
    )?;

    if let Some(side) = accept.side() {
        let dst = view.accept(&state.media_root, side)?;
        let (idx1, idx2) = view.advanced();
        info!(user = %user.username, document_id = id, file = %dst.display(), "Line accepted");
        return Ok(redirect_with_message(
            &params.url(id, idx1 as i64, idx2 as i64),
            &format!("Accepted line {} of {}.", view.validated_count + 1, doc.display_name()),
        ));
    }

    let page_image = doc
        .file
        .as_deref()
        .map(|f| format!(r#"<details open><summary>Page image</summary><img class="line" src="{}" alt="page"></details>"#, escape(&html::media_url(f))))
        .unwrap_or_default();
    let padding = state.config.segmentation.padding;

    let body = format!(
        r#"<p><a href="/admin/documents">Back to documents</a> &middot; {validated} line(s) accepted so far</p>
<div class="compare">
{first}
{second}
</div>
<form method="post" action="{finalize}">
<p><button type="submit">Finalize: create line segments from accepted lines</button></p>
</form>
{page_image}"#,
        validated = view.validated_count,
        first = candidate_column(&view, Side::First, &params, id, padding),
        second = candidate_column(&view, Side::Second, &params, id, padding),
        finalize = escape(&format!(
            "/finalize/{}{}",
            id,
            params.query(view.idx1 as i64, view.idx2 as i64).suffix()
        )),
        page_image = page_image,
    );

    Ok(html::render(
        &format!("Compare {}", doc.display_name()),
        Some(&user),
        &headers,
        &body,
    ))
}

/// POST /recreate/:id
pub async fn recreate(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(id): Path<i64>,
    Query(params): Query<WizardParams>,
    Form(form): Form<RecreateForm>,
) -> Result<Response, ApiError> {
    let back = params.url(id, params.idx1, params.idx2);
    let (doc, _) = load_document(&state, id).await?;

    let model_name = match form.recreate {
        RecreateTarget::Model1 => &params.model1,
        RecreateTarget::Model2 => &params.model2,
    };
    let padding = form.padding.unwrap_or(state.config.segmentation.padding);

    let Some(model) = state.config.segmentation.model(model_name) else {
        return Ok(redirect_with_message(
            &back,
            &format!("Model '{}' is not configured.", model_name),
        ));
    };

    let message = match run_model(&state.media_root, &doc, model, padding).await {
        Ok(_) => {
            info!(user = %user.username, document_id = id, model = %model.name, padding, "Model re-run");
            format!("Recreated {} lines with padding {}.", model.name, padding)
        }
        Err(e) => {
            warn!(document_id = id, model = %model.name, "Model re-run failed: {}", e);
            format!("Recreating {} failed: {}", model.name, e)
        }
    };
    Ok(redirect_with_message(&back, &message))
}

async fn finalize_with_message(state: &AppState, user: &User, id: i64) -> Result<String, ApiError> {
    let (doc, _) = load_document(state, id).await?;
    let report = finalize_document(&state.db, &state.media_root, &doc).await?;
    info!(user = %user.username, document_id = id, created = report.created, "Document finalized");
    Ok(format!(
        "Created {} line segment(s) for {} ({} already present).",
        report.created,
        doc.display_name(),
        report.existing
    ))
}

/// POST /finalize/:id
pub async fn finalize(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(id): Path<i64>,
    Query(params): Query<WizardParams>,
) -> Result<Response, ApiError> {
    let message = finalize_with_message(&state, &user, id).await?;
    Ok(redirect_with_message(&params.url(id, params.idx1, params.idx2), &message))
}

/// GET /finalize_admin/:id
pub async fn finalize_admin(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(id): Path<i64>,
    query: ListQuery,
) -> Result<Response, ApiError> {
    let message = finalize_with_message(&state, &user, id).await?;
    Ok(redirect_with_message(
        &format!("/admin/documents{}", query.suffix()),
        &message,
    ))
}

/// GET /segmenter/:id
///
/// Fire-and-forget: the page returns as soon as the process is spawned.
pub async fn launch_segmenter(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(id): Path<i64>,
    query: ListQuery,
) -> Result<Response, ApiError> {
    let back = format!("/admin/documents{}", query.suffix());
    let (doc, basename) = load_document(&state, id).await?;

    let Some(interactive) = state.config.segmentation.interactive.as_ref() else {
        warn!(document_id = id, "Interactive segmenter is not configured");
        return Ok(redirect_with_message(
            &back,
            "Interactive segmenter is not configured (set segmentation.interactive in config.toml).",
        ));
    };
    let Some(image) = media::page_image(&state.media_root, &doc) else {
        warn!(document_id = id, basename = %basename, "Page image missing; segmenter not launched");
        return Ok(redirect_with_message(&back, &format!("No page image for {}.", doc.display_name())));
    };

    let message = match launch_interactive(interactive, &image) {
        Ok(pid) => {
            info!(user = %user.username, document_id = id, pid, "Interactive segmenter started");
            format!("Segmenter started for {}.", doc.display_name())
        }
        Err(e) => {
            warn!(document_id = id, "Failed to launch interactive segmenter: {}", e);
            format!("Could not start the segmenter: {}", e)
        }
    };
    Ok(redirect_with_message(&back, &message))
}

/// GET /segments
pub async fn segment_folders(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let folders = media::segment_folders(&state.media_root)?;

    let mut list = String::from("<table><thead><tr><th>Folder</th><th>Files</th></tr></thead><tbody>");
    for name in &folders {
        let count = media::count_entries(&state.media_root.join(name))?;
        list.push_str(&format!("<tr><td>{}</td><td>{}</td></tr>", escape(name), count));
    }
    list.push_str("</tbody></table>");
    if folders.is_empty() {
        list = "<p>No segment folders yet.</p>".to_string();
    }

    Ok(html::render("Segment folders", Some(&user), &headers, &list))
}
