//! htrsel-web library - admin pages and the comparison wizard

use axum::extract::DefaultBodyLimit;
use axum::Router;
use htrsel_common::config::TomlConfig;
use htrsel_common::db::init::get_setting_i64;
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

pub mod api;
pub mod error;
pub mod html;
pub mod pagination;

pub use error::ApiError;

/// Uploads (page scans, notebook PDFs) can be large
const MAX_UPLOAD_BYTES: usize = 512 * 1024 * 1024;

/// Tunables read from the `settings` table at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageSettings {
    pub session_timeout_seconds: i64,
    pub document_page_size: i64,
    pub segment_page_size: i64,
}

impl Default for PageSettings {
    fn default() -> Self {
        Self {
            session_timeout_seconds: 14 * 24 * 60 * 60,
            document_page_size: pagination::DOCUMENT_PAGE_SIZE,
            segment_page_size: pagination::SEGMENT_PAGE_SIZE,
        }
    }
}

impl PageSettings {
    pub async fn load(db: &SqlitePool) -> htrsel_common::Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            session_timeout_seconds: get_setting_i64(
                db,
                "session_timeout_seconds",
                defaults.session_timeout_seconds,
            )
            .await?,
            document_page_size: get_setting_i64(db, "document_page_size", defaults.document_page_size)
                .await?,
            segment_page_size: get_setting_i64(db, "segment_page_size", defaults.segment_page_size)
                .await?,
        })
    }
}

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    /// Loaded configuration (models, sync target, symbols)
    pub config: Arc<TomlConfig>,
    /// Directory holding page images and segment folders
    pub media_root: Arc<PathBuf>,
    pub settings: PageSettings,
}

impl AppState {
    /// Create new application state
    pub fn new(db: SqlitePool, config: TomlConfig, media_root: PathBuf, settings: PageSettings) -> Self {
        Self {
            db,
            config: Arc::new(config),
            media_root: Arc::new(media_root),
            settings,
        }
    }
}

/// Build application router
///
/// Everything except login, logout and `/health` requires a session.
pub fn build_router(state: AppState) -> Router {
    use axum::middleware;
    use axum::routing::{get, post};

    let protected = Router::new()
        .route("/admin", get(api::admin_index))
        .route("/admin/documents", get(api::documents::list_documents))
        .route("/admin/documents/action", post(api::documents::document_action))
        .route(
            "/admin/documents/add",
            get(api::documents::add_document_form).post(api::documents::add_document),
        )
        .route(
            "/admin/documents/:id",
            get(api::documents::change_document_form).post(api::documents::change_document),
        )
        .route("/admin/documents/:id/delete", post(api::documents::delete_document))
        .route("/admin/notebooks", get(api::notebooks::list_notebooks))
        .route("/admin/notebooks/action", post(api::notebooks::notebook_action))
        .route(
            "/admin/notebooks/add",
            get(api::notebooks::add_notebook_form).post(api::notebooks::add_notebook),
        )
        .route("/admin/notebooks/:id/delete", post(api::notebooks::delete_notebook))
        .route("/admin/segments", get(api::segments::list_segments))
        .route("/admin/segments/action", post(api::segments::segment_action))
        .route(
            "/admin/segments/:id",
            get(api::segments::change_segment_form).post(api::segments::change_segment),
        )
        .route("/segments", get(api::wizard::segment_folders))
        .route("/compare/:id", get(api::wizard::compare))
        .route("/recreate/:id", post(api::wizard::recreate))
        .route("/finalize/:id", post(api::wizard::finalize))
        .route("/finalize_admin/:id", get(api::wizard::finalize_admin))
        .route("/segmenter/:id", get(api::wizard::launch_segmenter))
        .nest_service("/media", ServeDir::new(state.media_root.as_path()))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            api::auth::auth_middleware,
        ));

    let public = Router::new()
        .route("/", get(api::root_redirect))
        .route("/login", get(api::auth::login_form).post(api::auth::login))
        .route("/logout", post(api::auth::logout))
        .merge(api::health::health_routes());

    Router::new()
        .merge(protected)
        .merge(public)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
