//! htrsel-web - HTR segment selector
//!
//! Serves the admin pages and the comparison wizard, and manages operator
//! accounts from the command line.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use htrsel_common::config::{CompiledDefaults, RootFolderInitializer, RootFolderResolver, TomlConfig};
use htrsel_common::db::models::Role;
use htrsel_common::db::{init_database, users};
use htrsel_web::{build_router, AppState, PageSettings};
use sqlx::SqlitePool;
use tracing::info;

/// Command-line arguments for htrsel-web
#[derive(Parser, Debug)]
#[command(name = "htrsel-web")]
#[command(about = "Line segment selection and transcription for handwritten pages")]
#[command(version)]
struct Cli {
    /// Root folder holding htrsel.db and media/
    #[arg(short, long, global = true)]
    root_folder: Option<PathBuf>,

    /// Address to listen on (overrides config `bind`)
    #[arg(short, long, global = true, env = "HTRSEL_BIND")]
    bind: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the web server (default)
    Serve,
    /// Create an operator account
    CreateUser {
        #[arg(long)]
        username: String,
        #[arg(long, env = "HTRSEL_PASSWORD")]
        password: String,
        /// segmenter, transcriber or verifier; repeatable
        #[arg(long = "group")]
        groups: Vec<String>,
        #[arg(long)]
        superuser: bool,
    },
    /// Replace an account's groups
    SetGroups {
        #[arg(long)]
        username: String,
        #[arg(long = "group")]
        groups: Vec<String>,
    },
}

fn parse_roles(groups: &[String]) -> Result<Vec<Role>> {
    groups
        .iter()
        .map(|g| {
            Role::from_group_name(g.trim())
                .with_context(|| format!("Unknown group '{}' (expected segmenter, transcriber or verifier)", g))
        })
        .collect()
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Read the config before the subscriber exists so logging.level applies
    let (config, source) = TomlConfig::load_or_default();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level)),
        )
        .init();

    info!(
        "Starting htrsel-web v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    source.log();

    let root_folder = RootFolderResolver::new("htrsel-web")
        .with_cli_arg(cli.root_folder.clone())
        .with_toml(&config)
        .resolve();
    let initializer = RootFolderInitializer::new(root_folder);
    initializer.ensure_directory_exists()?;

    let db_path = initializer.database_path();
    info!("Database path: {}", db_path.display());
    let pool = init_database(&db_path)
        .await
        .with_context(|| format!("Failed to open database {}", db_path.display()))?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(pool, config, initializer.media_path(), cli.bind).await,
        Command::CreateUser {
            username,
            password,
            groups,
            superuser,
        } => {
            let roles = parse_roles(&groups)?;
            let id = users::create_user(&pool, &username, &password, superuser, &roles).await?;
            info!(user_id = id, username = %username, superuser, ?roles, "User created");
            Ok(())
        }
        Command::SetGroups { username, groups } => {
            let roles = parse_roles(&groups)?;
            let Some(id) = users::find_user_id(&pool, &username).await? else {
                bail!("No user named '{}'", username);
            };
            users::set_roles(&pool, id, &roles).await?;
            info!(user_id = id, username = %username, ?roles, "Groups updated");
            Ok(())
        }
    }
}

async fn serve(pool: SqlitePool, config: TomlConfig, media_root: PathBuf, bind: Option<String>) -> Result<()> {
    let settings = PageSettings::load(&pool).await?;
    let bind = bind
        .or_else(|| config.bind.clone())
        .unwrap_or_else(|| CompiledDefaults::for_current_platform().bind);
    info!("Media folder: {}", media_root.display());
    if config.sync.target.is_none() {
        info!("sync.target not set; the sync action is disabled");
    }

    let state = AppState::new(pool, config, media_root, settings);
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("Failed to bind {}", bind))?;
    info!("htrsel-web listening on http://{}", bind);
    info!("Health check: http://{}/health", bind);

    axum::serve(listener, app).await?;
    Ok(())
}
