use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use axum::{
    extract::DefaultBodyLimit,
    http::Method,
    middleware,
    routing::{delete, get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::{
    access::AccessGuard,
    auth::require_admin,
    blobs::BlobStore,
    handlers::{
        create_share, delete_file, delete_share, download_file, health, list_files, list_shares,
        login, share_info, upload_files, verify_share,
    },
    share::ShareService,
    store::Store,
    AppState,
};

/// Upload request body cap.
const MAX_UPLOAD_BYTES: usize = 100 * 1024 * 1024;

const DEFAULT_ADMIN_USER: &str = "admin";
const DEFAULT_ADMIN_PASS: &str = "admin123";

pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub data_dir: Option<PathBuf>,
    /// Blob directory; defaults to `<data_dir>/uploads`.
    pub upload_dir: Option<PathBuf>,
    pub admin_user: String,
    pub admin_pass: String,
    pub session_ttl_secs: i64,
    pub cors_origins: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: std::env::var("FERRY_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: std::env::var("FERRY_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8080),
            data_dir: std::env::var("FERRY_DATA_DIR").ok().map(PathBuf::from),
            upload_dir: std::env::var("FERRY_UPLOAD_DIR").ok().map(PathBuf::from),
            admin_user: std::env::var("FERRY_ADMIN_USER")
                .unwrap_or_else(|_| DEFAULT_ADMIN_USER.into()),
            admin_pass: std::env::var("FERRY_ADMIN_PASS")
                .unwrap_or_else(|_| DEFAULT_ADMIN_PASS.into()),
            session_ttl_secs: std::env::var("FERRY_SESSION_TTL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(86400),
            cors_origins: std::env::var("FERRY_CORS_ORIGINS").ok(),
        }
    }
}

/// Resolve the data directory: explicit config beats `FERRY_DATA_DIR` beats
/// the platform default.
pub fn resolve_data_dir(data_dir: Option<&PathBuf>) -> Result<PathBuf> {
    match data_dir {
        Some(d) => {
            std::fs::create_dir_all(d).context("create data dir")?;
            Ok(d.clone())
        }
        None => crate::dirs::data_dir(),
    }
}

/// Assemble the full route table over `state`. Public routes carry no
/// authentication; admin routes sit behind the bearer-session middleware.
pub fn router(state: AppState) -> Router {
    let public = Router::new()
        .route("/health", get(health))
        .route("/api/auth/login", post(login))
        .route("/api/s/{code}", get(share_info))
        .route("/api/s/{code}/verify", post(verify_share))
        .route("/api/s/{code}/download/{file_id}", get(download_file));

    let admin = Router::new()
        .route("/api/files/upload", post(upload_files))
        .route("/api/files", get(list_files))
        .route("/api/files/{id}", delete(delete_file))
        .route("/api/shares", post(create_share))
        .route("/api/shares", get(list_shares))
        .route("/api/shares/{id}", delete(delete_share))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            require_admin,
        ));

    Router::new()
        .merge(public)
        .merge(admin)
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(state)
}

pub async fn run(cfg: ServerConfig) -> Result<()> {
    let data_dir = resolve_data_dir(cfg.data_dir.as_ref())?;
    info!(data_dir = %data_dir.display(), "using data directory");

    let db_path = data_dir.join("ferry.db");
    let store = Store::open(&db_path).context("open store")?;

    let upload_dir = cfg
        .upload_dir
        .clone()
        .unwrap_or_else(|| data_dir.join("uploads"));
    let blobs = BlobStore::open(upload_dir).context("open blob store")?;
    info!(upload_dir = %blobs.root().display(), "using upload directory");

    if cfg.admin_pass == DEFAULT_ADMIN_PASS {
        warn!("FERRY_ADMIN_PASS is unset; running with the default admin password");
    }

    let state = AppState {
        shares: ShareService::new(store.clone()),
        access: AccessGuard::new(store.clone(), blobs.clone()),
        store,
        blobs,
        admin_user: cfg.admin_user,
        admin_pass: cfg.admin_pass,
        session_ttl_secs: cfg.session_ttl_secs,
    };

    let cors = build_cors(cfg.cors_origins.as_deref());
    let app = router(state).layer(cors).layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", cfg.host, cfg.port)
        .parse()
        .context("invalid host/port")?;

    info!(%addr, "ferry server listening");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("bind listener")?;

    axum::serve(listener, app).await.context("server error")
}

fn build_cors(origins: Option<&str>) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any);

    match origins {
        Some(o) => {
            let origins: Vec<_> = o.split(',').filter_map(|s| s.trim().parse().ok()).collect();
            cors.allow_origin(origins)
        }
        None => cors.allow_origin(Any),
    }
}
