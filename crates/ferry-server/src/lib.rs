pub mod access;
pub mod auth;
pub mod blobs;
pub mod dirs;
pub mod error;
pub mod handlers;
pub mod passwd;
pub mod server;
pub mod share;
pub mod store;

/// Shared application state threaded through axum handlers. All handles are
/// injected at construction; there is no ambient global.
#[derive(Clone)]
pub struct AppState {
    pub store: store::Store,
    pub blobs: blobs::BlobStore,
    pub shares: share::ShareService,
    pub access: access::AccessGuard,
    /// Admin credentials checked at login.
    pub admin_user: String,
    pub admin_pass: String,
    pub session_ttl_secs: i64,
}

pub use server::{resolve_data_dir, router, run, ServerConfig};
