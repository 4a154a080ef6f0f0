use axum::{
    body::Body,
    extract::{multipart::Field, Multipart, Path, Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use constant_time_eq::constant_time_eq;
use serde::Deserialize;
use serde_json::json;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tracing::{info, warn};

use crate::{
    blobs::BlobStore,
    error::ShareError,
    share::CreateShare,
    store::{generate_id, now_unix, sessions, FileMeta, FileRecord},
    AppState,
};

// ── Health ────────────────────────────────────────────────────────────────────

pub async fn health() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

// ── Admin login ───────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> Result<Response, ShareError> {
    // Compare both fields before deciding, in constant time each.
    let user_ok = constant_time_eq(body.username.as_bytes(), state.admin_user.as_bytes());
    let pass_ok = constant_time_eq(body.password.as_bytes(), state.admin_pass.as_bytes());
    if !(user_ok && pass_ok) {
        return Err(ShareError::Unauthorized("invalid credentials"));
    }

    let token = sessions::generate_session_token();
    let now = now_unix();
    let record = sessions::SessionRecord {
        id: generate_id(),
        token_hash: sessions::hash_token(&token),
        created_at: now,
        expires_at: now + state.session_ttl_secs,
    };
    state.store.put_session(&record)?;

    info!(session = %record.id, "admin login");
    Ok(Json(json!({"token": token})).into_response())
}

// ── Files (admin) ─────────────────────────────────────────────────────────────

pub async fn upload_files(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Response, ShareError> {
    let mut saved: Vec<FileMeta> = Vec::new();

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(_) => return Err(ShareError::Validation("invalid form data".into())),
        };
        if field.name() != Some("files") {
            continue;
        }
        let Some(name) = field.file_name().map(str::to_owned) else {
            continue;
        };
        let content_type = field.content_type().map(str::to_owned);

        let record = save_upload(&state, field, name, content_type).await?;
        info!(file = %record.id, name = %record.name, size = record.size, "file uploaded");
        saved.push(FileMeta::from(&record));
    }

    if saved.is_empty() {
        return Err(ShareError::Validation("no files provided".into()));
    }
    Ok(Json(json!({"files": saved})).into_response())
}

/// Stream one multipart part into the blob store and record it. The partial
/// blob is removed if the transfer dies half-way.
async fn save_upload(
    state: &AppState,
    mut field: Field<'_>,
    name: String,
    content_type: Option<String>,
) -> Result<FileRecord, ShareError> {
    let stored_key = BlobStore::generate_key(&name);
    let mut out = state
        .blobs
        .create(&stored_key)
        .await
        .map_err(|e| anyhow::Error::new(e).context("create blob"))?;

    let mut size: i64 = 0;
    loop {
        match field.chunk().await {
            Ok(Some(chunk)) => {
                size += chunk.len() as i64;
                if let Err(e) = out.write_all(&chunk).await {
                    let _ = state.blobs.remove(&stored_key);
                    return Err(anyhow::Error::new(e).context("write blob").into());
                }
            }
            Ok(None) => break,
            Err(_) => {
                let _ = state.blobs.remove(&stored_key);
                return Err(ShareError::Validation("invalid form data".into()));
            }
        }
    }
    out.flush()
        .await
        .map_err(|e| anyhow::Error::new(e).context("flush blob"))?;

    let mime_type = content_type.unwrap_or_else(|| {
        mime_guess::from_path(&name)
            .first_or_octet_stream()
            .essence_str()
            .to_owned()
    });

    let record = FileRecord {
        id: generate_id(),
        name,
        stored_key,
        size,
        mime_type,
        created_at: now_unix(),
    };
    state.store.insert_file(&record)?;
    Ok(record)
}

pub async fn list_files(State(state): State<AppState>) -> Result<Response, ShareError> {
    let files: Vec<FileMeta> = state.store.list_files()?.iter().map(FileMeta::from).collect();
    Ok(Json(json!({"files": files})).into_response())
}

pub async fn delete_file(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ShareError> {
    let Some(record) = state.store.delete_file(&id)? else {
        return Err(ShareError::NotFound("file not found"));
    };
    if let Err(e) = state.blobs.remove(&record.stored_key) {
        warn!(file = %record.id, error = %e, "failed to remove blob");
    }

    info!(file = %record.id, "file deleted");
    Ok(Json(json!({"message": "file deleted"})).into_response())
}

// ── Shares (admin) ────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateShareRequest {
    #[serde(default)]
    pub title: String,
    pub password: Option<String>,
    #[serde(default)]
    pub file_ids: Vec<String>,
    /// Hours until expiry; absent or non-positive means no expiry.
    pub expires_in: Option<i64>,
}

pub async fn create_share(
    State(state): State<AppState>,
    Json(body): Json<CreateShareRequest>,
) -> Result<Response, ShareError> {
    let view = state
        .shares
        .create_share(CreateShare {
            title: body.title,
            password: body.password,
            file_ids: body.file_ids,
            ttl_hours: body.expires_in,
        })
        .await?;

    info!(share = %view.id, code = %view.code, "share created");
    Ok(Json(json!({"share": view})).into_response())
}

pub async fn list_shares(State(state): State<AppState>) -> Result<Response, ShareError> {
    let shares = state.shares.list_shares()?;
    Ok(Json(json!({"shares": shares})).into_response())
}

pub async fn delete_share(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ShareError> {
    state.shares.delete_share(&id)?;
    info!(share = %id, "share deleted");
    Ok(Json(json!({"message": "share deleted"})).into_response())
}

// ── Public share access ───────────────────────────────────────────────────────

pub async fn share_info(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Response, ShareError> {
    Ok(Json(state.access.share_info(&code)?).into_response())
}

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    pub password: Option<String>,
}

pub async fn verify_share(
    State(state): State<AppState>,
    Path(code): Path<String>,
    Json(body): Json<VerifyRequest>,
) -> Result<Response, ShareError> {
    let password = body.password.unwrap_or_default();
    if password.is_empty() {
        return Err(ShareError::Validation("password required".into()));
    }

    let files = state.access.verify_share(&code, &password).await?;
    Ok(Json(json!({"files": files})).into_response())
}

#[derive(Debug, Deserialize)]
pub struct DownloadQuery {
    pub pwd: Option<String>,
}

pub async fn download_file(
    State(state): State<AppState>,
    Path((code, file_id)): Path<(String, String)>,
    Query(query): Query<DownloadQuery>,
) -> Result<Response, ShareError> {
    let pwd = query.pwd.filter(|p| !p.is_empty());
    let grant = state
        .access
        .authorize_download(&code, &file_id, pwd.as_deref())
        .await?;

    let file = tokio::fs::File::open(&grant.path)
        .await
        .map_err(|e| anyhow::Error::new(e).context("open blob"))?;
    let len = file.metadata().await.ok().map(|m| m.len());

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&grant.mime_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );
    if let Some(len) = len {
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(len));
    }
    let disposition = format!("attachment; filename=\"{}\"", sanitize_filename(&grant.name));
    headers.insert(
        header::CONTENT_DISPOSITION,
        HeaderValue::from_str(&disposition)
            .unwrap_or_else(|_| HeaderValue::from_static("attachment")),
    );

    let stream = ReaderStream::new(file);
    Ok((StatusCode::OK, headers, Body::from_stream(stream)).into_response())
}

/// Strip characters that would break the quoted Content-Disposition value.
fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c == '"' || c == '\\' || c.is_control() {
                '_'
            } else {
                c
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filenames_are_safe_inside_quotes() {
        assert_eq!(sanitize_filename("plain.txt"), "plain.txt");
        assert_eq!(sanitize_filename("we\"ird\\name\r\n.txt"), "we_ird_name__.txt");
    }
}
