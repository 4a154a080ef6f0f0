use serde::{Deserialize, Serialize};

/// Uploaded file metadata, stored in redb as bincode-encoded bytes.
/// The blob itself lives in the upload directory under `stored_key`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: String,
    /// Original filename, used for downloads and presentation.
    pub name: String,
    /// Random on-disk name; never serialized to clients.
    pub stored_key: String,
    pub size: i64,
    pub mime_type: String,
    /// Unix timestamp (seconds) when the record was created.
    pub created_at: i64,
}

/// A published share: a code-addressed bundle of file references.
/// Membership rows live in their own table, keyed `(share_id, file_id)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShareRecord {
    pub id: String,
    /// Short random public token used in URLs. Unique, never regenerated.
    pub code: String,
    pub title: String,
    /// PHC-format Argon2id hash; `None` means publicly readable.
    pub password_hash: Option<String>,
    /// Optional Unix timestamp (seconds) after which the share is expired.
    pub expires_at: Option<i64>,
    pub created_at: i64,
}

impl ShareRecord {
    pub fn has_password(&self) -> bool {
        self.password_hash.is_some()
    }

    /// Expiry is a computed predicate; expired shares stay in the store so
    /// they can be reported as gone rather than never-existing.
    pub fn is_expired(&self, now: i64) -> bool {
        matches!(self.expires_at, Some(exp) if now >= exp)
    }
}

// ── Client-facing views ──────────────────────────────────────────────────────

/// File fields disclosed through a share. The storage key stays server-side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileView {
    pub id: String,
    pub name: String,
    pub size: i64,
    pub mime_type: String,
}

impl From<&FileRecord> for FileView {
    fn from(record: &FileRecord) -> Self {
        Self {
            id: record.id.clone(),
            name: record.name.clone(),
            size: record.size,
            mime_type: record.mime_type.clone(),
        }
    }
}

/// Admin-facing file listing entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileMeta {
    pub id: String,
    pub name: String,
    pub size: i64,
    pub mime_type: String,
    pub created_at: i64,
}

impl From<&FileRecord> for FileMeta {
    fn from(record: &FileRecord) -> Self {
        Self {
            id: record.id.clone(),
            name: record.name.clone(),
            size: record.size,
            mime_type: record.mime_type.clone(),
            created_at: record.created_at,
        }
    }
}

/// Admin view of a share with membership resolved.
/// Exposes `has_password` in place of the hash.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShareView {
    pub id: String,
    pub code: String,
    pub title: String,
    pub has_password: bool,
    pub expires_at: Option<i64>,
    pub created_at: i64,
    pub files: Vec<FileView>,
}

impl ShareView {
    pub fn new(record: &ShareRecord, files: &[FileRecord]) -> Self {
        Self {
            id: record.id.clone(),
            code: record.code.clone(),
            title: record.title.clone(),
            has_password: record.has_password(),
            expires_at: record.expires_at,
            created_at: record.created_at,
            files: files.iter().map(FileView::from).collect(),
        }
    }
}

/// Public info lookup response. `files` is present only when the share has
/// no password.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShareInfo {
    pub title: String,
    pub has_password: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub files: Option<Vec<FileView>>,
}
