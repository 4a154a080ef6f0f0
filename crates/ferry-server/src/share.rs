//! Admin-facing share lifecycle: creation, listing, deletion.

use std::collections::HashSet;
use std::sync::Arc;

use rand::Rng;

use crate::error::ShareError;
use crate::passwd;
use crate::store::{generate_id, now_unix, CreateShareOutcome, ShareRecord, ShareView, Store};

/// Attempts before giving up on finding an unclaimed code.
const MAX_CODE_ATTEMPTS: usize = 5;

/// Source of public share codes. Pluggable so creation-retry behavior is
/// testable with a deterministic sequence.
pub trait CodeGen: Send + Sync {
    fn generate(&self) -> String;
}

/// Production generator: 4 CSPRNG bytes as 8 lowercase hex characters.
/// Uniqueness is enforced by the store, not here.
pub struct HexCodes;

impl CodeGen for HexCodes {
    fn generate(&self) -> String {
        let mut bytes = [0u8; 4];
        rand::thread_rng().fill(&mut bytes);
        hex::encode(bytes)
    }
}

pub struct CreateShare {
    pub title: String,
    pub password: Option<String>,
    pub file_ids: Vec<String>,
    pub ttl_hours: Option<i64>,
}

#[derive(Clone)]
pub struct ShareService {
    store: Store,
    codes: Arc<dyn CodeGen>,
}

impl ShareService {
    pub fn new(store: Store) -> Self {
        Self::with_codes(store, Arc::new(HexCodes))
    }

    pub fn with_codes(store: Store, codes: Arc<dyn CodeGen>) -> Self {
        Self { store, codes }
    }

    /// Create a share over a non-empty set of existing files. The share and
    /// its membership are persisted atomically; a code collision triggers a
    /// bounded regenerate-and-retry before reporting a conflict.
    pub async fn create_share(&self, req: CreateShare) -> Result<ShareView, ShareError> {
        let mut seen = HashSet::new();
        let file_ids: Vec<String> = req
            .file_ids
            .into_iter()
            .filter(|id| seen.insert(id.clone()))
            .collect();
        if file_ids.is_empty() {
            return Err(ShareError::Validation(
                "at least one file id is required".into(),
            ));
        }

        let password_hash = match req.password.as_deref() {
            Some(p) if !p.is_empty() => Some(passwd::hash_blocking(p.to_owned()).await?),
            _ => None,
        };

        let now = now_unix();
        let expires_at = req.ttl_hours.filter(|h| *h > 0).map(|h| now + h * 3600);

        for _ in 0..MAX_CODE_ATTEMPTS {
            let record = ShareRecord {
                id: generate_id(),
                code: self.codes.generate(),
                title: req.title.clone(),
                password_hash: password_hash.clone(),
                expires_at,
                created_at: now,
            };
            match self.store.create_share(&record, &file_ids)? {
                CreateShareOutcome::Created => {
                    let files = self.store.share_files(&record.id)?;
                    return Ok(ShareView::new(&record, &files));
                }
                CreateShareOutcome::CodeTaken => continue,
                CreateShareOutcome::MissingFile => {
                    return Err(ShareError::NotFound("one or more files not found"));
                }
            }
        }
        Err(ShareError::Conflict(
            "could not allocate a unique share code".into(),
        ))
    }

    /// All shares, newest first, with membership resolved.
    pub fn list_shares(&self) -> Result<Vec<ShareView>, ShareError> {
        let mut views = Vec::new();
        for record in self.store.list_shares()? {
            let files = self.store.share_files(&record.id)?;
            views.push(ShareView::new(&record, &files));
        }
        Ok(views)
    }

    /// Delete a share by internal id. A second delete of the same id is a
    /// legitimate `NotFound`.
    pub fn delete_share(&self, id: &str) -> Result<(), ShareError> {
        if self.store.delete_share(id)? {
            Ok(())
        } else {
            Err(ShareError::NotFound("share not found"))
        }
    }
}
