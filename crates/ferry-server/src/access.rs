//! Anonymous read path: every request to a share code walks the same gates
//! in order — existence, expiry, password, per-file membership. No state is
//! carried between requests; a successful password check authorizes exactly
//! one response.

use std::path::PathBuf;

use tracing::error;

use crate::blobs::BlobStore;
use crate::error::ShareError;
use crate::passwd::{self, PasswordError};
use crate::store::{now_unix, FileView, ShareInfo, ShareRecord, Store};

/// Everything the transport needs to stream one authorized download.
#[derive(Debug)]
pub struct DownloadGrant {
    pub path: PathBuf,
    pub name: String,
    pub mime_type: String,
}

#[derive(Clone)]
pub struct AccessGuard {
    store: Store,
    blobs: BlobStore,
}

impl AccessGuard {
    pub fn new(store: Store, blobs: BlobStore) -> Self {
        Self { store, blobs }
    }

    /// Gates 1 and 2: the share must exist and must not be expired.
    /// A deleted share and a never-existing one are indistinguishable here.
    fn resolve(&self, code: &str) -> Result<ShareRecord, ShareError> {
        let share = self
            .store
            .find_share_by_code(code)?
            .ok_or(ShareError::NotFound("share not found"))?;
        if share.is_expired(now_unix()) {
            return Err(ShareError::Gone("share has expired"));
        }
        Ok(share)
    }

    /// Gate 3: the password check. Runs after the expiry gate, so an expired
    /// share never reveals whether a candidate password was correct. A
    /// corrupt stored hash is logged as a fault but fails authorization like
    /// any wrong password.
    async fn check_password(
        &self,
        share: &ShareRecord,
        candidate: Option<&str>,
    ) -> Result<(), ShareError> {
        let Some(hash) = share.password_hash.clone() else {
            return Ok(());
        };
        let Some(candidate) = candidate else {
            return Err(ShareError::Unauthorized("password required"));
        };
        match passwd::verify_blocking(hash, candidate.to_owned()).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(ShareError::Unauthorized("wrong password")),
            Err(PasswordError::InvalidHash) => {
                error!(share = %share.code, "stored password hash is corrupt");
                Err(ShareError::Unauthorized("wrong password"))
            }
            Err(e) => Err(ShareError::Hashing(e.to_string())),
        }
    }

    fn file_views(&self, share: &ShareRecord) -> Result<Vec<FileView>, ShareError> {
        Ok(self
            .store
            .share_files(&share.id)?
            .iter()
            .map(FileView::from)
            .collect())
    }

    /// Public info lookup. Passwordless shares disclose their file list
    /// directly; password-protected shares disclose only the title and the
    /// fact that a password is required.
    pub fn share_info(&self, code: &str) -> Result<ShareInfo, ShareError> {
        let share = self.resolve(code)?;
        let has_password = share.has_password();
        let files = if has_password {
            None
        } else {
            Some(self.file_views(&share)?)
        };
        Ok(ShareInfo {
            title: share.title,
            has_password,
            files,
        })
    }

    /// Password verification. Success discloses the file list for this
    /// request only; no session or ticket is minted, and the next call
    /// re-checks the password.
    pub async fn verify_share(
        &self,
        code: &str,
        password: &str,
    ) -> Result<Vec<FileView>, ShareError> {
        let share = self.resolve(code)?;
        self.check_password(&share, Some(password)).await?;
        self.file_views(&share)
    }

    /// Per-file download gate. Re-runs the resolve/expiry/password gates,
    /// then requires membership: a file that exists globally but is not
    /// linked to this share looks exactly like a nonexistent file. A missing
    /// blob is reported separately — that is a storage inconsistency, not an
    /// authorization failure.
    pub async fn authorize_download(
        &self,
        code: &str,
        file_id: &str,
        password: Option<&str>,
    ) -> Result<DownloadGrant, ShareError> {
        let share = self.resolve(code)?;
        self.check_password(&share, password).await?;

        let file = self
            .store
            .share_file(&share.id, file_id)?
            .ok_or(ShareError::NotFound("file not found in share"))?;

        if !self.blobs.exists(&file.stored_key) {
            return Err(ShareError::NotFound("file not found on disk"));
        }

        Ok(DownloadGrant {
            path: self.blobs.path(&file.stored_key),
            name: file.name,
            mime_type: file.mime_type,
        })
    }
}
