use std::path::Path;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use rand::Rng;
use redb::{Database, ReadableTable, TableDefinition};
use tracing::debug;

use super::model::{FileRecord, ShareRecord};

const FILES: TableDefinition<&str, &[u8]> = TableDefinition::new("files");
const SHARES: TableDefinition<&str, &[u8]> = TableDefinition::new("shares");
/// Secondary index: public code -> share id. Insertion into this table is the
/// uniqueness check for codes.
const SHARE_CODES: TableDefinition<&str, &str> = TableDefinition::new("share_codes");
/// Membership rows, keyed (share_id, file_id).
const SHARE_FILES: TableDefinition<(&str, &str), ()> = TableDefinition::new("share_files");

/// Seconds since the Unix epoch.
pub fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

/// Generate a short random record id.
pub fn generate_id() -> String {
    let mut bytes = [0u8; 8];
    rand::thread_rng().fill(&mut bytes);
    hex::encode(bytes)
}

/// Result of an atomic share-creation attempt.
#[derive(Debug, PartialEq, Eq)]
pub enum CreateShareOutcome {
    /// Share row, code index, and membership rows all committed.
    Created,
    /// The chosen code is already claimed by another share. Nothing written.
    CodeTaken,
    /// At least one referenced file id does not exist. Nothing written.
    MissingFile,
}

/// Thread-safe handle to the redb store.
#[derive(Clone)]
pub struct Store {
    pub(crate) db: Arc<Database>,
}

impl Store {
    /// Open (or create) the database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        let db = Database::create(path).context("open redb database")?;

        // Ensure all tables exist.
        let write_txn = db.begin_write()?;
        write_txn.open_table(FILES)?;
        write_txn.open_table(SHARES)?;
        write_txn.open_table(SHARE_CODES)?;
        write_txn.open_table(SHARE_FILES)?;
        write_txn.open_table(super::sessions::SESSIONS)?;
        write_txn.commit()?;

        Ok(Self { db: Arc::new(db) })
    }

    // ── Files ────────────────────────────────────────────────────────────

    /// Insert an uploaded file record.
    pub fn insert_file(&self, record: &FileRecord) -> Result<()> {
        let bytes = encode(record)?;
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(FILES)?;
            table.insert(record.id.as_str(), bytes.as_slice())?;
        }
        write_txn.commit()?;

        debug!(file = %record.id, "stored file record");
        Ok(())
    }

    pub fn get_file(&self, id: &str) -> Result<Option<FileRecord>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(FILES)?;
        match table.get(id)? {
            None => Ok(None),
            Some(guard) => Ok(Some(decode(guard.value())?)),
        }
    }

    /// List all file records, newest first.
    pub fn list_files(&self) -> Result<Vec<FileRecord>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(FILES)?;

        let mut records = Vec::new();
        for item in table.iter()? {
            let (_k, v) = item?;
            records.push(decode::<FileRecord>(v.value())?);
        }
        records.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(records)
    }

    /// Delete a file record and every membership row referencing it. The
    /// shares themselves are left intact. Returns the removed record so the
    /// caller can clean up the blob.
    pub fn delete_file(&self, id: &str) -> Result<Option<FileRecord>> {
        let write_txn = self.db.begin_write()?;
        let removed = {
            let mut files = write_txn.open_table(FILES)?;
            // Clone the guard value immediately so the borrow ends before
            // any mutation.
            let raw: Option<Vec<u8>> = files.get(id)?.map(|g| g.value().to_vec());
            match raw {
                None => None,
                Some(bytes) => {
                    files.remove(id)?;

                    let mut members = write_txn.open_table(SHARE_FILES)?;
                    let stale: Vec<(String, String)> = {
                        let mut keys = Vec::new();
                        for item in members.iter()? {
                            let (k, _v) = item?;
                            let (share_id, file_id) = k.value();
                            if file_id == id {
                                keys.push((share_id.to_owned(), file_id.to_owned()));
                            }
                        }
                        keys
                    };
                    for (share_id, file_id) in &stale {
                        members.remove((share_id.as_str(), file_id.as_str()))?;
                    }

                    Some(decode::<FileRecord>(&bytes)?)
                }
            }
        };
        write_txn.commit()?;

        if let Some(ref record) = removed {
            debug!(file = %record.id, "deleted file record");
        }
        Ok(removed)
    }

    // ── Shares ───────────────────────────────────────────────────────────

    /// Create a share with its full membership in a single transaction.
    /// Validates every referenced file id and the code's uniqueness first;
    /// on any failure outcome the transaction is abandoned with nothing
    /// written.
    pub fn create_share(
        &self,
        record: &ShareRecord,
        file_ids: &[String],
    ) -> Result<CreateShareOutcome> {
        let write_txn = self.db.begin_write()?;
        {
            let files = write_txn.open_table(FILES)?;
            for file_id in file_ids {
                if files.get(file_id.as_str())?.is_none() {
                    return Ok(CreateShareOutcome::MissingFile);
                }
            }

            let mut codes = write_txn.open_table(SHARE_CODES)?;
            if codes.get(record.code.as_str())?.is_some() {
                return Ok(CreateShareOutcome::CodeTaken);
            }
            codes.insert(record.code.as_str(), record.id.as_str())?;

            let bytes = encode(record)?;
            let mut shares = write_txn.open_table(SHARES)?;
            shares.insert(record.id.as_str(), bytes.as_slice())?;

            let mut members = write_txn.open_table(SHARE_FILES)?;
            for file_id in file_ids {
                members.insert((record.id.as_str(), file_id.as_str()), ())?;
            }
        }
        write_txn.commit()?;

        debug!(share = %record.id, code = %record.code, "created share");
        Ok(CreateShareOutcome::Created)
    }

    pub fn get_share(&self, id: &str) -> Result<Option<ShareRecord>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(SHARES)?;
        match table.get(id)? {
            None => Ok(None),
            Some(guard) => Ok(Some(decode(guard.value())?)),
        }
    }

    /// Look up a share by its public code. Expired shares are returned as-is;
    /// expiry is the caller's predicate to apply.
    pub fn find_share_by_code(&self, code: &str) -> Result<Option<ShareRecord>> {
        let read_txn = self.db.begin_read()?;
        let codes = read_txn.open_table(SHARE_CODES)?;
        let share_id: Option<String> = codes.get(code)?.map(|g| g.value().to_owned());
        let Some(share_id) = share_id else {
            return Ok(None);
        };

        let shares = read_txn.open_table(SHARES)?;
        match shares.get(share_id.as_str())? {
            None => Ok(None),
            Some(guard) => Ok(Some(decode(guard.value())?)),
        }
    }

    /// List all shares, newest first.
    pub fn list_shares(&self) -> Result<Vec<ShareRecord>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(SHARES)?;

        let mut records = Vec::new();
        for item in table.iter()? {
            let (_k, v) = item?;
            records.push(decode::<ShareRecord>(v.value())?);
        }
        records.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(records)
    }

    /// Resolve a share's membership to file records.
    pub fn share_files(&self, share_id: &str) -> Result<Vec<FileRecord>> {
        let read_txn = self.db.begin_read()?;
        let members = read_txn.open_table(SHARE_FILES)?;
        let files = read_txn.open_table(FILES)?;

        let mut records = Vec::new();
        for item in members.iter()? {
            let (k, _v) = item?;
            let (sid, file_id) = k.value();
            if sid != share_id {
                continue;
            }
            if let Some(guard) = files.get(file_id)? {
                records.push(decode(guard.value())?);
            }
        }
        Ok(records)
    }

    /// Membership-gated file lookup: returns the record only if `file_id`
    /// is linked to `share_id`.
    pub fn share_file(&self, share_id: &str, file_id: &str) -> Result<Option<FileRecord>> {
        let read_txn = self.db.begin_read()?;
        let members = read_txn.open_table(SHARE_FILES)?;
        if members.get((share_id, file_id))?.is_none() {
            return Ok(None);
        }
        let files = read_txn.open_table(FILES)?;
        match files.get(file_id)? {
            None => Ok(None),
            Some(guard) => Ok(Some(decode(guard.value())?)),
        }
    }

    /// Delete a share: membership rows first, then the code index entry and
    /// the share row. The referenced files are untouched. Returns true if
    /// the share existed.
    pub fn delete_share(&self, id: &str) -> Result<bool> {
        let write_txn = self.db.begin_write()?;
        let existed = {
            let mut shares = write_txn.open_table(SHARES)?;
            let raw: Option<Vec<u8>> = shares.get(id)?.map(|g| g.value().to_vec());
            match raw {
                None => false,
                Some(bytes) => {
                    let record: ShareRecord = decode(&bytes)?;

                    let mut members = write_txn.open_table(SHARE_FILES)?;
                    let stale: Vec<(String, String)> = {
                        let mut keys = Vec::new();
                        for item in members.iter()? {
                            let (k, _v) = item?;
                            let (share_id, file_id) = k.value();
                            if share_id == id {
                                keys.push((share_id.to_owned(), file_id.to_owned()));
                            }
                        }
                        keys
                    };
                    for (share_id, file_id) in &stale {
                        members.remove((share_id.as_str(), file_id.as_str()))?;
                    }

                    let mut codes = write_txn.open_table(SHARE_CODES)?;
                    codes.remove(record.code.as_str())?;
                    shares.remove(id)?;
                    true
                }
            }
        };
        write_txn.commit()?;

        if existed {
            debug!(share = %id, "deleted share");
        }
        Ok(existed)
    }
}

fn encode<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
    bincode::serde::encode_to_vec(value, bincode::config::standard()).context("bincode encode")
}

fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    let (value, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())
        .context("bincode decode")?;
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn make_store() -> (Store, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");
        let store = Store::open(&path).unwrap();
        (store, dir)
    }

    fn file(id: &str) -> FileRecord {
        FileRecord {
            id: id.into(),
            name: format!("{id}.txt"),
            stored_key: format!("{id}-blob.txt"),
            size: 3,
            mime_type: "text/plain".into(),
            created_at: now_unix(),
        }
    }

    fn share(id: &str, code: &str) -> ShareRecord {
        ShareRecord {
            id: id.into(),
            code: code.into(),
            title: String::new(),
            password_hash: None,
            expires_at: None,
            created_at: now_unix(),
        }
    }

    #[test]
    fn insert_get_delete_file() {
        let (s, _dir) = make_store();
        s.insert_file(&file("f1")).unwrap();
        assert_eq!(s.get_file("f1").unwrap().unwrap().name, "f1.txt");
        let removed = s.delete_file("f1").unwrap().unwrap();
        assert_eq!(removed.stored_key, "f1-blob.txt");
        assert!(s.get_file("f1").unwrap().is_none());
        assert!(s.delete_file("f1").unwrap().is_none());
    }

    #[test]
    fn create_share_rejects_missing_file() {
        let (s, _dir) = make_store();
        s.insert_file(&file("f1")).unwrap();
        let outcome = s
            .create_share(&share("s1", "11111111"), &["f1".into(), "nope".into()])
            .unwrap();
        assert_eq!(outcome, CreateShareOutcome::MissingFile);
        // Nothing was written.
        assert!(s.get_share("s1").unwrap().is_none());
        assert!(s.find_share_by_code("11111111").unwrap().is_none());
    }

    #[test]
    fn create_share_rejects_taken_code() {
        let (s, _dir) = make_store();
        s.insert_file(&file("f1")).unwrap();
        let outcome = s
            .create_share(&share("s1", "22222222"), &["f1".into()])
            .unwrap();
        assert_eq!(outcome, CreateShareOutcome::Created);

        let outcome = s
            .create_share(&share("s2", "22222222"), &["f1".into()])
            .unwrap();
        assert_eq!(outcome, CreateShareOutcome::CodeTaken);
        assert!(s.get_share("s2").unwrap().is_none());
    }

    #[test]
    fn find_share_by_code_resolves_membership() {
        let (s, _dir) = make_store();
        s.insert_file(&file("f1")).unwrap();
        s.insert_file(&file("f2")).unwrap();
        s.create_share(&share("s1", "33333333"), &["f1".into(), "f2".into()])
            .unwrap();

        let found = s.find_share_by_code("33333333").unwrap().unwrap();
        assert_eq!(found.id, "s1");
        let mut names: Vec<String> = s
            .share_files("s1")
            .unwrap()
            .into_iter()
            .map(|f| f.name)
            .collect();
        names.sort();
        assert_eq!(names, vec!["f1.txt", "f2.txt"]);
    }

    #[test]
    fn find_share_by_code_returns_expired_shares() {
        let (s, _dir) = make_store();
        s.insert_file(&file("f1")).unwrap();
        let mut expired = share("s1", "44444444");
        expired.expires_at = Some(now_unix() - 60);
        s.create_share(&expired, &["f1".into()]).unwrap();

        // No eviction on lookup: expired is the caller's predicate.
        let found = s.find_share_by_code("44444444").unwrap().unwrap();
        assert!(found.is_expired(now_unix()));
    }

    #[test]
    fn share_file_is_membership_gated() {
        let (s, _dir) = make_store();
        s.insert_file(&file("f1")).unwrap();
        s.insert_file(&file("outsider")).unwrap();
        s.create_share(&share("s1", "55555555"), &["f1".into()])
            .unwrap();

        assert!(s.share_file("s1", "f1").unwrap().is_some());
        // Exists globally, but not linked to this share.
        assert!(s.share_file("s1", "outsider").unwrap().is_none());
        assert!(s.share_file("s1", "ghost").unwrap().is_none());
    }

    #[test]
    fn deleting_a_file_cascades_membership_only() {
        let (s, _dir) = make_store();
        s.insert_file(&file("f1")).unwrap();
        s.insert_file(&file("f2")).unwrap();
        s.create_share(&share("s1", "66666666"), &["f1".into(), "f2".into()])
            .unwrap();
        s.create_share(&share("s2", "77777777"), &["f1".into()])
            .unwrap();

        s.delete_file("f1").unwrap().unwrap();

        // Both shares survive; f1 is gone from each membership.
        assert!(s.get_share("s1").unwrap().is_some());
        assert!(s.get_share("s2").unwrap().is_some());
        let names: Vec<String> = s
            .share_files("s1")
            .unwrap()
            .into_iter()
            .map(|f| f.name)
            .collect();
        assert_eq!(names, vec!["f2.txt"]);
        assert!(s.share_files("s2").unwrap().is_empty());
    }

    #[test]
    fn deleting_a_share_keeps_files_and_frees_the_code() {
        let (s, _dir) = make_store();
        s.insert_file(&file("f1")).unwrap();
        s.create_share(&share("s1", "88888888"), &["f1".into()])
            .unwrap();

        assert!(s.delete_share("s1").unwrap());
        assert!(!s.delete_share("s1").unwrap());

        assert!(s.find_share_by_code("88888888").unwrap().is_none());
        assert!(s.get_file("f1").unwrap().is_some());
        assert!(s.share_files("s1").unwrap().is_empty());
    }

    #[test]
    fn list_shares_newest_first() {
        let (s, _dir) = make_store();
        s.insert_file(&file("f1")).unwrap();
        let mut old = share("s1", "aaaa1111");
        old.created_at = 1000;
        let mut new = share("s2", "bbbb2222");
        new.created_at = 2000;
        s.create_share(&old, &["f1".into()]).unwrap();
        s.create_share(&new, &["f1".into()]).unwrap();

        let ids: Vec<String> = s.list_shares().unwrap().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["s2", "s1"]);
    }
}
