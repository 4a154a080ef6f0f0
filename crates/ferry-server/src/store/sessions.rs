use anyhow::{Context, Result};
use redb::{ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};

pub(crate) const SESSIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("sessions");

/// Admin session row. Only the SHA-256 hash of the bearer token is stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: String,
    pub token_hash: Vec<u8>,
    pub created_at: i64,
    pub expires_at: i64,
}

/// Generate a new admin session token in the format `ferry_tok_<32 hex chars>`.
pub fn generate_session_token() -> String {
    use rand::Rng;
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill(&mut bytes);
    format!("ferry_tok_{}", hex::encode(bytes))
}

/// Hash a token with SHA-256 for storage lookup.
pub fn hash_token(token: &str) -> Vec<u8> {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.finalize().to_vec()
}

impl super::db::Store {
    /// Insert an admin session record.
    pub fn put_session(&self, record: &SessionRecord) -> Result<()> {
        let bytes = bincode::serde::encode_to_vec(record, bincode::config::standard())
            .context("bincode encode session")?;

        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(SESSIONS)?;
            table.insert(record.id.as_str(), bytes.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Find a live session by token hash. Expired sessions encountered
    /// during the scan are evicted.
    pub fn find_session_by_hash(&self, hash: &[u8]) -> Result<Option<SessionRecord>> {
        let now = super::db::now_unix();

        let write_txn = self.db.begin_write()?;
        let found = {
            let mut table = write_txn.open_table(SESSIONS)?;

            let mut hit: Option<SessionRecord> = None;
            let mut stale: Vec<String> = Vec::new();
            for item in table.iter()? {
                let (k, v) = item?;
                let (record, _): (SessionRecord, _) =
                    bincode::serde::decode_from_slice(v.value(), bincode::config::standard())
                        .context("bincode decode session")?;
                if record.expires_at <= now {
                    stale.push(k.value().to_owned());
                } else if record.token_hash == hash {
                    hit = Some(record);
                }
            }
            for id in &stale {
                table.remove(id.as_str())?;
            }
            hit
        };
        write_txn.commit()?;
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::super::db::{now_unix, Store};
    use super::*;
    use tempfile::tempdir;

    fn make_store() -> (Store, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let store = Store::open(&dir.path().join("test.db")).unwrap();
        (store, dir)
    }

    fn session(id: &str, token: &str, expires_at: i64) -> SessionRecord {
        SessionRecord {
            id: id.into(),
            token_hash: hash_token(token),
            created_at: now_unix(),
            expires_at,
        }
    }

    #[test]
    fn token_format() {
        let token = generate_session_token();
        assert!(token.starts_with("ferry_tok_"));
        assert_eq!(token.len(), "ferry_tok_".len() + 32);
    }

    #[test]
    fn find_by_hash_matches_only_the_right_token() {
        let (s, _dir) = make_store();
        s.put_session(&session("a", "tok-a", now_unix() + 3600))
            .unwrap();

        let hit = s.find_session_by_hash(&hash_token("tok-a")).unwrap();
        assert_eq!(hit.unwrap().id, "a");
        assert!(s
            .find_session_by_hash(&hash_token("tok-b"))
            .unwrap()
            .is_none());
    }

    #[test]
    fn expired_sessions_are_evicted_on_lookup() {
        let (s, _dir) = make_store();
        s.put_session(&session("old", "tok-old", now_unix() - 1))
            .unwrap();
        s.put_session(&session("live", "tok-live", now_unix() + 3600))
            .unwrap();

        assert!(s
            .find_session_by_hash(&hash_token("tok-old"))
            .unwrap()
            .is_none());
        // The expired row is gone; the live one still resolves.
        assert!(s
            .find_session_by_hash(&hash_token("tok-live"))
            .unwrap()
            .is_some());
    }
}
