pub mod db;
pub mod model;
pub mod sessions;

pub use db::{generate_id, now_unix, CreateShareOutcome, Store};
pub use model::{FileMeta, FileRecord, FileView, ShareInfo, ShareRecord, ShareView};
pub use sessions::SessionRecord;
