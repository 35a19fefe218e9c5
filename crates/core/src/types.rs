/// Jobs and chunks are keyed by UUID v4.
pub type DbId = uuid::Uuid;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Generate a fresh identifier for a job or chunk.
pub fn new_id() -> DbId {
    uuid::Uuid::new_v4()
}
