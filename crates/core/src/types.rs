/// Engine-issued task identifier. Opaque; only ever compared and echoed.
pub type TaskId = String;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
