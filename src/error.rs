use thiserror::Error;

#[derive(Error, Debug)]
pub enum TallyError {
    #[error("Database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Local storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Category parent references form a cycle: {}", format_ids(.ids))]
    CyclicCategoryGraph { ids: Vec<i64> },

    #[error("Remote write failed: {0}")]
    RemoteWriteFailed(String),

    #[error("Nothing to paste: clipboard is empty")]
    EmptyClipboardPaste,

    #[error("Nothing to copy: cell has no entries")]
    EmptySourceCopy,

    #[error("Unknown category: id {0}")]
    UnknownCategory(i64),

    #[error("Unknown entry: id {0}")]
    UnknownEntry(i64),

    #[error("Category type mismatch: parent is {parent}, child is {child}")]
    TypeMismatch { parent: String, child: String },

    #[error("Amount out of range: {0}")]
    AmountOverflow(String),

    #[error("Invalid month: {0}")]
    InvalidMonth(String),

    #[error("Settings error: {0}")]
    Settings(String),

    #[error("{0}")]
    Other(String),
}

fn format_ids(ids: &[i64]) -> String {
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(" -> ")
}

pub type Result<T> = std::result::Result<T, TallyError>;
