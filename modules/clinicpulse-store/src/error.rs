/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migrate(String),

    #[error("Malformed row for review {review_id}: {reason}")]
    MalformedRow { review_id: uuid::Uuid, reason: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
