use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClinicPulseError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unification error: {0}")]
    Unification(String),

    #[error("Enrichment error: {0}")]
    Enrichment(String),

    #[error("Scoring error: {0}")]
    Scoring(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}
