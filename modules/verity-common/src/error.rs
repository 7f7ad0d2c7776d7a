use thiserror::Error;

#[derive(Error, Debug)]
pub enum VerityError {
    #[error("Job store error: {0}")]
    Store(String),

    #[error("Analysis error: {0}")]
    Analysis(String),

    #[error("Search error: {0}")]
    Search(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Provider circuit open: {0}")]
    CircuitOpen(String),

    #[error("System paused: {0}")]
    Paused(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}
