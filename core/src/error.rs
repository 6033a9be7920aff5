use thiserror::Error;

#[derive(Error, Debug)]
pub enum TgError {
    #[error("Connection error: {0}")]
    Connection(String),
    #[error("Read error: {0}")]
    Read(String),
    #[error("Decode error: {0}")]
    Decode(String),
    #[error("Render error: {0}")]
    Render(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Platform error: {0}")]
    Platform(String),
    #[error("Setup interrupted")]
    SetupInterrupted,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Unknown error: {0}")]
    Unknown(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, TgError>;
