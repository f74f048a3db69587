use thiserror::Error;

/// Central error type for the stem-splitter-web crate.
///
/// The `Display` text of every variant is what the upload form flashes back
/// to the user, so messages are written for people, not logs.
#[derive(Debug, Error)]
pub enum StemError {
    // Generic fallback (wraps anyhow)
    #[error("Error processing file: {0}")]
    Anyhow(#[from] anyhow::Error),

    // --- Upload validation ---
    #[error("No file part")]
    NoFilePart,

    #[error("No selected file")]
    NoSelectedFile,

    #[error("File type '{0}' is not allowed; upload an mp3 or wav file")]
    DisallowedExtension(String),

    #[error("Invalid upload: {0}")]
    Upload(String),

    // --- Pipeline stages ---
    #[error("Error loading audio file: {0}")]
    Decode(String),

    #[error("Separation model is not available: {0}")]
    ModelUnavailable(String),

    #[error("Error separating audio: {0}")]
    Inference(String),

    #[error("Error encoding stems: {0}")]
    Encode(String),

    // --- Model cache ---
    #[error("Registry error: {0}")]
    Registry(String),

    #[error("Manifest error: {0}")]
    Manifest(String),

    #[error("Checksum mismatch for {path}")]
    Checksum { path: String },

    #[error("Cache dir not available")]
    CacheDirUnavailable,

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Coarse classification used for logging and status decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Model,
    Decode,
    Inference,
    Encode,
    Internal,
}

impl StemError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StemError::NoFilePart
            | StemError::NoSelectedFile
            | StemError::DisallowedExtension(_)
            | StemError::Upload(_) => ErrorKind::Validation,
            StemError::ModelUnavailable(_)
            | StemError::Registry(_)
            | StemError::Manifest(_)
            | StemError::Checksum { .. }
            | StemError::CacheDirUnavailable => ErrorKind::Model,
            StemError::Decode(_) => ErrorKind::Decode,
            StemError::Inference(_) => ErrorKind::Inference,
            StemError::Encode(_) => ErrorKind::Encode,
            StemError::Anyhow(_) | StemError::Config(_) => ErrorKind::Internal,
        }
    }
}

// --- Implement From conversions for common errors ---
impl From<std::io::Error> for StemError {
    fn from(e: std::io::Error) -> Self {
        StemError::Anyhow(e.into())
    }
}

impl From<serde_json::Error> for StemError {
    fn from(e: serde_json::Error) -> Self {
        StemError::Anyhow(e.into())
    }
}

impl From<reqwest::Error> for StemError {
    fn from(e: reqwest::Error) -> Self {
        StemError::Anyhow(e.into())
    }
}

impl From<hex::FromHexError> for StemError {
    fn from(e: hex::FromHexError) -> Self {
        StemError::Anyhow(e.into())
    }
}

impl From<symphonia::core::errors::Error> for StemError {
    fn from(e: symphonia::core::errors::Error) -> Self {
        StemError::Decode(e.to_string())
    }
}

impl From<ort::Error> for StemError {
    fn from(e: ort::Error) -> Self {
        StemError::Inference(e.to_string())
    }
}

impl From<ndarray::ShapeError> for StemError {
    fn from(e: ndarray::ShapeError) -> Self {
        StemError::Inference(e.to_string())
    }
}

impl From<axum::extract::multipart::MultipartError> for StemError {
    fn from(e: axum::extract::multipart::MultipartError) -> Self {
        StemError::Upload(e.body_text())
    }
}

pub type Result<T> = std::result::Result<T, StemError>;
