use thiserror::Error;

#[derive(Debug, Error)]
pub enum FlowError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Frame at {timestamp:.2}s not ready before timeout")]
    FrameTimeout { timestamp: f64 },
    #[error("Frame source error: {0}")]
    FrameSource(String),
    #[error("Image encode error: {0}")]
    Encode(#[from] image::ImageError),
    #[error("Packaging failed: {0}")]
    Packaging(String),
    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Config parse error: {0}")]
    Config(#[from] serde_json::Error),
}

