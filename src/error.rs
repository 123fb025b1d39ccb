use thiserror::Error;

/// Errors raised by the layer model, the viewers and the file/inference glue.
///
/// `Validation`, `NotFound` and `StaleReference` are structural errors: they
/// mean the caller broke an invariant of the layer stack and the operation
/// was aborted without touching the model.
#[derive(Debug, Error)]
pub enum VisionError {
    /// Duplicate layer name, layer grid not matching the base layer, bad argument.
    #[error("validation error: {0}")]
    Validation(String),
    /// Layer or record is not a member of the collection it was looked up in.
    #[error("not found: {0}")]
    NotFound(String),
    /// Pixel buffer with an incompatible rank or element type.
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),
    /// A layer view was used after its layer left the viewed layered image.
    #[error("stale reference: {0}")]
    StaleReference(String),
    #[error("load failed: {0}")]
    Load(String),
    #[error("inference failed: {0}")]
    Inference(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("image codec error: {0}")]
    Image(#[from] image::ImageError),
}

pub type Result<T> = std::result::Result<T, VisionError>;
