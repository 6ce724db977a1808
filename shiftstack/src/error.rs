use thiserror::Error;

/// Errors produced by the stack search engine.
#[derive(Error, Debug)]
pub enum SearchError {
    /// A kernel or image plane violates a shape invariant (even-sided or
    /// non-square PSF, mismatched plane dimensions, wrong time-vector
    /// length).
    #[error("invalid shape: {0}")]
    InvalidShape(String),

    /// The image stack contains no frames.
    #[error("image stack contains no frames")]
    EmptyStack,

    /// The search grid specification failed validation.
    #[error("invalid search specification: {0}")]
    BadSearchSpec(String),

    /// GPU execution was requested but no usable compute adapter exists.
    #[error("compute device unavailable: {0}")]
    DeviceUnavailable(String),

    /// A host or device buffer allocation failed.
    #[error("allocation failed: {0}")]
    AllocationFailure(String),

    /// Writing results or debug planes to disk failed.
    #[error("result I/O failed: {0}")]
    Io(#[from] std::io::Error),
}
