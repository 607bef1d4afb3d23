/// Result alias that carries the custom [`SceneError`] type.
pub type Result<T> = std::result::Result<T, SceneError>;

/// Common error type for the core crate.
#[derive(Debug, thiserror::Error)]
pub enum SceneError {
    /// Free-form error used by handlers and host glue that have nothing more
    /// specific to report.
    #[error("{0}")]
    Message(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// Configuration file could not be parsed.
    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),
    /// Configuration parsed but failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
    /// The process-wide scene context was constructed twice.
    #[error("scene context has already been constructed")]
    AlreadyConstructed,
    /// A quality level name did not match any known level.
    #[error("unknown quality level `{0}`")]
    UnknownQuality(String),
    /// An event handler reported a failure while being dispatched.
    #[error("handler for `{event}` failed: {message}")]
    Handler { event: String, message: String },
}

impl SceneError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }
}

impl From<&str> for SceneError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for SceneError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}
