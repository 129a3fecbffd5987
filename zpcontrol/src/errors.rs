use thiserror::Error;

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, ControlError>;

/// Errors produced by the browse navigator and playback actions.
#[derive(Error, Debug)]
pub enum ControlError {
    /// A zone player rejected or failed an operation.
    #[error("Device error: {0}")]
    Device(String),

    /// A music service rejected or failed an operation.
    #[error("Music service error: {0}")]
    Service(String),

    /// A device or service answered with a payload we cannot use.
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// No coordinator device has been selected yet.
    #[error("No coordinator device is selected")]
    NoCurrentDevice,

    /// The host is not present in the session's device table.
    #[error("Unknown device host: {0}")]
    UnknownHost(String),

    /// The service id is not registered in this session.
    #[error("Unknown music service: {0}")]
    UnknownService(u32),

    /// Reading or writing the configuration failed.
    #[error("Configuration error: {0}")]
    Config(#[from] anyhow::Error),
}

impl ControlError {
    pub fn device(message: impl Into<String>) -> Self {
        ControlError::Device(message.into())
    }

    pub fn service(message: impl Into<String>) -> Self {
        ControlError::Service(message.into())
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        ControlError::MalformedResponse(message.into())
    }
}
