use thiserror::Error;

pub type TransportResult<T> = Result<T, TransportError>;

#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("backend returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("backend request failed: {message}")]
    Network { message: String },
    #[error("backend call timed out after {seconds}s")]
    Timeout { seconds: f64 },
    #[error("invalid backend response: {message}")]
    Decode { message: String },
    #[error("invalid backend URL: {message}")]
    InvalidUrl { message: String },
    #[error("invalid backend client settings: {message}")]
    InvalidConfig { message: String },
}

impl TransportError {
    pub fn status(status: u16, body: impl Into<String>) -> Self {
        Self::Status {
            status,
            body: body.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        Self::network(err.to_string())
    }
}
