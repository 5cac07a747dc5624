use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Invalid topic key: {0}")]
    InvalidTopic(String),

    #[error("Invalid identifier: {0}")]
    InvalidId(#[from] std::num::ParseIntError),

    #[error("Payload decode error: {0}")]
    Decode(#[from] serde_json::Error),
}
