use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExporterError {
    #[error("Cannot connect to server: {0}")]
    Connection(String),

    #[error("Command '{command}' failed: {message}")]
    Command { command: String, message: String },

    #[error("Command '{command}' exceeded its deadline of {timeout:?}")]
    Timeout { command: String, timeout: Duration },

    #[error("Malformed payload: {0}")]
    Decode(String),

    #[error("Section '{0}' is absent from the payload")]
    MissingSection(&'static str),

    #[error("Metric error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ExporterError {
    pub fn command(command: impl Into<String>, message: impl ToString) -> Self {
        Self::Command {
            command: command.into(),
            message: message.to_string(),
        }
    }
}

impl From<mongodb::bson::de::Error> for ExporterError {
    fn from(err: mongodb::bson::de::Error) -> Self {
        ExporterError::Decode(err.to_string())
    }
}

impl From<mongodb::bson::document::ValueAccessError> for ExporterError {
    fn from(err: mongodb::bson::document::ValueAccessError) -> Self {
        ExporterError::Decode(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ExporterError>;
