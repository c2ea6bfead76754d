// Typed errors with thiserror. Surface meaningful messages to JS.
// Engines themselves never fail; errors only come from host-supplied data.

use thiserror::Error;
use wasm_bindgen::JsValue;

/// Engine error types.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid talent data: {0}")]
    InvalidTalentData(String),

    #[error("Invalid build string: {0}")]
    InvalidBuild(String),

    #[error("Unknown talent: {0}")]
    UnknownTalent(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::Serialization(err.to_string())
    }
}

impl From<EngineError> for JsValue {
    fn from(err: EngineError) -> Self {
        JsValue::from_str(&err.to_string())
    }
}
