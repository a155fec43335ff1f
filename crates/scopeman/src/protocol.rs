//
// protocol.rs
//
// Message contracts exchanged with the analysis engine
//

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const INIT_MSG: &str = "INIT";
pub const QUERY_MSG: &str = "QUERY";
pub const GET_FILE_MSG: &str = "GET_FILE";
pub const LOG_MSG: &str = "LOG";

/// Completion names returned by the engine.
///
/// The same list can be handed to several callers; copy it before mutating.
pub type Completions = Arc<[String]>;

/// Messages sent to the engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum EngineRequest {
    /// Rebuild the engine model for `dir` from `files` plus the definitions in `env`.
    #[serde(rename = "INIT")]
    Init {
        dir: String,
        files: Vec<String>,
        env: Vec<Arc<Value>>,
    },
    #[serde(rename = "QUERY")]
    Query {
        dir: String,
        file: String,
        offset: usize,
        text: String,
    },
    /// Reply to an engine `GET_FILE` pull.
    #[serde(rename = "GET_FILE")]
    FileContent { file: String, text: String },
}

impl EngineRequest {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Init { .. } => INIT_MSG,
            Self::Query { .. } => QUERY_MSG,
            Self::FileContent { .. } => GET_FILE_MSG,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CompletionsResponse {
    pub dir: String,
    pub file: String,
    pub offset: usize,
    #[serde(default)]
    pub completions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FileRequest {
    pub file: String,
}

/// Messages arriving from the engine, decoded by their `type` tag.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineMessage {
    Completions(CompletionsResponse),
    GetFile(FileRequest),
    Log(String),
    /// Any other tag; kept whole for logging.
    Unknown(Value),
}

impl EngineMessage {
    /// Decode a message object.
    ///
    /// Unrecognised tags are not an error. A recognised tag whose payload
    /// does not fit its contract is.
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        let kind = value.get("type").and_then(Value::as_str).unwrap_or_default();
        match kind {
            QUERY_MSG => Ok(Self::Completions(serde_json::from_value(value)?)),
            GET_FILE_MSG => Ok(Self::GetFile(serde_json::from_value(value)?)),
            LOG_MSG => {
                let text = value
                    .get("log")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| value.to_string());
                Ok(Self::Log(text))
            }
            _ => Ok(Self::Unknown(value)),
        }
    }

    pub fn from_line(line: &str) -> Result<Self, serde_json::Error> {
        Self::from_value(serde_json::from_str(line)?)
    }
}
