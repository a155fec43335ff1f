//
// error.rs
//
// Failure outcomes of a completion request
//

use std::time::Duration;

/// Why a hint request produced no completions.
///
/// None of these reach the editor as a fault: the LSP layer turns every
/// variant into an empty completion response.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HintError {
    #[error("document has {len} characters, limit is {max}")]
    DocumentTooLarge { len: usize, max: usize },

    #[error("completion request for {file} was superseded by a newer request")]
    Superseded { file: String },

    #[error("completion request for {file} timed out after {after:?}")]
    TimedOut { file: String, after: Duration },

    #[error("analysis engine dropped the completion request for {file}")]
    EngineGone { file: String },
}
