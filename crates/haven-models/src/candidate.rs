//! Scored clip candidates.

use std::path::PathBuf;

use serde_json::{Map, Value};

/// A scored clip awaiting ledger disposition.
///
/// Produced by the scoring gate once a clip clears the acceptance threshold;
/// folded into a threat's evidence set by the ledger controller. `path`
/// points at the staging file until acceptance, at which point it is
/// rewritten to the threat's storage directory.
#[derive(Debug, Clone)]
pub struct ClipCandidate {
    /// Severity score from the external scorer, 0-10.
    pub score: u8,
    /// Short human-readable explanation from the scorer.
    pub explanation: String,
    /// Location of the clip file on disk.
    pub path: PathBuf,
    /// Capture context (e.g. camera location), if known.
    pub metadata: Option<Map<String, Value>>,
}

impl ClipCandidate {
    /// File name component of the clip path.
    pub fn file_name(&self) -> Option<String> {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
    }
}
