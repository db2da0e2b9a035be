use crate::error::ErrorKind;
use serde::Serialize;
use std::fmt;

/// Everything the AR screen needs after a successful scan
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArHandoff {
    pub code_id: String,
    pub video_id: String,
    pub title: String,
    pub video_url: String,
    pub route: String,
    pub scan_count: u64,
    /// Set when the scan was granted but its counter write failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub persistence_warning: Option<String>,
}

/// Why a matched code cannot be played
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum IncompleteReason {
    /// The linked video is not in the library
    VideoMissing { video_id: String },
    /// The linked video has no playable URL
    NoPlayableUrl { video_id: String },
}

impl fmt::Display for IncompleteReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IncompleteReason::VideoMissing { video_id } => {
                write!(f, "linked video {} was not found", video_id)
            }
            IncompleteReason::NoPlayableUrl { video_id } => {
                write!(f, "linked video {} has no playable URL", video_id)
            }
        }
    }
}

/// Result of handling one decoded payload
#[derive(Debug, Clone, PartialEq)]
pub enum ScanOutcome {
    Matched(ArHandoff),
    /// No known code matched; scanning resumes
    NotRecognized,
    /// A code matched but its data is unusable; scanning resumes
    RecordIncomplete {
        code_id: String,
        reason: IncompleteReason,
    },
}

impl ScanOutcome {
    pub fn is_match(&self) -> bool {
        matches!(self, ScanOutcome::Matched(_))
    }

    /// Place in the failure taxonomy, `None` for a match
    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            ScanOutcome::Matched(_) => None,
            ScanOutcome::NotRecognized => Some(ErrorKind::NotRecognized),
            ScanOutcome::RecordIncomplete { .. } => Some(ErrorKind::RecordIncomplete),
        }
    }

    /// Short machine-readable label
    pub fn label(&self) -> &'static str {
        match self {
            ScanOutcome::Matched(_) => "matched",
            ScanOutcome::NotRecognized => "not_recognized",
            ScanOutcome::RecordIncomplete { .. } => "record_incomplete",
        }
    }

    /// Simple message for the scan screen
    pub fn user_message(&self) -> String {
        match self {
            ScanOutcome::Matched(handoff) => format!("Found \"{}\"", handoff.title),
            ScanOutcome::NotRecognized => {
                "This code isn't recognized. Keep scanning or try another code.".to_string()
            }
            ScanOutcome::RecordIncomplete { .. } => {
                "This code's video isn't available right now.".to_string()
            }
        }
    }
}
