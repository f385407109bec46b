//! Response bodies of the analysis backend.

use std::fmt;

use cadence_core::SessionKey;
use serde::{Deserialize, Serialize};

/// Processing status of an uploaded conversation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisStatus {
    /// Waiting for a worker.
    Queued,
    /// Transcription or analysis in progress.
    Processing,
    /// Results are available.
    Ready,
    /// Results are available (older backends).
    Completed,
    /// Processing failed.
    Failed,
    /// A status this client does not know. Never terminal.
    #[serde(other)]
    Unknown,
}

impl AnalysisStatus {
    /// Parse a status name. Unrecognized names map to [`Unknown`](Self::Unknown).
    pub fn parse(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "queued" => Self::Queued,
            "processing" => Self::Processing,
            "ready" => Self::Ready,
            "completed" => Self::Completed,
            "failed" => Self::Failed,
            _ => Self::Unknown,
        }
    }

    /// Wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::Ready => "ready",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Unknown => "unknown",
        }
    }

    /// Whether results are available.
    pub fn is_success(self) -> bool {
        matches!(self, Self::Ready | Self::Completed)
    }

    /// Whether processing failed.
    pub fn is_failure(self) -> bool {
        self == Self::Failed
    }
}

impl fmt::Display for AnalysisStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `GET /analysis/{id}` response.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRecord {
    /// Conversation ID, when the backend echoes it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Current status.
    pub status: AnalysisStatus,
    /// Short summary once ready.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// Overall score once ready.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    /// Percentage complete while processing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
    /// Failure reason.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AnalysisRecord {
    /// A record with only a status, as fakes and tests need.
    pub fn with_status(status: AnalysisStatus) -> Self {
        Self {
            id: None,
            status,
            summary: None,
            score: None,
            progress: None,
            error: None,
        }
    }
}

/// `POST /upload` response.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadReceipt {
    /// ID of the new conversation. Also the session key of its channel.
    pub conversation_id: SessionKey,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_status_decodes() {
        let record: AnalysisRecord =
            serde_json::from_str(r#"{"status":"transcribing","progress":12}"#).unwrap();
        assert_eq!(record.status, AnalysisStatus::Unknown);
        assert_eq!(record.progress, Some(12.0));
    }

    #[test]
    fn full_record_decodes() {
        let record: AnalysisRecord = serde_json::from_str(
            r#"{"id":"conv_1","status":"ready","summary":"Good pacing","score":8.5}"#,
        )
        .unwrap();
        assert_eq!(record.status, AnalysisStatus::Ready);
        assert!(record.status.is_success());
        assert_eq!(record.summary.as_deref(), Some("Good pacing"));
    }

    #[test]
    fn parse_names() {
        assert_eq!(AnalysisStatus::parse("READY"), AnalysisStatus::Ready);
        assert_eq!(AnalysisStatus::parse(" failed "), AnalysisStatus::Failed);
        assert_eq!(AnalysisStatus::parse("archived"), AnalysisStatus::Unknown);
        assert!(AnalysisStatus::Failed.is_failure());
        assert!(!AnalysisStatus::Processing.is_success());
    }

    #[test]
    fn receipt_uses_camel_case() {
        let receipt: UploadReceipt =
            serde_json::from_str(r#"{"conversationId":"conv_abc123"}"#).unwrap();
        assert_eq!(receipt.conversation_id.as_str(), "conv_abc123");
    }
}
