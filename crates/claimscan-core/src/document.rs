use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::ingest::MatchResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Uploaded,
    Processing,
    Done,
    Error,
}

impl DocumentStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uploaded => "uploaded",
            Self::Processing => "processing",
            Self::Done => "done",
            Self::Error => "error",
        }
    }

    /// Status only moves forward: uploaded, processing, then done or error.
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Uploaded, Self::Processing) | (Self::Processing, Self::Done | Self::Error)
        )
    }
}

impl std::fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-document outcome shown to reviewers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: Uuid,
    pub file_name: String,
    pub extracted_name: String,
    pub matched_id: String,
    pub matched_name: String,
    pub confidence: f64,
    pub status: DocumentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DocumentRecord {
    #[must_use]
    pub fn new(file_name: impl Into<String>) -> Self {
        let now = Utc::now();
        let unmatched = MatchResult::no_match();
        Self {
            id: Uuid::now_v7(),
            file_name: file_name.into(),
            extracted_name: String::new(),
            matched_id: unmatched.matched_id,
            matched_name: unmatched.matched_name,
            confidence: unmatched.confidence,
            status: DocumentStatus::Uploaded,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn transition(&mut self, next: DocumentStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(Error::InvalidStatusTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn start_processing(&mut self) -> Result<()> {
        self.transition(DocumentStatus::Processing)
    }

    pub fn complete(
        &mut self,
        extracted_name: impl Into<String>,
        matched: &MatchResult,
    ) -> Result<()> {
        self.transition(DocumentStatus::Done)?;
        self.extracted_name = extracted_name.into();
        self.matched_id.clone_from(&matched.matched_id);
        self.matched_name.clone_from(&matched.matched_name);
        self.confidence = matched.confidence;
        Ok(())
    }

    pub fn fail(&mut self, message: impl Into<String>) -> Result<()> {
        self.transition(DocumentStatus::Error)?;
        self.error = Some(message.into());
        Ok(())
    }

    /// Reviewer correction of the registry match. Confidence becomes 1.0.
    pub fn override_match(
        &mut self,
        matched_id: impl Into<String>,
        matched_name: impl Into<String>,
    ) -> Result<()> {
        let matched_id = matched_id.into();
        if matched_id.trim().is_empty() {
            return Err(Error::EmptyOverrideId);
        }
        if self.status != DocumentStatus::Done {
            return Err(Error::InvalidStatusTransition {
                from: self.status,
                to: DocumentStatus::Done,
            });
        }

        tracing::info!(
            file = %self.file_name,
            previous = %self.matched_id,
            matched_id = %matched_id,
            "Registry match overridden"
        );

        self.matched_id = matched_id;
        self.matched_name = matched_name.into();
        self.confidence = 1.0;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn is_matched(&self) -> bool {
        !self.matched_id.is_empty()
    }
}
