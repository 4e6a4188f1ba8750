//! Collaborator records consumed and emitted by the engine.
//!
//! Leads and campaigns are owned by external CRUD services; the engine only
//! reads them. Persona insights are validated here, at the boundary, so
//! business logic never sees a malformed blob.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SchemaError;
use crate::sequence::model::Sequence;

/// AI-inferred profile of a lead used to personalize content.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct PersonaInsights {
    #[serde(default)]
    pub pain_points: Vec<String>,
    #[serde(default)]
    pub priorities: Vec<String>,
    /// Conversation hooks for the opening line.
    #[serde(default)]
    pub icebreakers: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

impl PersonaInsights {
    /// Parse and validate an untyped persona blob.
    pub fn from_value(value: serde_json::Value) -> Result<Self, SchemaError> {
        let persona: PersonaInsights = serde_json::from_value(value)?;
        persona.validate()?;
        Ok(persona)
    }

    pub fn validate(&self) -> Result<(), SchemaError> {
        let lists = [
            ("painPoints", &self.pain_points),
            ("priorities", &self.priorities),
            ("icebreakers", &self.icebreakers),
        ];
        for (field, entries) in lists {
            if entries.iter().any(|e| e.trim().is_empty()) {
                return Err(SchemaError::Invalid {
                    record: "persona_insights".into(),
                    reason: format!("{field} contains a blank entry"),
                });
            }
        }
        if self.is_empty() {
            return Err(SchemaError::Invalid {
                record: "persona_insights".into(),
                reason: "persona has no content".into(),
            });
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.pain_points.is_empty()
            && self.priorities.is_empty()
            && self.icebreakers.is_empty()
            && self.summary.as_deref().is_none_or(|s| s.trim().is_empty())
    }
}

/// A prospective contact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lead {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    pub name: String,
    pub position: String,
    #[serde(default)]
    pub company: Option<String>,
    pub requirement: String,
    #[serde(default)]
    pub founder_linkedin: Option<String>,
    #[serde(default)]
    pub website_url: Option<String>,
    #[serde(default)]
    pub persona_insights: Option<PersonaInsights>,
}

impl Lead {
    /// Parse a lead record, rejecting malformed persona blobs.
    pub fn from_json(raw: &str) -> Result<Self, SchemaError> {
        let lead: Lead = serde_json::from_str(raw)?;
        lead.validate()?;
        Ok(lead)
    }

    /// Parse a JSON array of leads; one malformed persona rejects the list.
    pub fn list_from_json(raw: &str) -> Result<Vec<Self>, SchemaError> {
        let leads: Vec<Lead> = serde_json::from_str(raw)?;
        for lead in &leads {
            lead.validate()?;
        }
        Ok(leads)
    }

    pub fn validate(&self) -> Result<(), SchemaError> {
        match &self.persona_insights {
            Some(persona) => persona.validate(),
            None => Ok(()),
        }
    }

    /// First whitespace-separated token of the name, for `{{name}}` interpolation.
    pub fn first_name(&self) -> &str {
        self.name.split_whitespace().next().unwrap_or("")
    }
}

/// Campaign lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignStatus {
    Draft,
    Active,
    Paused,
    Completed,
}

/// A campaign as far as the engine cares: an id, a status, and its sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Campaign {
    pub id: String,
    pub status: CampaignStatus,
    #[serde(default)]
    pub sequence: Sequence,
}

/// Request handed to the delivery collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendRequest {
    pub lead_id: String,
    pub to_email: String,
    pub subject: String,
    pub body: String,
    pub campaign_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence_step_id: Option<String>,
}

/// Outcome recorded for a send attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SendStatus {
    Sent,
    Failed,
}

impl SendStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SendStatus::Sent => "sent",
            SendStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "sent" => SendStatus::Sent,
            _ => SendStatus::Failed,
        }
    }
}

/// Log record emitted for persistence after every hand-off.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    pub lead_id: String,
    pub campaign_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence_step_id: Option<String>,
    pub subject: String,
    pub body: String,
    pub status: SendStatus,
    pub sent_at: DateTime<Utc>,
}
