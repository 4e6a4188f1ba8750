//! Sequence data model: ordered drip steps and the editing operations on them.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;
use uuid::Uuid;

use crate::error::SequenceError;

/// Wait applied to a follow-up step that carries no explicit delay.
pub const DEFAULT_DELAY_DAYS: u32 = 2;

/// Longest wait a single step may carry (ten years).
pub const MAX_DELAY_DAYS: u32 = 3650;

/// Prompt given to steps created by [`Sequence::add_step`].
pub const DEFAULT_FOLLOW_UP_PROMPT: &str =
    "Write a brief follow-up to the previous email. Add one new angle or piece of value \
     and keep the same low-pressure question.";

/// Keys that route a partial update into the step's config.
const CONFIG_KEYS: [&str; 3] = ["delayDays", "subject", "prompt"];

/// What a step does when reached.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepType {
    /// Send an email.
    #[default]
    Email,
    /// Pure timing gate; never sends.
    Delay,
}

/// Per-step settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay_days: Option<u32>,
    /// Fixed subject; overrides the generated one when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    /// Instruction folded into the campaign context for generation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
}

impl StepConfig {
    pub fn delay_days_or_default(&self) -> u32 {
        self.delay_days.unwrap_or(DEFAULT_DELAY_DAYS)
    }
}

/// One stage of a drip campaign.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceStep {
    pub id: String,
    #[serde(rename = "type", default)]
    pub step_type: StepType,
    pub name: String,
    #[serde(default)]
    pub config: StepConfig,
}

impl SequenceStep {
    /// An email step with a fresh id.
    pub fn email(name: impl Into<String>, config: StepConfig) -> Self {
        Self {
            id: generate_step_id(),
            step_type: StepType::Email,
            name: name.into(),
            config,
        }
    }

    /// A delay-only step with a fresh id.
    pub fn delay(name: impl Into<String>, days: u32) -> Self {
        Self {
            id: generate_step_id(),
            step_type: StepType::Delay,
            name: name.into(),
            config: StepConfig {
                delay_days: Some(days),
                ..Default::default()
            },
        }
    }

    pub fn is_sendable(&self) -> bool {
        self.step_type == StepType::Email
    }
}

fn generate_step_id() -> String {
    format!("step-{}", Uuid::new_v4().simple())
}

/// Root-level step changes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct StepMetaUpdate {
    #[serde(default)]
    pub name: Option<String>,
}

/// Config changes. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepConfigUpdate {
    #[serde(default)]
    pub delay_days: Option<u32>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub prompt: Option<String>,
}

/// The next step to send for a lead and when it becomes eligible.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DueStep {
    pub index: usize,
    pub step_id: String,
    pub due_at: DateTime<Utc>,
}

/// An ordered list of steps plus the optimistic-concurrency version it was loaded at.
///
/// Serializes as a bare array of steps; the version travels separately in storage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<SequenceStep>", into = "Vec<SequenceStep>")]
pub struct Sequence {
    pub steps: Vec<SequenceStep>,
    pub version: u64,
}

impl From<Vec<SequenceStep>> for Sequence {
    fn from(steps: Vec<SequenceStep>) -> Self {
        Self { steps, version: 0 }
    }
}

impl From<Sequence> for Vec<SequenceStep> {
    fn from(sequence: Sequence) -> Self {
        sequence.steps
    }
}

impl Sequence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_version(mut self, version: u64) -> Self {
        self.version = version;
        self
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn step(&self, id: &str) -> Option<&SequenceStep> {
        self.steps.iter().find(|s| s.id == id)
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.steps.iter().position(|s| s.id == id)
    }

    /// Append an email step with a generated id, a default name and the default
    /// follow-up prompt.
    pub fn add_step(&mut self) -> &SequenceStep {
        let name = if self.steps.is_empty() {
            "Initial outreach".to_string()
        } else {
            format!("Follow-up {}", self.steps.len())
        };
        let step = SequenceStep::email(
            name,
            StepConfig {
                delay_days: Some(DEFAULT_DELAY_DAYS),
                subject: None,
                prompt: Some(DEFAULT_FOLLOW_UP_PROMPT.to_string()),
            },
        );
        debug!(step_id = %step.id, position = self.steps.len(), "Adding sequence step");
        self.steps.push(step);
        &self.steps[self.steps.len() - 1]
    }

    pub fn update_step_meta(&mut self, id: &str, update: StepMetaUpdate) -> Result<(), SequenceError> {
        let step = self.step_mut(id)?;
        if let Some(name) = update.name {
            step.name = name;
        }
        Ok(())
    }

    pub fn update_step_config(&mut self, id: &str, update: StepConfigUpdate) -> Result<(), SequenceError> {
        if let Some(days) = update.delay_days
            && days > MAX_DELAY_DAYS
        {
            return Err(SequenceError::DelayTooLong { days, max: MAX_DELAY_DAYS });
        }
        let step = self.step_mut(id)?;
        if let Some(days) = update.delay_days {
            step.config.delay_days = Some(days);
        }
        if let Some(subject) = update.subject {
            step.config.subject = Some(subject);
        }
        if let Some(prompt) = update.prompt {
            step.config.prompt = Some(prompt);
        }
        Ok(())
    }

    /// Apply an untyped partial update.
    ///
    /// If any of `delayDays`, `subject` or `prompt` is present the patch is merged
    /// into the step config; otherwise into the root fields.
    pub fn update_step(&mut self, id: &str, patch: &Map<String, Value>) -> Result<(), SequenceError> {
        let targets_config = CONFIG_KEYS.iter().any(|k| patch.contains_key(*k));
        let value = Value::Object(patch.clone());

        if targets_config {
            let update: StepConfigUpdate = serde_json::from_value(value)
                .map_err(|e| SequenceError::InvalidUpdate(e.to_string()))?;
            self.update_step_config(id, update)
        } else {
            let update: StepMetaUpdate = serde_json::from_value(value)
                .map_err(|e| SequenceError::InvalidUpdate(e.to_string()))?;
            self.update_step_meta(id, update)
        }
    }

    pub fn remove_step(&mut self, id: &str) -> Result<SequenceStep, SequenceError> {
        let index = self
            .position(id)
            .ok_or_else(|| SequenceError::StepNotFound { id: id.to_string() })?;
        Ok(self.steps.remove(index))
    }

    /// Move a step to `new_index`, shifting the others.
    pub fn move_step(&mut self, id: &str, new_index: usize) -> Result<(), SequenceError> {
        let len = self.steps.len();
        if new_index >= len {
            return Err(SequenceError::IndexOutOfRange { index: new_index, len });
        }
        let from = self
            .position(id)
            .ok_or_else(|| SequenceError::StepNotFound { id: id.to_string() })?;
        let step = self.steps.remove(from);
        self.steps.insert(new_index, step);
        Ok(())
    }

    /// Check step invariants: every id non-empty and unique, every delay within
    /// [`MAX_DELAY_DAYS`].
    pub fn validate(&self) -> Result<(), SequenceError> {
        let mut seen = std::collections::HashSet::with_capacity(self.steps.len());
        for (position, step) in self.steps.iter().enumerate() {
            if step.id.trim().is_empty() {
                return Err(SequenceError::EmptyStepId { position });
            }
            if !seen.insert(step.id.as_str()) {
                return Err(SequenceError::DuplicateStepId { id: step.id.clone() });
            }
            if let Some(days) = step.config.delay_days
                && days > MAX_DELAY_DAYS
            {
                return Err(SequenceError::DelayTooLong { days, max: MAX_DELAY_DAYS });
            }
        }
        Ok(())
    }

    /// The next email step after `last_sent` (or the first, when nothing was sent)
    /// and when it becomes eligible, measured from `anchor`.
    ///
    /// Step 0 never waits. Later email steps wait their own `delay_days`; delay
    /// steps passed on the way add theirs. `None` also when the due instant
    /// falls outside the representable calendar.
    pub fn next_due(&self, last_sent: Option<usize>, anchor: DateTime<Utc>) -> Option<DueStep> {
        let start = last_sent.map_or(0, |i| i + 1);
        let mut days: i64 = 0;

        for (index, step) in self.steps.iter().enumerate().skip(start) {
            if index > 0 {
                days += i64::from(step.config.delay_days_or_default());
            }
            if step.is_sendable() {
                let due_at = Duration::try_days(days).and_then(|d| anchor.checked_add_signed(d))?;
                return Some(DueStep {
                    index,
                    step_id: step.id.clone(),
                    due_at,
                });
            }
        }
        None
    }

    fn step_mut(&mut self, id: &str) -> Result<&mut SequenceStep, SequenceError> {
        self.steps
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| SequenceError::StepNotFound { id: id.to_string() })
    }
}
