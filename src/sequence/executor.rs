//! Resolves a (lead, step) pair into a send request and hands it off.
//!
//! Order of operations for one execution:
//! 1. Resolve the step from the stored sequence
//! 2. Ask the warmup gate for a slot (deferral stops here, nothing is generated)
//! 3. Use manual content or generate it
//! 4. Optionally block content that failed validation
//! 5. Interpolate `{{name}}`, deliver, then log the outcome
//!
//! Every path that takes a warmup slot and does not send gives it back.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::campaign::{Lead, LogRecord, SendRequest, SendStatus};
use crate::error::ExecutionError;
use crate::outreach::{
    CompanyInfo, EmailGenerator, GeneratedEmail, GenerationOptions, PromptContext, Tone,
    ValidationResult,
};
use crate::sequence::delivery::DeliverySink;
use crate::sequence::model::{DueStep, SequenceStep};
use crate::store::Database;
use crate::warmup::{DeferReason, GateDecision, SendReservation, WarmupGate};

/// Placeholder the model (or a human) uses for the recipient's first name.
pub const NAME_PLACEHOLDER: &str = "{{name}}";

#[derive(Debug, Clone, Default)]
pub struct ExecutorConfig {
    /// Refuse to send generated content that failed validation. Off means the
    /// failure is logged and the email goes out anyway.
    pub block_invalid: bool,
}

/// Caller-written content that bypasses generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManualContent {
    pub subject: String,
    pub body: String,
}

/// One manual or triggered step execution.
#[derive(Debug, Clone)]
pub struct ExecuteRequest {
    pub campaign_id: String,
    pub step_id: String,
    pub lead: Lead,
    pub manual: Option<ManualContent>,
    pub company_info: Option<CompanyInfo>,
    /// Provider, model and per-call settings for generation.
    pub options: GenerationOptions,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    /// Handed off to delivery and logged as sent.
    Sent {
        request: SendRequest,
        validation: Option<ValidationResult>,
    },
    /// The warmup gate said not now. Retry at `retry_at`.
    Deferred {
        retry_at: DateTime<Utc>,
        reason: DeferReason,
    },
    /// Generated content failed validation and blocking is on.
    Rejected {
        email: GeneratedEmail,
        validation: ValidationResult,
    },
}

pub struct SequenceExecutor {
    generator: Arc<EmailGenerator>,
    db: Arc<dyn Database>,
    delivery: Arc<dyn DeliverySink>,
    gate: Option<Arc<WarmupGate>>,
    config: ExecutorConfig,
}

impl SequenceExecutor {
    pub fn new(
        generator: Arc<EmailGenerator>,
        db: Arc<dyn Database>,
        delivery: Arc<dyn DeliverySink>,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            generator,
            db,
            delivery,
            gate: None,
            config,
        }
    }

    /// Enforce `gate` before every send.
    pub fn with_warmup(mut self, gate: Arc<WarmupGate>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub async fn execute(&self, request: ExecuteRequest) -> Result<ExecutionOutcome, ExecutionError> {
        self.execute_at(request, Utc::now()).await
    }

    /// Execute as if the current time were `now`.
    pub async fn execute_at(
        &self,
        request: ExecuteRequest,
        now: DateTime<Utc>,
    ) -> Result<ExecutionOutcome, ExecutionError> {
        let sequence = self.db.load_sequence(&request.campaign_id).await?;
        let step = sequence
            .step(&request.step_id)
            .cloned()
            .ok_or_else(|| crate::error::SequenceError::StepNotFound {
                id: request.step_id.clone(),
            })?;
        if !step.is_sendable() {
            return Err(ExecutionError::NotSendable { id: step.id });
        }

        let lead = &request.lead;
        let to_email = lead
            .email
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .ok_or_else(|| ExecutionError::MissingRecipient {
                lead_id: lead.id.clone(),
            })?
            .to_string();

        let reservation = match &self.gate {
            Some(gate) => match gate.try_acquire(now).await? {
                GateDecision::Permitted(reservation) => Some(reservation),
                GateDecision::Deferred { until, reason } => {
                    info!(
                        lead_id = %lead.id,
                        step_id = %step.id,
                        %reason,
                        retry_at = %until,
                        "Step execution deferred by warmup"
                    );
                    return Ok(ExecutionOutcome::Deferred {
                        retry_at: until,
                        reason,
                    });
                }
            },
            None => None,
        };

        let (email, validation) = match self.compose(&request, &step).await {
            Ok(composed) => composed,
            Err(e) => {
                self.release(reservation).await;
                return Err(e);
            }
        };

        if self.config.block_invalid
            && let Some(v) = &validation
            && !v.is_valid
        {
            warn!(lead_id = %lead.id, step_id = %step.id, errors = ?v.errors, "Blocking invalid email");
            self.release(reservation).await;
            return Ok(ExecutionOutcome::Rejected {
                email,
                validation: v.clone(),
            });
        }

        let first_name = lead.first_name();
        let send = SendRequest {
            lead_id: lead.id.clone(),
            to_email,
            subject: email.subject.replace(NAME_PLACEHOLDER, first_name),
            body: email.body.replace(NAME_PLACEHOLDER, first_name),
            campaign_id: request.campaign_id.clone(),
            sequence_step_id: Some(step.id.clone()),
        };

        let delivered = self.delivery.deliver(send.clone()).await;
        let status = if delivered.is_ok() {
            SendStatus::Sent
        } else {
            SendStatus::Failed
        };

        let logged = self
            .db
            .insert_email_log(&LogRecord {
                lead_id: send.lead_id.clone(),
                campaign_id: send.campaign_id.clone(),
                sequence_step_id: send.sequence_step_id.clone(),
                subject: send.subject.clone(),
                body: send.body.clone(),
                status,
                sent_at: now,
            })
            .await;

        if let Err(e) = delivered {
            warn!(lead_id = %lead.id, step_id = %step.id, error = %e, "Delivery hand-off failed");
            self.release(reservation).await;
            return Err(e.into());
        }
        logged?;

        info!(
            lead_id = %lead.id,
            campaign_id = %request.campaign_id,
            step_id = %step.id,
            "Sequence step sent"
        );
        Ok(ExecutionOutcome::Sent {
            request: send,
            validation,
        })
    }

    /// The next step due for a lead, from its send history.
    ///
    /// Timing is measured from the last successful send, or from `enrolled_at`
    /// when nothing was sent yet.
    pub async fn next_due(
        &self,
        campaign_id: &str,
        lead_id: &str,
        enrolled_at: DateTime<Utc>,
    ) -> Result<Option<DueStep>, ExecutionError> {
        let sequence = self.db.load_sequence(campaign_id).await?;
        let logs = self.db.list_email_logs(campaign_id, Some(lead_id)).await?;

        let last_sent = logs
            .iter()
            .filter(|log| log.status == SendStatus::Sent)
            .filter_map(|log| {
                let step_id = log.sequence_step_id.as_deref()?;
                Some((sequence.position(step_id)?, log.sent_at))
            })
            .max_by_key(|(index, _)| *index);

        Ok(match last_sent {
            Some((index, sent_at)) => sequence.next_due(Some(index), sent_at),
            None => sequence.next_due(None, enrolled_at),
        })
    }

    async fn compose(
        &self,
        request: &ExecuteRequest,
        step: &SequenceStep,
    ) -> Result<(GeneratedEmail, Option<ValidationResult>), ExecutionError> {
        if let Some(manual) = &request.manual {
            return Ok((
                GeneratedEmail {
                    subject: manual.subject.clone(),
                    body: manual.body.clone(),
                },
                None,
            ));
        }

        let context = prompt_context_for(&request.lead, step, request.company_info.clone());
        let options = GenerationOptions {
            validate_output: true,
            ..request.options.clone()
        };
        let result = self.generator.generate_email(&context, &options).await?;

        let mut email = result.email;
        if let Some(subject) = step.config.subject.as_deref().filter(|s| !s.trim().is_empty()) {
            email.subject = subject.to_string();
        }
        Ok((email, result.validation))
    }

    async fn release(&self, reservation: Option<SendReservation>) {
        if let (Some(gate), Some(reservation)) = (&self.gate, reservation)
            && let Err(e) = gate.release(reservation).await
        {
            warn!(error = %e, "Failed to release warmup reservation");
        }
    }
}

/// Prompt context for a sequence step: the lead's profile, professional tone,
/// the step name and prompt as campaign context, and the persona when stored.
pub fn prompt_context_for(
    lead: &Lead,
    step: &SequenceStep,
    company_info: Option<CompanyInfo>,
) -> PromptContext {
    let campaign_context = match step.config.prompt.as_deref() {
        Some(prompt) if !prompt.trim().is_empty() => format!("{}: {}", step.name, prompt),
        _ => step.name.clone(),
    };

    PromptContext {
        tone: Tone::Professional,
        company_info,
        campaign_context: Some(campaign_context),
        ..PromptContext::from_lead(lead)
    }
}
