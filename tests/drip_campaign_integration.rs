//! End-to-end drip campaign against a file-backed store.
//!
//! Builds a sequence through the editing API, persists it with version
//! checks, then walks two leads through it with the warmup gate enforcing
//! a one-send-per-day limit.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde_json::json;

use outreach_engine::campaign::{Lead, SendStatus};
use outreach_engine::error::{DatabaseError, LlmError};
use outreach_engine::llm::{
    CompletionRequest, CompletionResponse, FinishReason, LlmBackend, LlmProvider, ProviderRegistry,
};
use outreach_engine::outreach::{EmailGenerator, GenerationOptions, GeneratorConfig};
use outreach_engine::sequence::{
    ChannelDelivery, ExecuteRequest, ExecutionOutcome, ExecutorConfig, Sequence, SequenceExecutor,
    SequenceStep,
};
use outreach_engine::store::{Database, LibSqlBackend};
use outreach_engine::warmup::{DeferReason, WarmupGate, WarmupSettings};

/// Stub LLM provider (no real API calls).
struct StubLlm;

#[async_trait]
impl LlmProvider for StubLlm {
    fn backend(&self) -> LlmBackend {
        LlmBackend::Gateway
    }

    fn model_name(&self) -> &str {
        "stub"
    }

    fn cost_per_token(&self) -> (Decimal, Decimal) {
        (Decimal::ZERO, Decimal::ZERO)
    }

    async fn complete(&self, _request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        Ok(CompletionResponse {
            content: r#"{"subject":"An idea for your team","body":"Hi {{name}},\n\nOne thought on onboarding.\n\nBest,\nSam"}"#
                .to_string(),
            usage: None,
            finish_reason: FinishReason::Stop,
        })
    }
}

fn generator() -> Arc<EmailGenerator> {
    let mut registry = ProviderRegistry::new();
    registry.register(Arc::new(StubLlm));
    Arc::new(EmailGenerator::new(
        Arc::new(registry),
        GeneratorConfig {
            call_timeout: Duration::from_secs(5),
            batch_interval: Duration::ZERO,
        },
    ))
}

fn lead(id: &str, name: &str) -> Lead {
    Lead::from_json(
        &json!({
            "id": id,
            "email": format!("{id}@example.com"),
            "name": name,
            "position": "VP Operations",
            "company": "Globex",
            "requirement": "Faster customer onboarding",
        })
        .to_string(),
    )
    .unwrap()
}

fn request(step_id: &str, lead: Lead) -> ExecuteRequest {
    ExecuteRequest {
        campaign_id: "spring".into(),
        step_id: step_id.into(),
        lead,
        manual: None,
        company_info: None,
        options: GenerationOptions::default(),
    }
}

fn at(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 4, day, hour, 0, 0).unwrap()
}

/// Build and persist: initial outreach, a 1-day pause, then a follow-up
/// 3 days after the pause.
async fn build_sequence(db: &dyn Database) -> Vec<String> {
    let mut sequence = db.load_sequence("spring").await.unwrap();
    assert!(sequence.is_empty());
    assert_eq!(sequence.version, 0);

    let intro = sequence.add_step().id.clone();
    let follow_up = sequence.add_step().id.clone();
    let pause = SequenceStep::delay("Pause", 1);
    let pause_id = pause.id.clone();
    sequence.steps.push(pause);
    sequence.move_step(&pause_id, 1).unwrap();

    let patch = json!({"delayDays": 3, "subject": "Circling back"});
    sequence
        .update_step(&follow_up, patch.as_object().unwrap())
        .unwrap();
    let rename = json!({"name": "Intro"});
    sequence.update_step(&intro, rename.as_object().unwrap()).unwrap();
    sequence.validate().unwrap();

    sequence.version = db.save_sequence("spring", &sequence).await.unwrap();
    assert_eq!(sequence.version, 1);

    vec![intro, pause_id, follow_up]
}

#[tokio::test]
async fn concurrent_sequence_edits_conflict() {
    let db = LibSqlBackend::new_memory().await.unwrap();
    build_sequence(&db).await;

    let mut first = db.load_sequence("spring").await.unwrap();
    let mut second: Sequence = db.load_sequence("spring").await.unwrap();

    first.add_step();
    first.version = db.save_sequence("spring", &first).await.unwrap();
    assert_eq!(first.version, 2);

    let intro = second.steps[0].id.clone();
    second.remove_step(&intro).unwrap();
    let err = db.save_sequence("spring", &second).await.unwrap_err();
    match err {
        DatabaseError::VersionConflict {
            expected, found, ..
        } => {
            assert_eq!(expected, 1);
            assert_eq!(found, 2);
        }
        other => panic!("Expected VersionConflict, got {:?}", other),
    }

    let stored = db.load_sequence("spring").await.unwrap();
    assert_eq!(stored.len(), 4);
    assert_eq!(stored.steps[3].name, "Follow-up 3");
}

#[tokio::test]
async fn two_leads_walk_the_sequence_under_warmup() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("outreach.db");
    let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_local(&path).await.unwrap());
    let steps = build_sequence(db.as_ref()).await;

    let gate = WarmupGate::load("sales@globex.test", Arc::clone(&db), WarmupSettings::default())
        .await
        .unwrap();
    gate.update_settings(WarmupSettings {
        current_daily_limit: 1,
        max_daily_limit: 3,
        ramp_up_rate: 1,
        ..WarmupSettings::default()
    })
    .await
    .unwrap();

    let (sink, mut rx) = ChannelDelivery::new(8);
    let executor = SequenceExecutor::new(
        generator(),
        Arc::clone(&db),
        Arc::new(sink),
        ExecutorConfig::default(),
    )
    .with_warmup(Arc::new(gate));

    // Before the window opens nothing is generated.
    let outcome = executor
        .execute_at(request(&steps[0], lead("ada", "Ada Lovelace")), at(6, 7))
        .await
        .unwrap();
    assert_eq!(
        outcome,
        ExecutionOutcome::Deferred {
            retry_at: at(6, 9),
            reason: DeferReason::OutsideWindow,
        }
    );

    // Day one: Ada takes the only slot, Grace is pushed to tomorrow's window.
    let outcome = executor
        .execute_at(request(&steps[0], lead("ada", "Ada Lovelace")), at(6, 10))
        .await
        .unwrap();
    assert!(matches!(outcome, ExecutionOutcome::Sent { .. }));
    let sent = rx.recv().await.unwrap();
    assert_eq!(sent.to_email, "ada@example.com");
    assert!(sent.body.starts_with("Hi Ada,"));

    let outcome = executor
        .execute_at(request(&steps[0], lead("grace", "Grace Hopper")), at(6, 11))
        .await
        .unwrap();
    assert_eq!(
        outcome,
        ExecutionOutcome::Deferred {
            retry_at: at(7, 9),
            reason: DeferReason::DailyLimitReached,
        }
    );

    // Ada's next step skips the pause and lands 1 + 3 days after the send.
    let due = executor
        .next_due("spring", "ada", at(6, 0))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(due.step_id, steps[2]);
    assert_eq!(due.due_at, at(10, 10));

    // Grace has not been sent anything, so her first step is due at enrolment.
    let due = executor
        .next_due("spring", "grace", at(6, 0))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(due.step_id, steps[0]);
    assert_eq!(due.due_at, at(6, 0));

    // Day two: Grace goes out.
    let outcome = executor
        .execute_at(request(&steps[0], lead("grace", "Grace Hopper")), at(7, 9))
        .await
        .unwrap();
    assert!(matches!(outcome, ExecutionOutcome::Sent { .. }));
    assert_eq!(rx.recv().await.unwrap().to_email, "grace@example.com");

    // Day ten: Ada's follow-up uses the step subject, then she is done.
    let outcome = executor
        .execute_at(request(&steps[2], lead("ada", "Ada Lovelace")), at(10, 10))
        .await
        .unwrap();
    let ExecutionOutcome::Sent { request: follow_up, .. } = outcome else {
        panic!("expected the follow-up to send");
    };
    assert_eq!(follow_up.subject, "Circling back");
    assert_eq!(follow_up.sequence_step_id.as_deref(), Some(steps[2].as_str()));
    assert!(executor.next_due("spring", "ada", at(6, 0)).await.unwrap().is_none());

    let logs = db.list_email_logs("spring", None).await.unwrap();
    assert_eq!(logs.len(), 3);
    assert!(logs.iter().all(|log| log.status == SendStatus::Sent));

    // Counters and settings survive a reopen.
    drop(executor);
    drop(db);
    let reopened = LibSqlBackend::new_local(&path).await.unwrap();
    let day_one = at(6, 0).date_naive();
    assert_eq!(reopened.sends_on("sales@globex.test", day_one).await.unwrap(), 1);
    let settings = reopened
        .load_warmup_settings("sales@globex.test")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(settings.current_daily_limit, 1);
    assert_eq!(reopened.load_sequence("spring").await.unwrap().len(), 3);
}
