use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};
use tokio_util::sync::CancellationToken;

use outreach_engine::campaign::Lead;
use outreach_engine::config::EngineConfig;
use outreach_engine::llm::{LlmBackend, ProviderRegistry};
use outreach_engine::outreach::{
    CompanyInfo, EmailGenerator, GeneratedEmail, PromptContext, Tone, validate_email,
};
use outreach_engine::sequence::{
    ChannelDelivery, ExecuteRequest, ExecutionOutcome, ExecutorConfig, SequenceExecutor,
};
use outreach_engine::store::{Database, LibSqlBackend};
use outreach_engine::warmup::{self, WarmupGate, WarmupSettings};

/// Cold-outreach email generation and drip sequencing
#[derive(Parser, Debug)]
#[command(name = "outreach-engine", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate one email for a lead
    Generate {
        /// Lead record (JSON)
        lead: PathBuf,

        #[command(flatten)]
        prompt: PromptArgs,

        /// Writing style
        #[arg(long, value_enum, default_value_t = ToneArg::Professional)]
        tone: ToneArg,
    },

    /// Generate emails for a list of leads, one call at a time
    Batch {
        /// JSON array of lead records
        leads: PathBuf,

        #[command(flatten)]
        prompt: PromptArgs,
    },

    /// Estimate the cost of generating for a lead on every backend
    Estimate {
        /// Lead record (JSON)
        lead: PathBuf,

        /// Company info (JSON)
        #[arg(long)]
        company: Option<PathBuf>,
    },

    /// Check a generated email against the deliverability rules
    Validate {
        /// Generated email (JSON with subject and body)
        email: PathBuf,
    },

    /// Show a campaign's sequence
    Sequence {
        campaign_id: String,

        /// Append a default email step before printing
        #[arg(long)]
        add: bool,
    },

    /// Run one sequence step for a lead through the warmup gate
    Execute {
        campaign_id: String,
        step_id: String,

        /// Lead record (JSON)
        lead: PathBuf,

        /// Company info (JSON)
        #[arg(long)]
        company: Option<PathBuf>,

        /// Refuse to send emails that fail validation
        #[arg(long)]
        block_invalid: bool,
    },

    /// Run the daily warmup ramp until interrupted
    Ramp {
        /// Six-field cron expression (sec min hour day month weekday)
        #[arg(long, default_value = warmup::DEFAULT_RAMP_SCHEDULE)]
        schedule: String,
    },
}

/// Options shared by the generating commands.
#[derive(Args, Debug, Default)]
struct PromptArgs {
    /// Company info (JSON)
    #[arg(long)]
    company: Option<PathBuf>,

    /// Free-text campaign context
    #[arg(long)]
    context: Option<String>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum ToneArg {
    Professional,
    Casual,
    Friendly,
    Direct,
}

impl From<ToneArg> for Tone {
    fn from(tone: ToneArg) -> Self {
        match tone {
            ToneArg::Professional => Tone::Professional,
            ToneArg::Casual => Tone::Casual,
            ToneArg::Friendly => Tone::Friendly,
            ToneArg::Direct => Tone::Direct,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = EngineConfig::from_env()?;

    match cli.command {
        Command::Validate { email } => {
            let email: GeneratedEmail = read_json(&email)?;
            print_json(&validate_email(&email))
        }
        Command::Estimate { lead, company } => {
            let generator = build_generator(&config)?;
            let prompt = PromptArgs {
                company,
                context: None,
            };
            let context = prompt_context(&lead, &prompt, Tone::default())?;
            let estimates: Vec<_> = LlmBackend::ALL
                .iter()
                .map(|backend| generator.estimate_cost(&context, *backend))
                .collect();
            print_json(&estimates)
        }
        Command::Generate { lead, prompt, tone } => {
            config.require_default_credential()?;
            let generator = build_generator(&config)?;
            let context = prompt_context(&lead, &prompt, tone.into())?;
            let result = generator
                .generate_email(&context, &config.generation_options())
                .await?;
            print_json(&result)
        }
        Command::Batch { leads, prompt } => {
            config.require_default_credential()?;
            let generator = build_generator(&config)?;
            let leads = read_leads(&leads)?;
            let company = read_company(prompt.company.as_deref())?;
            let contexts: Vec<PromptContext> = leads
                .iter()
                .map(|lead| PromptContext {
                    company_info: company.clone(),
                    campaign_context: prompt.context.clone(),
                    ..PromptContext::from_lead(lead)
                })
                .collect();

            let cancel = CancellationToken::new();
            let on_ctrl_c = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    on_ctrl_c.cancel();
                }
            });

            let results = generator
                .generate_batch_with_cancel(&contexts, &config.generation_options(), &cancel)
                .await;
            print_json(&results)
        }
        Command::Sequence { campaign_id, add } => {
            let db = open_db(&config).await?;
            let mut sequence = db.load_sequence(&campaign_id).await?;
            if add {
                sequence.add_step();
                sequence.version = db.save_sequence(&campaign_id, &sequence).await?;
            }
            print_json(&sequence)
        }
        Command::Execute {
            campaign_id,
            step_id,
            lead,
            company,
            block_invalid,
        } => {
            let db = open_db(&config).await?;
            let generator = Arc::new(build_generator(&config)?);
            let lead = read_lead(&lead)?;

            let gate = WarmupGate::load(&config.account_id, Arc::clone(&db), WarmupSettings::default())
                .await?;
            let (sink, mut rx) = ChannelDelivery::new(16);
            let executor = SequenceExecutor::new(
                generator,
                Arc::clone(&db),
                Arc::new(sink),
                ExecutorConfig { block_invalid },
            )
            .with_warmup(Arc::new(gate));

            let outcome = executor
                .execute(ExecuteRequest {
                    campaign_id,
                    step_id,
                    lead,
                    manual: None,
                    company_info: read_company(company.as_deref())?,
                    options: config.generation_options(),
                })
                .await?;

            if let ExecutionOutcome::Sent { .. } = &outcome
                && let Ok(request) = rx.try_recv()
            {
                print_json(&request)?;
            }
            match outcome {
                ExecutionOutcome::Sent { .. } => Ok(()),
                ExecutionOutcome::Deferred { retry_at, reason } => {
                    eprintln!("Deferred ({reason}); retry at {retry_at}");
                    Ok(())
                }
                ExecutionOutcome::Rejected { validation, .. } => {
                    eprintln!("Rejected: {}", validation.errors.join("; "));
                    std::process::exit(1);
                }
            }
        }
        Command::Ramp { schedule } => {
            let db = open_db(&config).await?;
            let gate = Arc::new(
                WarmupGate::load(&config.account_id, db, WarmupSettings::default()).await?,
            );
            let handle = warmup::spawn_ramp_ticker(Arc::clone(&gate), &schedule)?;
            let days_to_max = gate.settings().await.days_to_max_capacity();
            eprintln!(
                "Ramping account '{}' on '{schedule}' (days to max: {days_to_max:?}). Ctrl-C to stop.",
                gate.account_id(),
            );
            tokio::signal::ctrl_c().await?;
            handle.abort();
            Ok(())
        }
    }
}

fn build_generator(config: &EngineConfig) -> anyhow::Result<EmailGenerator> {
    let registry = ProviderRegistry::from_settings(config.llm.clone())?;
    Ok(EmailGenerator::new(Arc::new(registry), config.generator_config()))
}

async fn open_db(config: &EngineConfig) -> anyhow::Result<Arc<dyn Database>> {
    let backend = LibSqlBackend::new_local(&config.db_path)
        .await
        .with_context(|| format!("failed to open database at {}", config.db_path.display()))?;
    Ok(Arc::new(backend))
}

fn prompt_context(lead: &Path, prompt: &PromptArgs, tone: Tone) -> anyhow::Result<PromptContext> {
    let lead = read_lead(lead)?;
    Ok(PromptContext {
        tone,
        company_info: read_company(prompt.company.as_deref())?,
        campaign_context: prompt.context.clone(),
        ..PromptContext::from_lead(&lead)
    })
}

fn read_lead(path: &Path) -> anyhow::Result<Lead> {
    let raw = read_file(path)?;
    Lead::from_json(&raw).with_context(|| format!("invalid lead in {}", path.display()))
}

fn read_leads(path: &Path) -> anyhow::Result<Vec<Lead>> {
    let raw = read_file(path)?;
    Lead::list_from_json(&raw).with_context(|| format!("invalid leads in {}", path.display()))
}

fn read_company(path: Option<&Path>) -> anyhow::Result<Option<CompanyInfo>> {
    path.map(read_json).transpose()
}

fn read_file(path: &Path) -> anyhow::Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let raw = read_file(path)?;
    serde_json::from_str(&raw).with_context(|| format!("invalid JSON in {}", path.display()))
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
