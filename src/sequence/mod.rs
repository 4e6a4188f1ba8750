//! Drip sequences: the step model, execution of a step for a lead, and the
//! delivery hand-off.

pub mod delivery;
pub mod executor;
pub mod model;

pub use delivery::{ChannelDelivery, DeliverySink};
pub use executor::{
    ExecuteRequest, ExecutionOutcome, ExecutorConfig, ManualContent, SequenceExecutor,
    prompt_context_for,
};
pub use model::{
    DueStep, Sequence, SequenceStep, StepConfig, StepConfigUpdate, StepMetaUpdate, StepType,
};
