//! Outreach engine: personalized cold-email generation and drip sequencing
//! under a warmup policy.

pub mod campaign;
pub mod config;
pub mod error;
pub mod llm;
pub mod outreach;
pub mod sequence;
pub mod store;
pub mod warmup;
