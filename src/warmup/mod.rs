//! Warmup policy: a daily volume ramp plus a local send window, enforced
//! before every send.

pub mod gate;
pub mod settings;

pub use gate::{
    DEFAULT_RAMP_SCHEDULE, DeferReason, GateDecision, SendReservation, WarmupGate, spawn_ramp_ticker,
};
pub use settings::WarmupSettings;
