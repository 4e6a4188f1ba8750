//! Strict warmup enforcement for one sending account.
//!
//! A send is permitted only when warmup is disabled, or when the local time is
//! inside the send window and today's counter is below the current daily limit.
//! Anything else is deferred with the instant it may be retried; nothing is
//! dropped and nothing slips through.

use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Days, NaiveDate, NaiveDateTime, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::WarmupError;
use crate::store::Database;
use crate::warmup::settings::WarmupSettings;

/// Why a send was deferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeferReason {
    OutsideWindow,
    DailyLimitReached,
}

impl std::fmt::Display for DeferReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OutsideWindow => write!(f, "outside send window"),
            Self::DailyLimitReached => write!(f, "daily limit reached"),
        }
    }
}

/// A slot taken from the daily counter. Hand it back with
/// [`WarmupGate::release`] if the send does not happen.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub struct SendReservation {
    account_id: String,
    /// `None` when warmup was disabled and nothing was counted.
    day: Option<NaiveDate>,
}

impl SendReservation {
    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    pub fn day(&self) -> Option<NaiveDate> {
        self.day
    }

    pub fn is_metered(&self) -> bool {
        self.day.is_some()
    }
}

/// Outcome of asking the gate for a send slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    Permitted(SendReservation),
    Deferred {
        until: DateTime<Utc>,
        reason: DeferReason,
    },
}

struct Policy {
    settings: WarmupSettings,
    tz: Tz,
}

impl Policy {
    fn new(settings: WarmupSettings) -> Result<Self, WarmupError> {
        settings.validate()?;
        let tz = settings.tz()?;
        Ok(Self { settings, tz })
    }

    /// Next time the window opens, strictly after `local`.
    fn next_opening(&self, local: NaiveDateTime) -> DateTime<Utc> {
        let start = self.settings.send_window_start;
        let date = local.date();
        let today = date.and_hms_opt(start, 0, 0).unwrap_or(local);
        let opening = if local < today {
            today
        } else {
            today + Days::new(1)
        };
        self.to_utc(opening)
    }

    /// First in-window instant of the day after `day`.
    fn next_day_opening(&self, day: NaiveDate) -> DateTime<Utc> {
        let next = day + Days::new(1);
        let hour = if self.settings.in_window(0) {
            0
        } else {
            self.settings.send_window_start
        };
        let opening = next
            .and_hms_opt(hour, 0, 0)
            .unwrap_or_else(|| next.and_time(chrono::NaiveTime::MIN));
        self.to_utc(opening)
    }

    fn to_utc(&self, local: NaiveDateTime) -> DateTime<Utc> {
        // A wall-clock time skipped by a DST jump resolves to the hour after.
        self.tz
            .from_local_datetime(&local)
            .earliest()
            .or_else(|| {
                self.tz
                    .from_local_datetime(&(local + chrono::Duration::hours(1)))
                    .earliest()
            })
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|| local.and_utc())
    }
}

/// Warmup gate bound to one sending account.
pub struct WarmupGate {
    account_id: String,
    db: Arc<dyn Database>,
    policy: RwLock<Policy>,
}

impl WarmupGate {
    pub fn new(
        account_id: impl Into<String>,
        settings: WarmupSettings,
        db: Arc<dyn Database>,
    ) -> Result<Self, WarmupError> {
        Ok(Self {
            account_id: account_id.into(),
            db,
            policy: RwLock::new(Policy::new(settings)?),
        })
    }

    /// Build a gate from stored settings, falling back to `default` when the
    /// account has none yet.
    pub async fn load(
        account_id: impl Into<String>,
        db: Arc<dyn Database>,
        default: WarmupSettings,
    ) -> Result<Self, WarmupError> {
        let account_id = account_id.into();
        let settings = db
            .load_warmup_settings(&account_id)
            .await?
            .unwrap_or(default);
        Self::new(account_id, settings, db)
    }

    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    pub async fn settings(&self) -> WarmupSettings {
        self.policy.read().await.settings.clone()
    }

    /// Validate, persist, then swap in new settings.
    pub async fn update_settings(&self, settings: WarmupSettings) -> Result<(), WarmupError> {
        let policy = Policy::new(settings)?;
        self.db
            .save_warmup_settings(&self.account_id, &policy.settings)
            .await?;
        *self.policy.write().await = policy;
        info!(account = %self.account_id, "Warmup settings updated");
        Ok(())
    }

    /// Ask for a send slot at `now`.
    pub async fn try_acquire(&self, now: DateTime<Utc>) -> Result<GateDecision, WarmupError> {
        let policy = self.policy.read().await;
        let settings = &policy.settings;

        if !settings.enabled {
            return Ok(GateDecision::Permitted(SendReservation {
                account_id: self.account_id.clone(),
                day: None,
            }));
        }

        let local = now.with_timezone(&policy.tz).naive_local();
        if !settings.in_window(local.hour()) {
            let until = policy.next_opening(local);
            debug!(account = %self.account_id, %until, "Send deferred, outside window");
            return Ok(GateDecision::Deferred {
                until,
                reason: DeferReason::OutsideWindow,
            });
        }

        let day = local.date();
        let reserved = self
            .db
            .try_reserve_send(&self.account_id, day, settings.current_daily_limit)
            .await?;

        if reserved {
            Ok(GateDecision::Permitted(SendReservation {
                account_id: self.account_id.clone(),
                day: Some(day),
            }))
        } else {
            let until = policy.next_day_opening(day);
            info!(
                account = %self.account_id,
                limit = settings.current_daily_limit,
                %until,
                "Daily send limit reached, deferring"
            );
            Ok(GateDecision::Deferred {
                until,
                reason: DeferReason::DailyLimitReached,
            })
        }
    }

    /// Return an unused slot to the counter.
    pub async fn release(&self, reservation: SendReservation) -> Result<(), WarmupError> {
        if let Some(day) = reservation.day {
            self.db.release_send(&reservation.account_id, day).await?;
            debug!(account = %reservation.account_id, %day, "Send reservation released");
        }
        Ok(())
    }

    /// Apply one ramp step and persist it when the limit changed.
    pub async fn ramp_up(&self) -> Result<bool, WarmupError> {
        let mut policy = self.policy.write().await;
        let mut next = policy.settings.clone();
        if !next.ramp_up() {
            return Ok(false);
        }
        self.db.save_warmup_settings(&self.account_id, &next).await?;
        info!(
            account = %self.account_id,
            daily_limit = next.current_daily_limit,
            max = next.max_daily_limit,
            "Warmup limit ramped up"
        );
        policy.settings = next;
        Ok(true)
    }
}

/// Daily at midnight UTC.
pub const DEFAULT_RAMP_SCHEDULE: &str = "0 0 0 * * *";

/// Spawn a task that ramps `gate` up on every fire of the cron `schedule`.
pub fn spawn_ramp_ticker(
    gate: Arc<WarmupGate>,
    schedule: &str,
) -> Result<tokio::task::JoinHandle<()>, WarmupError> {
    let schedule = cron::Schedule::from_str(schedule)
        .map_err(|e| WarmupError::InvalidSchedule(format!("{schedule}: {e}")))?;

    Ok(tokio::spawn(async move {
        loop {
            let Some(next) = schedule.upcoming(Utc).next() else {
                warn!(account = %gate.account_id(), "Ramp schedule has no upcoming fire, stopping");
                break;
            };
            let wait = (next - Utc::now()).to_std().unwrap_or_default();
            tokio::time::sleep(wait).await;

            if let Err(e) = gate.ramp_up().await {
                warn!(account = %gate.account_id(), error = %e, "Warmup ramp failed");
            }
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::LibSqlBackend;

    async fn gate_with(settings: WarmupSettings) -> (WarmupGate, Arc<dyn Database>) {
        let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        (WarmupGate::new("acct-1", settings, Arc::clone(&db)).unwrap(), db)
    }

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    fn limited(limit: u32) -> WarmupSettings {
        WarmupSettings {
            current_daily_limit: limit,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn disabled_always_permits_without_counting() {
        let (gate, db) = gate_with(WarmupSettings {
            enabled: false,
            current_daily_limit: 0,
            ..Default::default()
        })
        .await;

        let decision = gate.try_acquire(at(2026, 3, 2, 3, 0)).await.unwrap();
        match decision {
            GateDecision::Permitted(r) => assert!(!r.is_metered()),
            other => panic!("expected permit, got {other:?}"),
        }
        let day = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        assert_eq!(db.sends_on("acct-1", day).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn outside_window_defers_to_opening() {
        let (gate, _) = gate_with(limited(5)).await;

        let early = gate.try_acquire(at(2026, 3, 2, 7, 30)).await.unwrap();
        assert_eq!(
            early,
            GateDecision::Deferred {
                until: at(2026, 3, 2, 9, 0),
                reason: DeferReason::OutsideWindow,
            }
        );

        let late = gate.try_acquire(at(2026, 3, 2, 17, 0)).await.unwrap();
        assert_eq!(
            late,
            GateDecision::Deferred {
                until: at(2026, 3, 3, 9, 0),
                reason: DeferReason::OutsideWindow,
            }
        );
    }

    #[tokio::test]
    async fn window_uses_local_time() {
        let (gate, _) = gate_with(WarmupSettings {
            timezone: "America/New_York".into(),
            ..limited(5)
        })
        .await;

        // 14:00 UTC is 09:00 in New York (EST, UTC-5).
        let open = gate.try_acquire(at(2026, 1, 15, 14, 0)).await.unwrap();
        assert!(matches!(open, GateDecision::Permitted(_)));

        // 13:00 UTC is 08:00 local; opens at 14:00 UTC.
        let closed = gate.try_acquire(at(2026, 1, 15, 13, 0)).await.unwrap();
        assert_eq!(
            closed,
            GateDecision::Deferred {
                until: at(2026, 1, 15, 14, 0),
                reason: DeferReason::OutsideWindow,
            }
        );
    }

    #[tokio::test]
    async fn daily_limit_defers_to_next_day() {
        let (gate, _) = gate_with(limited(2)).await;
        let now = at(2026, 3, 2, 10, 0);

        assert!(matches!(gate.try_acquire(now).await.unwrap(), GateDecision::Permitted(_)));
        assert!(matches!(gate.try_acquire(now).await.unwrap(), GateDecision::Permitted(_)));
        assert_eq!(
            gate.try_acquire(now).await.unwrap(),
            GateDecision::Deferred {
                until: at(2026, 3, 3, 9, 0),
                reason: DeferReason::DailyLimitReached,
            }
        );

        let next_day = gate.try_acquire(at(2026, 3, 3, 9, 0)).await.unwrap();
        assert!(matches!(next_day, GateDecision::Permitted(_)));
    }

    #[tokio::test]
    async fn zero_limit_never_permits() {
        let (gate, _) = gate_with(limited(0)).await;
        let decision = gate.try_acquire(at(2026, 3, 2, 10, 0)).await.unwrap();
        assert!(matches!(
            decision,
            GateDecision::Deferred {
                reason: DeferReason::DailyLimitReached,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn release_frees_a_slot() {
        let (gate, _) = gate_with(limited(1)).await;
        let now = at(2026, 3, 2, 10, 0);

        let GateDecision::Permitted(reservation) = gate.try_acquire(now).await.unwrap() else {
            panic!("first send should be permitted");
        };
        assert!(matches!(gate.try_acquire(now).await.unwrap(), GateDecision::Deferred { .. }));

        gate.release(reservation).await.unwrap();
        assert!(matches!(gate.try_acquire(now).await.unwrap(), GateDecision::Permitted(_)));
    }

    #[tokio::test]
    async fn wrapping_window_counts_from_local_midnight() {
        let (gate, _) = gate_with(WarmupSettings {
            send_window_start: 22,
            send_window_end: 6,
            ..limited(1)
        })
        .await;

        assert!(matches!(
            gate.try_acquire(at(2026, 3, 2, 23, 0)).await.unwrap(),
            GateDecision::Permitted(_)
        ));
        assert_eq!(
            gate.try_acquire(at(2026, 3, 2, 23, 30)).await.unwrap(),
            GateDecision::Deferred {
                until: at(2026, 3, 3, 0, 0),
                reason: DeferReason::DailyLimitReached,
            }
        );
        assert_eq!(
            gate.try_acquire(at(2026, 3, 2, 12, 0)).await.unwrap(),
            GateDecision::Deferred {
                until: at(2026, 3, 2, 22, 0),
                reason: DeferReason::OutsideWindow,
            }
        );
    }

    #[tokio::test]
    async fn concurrent_senders_never_exceed_limit() {
        let (gate, _) = gate_with(limited(3)).await;
        let gate = Arc::new(gate);
        let now = at(2026, 3, 2, 10, 0);

        let mut handles = Vec::new();
        for _ in 0..10 {
            let gate = Arc::clone(&gate);
            handles.push(tokio::spawn(async move { gate.try_acquire(now).await.unwrap() }));
        }

        let mut permitted = 0;
        for handle in handles {
            if matches!(handle.await.unwrap(), GateDecision::Permitted(_)) {
                permitted += 1;
            }
        }
        assert_eq!(permitted, 3);
    }

    #[tokio::test]
    async fn ramp_up_persists_new_limit() {
        let (gate, db) = gate_with(WarmupSettings {
            current_daily_limit: 45,
            max_daily_limit: 50,
            ramp_up_rate: 10,
            ..Default::default()
        })
        .await;

        assert!(gate.ramp_up().await.unwrap());
        assert!(!gate.ramp_up().await.unwrap());
        assert_eq!(gate.settings().await.current_daily_limit, 50);

        let stored = db.load_warmup_settings("acct-1").await.unwrap().unwrap();
        assert_eq!(stored.current_daily_limit, 50);

        let reloaded = WarmupGate::load("acct-1", db, WarmupSettings::default())
            .await
            .unwrap();
        assert_eq!(reloaded.settings().await.current_daily_limit, 50);
    }

    #[tokio::test]
    async fn invalid_settings_rejected() {
        let db: Arc<dyn Database> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let result = WarmupGate::new("acct-1", limited(100), Arc::clone(&db));
        assert!(matches!(result, Err(WarmupError::InvalidSettings(_))));

        let gate = WarmupGate::new("acct-1", limited(5), db).unwrap();
        assert!(gate.update_settings(limited(500)).await.is_err());
        assert_eq!(gate.settings().await.current_daily_limit, 5);
    }

    #[tokio::test]
    async fn ramp_ticker_rejects_bad_schedule() {
        let (gate, _) = gate_with(limited(5)).await;
        let result = spawn_ramp_ticker(Arc::new(gate), "whenever");
        assert!(matches!(result, Err(WarmupError::InvalidSchedule(_))));
    }

    #[test]
    fn default_schedule_parses() {
        assert!(cron::Schedule::from_str(DEFAULT_RAMP_SCHEDULE).is_ok());
    }
}
