//! Tick scheduling on top of a coarse recurring alarm.
//!
//! The alarm backend only knows how to schedule and cancel named recurring
//! alarms. Fires are delivered as [`AlarmFired`] messages and consumed by the
//! coordinator, which applies exactly one engine tick per fire. Wake-ups
//! missed while the process was suspended are dropped rather than replayed.
//!
//! Every schedule carries a generation number that comes back on each fire.
//! A fire queued before a disarm keeps its old generation, so it is rejected
//! even after the alarm is armed again.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Duration, Instant, MissedTickBehavior};
use tracing::debug;

use super::timer::Directive;

// ============================================================================
// Constants
// ============================================================================

/// Name of the recurring alarm driving the Pomodoro countdown.
pub const ALARM_NAME: &str = "pomodoroTimer";

// ============================================================================
// AlarmBackend
// ============================================================================

/// A named alarm fired by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlarmFired {
    /// Alarm name passed to `schedule`
    pub name: String,
    /// Generation passed to `schedule`
    pub generation: u64,
}

/// Recurring wake-up primitive.
///
/// Precision is not guaranteed: fires may arrive late, and fires missed
/// during suspension are coalesced.
pub trait AlarmBackend: Send {
    /// Schedules `name` to fire every `period`, replacing any alarm with the
    /// same name. Each fire carries `generation`.
    fn schedule(&mut self, name: &str, period: Duration, generation: u64);

    /// Cancels `name`. Cancelling an unknown alarm is a no-op.
    fn cancel(&mut self, name: &str);
}

// ============================================================================
// TokioAlarms
// ============================================================================

/// Alarm backend running one tokio interval task per alarm.
pub struct TokioAlarms {
    fired_tx: mpsc::UnboundedSender<AlarmFired>,
    tasks: HashMap<String, JoinHandle<()>>,
}

impl TokioAlarms {
    /// Creates a backend delivering fires into `fired_tx`.
    pub fn new(fired_tx: mpsc::UnboundedSender<AlarmFired>) -> Self {
        Self {
            fired_tx,
            tasks: HashMap::new(),
        }
    }
}

impl AlarmBackend for TokioAlarms {
    fn schedule(&mut self, name: &str, period: Duration, generation: u64) {
        self.cancel(name);

        let tx = self.fired_tx.clone();
        let alarm = name.to_string();
        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;
                let fired = AlarmFired {
                    name: alarm.clone(),
                    generation,
                };
                if tx.send(fired).is_err() {
                    debug!("Alarm receiver closed, stopping {}", alarm);
                    break;
                }
            }
        });

        debug!("Alarm {} scheduled every {:?} (generation {})", name, period, generation);
        self.tasks.insert(name.to_string(), handle);
    }

    fn cancel(&mut self, name: &str) {
        if let Some(handle) = self.tasks.remove(name) {
            handle.abort();
            debug!("Alarm {} cancelled", name);
        }
    }
}

impl Drop for TokioAlarms {
    fn drop(&mut self) {
        for (_, handle) in self.tasks.drain() {
            handle.abort();
        }
    }
}

// ============================================================================
// ManualAlarms
// ============================================================================

/// A call recorded by [`ManualAlarms`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlarmCall {
    /// `schedule(name, period, generation)`
    Schedule(String, Duration, u64),
    /// `cancel(name)`
    Cancel(String),
}

#[derive(Debug, Default)]
struct ManualAlarmLog {
    active: HashMap<String, (Duration, u64)>,
    calls: Vec<AlarmCall>,
}

/// Alarm backend that only fires when told to.
///
/// Clones share the same log, so a test can keep one handle while the
/// scheduler owns another.
#[derive(Debug, Clone)]
pub struct ManualAlarms {
    fired_tx: mpsc::UnboundedSender<AlarmFired>,
    log: Arc<Mutex<ManualAlarmLog>>,
}

impl ManualAlarms {
    /// Creates a backend delivering fires into `fired_tx`.
    pub fn new(fired_tx: mpsc::UnboundedSender<AlarmFired>) -> Self {
        Self {
            fired_tx,
            log: Arc::new(Mutex::new(ManualAlarmLog::default())),
        }
    }

    fn with_log<R>(&self, f: impl FnOnce(&mut ManualAlarmLog) -> R) -> R {
        let mut log = self.log.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut log)
    }

    /// Delivers one fire for `name`, whether or not it is scheduled.
    ///
    /// The fire carries the generation `name` is currently scheduled with,
    /// or 0 when it is not scheduled.
    pub fn fire(&self, name: &str) {
        let generation = self.with_log(|log| log.active.get(name).map_or(0, |(_, g)| *g));
        let _ = self.fired_tx.send(AlarmFired {
            name: name.to_string(),
            generation,
        });
    }

    /// Returns true if `name` is currently scheduled.
    pub fn is_scheduled(&self, name: &str) -> bool {
        self.with_log(|log| log.active.contains_key(name))
    }

    /// Returns the period `name` is scheduled with.
    pub fn period(&self, name: &str) -> Option<Duration> {
        self.with_log(|log| log.active.get(name).map(|(period, _)| *period))
    }

    /// Returns every recorded call in order.
    pub fn calls(&self) -> Vec<AlarmCall> {
        self.with_log(|log| log.calls.clone())
    }
}

impl AlarmBackend for ManualAlarms {
    fn schedule(&mut self, name: &str, period: Duration, generation: u64) {
        self.with_log(|log| {
            log.active.insert(name.to_string(), (period, generation));
            log.calls
                .push(AlarmCall::Schedule(name.to_string(), period, generation));
        });
    }

    fn cancel(&mut self, name: &str) {
        self.with_log(|log| {
            log.active.remove(name);
            log.calls.push(AlarmCall::Cancel(name.to_string()));
        });
    }
}

// ============================================================================
// TickScheduler
// ============================================================================

/// Arms and disarms the countdown alarm.
pub struct TickScheduler {
    backend: Box<dyn AlarmBackend>,
    armed: Option<Duration>,
    generation: u64,
}

impl TickScheduler {
    /// Creates a disarmed scheduler over `backend`.
    pub fn new(backend: impl AlarmBackend + 'static) -> Self {
        Self {
            backend: Box::new(backend),
            armed: None,
            generation: 0,
        }
    }

    /// Arms the alarm. Arming again with the same period does nothing;
    /// a different period reconfigures it.
    pub fn arm(&mut self, period: Duration) {
        if self.armed == Some(period) {
            return;
        }
        self.generation += 1;
        self.backend.schedule(ALARM_NAME, period, self.generation);
        self.armed = Some(period);
    }

    /// Disarms the alarm. Safe when not armed.
    pub fn disarm(&mut self) {
        if self.armed.take().is_some() {
            self.generation += 1;
            self.backend.cancel(ALARM_NAME);
        }
    }

    /// Follows an engine directive.
    pub fn apply(&mut self, directive: Directive) {
        match directive {
            Directive::Arm(period) => self.arm(period),
            Directive::Disarm => self.disarm(),
            Directive::Keep => {}
        }
    }

    /// Returns true while armed.
    pub fn is_armed(&self) -> bool {
        self.armed.is_some()
    }

    /// Returns the armed period.
    pub fn period(&self) -> Option<Duration> {
        self.armed
    }

    /// Current arm generation.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Returns true if `fired` should drive a tick.
    ///
    /// Fires for other alarms, and fires scheduled under an earlier
    /// generation, are rejected.
    pub fn accepts(&self, fired: &AlarmFired) -> bool {
        fired.name == ALARM_NAME && self.is_armed() && fired.generation == self.generation
    }
}

// ============================================================================
// Tests
// ============================================================================
