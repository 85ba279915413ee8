//! Station State Machine
//!
//! Transition rules for the wash station display, driven by one
//! [`Classification`] per sensor sample and four deadline timers.
//!
//! ## Timers
//!
//! Each timer is either unset or holds the instant it was started. A timer is
//! started by the first sample that needs it and cleared by the transition it
//! guards. Timers a rule does not name are left alone, so a `wash_idle` timer
//! started by a brief gap during a wash keeps running when the hand comes back.
//!
//! ## Wake flag
//!
//! Waking from `Sleeping` sets a one-shot flag. The next transition that logs
//! an event reports the "wake" variant of its code and clears the flag. If no
//! logged transition follows, the flag stays set.

use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::state::{Classification, LogEvent, StationState};

/// Elapsed-time thresholds for each timed transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// Empty room in `Idle` before the screen sleeps
    pub idle: Duration,
    /// Length of the wash animation
    pub wash: Duration,
    /// Empty room during a wash before it is abandoned
    pub wash_idle: Duration,
    /// Time on the done screen before returning home
    pub done: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            idle: Duration::from_secs(10),
            wash: Duration::from_millis(25_500),
            wash_idle: Duration::from_secs(4),
            done: Duration::from_secs(4),
        }
    }
}

/// Start instants of the four deadline timers. `None` means unset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Timers {
    pub idle: Option<Instant>,
    pub wash: Option<Instant>,
    pub wash_idle: Option<Instant>,
    pub done: Option<Instant>,
}

/// Outcome of feeding one classification to the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Evaluation {
    pub state: StationState,
    /// True iff `state` differs from the state before the call
    pub changed: bool,
    /// Usage event to report. Only ever set when `changed` is true.
    pub log_event: Option<LogEvent>,
}

/// Owned station context: current state, timers and wake flag.
#[derive(Debug, Clone)]
pub struct StationStateMachine {
    state: StationState,
    timers: Timers,
    wake_flag: bool,
    timeouts: Timeouts,
}

impl StationStateMachine {
    pub fn new(timeouts: Timeouts) -> Self {
        Self {
            state: StationState::Init,
            timers: Timers::default(),
            wake_flag: false,
            timeouts,
        }
    }

    pub fn state(&self) -> StationState {
        self.state
    }

    pub fn timers(&self) -> &Timers {
        &self.timers
    }

    pub fn wake_flag(&self) -> bool {
        self.wake_flag
    }

    pub fn timeouts(&self) -> &Timeouts {
        &self.timeouts
    }

    /// Apply one classification observed at `now`.
    pub fn evaluate(&mut self, class: Classification, now: Instant) -> Evaluation {
        use Classification::*;
        use StationState::*;

        let previous = self.state;
        let mut log_event = None;

        match (previous, class) {
            (Init | Idle, Waving) => {
                self.timers.wash = Some(now);
                self.timers.idle = None;
                self.state = InWash;
            }
            (Init | Idle, Present) => {
                start_if_unset(&mut self.timers.idle, now);
            }
            (Init | Idle, Empty) => {
                if expired(&mut self.timers.idle, now, self.timeouts.idle) {
                    self.state = Sleeping;
                    log_event = Some(self.consume_wake(LogEvent::WakeSleep, LogEvent::Sleep));
                }
            }

            (Sleeping, Waving | Present) => {
                self.state = Idle;
                self.wake_flag = true;
                log_event = Some(LogEvent::WakeWaveIncomplete);
            }
            (Sleeping, Empty) => {}

            (InWash, Waving | Present) => {
                if elapsed_at_least(self.timers.wash, now, self.timeouts.wash) {
                    self.timers.wash = None;
                    self.state = Done;
                    log_event = Some(
                        self.consume_wake(LogEvent::WakeWaveComplete, LogEvent::WaveComplete),
                    );
                }
            }
            (InWash, Empty) => {
                if expired(&mut self.timers.wash_idle, now, self.timeouts.wash_idle) {
                    self.state = Idle;
                    log_event = Some(
                        self.consume_wake(LogEvent::WakeWaveIncomplete, LogEvent::WaveIncomplete),
                    );
                }
            }

            (Done, Waving) => {
                self.timers.wash = Some(now);
                self.state = InWash;
            }
            (Done, Present | Empty) => {
                if expired(&mut self.timers.done, now, self.timeouts.done) {
                    self.state = Idle;
                }
            }
        }

        let changed = self.state != previous;
        if changed {
            info!(from = %previous, to = %self.state, %class, "station state changed");
            if let Some(event) = log_event {
                debug!(event = %event, wake_flag = self.wake_flag, "transition emits log event");
            }
        }

        Evaluation {
            state: self.state,
            changed,
            log_event,
        }
    }

    /// Pick the wake variant of an event if the flag is set, clearing it.
    fn consume_wake(&mut self, woken: LogEvent, plain: LogEvent) -> LogEvent {
        if std::mem::take(&mut self.wake_flag) {
            woken
        } else {
            plain
        }
    }
}

fn start_if_unset(timer: &mut Option<Instant>, now: Instant) {
    if timer.is_none() {
        *timer = Some(now);
    }
}

fn elapsed_at_least(timer: Option<Instant>, now: Instant, timeout: Duration) -> bool {
    timer.is_some_and(|start| now.saturating_duration_since(start) >= timeout)
}

/// Start an unset timer, or report and clear it once `timeout` has elapsed.
/// The sample that starts a timer never expires it.
fn expired(timer: &mut Option<Instant>, now: Instant, timeout: Duration) -> bool {
    match *timer {
        None => {
            *timer = Some(now);
            false
        }
        Some(start) if now.saturating_duration_since(start) >= timeout => {
            *timer = None;
            true
        }
        Some(_) => false,
    }
}
