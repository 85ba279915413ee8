//! Station Core - sensor smoothing and display state machine
//!
//! This crate turns a stream of raw distance samples into station state
//! transitions. It has no I/O, no HTTP and no clock of its own: callers pass
//! `Instant`s in, which keeps every transition reproducible in tests.
//!
//! # Example
//!
//! ```
//! use std::time::Instant;
//! use station_core::{Smoother, StationState, StationStateMachine, Thresholds, Timeouts};
//!
//! let mut smoother = Smoother::new(Thresholds::default()).unwrap();
//! let mut machine = StationStateMachine::new(Timeouts::default());
//!
//! let class = smoother.observe(120);
//! let eval = machine.evaluate(class, Instant::now());
//!
//! assert!(eval.changed);
//! assert_eq!(eval.state, StationState::InWash);
//! ```

mod error;
mod machine;
mod smoother;
mod state;

pub use error::ThresholdError;
pub use machine::{Evaluation, StationStateMachine, Timeouts, Timers};
pub use smoother::{DistanceSample, Smoother, Thresholds, WINDOW_LEN};
pub use state::{Classification, LogEvent, StationState};
