//! Station state, per-sample classification and usage log events.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Display state of the station. Exactly one is current at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum StationState {
    /// Startup. Never re-entered once left.
    #[default]
    #[serde(rename = "INIT")]
    Init,
    /// Home screen, waiting for a wave
    #[serde(rename = "IDLE")]
    Idle,
    /// Wash animation running
    #[serde(rename = "INWASH")]
    InWash,
    /// Wash finished, waiting for the user to walk away
    #[serde(rename = "DONE")]
    Done,
    /// Idle timeout elapsed, screen blanked
    #[serde(rename = "BLACK")]
    Sleeping,
}

impl StationState {
    pub const ALL: [StationState; 5] = [
        Self::Init,
        Self::Idle,
        Self::InWash,
        Self::Done,
        Self::Sleeping,
    ];

    /// Name pushed to the UI on the live stream.
    pub fn wire_name(&self) -> &'static str {
        match self {
            Self::Init => "INIT",
            Self::Idle => "IDLE",
            Self::InWash => "INWASH",
            Self::Done => "DONE",
            Self::Sleeping => "BLACK",
        }
    }
}

impl fmt::Display for StationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

/// What the smoothed distance says is in front of the sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Classification {
    /// Hand very close to the sensor
    Waving = 0,
    /// Someone standing nearby
    Present = 1,
    /// Nothing in range
    Empty = 2,
}

impl Classification {
    pub fn ordinal(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Waving => write!(f, "waving"),
            Self::Present => write!(f, "present"),
            Self::Empty => write!(f, "empty"),
        }
    }
}

/// Usage milestone reported to the remote collector.
///
/// Code 3 covers both a plain wake from sleep and an interrupted wash that
/// follows a wake; the collector distinguishes them by sequence, not code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum LogEvent {
    Initialized = 1,
    WakeSleep = 2,
    WakeWaveIncomplete = 3,
    WakeWaveComplete = 4,
    Sleep = 5,
    WaveIncomplete = 6,
    WaveComplete = 7,
}

impl LogEvent {
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Self::Initialized),
            2 => Some(Self::WakeSleep),
            3 => Some(Self::WakeWaveIncomplete),
            4 => Some(Self::WakeWaveComplete),
            5 => Some(Self::Sleep),
            6 => Some(Self::WaveIncomplete),
            7 => Some(Self::WaveComplete),
            _ => None,
        }
    }
}

impl fmt::Display for LogEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Initialized => "initialized",
            Self::WakeSleep => "wake-homescreen-sleep",
            Self::WakeWaveIncomplete => "wake-homescreen-wave-incomplete",
            Self::WakeWaveComplete => "wake-homescreen-wave-complete",
            Self::Sleep => "homescreen-sleep",
            Self::WaveIncomplete => "homescreen-wave-incomplete",
            Self::WaveComplete => "homescreen-wave-complete",
        };
        write!(f, "{name} ({})", self.code())
    }
}
