/// Run lifecycle phase definitions
///
/// This module defines every phase a run can be in and which moves between
/// them are legal.
use std::fmt;

/// Represents the current lifecycle phase of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RunPhase {
    /// Run constructed but not started
    #[default]
    Idle,

    /// Establishing the first session and opening the journal
    Initializing,

    /// Scheduler is walking windows
    Running,

    /// Scheduler is parked at a page or window boundary
    Paused,

    /// Stop requested or range exhausted; sink is being persisted
    Stopping,

    // ===== Terminal =====
    /// Run is over; nothing further happens
    Finished,
}

impl RunPhase {
    /// Returns true if no further transitions are possible
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished)
    }

    /// Returns true if moving from `self` to `to` is a legal transition
    ///
    /// Staying in the same phase is always allowed and is a no-op.
    pub fn can_transition_to(&self, to: RunPhase) -> bool {
        if *self == to {
            return true;
        }
        matches!(
            (self, to),
            (Self::Idle, Self::Initializing)
                | (Self::Initializing, Self::Running)
                | (Self::Initializing, Self::Stopping)
                | (Self::Initializing, Self::Finished)
                | (Self::Running, Self::Paused)
                | (Self::Paused, Self::Running)
                | (Self::Running, Self::Stopping)
                | (Self::Paused, Self::Stopping)
                | (Self::Stopping, Self::Finished)
        )
    }

    /// Converts the phase to a database string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Initializing => "initializing",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Stopping => "stopping",
            Self::Finished => "finished",
        }
    }

    /// Parses a phase from a database string representation
    ///
    /// Returns None if the string doesn't match any known phase.
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "idle" => Some(Self::Idle),
            "initializing" => Some(Self::Initializing),
            "running" => Some(Self::Running),
            "paused" => Some(Self::Paused),
            "stopping" => Some(Self::Stopping),
            "finished" => Some(Self::Finished),
            _ => None,
        }
    }

    /// Returns all phases in lifecycle order
    pub fn all_phases() -> Vec<Self> {
        vec![
            Self::Idle,
            Self::Initializing,
            Self::Running,
            Self::Paused,
            Self::Stopping,
            Self::Finished,
        ]
    }
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}
