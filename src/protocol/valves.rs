//! Caller-side valve bookkeeping.
//!
//! The relay never tracks valves. A host that offers toggle buttons keeps a
//! [`ValveStates`] to decide which command a press should send, and records
//! the command once the send succeeded.

use crate::protocol::commands::Command;

/// The three valves on the rig.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Valve {
    /// Fresh-air inlet.
    Air,
    /// Vacuum pump line.
    Vacuum,
    /// Sampling bag line.
    Sampling,
}

impl Valve {
    /// All valves.
    pub const ALL: [Valve; 3] = [Valve::Air, Valve::Vacuum, Valve::Sampling];

    /// Name used inside command keywords.
    pub fn wire_name(&self) -> &'static str {
        match self {
            Self::Air => "AirValve",
            Self::Vacuum => "VacuumValve",
            Self::Sampling => "SamplingValve",
        }
    }

    /// Human-readable label.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Air => "Air Valve",
            Self::Vacuum => "Vacuum Valve",
            Self::Sampling => "Sampling Valve",
        }
    }
}

impl std::fmt::Display for Valve {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Whether a valve is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ValvePosition {
    /// Closed.
    #[default]
    Closed,
    /// Open.
    Open,
}

impl ValvePosition {
    /// The opposite position.
    pub fn toggled(self) -> Self {
        match self {
            Self::Closed => Self::Open,
            Self::Open => Self::Closed,
        }
    }
}

/// Last commanded position of each valve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ValveStates {
    air: ValvePosition,
    vacuum: ValvePosition,
    sampling: ValvePosition,
}

impl ValveStates {
    /// All valves closed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Last commanded position of a valve.
    pub fn position(&self, valve: Valve) -> ValvePosition {
        match valve {
            Valve::Air => self.air,
            Valve::Vacuum => self.vacuum,
            Valve::Sampling => self.sampling,
        }
    }

    /// Check if any valve is open.
    pub fn any_open(&self) -> bool {
        Valve::ALL
            .iter()
            .any(|v| self.position(*v) == ValvePosition::Open)
    }

    /// The command a toggle press should send for `valve`.
    pub fn toggle_command(&self, valve: Valve) -> Command {
        match self.position(valve) {
            ValvePosition::Open => Command::CloseValve(valve),
            ValvePosition::Closed => Command::OpenValve(valve),
        }
    }

    /// Label for a toggle button, e.g. "Open Air Valve".
    pub fn toggle_label(&self, valve: Valve) -> String {
        match self.position(valve) {
            ValvePosition::Open => format!("Close {}", valve.label()),
            ValvePosition::Closed => format!("Open {}", valve.label()),
        }
    }

    /// Apply a command that was sent successfully.
    ///
    /// Returns `true` if any valve position changed. Commands unrelated to
    /// valves are ignored.
    pub fn record_sent(&mut self, command: &Command) -> bool {
        let before = *self;

        match command {
            Command::OpenValve(valve) => self.set(*valve, ValvePosition::Open),
            Command::CloseValve(valve) => self.set(*valve, ValvePosition::Closed),
            Command::CloseAllValves => *self = Self::default(),
            _ => {}
        }

        *self != before
    }

    fn set(&mut self, valve: Valve, position: ValvePosition) {
        match valve {
            Valve::Air => self.air = position,
            Valve::Vacuum => self.vacuum = position,
            Valve::Sampling => self.sampling = position,
        }
    }
}
