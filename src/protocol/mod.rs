//! Protocol module for constructing commands and decoding replies.
//!
//! This module contains the implementations for:
//! - The rig's text command vocabulary
//! - UTF-8 framing of commands and notifications
//! - Caller-side valve state

pub mod commands;
pub mod frame;
pub mod valves;

pub use commands::{seconds_to_millis, Command, Parameter};
pub use frame::{decode_notification, CommandFrame};
pub use valves::{Valve, ValvePosition, ValveStates};
