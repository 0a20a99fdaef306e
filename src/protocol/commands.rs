//! Command vocabulary understood by the sampling rig.
//!
//! Every command is a bare keyword. Parameter commands append a decimal
//! value directly to their key, e.g. `samplingTime2500`. Time parameters are
//! entered in seconds and sent as whole milliseconds.

use crate::error::{Error, Result};
use crate::protocol::frame::CommandFrame;
use crate::protocol::valves::Valve;

/// Tunable rig parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Parameter {
    /// How long the sampling valve stays open.
    SamplingTime,
    /// How long the bag fills.
    FillingTime,
    /// Fill duration of each purge cycle.
    PurgeFillTime,
    /// Number of purge cycles.
    NumPurgeCycles,
}

impl Parameter {
    /// Every parameter, in the order the rig documents them.
    pub const ALL: [Parameter; 4] = [
        Parameter::SamplingTime,
        Parameter::FillingTime,
        Parameter::PurgeFillTime,
        Parameter::NumPurgeCycles,
    ];

    /// Wire key.
    pub fn key(&self) -> &'static str {
        match self {
            Self::SamplingTime => "samplingTime",
            Self::FillingTime => "fillingTime",
            Self::PurgeFillTime => "purgeFillTime",
            Self::NumPurgeCycles => "numPurgeCycles",
        }
    }

    /// Whether the value is a duration (seconds in, milliseconds on the wire).
    pub fn is_time(&self) -> bool {
        !matches!(self, Self::NumPurgeCycles)
    }

    /// Look a parameter up by wire key.
    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.key() == key)
    }
}

impl std::fmt::Display for Parameter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

/// A command for the rig.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Command {
    /// Run a sampling cycle.
    SampleBag,
    /// Run the purge cycles.
    PurgeBag,
    /// Sample, then purge.
    SampleAndPurgeBag,
    /// Stop whatever is running.
    Abort,
    /// Open one valve.
    OpenValve(Valve),
    /// Close one valve.
    CloseValve(Valve),
    /// Close every valve.
    CloseAllValves,
    /// Set a parameter to an already-encoded wire value.
    SetParameter {
        /// Which parameter.
        parameter: Parameter,
        /// Milliseconds for time parameters, a count otherwise.
        value: u32,
    },
    /// Free text, sent verbatim.
    Raw(String),
}

impl Command {
    /// Set a time parameter from seconds.
    ///
    /// The value is rounded to the nearest millisecond, ties to even.
    pub fn set_time(parameter: Parameter, seconds: f64) -> Result<Self> {
        if !parameter.is_time() {
            return Err(Error::InvalidParameter {
                name: parameter.key().to_string(),
                value: format!("{} (not a time parameter)", seconds),
            });
        }

        Ok(Self::SetParameter {
            parameter,
            value: seconds_to_millis(parameter, seconds)?,
        })
    }

    /// Set a count parameter.
    pub fn set_count(parameter: Parameter, count: u32) -> Result<Self> {
        if parameter.is_time() {
            return Err(Error::InvalidParameter {
                name: parameter.key().to_string(),
                value: format!("{} (not a count parameter)", count),
            });
        }

        Ok(Self::SetParameter {
            parameter,
            value: count,
        })
    }

    /// Set any parameter from a user-entered number.
    ///
    /// Time parameters take seconds; counts must be whole numbers.
    pub fn set_parameter(parameter: Parameter, value: f64) -> Result<Self> {
        if parameter.is_time() {
            return Self::set_time(parameter, value);
        }

        if !value.is_finite() || value < 0.0 || value.fract() != 0.0 || value > u32::MAX as f64 {
            return Err(Error::InvalidParameter {
                name: parameter.key().to_string(),
                value: value.to_string(),
            });
        }

        Self::set_count(parameter, value as u32)
    }

    /// Free-text command.
    pub fn raw(text: impl Into<String>) -> Self {
        Self::Raw(text.into())
    }

    /// Recognise known commands in text; anything else becomes [`Command::Raw`].
    pub fn parse(text: &str) -> Self {
        let known = match text {
            "sampleBag" => Some(Self::SampleBag),
            "purgeBag" => Some(Self::PurgeBag),
            "sampleAndPurgeBag" => Some(Self::SampleAndPurgeBag),
            "abort" => Some(Self::Abort),
            "closeAllValves" => Some(Self::CloseAllValves),
            _ => None,
        };

        if let Some(command) = known {
            return command;
        }

        for valve in Valve::ALL {
            if text.strip_prefix("open") == Some(valve.wire_name()) {
                return Self::OpenValve(valve);
            }
            if text.strip_prefix("close") == Some(valve.wire_name()) {
                return Self::CloseValve(valve);
            }
        }

        for parameter in Parameter::ALL {
            if let Some(digits) = text.strip_prefix(parameter.key()) {
                // Only canonical digits, so parsing and encoding agree
                let canonical = digits == "0" || !digits.starts_with('0');
                if canonical && !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
                    if let Ok(value) = digits.parse::<u32>() {
                        return Self::SetParameter { parameter, value };
                    }
                }
            }
        }

        Self::Raw(text.to_string())
    }

    /// Encode for transmission.
    pub fn encode(&self) -> CommandFrame {
        CommandFrame::new(&self.to_string())
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SampleBag => write!(f, "sampleBag"),
            Self::PurgeBag => write!(f, "purgeBag"),
            Self::SampleAndPurgeBag => write!(f, "sampleAndPurgeBag"),
            Self::Abort => write!(f, "abort"),
            Self::OpenValve(valve) => write!(f, "open{}", valve.wire_name()),
            Self::CloseValve(valve) => write!(f, "close{}", valve.wire_name()),
            Self::CloseAllValves => write!(f, "closeAllValves"),
            Self::SetParameter { parameter, value } => write!(f, "{}{}", parameter.key(), value),
            Self::Raw(text) => f.write_str(text),
        }
    }
}

/// Convert seconds to whole milliseconds, rounding ties to even.
pub fn seconds_to_millis(parameter: Parameter, seconds: f64) -> Result<u32> {
    let millis = (seconds * 1000.0).round_ties_even();

    if !millis.is_finite() || millis < 0.0 || millis > u32::MAX as f64 {
        return Err(Error::InvalidParameter {
            name: parameter.key().to_string(),
            value: seconds.to_string(),
        });
    }

    Ok(millis as u32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    #[test]
    fn test_keywords() {
        assert_eq!(Command::SampleBag.to_string(), "sampleBag");
        assert_eq!(Command::PurgeBag.to_string(), "purgeBag");
        assert_eq!(Command::SampleAndPurgeBag.to_string(), "sampleAndPurgeBag");
        assert_eq!(Command::Abort.to_string(), "abort");
        assert_eq!(Command::CloseAllValves.to_string(), "closeAllValves");
        assert_eq!(Command::OpenValve(Valve::Air).to_string(), "openAirValve");
        assert_eq!(Command::CloseValve(Valve::Vacuum).to_string(), "closeVacuumValve");
        assert_eq!(
            Command::OpenValve(Valve::Sampling).to_string(),
            "openSamplingValve"
        );
    }

    #[test]
    fn test_time_parameter_in_millis() {
        let command = Command::set_time(Parameter::SamplingTime, 2.5).unwrap();
        assert_eq!(command.to_string(), "samplingTime2500");
        assert_eq!(command.encode().as_bytes(), b"samplingTime2500");

        let tiny = Command::set_time(Parameter::SamplingTime, 0.0001).unwrap();
        assert_eq!(tiny.to_string(), "samplingTime0");

        let fill = Command::set_parameter(Parameter::PurgeFillTime, 12.0).unwrap();
        assert_eq!(fill.to_string(), "purgeFillTime12000");
    }

    #[test]
    fn test_rounding_to_nearest_milli() {
        assert_eq!(seconds_to_millis(Parameter::FillingTime, 1.2346).unwrap(), 1235);
        assert_eq!(seconds_to_millis(Parameter::FillingTime, 1.2344).unwrap(), 1234);
        assert_eq!(seconds_to_millis(Parameter::FillingTime, 0.0).unwrap(), 0);
    }

    #[test]
    fn test_count_parameter_as_is() {
        let command = Command::set_parameter(Parameter::NumPurgeCycles, 3.0).unwrap();
        assert_eq!(command.to_string(), "numPurgeCycles3");

        assert!(Command::set_parameter(Parameter::NumPurgeCycles, 2.5).is_err());
        assert!(Command::set_parameter(Parameter::NumPurgeCycles, -1.0).is_err());
        assert!(Command::set_count(Parameter::SamplingTime, 3).is_err());
        assert!(Command::set_time(Parameter::NumPurgeCycles, 3.0).is_err());
    }

    #[test]
    fn test_invalid_times_rejected() {
        assert!(Command::set_time(Parameter::SamplingTime, -0.5).is_err());
        assert!(Command::set_time(Parameter::SamplingTime, f64::NAN).is_err());
        assert!(Command::set_time(Parameter::SamplingTime, f64::INFINITY).is_err());
        assert!(Command::set_time(Parameter::SamplingTime, 5_000_000.0).is_err());
    }

    #[test]
    fn test_parse_known_and_raw() {
        assert_eq!(Command::parse("abort"), Command::Abort);
        assert_eq!(
            Command::parse("closeSamplingValve"),
            Command::CloseValve(Valve::Sampling)
        );
        assert_eq!(
            Command::parse("fillingTime1500"),
            Command::SetParameter {
                parameter: Parameter::FillingTime,
                value: 1500
            }
        );
        assert_eq!(Command::parse("fillingTime"), Command::raw("fillingTime"));
        assert_eq!(Command::parse("hello rig"), Command::raw("hello rig"));
        assert_eq!(Command::parse("hello rig").to_string(), "hello rig");
    }

    #[test]
    fn test_parse_keeps_padded_digits_raw() {
        assert_eq!(
            Command::parse("samplingTime007"),
            Command::raw("samplingTime007")
        );
        assert_eq!(Command::parse("samplingTime007").to_string(), "samplingTime007");
        assert_eq!(
            Command::parse("numPurgeCycles0"),
            Command::SetParameter {
                parameter: Parameter::NumPurgeCycles,
                value: 0
            }
        );
    }

    #[test]
    fn test_parameter_keys() {
        for parameter in Parameter::ALL {
            assert_eq!(Parameter::from_key(parameter.key()), Some(parameter));
        }
        assert_eq!(Parameter::from_key("unknown"), None);
        assert!(!Parameter::NumPurgeCycles.is_time());
    }

    proptest! {
        #[test]
        fn prop_whole_millis_survive_encoding(ms in 0u32..100_000_000) {
            let seconds = ms as f64 / 1000.0;
            let command = Command::set_time(Parameter::SamplingTime, seconds).unwrap();
            prop_assert_eq!(command.to_string(), format!("samplingTime{}", ms));
        }

        #[test]
        fn prop_encoded_times_are_plain_digits(seconds in 0.0f64..100_000.0) {
            let command = Command::set_time(Parameter::FillingTime, seconds).unwrap();
            let text = command.to_string();
            let digits = text.strip_prefix("fillingTime").unwrap();
            prop_assert!(digits.bytes().all(|b| b.is_ascii_digit()));
        }

        #[test]
        fn prop_parse_preserves_text(digits in "[0-9]{1,9}") {
            let text = format!("purgeFillTime{}", digits);
            prop_assert_eq!(Command::parse(&text).to_string(), text);
        }
    }
}
