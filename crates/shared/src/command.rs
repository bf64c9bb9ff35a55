//! Device command grammar: `OPCODE[,ARG]*` with integer arguments.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::EncodeError;

/// Feed speed used by the control panel, in milliseconds per millimetre (about 60 mm/s).
pub const DEFAULT_FEED_SPEED: f64 = 16.0;

/// Length used for the calibration cut, in millimetres.
pub const REFERENCE_CUT_LENGTH_MM: i64 = 100;

const MICROSTEP_SCALE: f64 = 100.0;

/// An encoded command, ready for transmission.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Command(String);

impl Command {
    /// Wraps user-typed text verbatim. This bypasses the encoder on purpose.
    pub fn raw(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn opcode(&self) -> &str {
        self.0.split(',').next().unwrap_or_default()
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<Intent> for Command {
    fn from(intent: Intent) -> Self {
        intent.encode()
    }
}

/// A logical device operation. Every variant has a fixed opcode and arity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    /// `MR,<duration>,<signed speed>`: relative move counted in revolutions.
    MoveRevolutions { duration_ms: i64, speed: i64 },
    /// `GTR,<duration>,<signed microsteps>`
    MoveMicrosteps { duration_ms: i64, microsteps: i64 },
    Stop,
    /// `TC`, wired to the panel's home button.
    Home,
    /// `CT`: one cutter stroke without feeding.
    QuickCut,
    /// `CUT,<count>,<microsteps>,<duration>`: queue `count` feed-and-cut cycles.
    Cut {
        count: i64,
        microsteps: i64,
        duration_ms: i64,
    },
    /// `CUTD,<count>,<length_mm>`: like `Cut`, with the device converting millimetres itself.
    CutMillimeters { count: i64, length_mm: i64 },
    CutterUp,
    CutterDown,
    Motors { enabled: bool },
    /// `G90`: take the current position as zero.
    SetZero,
    /// `MH`: travel back to position zero.
    MoveHome,
    Version,
    Status,
}

impl Intent {
    pub fn opcode(&self) -> &'static str {
        match self {
            Self::MoveRevolutions { .. } => "MR",
            Self::MoveMicrosteps { .. } => "GTR",
            Self::Stop => "STP",
            Self::Home => "TC",
            Self::QuickCut => "CT",
            Self::Cut { .. } => "CUT",
            Self::CutMillimeters { .. } => "CUTD",
            Self::CutterUp => "CU",
            Self::CutterDown => "CD",
            Self::Motors { .. } => "EM",
            Self::SetZero => "G90",
            Self::MoveHome => "MH",
            Self::Version => "v",
            Self::Status => "XX",
        }
    }

    /// Arguments in wire order.
    pub fn args(&self) -> Vec<i64> {
        match *self {
            Self::MoveRevolutions { duration_ms, speed } => vec![duration_ms, speed],
            Self::MoveMicrosteps {
                duration_ms,
                microsteps,
            } => vec![duration_ms, microsteps],
            Self::Cut {
                count,
                microsteps,
                duration_ms,
            } => vec![count, microsteps, duration_ms],
            Self::CutMillimeters { count, length_mm } => vec![count, length_mm],
            Self::Motors { enabled } => vec![i64::from(enabled)],
            Self::Stop
            | Self::Home
            | Self::QuickCut
            | Self::CutterUp
            | Self::CutterDown
            | Self::SetZero
            | Self::MoveHome
            | Self::Version
            | Self::Status => Vec::new(),
        }
    }

    pub fn encode(&self) -> Command {
        let mut encoded = self.opcode().to_string();
        for arg in self.args() {
            encoded.push(',');
            encoded.push_str(&arg.to_string());
        }
        Command(encoded)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JogDirection {
    Left,
    Right,
}

impl JogDirection {
    fn sign(self) -> i64 {
        match self {
            Self::Left => -1,
            Self::Right => 1,
        }
    }
}

/// The fixed jog moves offered by the control panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JogPreset {
    /// One revolution over one second.
    Revolution,
    /// Two revolutions over two seconds.
    DoubleRevolution,
    /// 1600 microsteps over half a second.
    Microsteps,
}

impl JogPreset {
    pub fn intent(self, direction: JogDirection) -> Intent {
        let sign = direction.sign();
        match self {
            Self::Revolution => Intent::MoveRevolutions {
                duration_ms: 1000,
                speed: sign,
            },
            Self::DoubleRevolution => Intent::MoveRevolutions {
                duration_ms: 2000,
                speed: 2 * sign,
            },
            Self::Microsteps => Intent::MoveMicrosteps {
                duration_ms: 500,
                microsteps: 1600 * sign,
            },
        }
    }
}

/// Integer fields of a `CUT` command derived from millimetre inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CutPlan {
    pub count: i64,
    pub microsteps: i64,
    pub duration_ms: i64,
}

impl CutPlan {
    /// Derives a cut batch from form inputs.
    ///
    /// `length_mm` and `count` are rounded first, then
    /// `duration = round(length * speed)` and
    /// `microsteps = round(100 * length * 100 / reference)`.
    pub fn from_length(
        length_mm: f64,
        count: f64,
        reference: f64,
        speed: f64,
    ) -> Result<Self, EncodeError> {
        if !reference.is_finite() || reference <= 0.0 {
            return Err(EncodeError::InvalidReference { reference });
        }
        ensure_finite("speed", speed)?;
        let length_mm = device_int("length_mm", length_mm)? as f64;
        let count = device_int("count", count)?;
        let duration_ms = device_int("duration_ms", length_mm * speed)?;
        let microsteps = device_int(
            "microsteps",
            (MICROSTEP_SCALE * length_mm * MICROSTEP_SCALE) / reference,
        )?;
        Ok(Self {
            count,
            microsteps,
            duration_ms,
        })
    }

    /// The calibration cut: one piece of nominal length, uncorrected by any reference.
    pub fn reference_cut(speed: f64) -> Result<Self, EncodeError> {
        ensure_finite("speed", speed)?;
        let length_mm = REFERENCE_CUT_LENGTH_MM;
        Ok(Self {
            count: 1,
            microsteps: 100 * length_mm,
            duration_ms: device_int("duration_ms", length_mm as f64 * speed)?,
        })
    }

    pub fn intent(&self) -> Intent {
        Intent::Cut {
            count: self.count,
            microsteps: self.microsteps,
            duration_ms: self.duration_ms,
        }
    }

    pub fn command(&self) -> Command {
        self.intent().encode()
    }
}

fn ensure_finite(field: &'static str, value: f64) -> Result<(), EncodeError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(EncodeError::NonFinite { field, value })
    }
}

// Half-way cases go toward positive infinity, as the control panel rounds them.
fn round_half_up(value: f64) -> f64 {
    let floor = value.floor();
    if value - floor >= 0.5 {
        floor + 1.0
    } else {
        floor
    }
}

// The firmware parses arguments into a 32-bit int.
fn device_int(field: &'static str, value: f64) -> Result<i64, EncodeError> {
    ensure_finite(field, value)?;
    let rounded = round_half_up(value);
    if rounded < f64::from(i32::MIN) || rounded > f64::from(i32::MAX) {
        return Err(EncodeError::OutOfRange { field, value });
    }
    Ok(rounded as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_motion_intents_in_field_order() {
        assert_eq!(
            Intent::MoveRevolutions {
                duration_ms: 1000,
                speed: -1
            }
            .encode()
            .as_str(),
            "MR,1000,-1"
        );
        assert_eq!(
            Intent::MoveMicrosteps {
                duration_ms: 500,
                microsteps: 1600
            }
            .encode()
            .as_str(),
            "GTR,500,1600"
        );
        assert_eq!(
            Intent::Cut {
                count: 3,
                microsteps: 9900,
                duration_ms: 1600
            }
            .encode()
            .as_str(),
            "CUT,3,9900,1600"
        );
    }

    #[test]
    fn argumentless_intents_encode_as_bare_opcode() {
        for (intent, expected) in [
            (Intent::Stop, "STP"),
            (Intent::Home, "TC"),
            (Intent::QuickCut, "CT"),
            (Intent::CutterUp, "CU"),
            (Intent::CutterDown, "CD"),
            (Intent::SetZero, "G90"),
            (Intent::MoveHome, "MH"),
            (Intent::Version, "v"),
            (Intent::Status, "XX"),
        ] {
            let command = intent.encode();
            assert_eq!(command.as_str(), expected);
            assert!(!command.as_str().contains(','));
        }
    }

    #[test]
    fn arity_matches_opcode() {
        let cases = [
            (
                Intent::MoveRevolutions {
                    duration_ms: 1,
                    speed: 1,
                },
                2,
            ),
            (
                Intent::MoveMicrosteps {
                    duration_ms: 1,
                    microsteps: 1,
                },
                2,
            ),
            (
                Intent::Cut {
                    count: 1,
                    microsteps: 1,
                    duration_ms: 1,
                },
                3,
            ),
            (
                Intent::CutMillimeters {
                    count: 1,
                    length_mm: 1,
                },
                2,
            ),
            (Intent::Motors { enabled: true }, 1),
        ];
        for (intent, arity) in cases {
            let command = intent.encode();
            let fields: Vec<&str> = command.as_str().split(',').collect();
            assert_eq!(fields.len(), arity + 1, "{command}");
            assert_eq!(fields[0], intent.opcode());
            assert_eq!(command.opcode(), intent.opcode());
        }
    }

    #[test]
    fn motors_encode_as_zero_or_one() {
        assert_eq!(Intent::Motors { enabled: true }.encode().as_str(), "EM,1");
        assert_eq!(Intent::Motors { enabled: false }.encode().as_str(), "EM,0");
    }

    #[test]
    fn jog_presets_match_panel_buttons() {
        let encoded: Vec<String> = [
            JogPreset::Revolution,
            JogPreset::DoubleRevolution,
            JogPreset::Microsteps,
        ]
        .into_iter()
        .flat_map(|preset| {
            [JogDirection::Left, JogDirection::Right]
                .map(|direction| preset.intent(direction).encode().into_string())
        })
        .collect();
        assert_eq!(
            encoded,
            [
                "MR,1000,-1",
                "MR,1000,1",
                "MR,2000,-2",
                "MR,2000,2",
                "GTR,500,-1600",
                "GTR,500,1600"
            ]
        );
    }

    #[test]
    fn cut_plan_derives_microsteps_and_duration() {
        let plan = CutPlan::from_length(100.0, 1.0, 100.0, DEFAULT_FEED_SPEED).expect("plan");
        assert_eq!(plan.microsteps, 10_000);
        assert_eq!(plan.duration_ms, 1600);
        assert_eq!(plan.command().as_str(), "CUT,1,10000,1600");
    }

    #[test]
    fn cut_plan_rounds_inputs_before_deriving() {
        // 49.6 mm is sent as 50 mm; 2.4 pieces as 2.
        let plan = CutPlan::from_length(49.6, 2.4, 101.0, DEFAULT_FEED_SPEED).expect("plan");
        assert_eq!(plan.count, 2);
        assert_eq!(plan.duration_ms, 800);
        // 100 * 50 * 100 / 101 = 4950.49...
        assert_eq!(plan.microsteps, 4950);
        assert_eq!(plan.command().as_str(), "CUT,2,4950,800");
    }

    #[test]
    fn cut_plan_rounds_negative_ties_toward_positive_infinity() {
        let plan = CutPlan::from_length(-2.5, 1.0, 100.0, DEFAULT_FEED_SPEED).expect("plan");
        assert_eq!(plan.command().as_str(), "CUT,1,-200,-32");

        let plan = CutPlan::from_length(2.5, -1.5, 100.0, DEFAULT_FEED_SPEED).expect("plan");
        assert_eq!(plan.command().as_str(), "CUT,-1,300,48");
    }

    #[test]
    fn half_up_rounding_keeps_values_just_below_a_tie() {
        assert_eq!(round_half_up(0.499_999_999_999_999_94), 0.0);
        assert_eq!(round_half_up(-0.5), 0.0);
        assert_eq!(round_half_up(-0.6), -1.0);
        assert_eq!(round_half_up(1.5), 2.0);
    }

    #[test]
    fn cut_plan_rejects_zero_reference() {
        let err = CutPlan::from_length(100.0, 1.0, 0.0, DEFAULT_FEED_SPEED).unwrap_err();
        assert_eq!(err, EncodeError::InvalidReference { reference: 0.0 });
        assert_eq!(err.field(), "reference");
    }

    #[test]
    fn cut_plan_rejects_negative_and_non_finite_inputs() {
        assert!(matches!(
            CutPlan::from_length(100.0, 1.0, -5.0, DEFAULT_FEED_SPEED),
            Err(EncodeError::InvalidReference { .. })
        ));
        assert!(matches!(
            CutPlan::from_length(100.0, 1.0, f64::NAN, DEFAULT_FEED_SPEED),
            Err(EncodeError::InvalidReference { .. })
        ));
        assert!(matches!(
            CutPlan::from_length(f64::INFINITY, 1.0, 100.0, DEFAULT_FEED_SPEED),
            Err(EncodeError::NonFinite {
                field: "length_mm",
                ..
            })
        ));
        assert!(matches!(
            CutPlan::from_length(100.0, f64::NAN, 100.0, DEFAULT_FEED_SPEED),
            Err(EncodeError::NonFinite { field: "count", .. })
        ));
    }

    #[test]
    fn cut_plan_rejects_values_beyond_device_range() {
        let err = CutPlan::from_length(1.0e9, 1.0, 0.001, DEFAULT_FEED_SPEED).unwrap_err();
        assert_eq!(err.field(), "duration_ms");
    }

    #[test]
    fn reference_cut_ignores_calibration() {
        let plan = CutPlan::reference_cut(DEFAULT_FEED_SPEED).expect("plan");
        assert_eq!(plan.command().as_str(), "CUT,1,10000,1600");
    }

    #[test]
    fn raw_commands_pass_through_verbatim() {
        let command = Command::raw("GT,100, 200 ,x");
        assert_eq!(command.as_str(), "GT,100, 200 ,x");
        assert_eq!(command.opcode(), "GT");
    }
}
