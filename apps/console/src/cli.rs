use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use shared::command::{Command, CutPlan, Intent, JogDirection, JogPreset};

use crate::config::Settings;

#[derive(Parser, Debug)]
#[command(name = "wirecutter", about = "Control client for the wire-cutting rig")]
pub struct Args {
    /// TOML settings file (defaults to ./wirecutter.toml when present).
    #[arg(long, global = true, env = "WIRECUTTER_CONFIG")]
    pub config: Option<PathBuf>,
    /// Overrides the configured device address.
    #[arg(long, global = true)]
    pub device_url: Option<String>,
    /// Tracing filter, e.g. `debug` or `client_core=trace`.
    #[arg(long, global = true)]
    pub log: Option<String>,
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum CliCommand {
    /// Send text to the device verbatim.
    Send {
        #[arg(allow_hyphen_values = true)]
        text: String,
    },
    /// Jog the feed motor with one of the panel presets.
    Jog {
        direction: Side,
        #[arg(long, value_enum, default_value_t = Step::Revolution)]
        step: Step,
    },
    Stop,
    Home,
    /// One cutter stroke without feeding.
    QuickCut,
    /// Feed and cut `count` pieces of `length-mm`, corrected by the calibration reference.
    Cut {
        #[arg(long)]
        length_mm: f64,
        #[arg(long, default_value_t = 1.0)]
        count: f64,
        /// Measured length of the last reference cut, in millimetres.
        #[arg(long)]
        reference: Option<f64>,
    },
    /// Like `cut`, leaving the millimetre conversion to the firmware.
    CutMm {
        #[arg(long)]
        length_mm: i64,
        #[arg(long, default_value_t = 1)]
        count: i64,
    },
    /// Cut one uncorrected 100 mm piece to measure against.
    RefCut,
    Motors { state: Toggle },
    Cutter { position: CutterPosition },
    /// Take the current position as zero.
    SetZero,
    MoveHome,
    Version,
    /// Ask the firmware for its status dump.
    Status,
    /// Print the queued-cut counter once.
    Count,
    /// Follow the event stream and counter; stdin lines are sent as raw commands.
    Watch,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// One revolution over a second.
    Revolution,
    /// Two revolutions over two seconds.
    Double,
    /// 1600 microsteps.
    Micro,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Toggle {
    On,
    Off,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CutterPosition {
    Up,
    Down,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Submit(Command),
    Count,
    Watch,
}

impl CliCommand {
    pub fn into_action(self, settings: &Settings) -> Result<Action> {
        let intent = match self {
            Self::Count => return Ok(Action::Count),
            Self::Watch => return Ok(Action::Watch),
            Self::Send { text } => return Ok(Action::Submit(Command::raw(text))),
            Self::Jog { direction, step } => {
                let direction = match direction {
                    Side::Left => JogDirection::Left,
                    Side::Right => JogDirection::Right,
                };
                let preset = match step {
                    Step::Revolution => JogPreset::Revolution,
                    Step::Double => JogPreset::DoubleRevolution,
                    Step::Micro => JogPreset::Microsteps,
                };
                preset.intent(direction)
            }
            Self::Stop => Intent::Stop,
            Self::Home => Intent::Home,
            Self::QuickCut => Intent::QuickCut,
            Self::Cut {
                length_mm,
                count,
                reference,
            } => CutPlan::from_length(
                length_mm,
                count,
                reference.unwrap_or(settings.reference),
                settings.feed_speed,
            )?
            .intent(),
            Self::CutMm { length_mm, count } => Intent::CutMillimeters { count, length_mm },
            Self::RefCut => CutPlan::reference_cut(settings.feed_speed)?.intent(),
            Self::Motors { state } => Intent::Motors {
                enabled: state == Toggle::On,
            },
            Self::Cutter { position } => match position {
                CutterPosition::Up => Intent::CutterUp,
                CutterPosition::Down => Intent::CutterDown,
            },
            Self::SetZero => Intent::SetZero,
            Self::MoveHome => Intent::MoveHome,
            Self::Version => Intent::Version,
            Self::Status => Intent::Status,
        };
        Ok(Action::Submit(intent.encode()))
    }
}
