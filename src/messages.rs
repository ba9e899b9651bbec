// Define message types for the runtime

use serde::{Deserialize, Serialize};

use crate::swerve::geometry::{ChassisVelocity, Pose2d, Rotation2d};

// Operator device -> runtime, sent every cycle by the teleop publisher
// Axes are normalized to [-1, 1] with forward/left/counter-clockwise positive
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct OperatorInput {
    pub forward: f64,
    pub strafe: f64,
    pub rotation: f64,
    // Raw throttle axis in [-1, 1], absent on devices without one
    #[serde(default)]
    pub throttle: Option<f64>,
    #[serde(default)]
    pub precision: bool,
    #[serde(default)]
    pub turbo: bool,
}

// Direct chassis-frame demand from an autonomous routine or script
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BaseCommand {
    pub vx: f64,
    pub vy: f64,
    pub omega: f64,
}

impl From<&BaseCommand> for ChassisVelocity {
    fn from(cmd: &BaseCommand) -> Self {
        ChassisVelocity::new(cmd.vx, cmd.vy, cmd.omega)
    }
}

/// Discrete operator actions, sent once per button press
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DriveEvent {
    Brake,
    Coast,
    Stop,
    ToggleFieldRelative,
    SetFieldRelative { enabled: bool },
    ToggleRotationLock,
    SetRotationLock { locked: bool },
    AlignEncoders,
}

/// Health status published by runtime
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeHealth {
    Ok,
    CmdStale,
    // Module measurements missing, chassis held stopped
    Degraded,
    // A steering encoder is disconnected, driving on held angles
    EncoderFault,
}

/// Pose and drive state published every cycle
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PoseTelemetry {
    pub pose: Pose2d,
    pub measured: ChassisVelocity,
    pub encoders_connected: [bool; 4],
    pub field_relative: bool,
    pub rotation_locked: bool,
    pub speed_multiplier: f64,
}

// Runtime -> hardware bridge, one per module
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ModuleActuation {
    pub drive_volts: f64,
    pub turn_volts: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "request", rename_all = "snake_case")]
pub enum ModuleConfigRequest {
    DriveBrake { enable: bool },
    TurnBrake { enable: bool },
    ResetDriveEncoder,
    SyncTurnEncoder,
}

// Hardware bridge -> runtime
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GyroReading {
    pub heading: Rotation2d,
}
