// Timeouts, topics, chassis and operator configuration
use std::f64::consts::PI;
use std::time::Duration;

use crate::swerve::geometry::Translation2d;
use crate::swerve::io::MAX_VOLTAGE;
use crate::swerve::kinematics::rectangular_layout;
use crate::swerve::module::ModuleGains;
use crate::swerve::DriveError;

// Runtime loop frequency
pub const LOOP_HZ: u64 = 50;

// Command timeout for watchdog
pub const CMD_TIMEOUT: Duration = Duration::from_millis(250);

// Zenoh topics
pub const TOPIC_CMD_INPUT: &str = "swerve/cmd/input"; // operator axes/buttons
pub const TOPIC_CMD_BASE: &str = "swerve/cmd/base"; // direct chassis demand (autonomous)
pub const TOPIC_CMD_EVENT: &str = "swerve/cmd/event"; // discrete button edges
pub const TOPIC_POSE: &str = "swerve/state/pose"; // pose telemetry
pub const TOPIC_HEALTH: &str = "swerve/state/health"; // health status

// Hardware bridge topics, `{}` is the module name
pub const TOPIC_HW_MEASUREMENT: &str = "swerve/hw/{}/measurement";
pub const TOPIC_HW_ACTUATION: &str = "swerve/hw/{}/actuation";
pub const TOPIC_HW_CONFIG: &str = "swerve/hw/{}/config";
pub const TOPIC_HW_GYRO: &str = "swerve/hw/gyro";

/// Module names in wiring order: front-left, front-right, back-left, back-right.
pub const MODULE_NAMES: [&str; 4] = ["front_left", "front_right", "back_left", "back_right"];

// Chassis dimensions (22 in square frame)
pub const TRACK_WIDTH_METERS: f64 = 0.5588;
pub const WHEELBASE_METERS: f64 = 0.5588;

// Speed limits
pub const MAX_SPEED_METERS_PER_SECOND: f64 = 4.5;
pub const MAX_ANGULAR_SPEED_RADIANS_PER_SECOND: f64 = 2.0 * PI;

// Actuator supply voltage
pub const NOMINAL_VOLTAGE: f64 = 12.0;

// Proportional steering gain (volts per radian of error)
pub const TURN_KP: f64 = 5.0;

// Cycles a module may run on a reused measurement before it is considered stale
pub const MAX_MISSED_MEASUREMENTS: u32 = 1;

// Operator input
pub const AXIS_DEADBAND: f64 = 0.1;
pub const TWIST_DEADBAND: f64 = 0.15;
pub const PRECISION_MULTIPLIER: f64 = 0.3;
pub const TURBO_MULTIPLIER: f64 = 1.0;
pub const NORMAL_MULTIPLIER: f64 = 0.7;
pub const THROTTLE_MIN: f64 = 0.2;
pub const THROTTLE_MAX: f64 = 1.0;

/// Expand one of the `TOPIC_HW_*` templates for a module.
pub fn hw_topic(template: &str, module: &str) -> String {
    template.replace("{}", module)
}

/// Chassis geometry and limits.
#[derive(Debug, Clone, PartialEq)]
pub struct SwerveConfig {
    /// Contact point offsets from the chassis center, in [`MODULE_NAMES`] order.
    pub module_offsets: [Translation2d; 4],
    pub max_speed: f64,
    pub max_angular_speed: f64,
    pub nominal_voltage: f64,
    pub turn_kp: f64,
    pub max_missed_measurements: u32,
}

impl Default for SwerveConfig {
    fn default() -> Self {
        Self {
            module_offsets: rectangular_layout(WHEELBASE_METERS, TRACK_WIDTH_METERS),
            max_speed: MAX_SPEED_METERS_PER_SECOND,
            max_angular_speed: MAX_ANGULAR_SPEED_RADIANS_PER_SECOND,
            nominal_voltage: NOMINAL_VOLTAGE,
            turn_kp: TURN_KP,
            max_missed_measurements: MAX_MISSED_MEASUREMENTS,
        }
    }
}

impl SwerveConfig {
    pub fn validate(&self) -> Result<(), DriveError> {
        if !(self.max_speed > 0.0) {
            return Err(DriveError::InvalidConfig("max_speed must be positive"));
        }
        if !(self.max_angular_speed > 0.0) {
            return Err(DriveError::InvalidConfig("max_angular_speed must be positive"));
        }
        if !(self.nominal_voltage > 0.0) || self.nominal_voltage > MAX_VOLTAGE {
            return Err(DriveError::InvalidConfig("nominal_voltage must be in (0, 12]"));
        }
        if !self.turn_kp.is_finite() || self.turn_kp < 0.0 {
            return Err(DriveError::InvalidConfig("turn_kp must be finite and non-negative"));
        }
        if self
            .module_offsets
            .iter()
            .any(|offset| !offset.x.is_finite() || !offset.y.is_finite())
        {
            return Err(DriveError::InvalidConfig("module offsets must be finite"));
        }
        Ok(())
    }

    pub fn gains(&self) -> ModuleGains {
        ModuleGains {
            max_speed: self.max_speed,
            turn_kp: self.turn_kp,
            nominal_voltage: self.nominal_voltage,
            max_missed_measurements: self.max_missed_measurements,
        }
    }
}

/// Operator input shaping.
#[derive(Debug, Clone, PartialEq)]
pub struct TeleopConfig {
    pub axis_deadband: f64,
    pub twist_deadband: f64,
    pub precision_multiplier: f64,
    pub turbo_multiplier: f64,
    pub normal_multiplier: f64,
    pub throttle_min: f64,
    pub throttle_max: f64,
    pub max_speed: f64,
    pub max_angular_speed: f64,
}

impl Default for TeleopConfig {
    fn default() -> Self {
        Self {
            axis_deadband: AXIS_DEADBAND,
            twist_deadband: TWIST_DEADBAND,
            precision_multiplier: PRECISION_MULTIPLIER,
            turbo_multiplier: TURBO_MULTIPLIER,
            normal_multiplier: NORMAL_MULTIPLIER,
            throttle_min: THROTTLE_MIN,
            throttle_max: THROTTLE_MAX,
            max_speed: MAX_SPEED_METERS_PER_SECOND,
            max_angular_speed: MAX_ANGULAR_SPEED_RADIANS_PER_SECOND,
        }
    }
}

impl TeleopConfig {
    pub fn validate(&self) -> Result<(), DriveError> {
        // Deadbands rescale by 1 / (1 - d)
        for deadband in [self.axis_deadband, self.twist_deadband] {
            if !(0.0..1.0).contains(&deadband) {
                return Err(DriveError::InvalidConfig("deadbands must be in [0, 1)"));
            }
        }
        let multipliers = [
            self.precision_multiplier,
            self.turbo_multiplier,
            self.normal_multiplier,
            self.throttle_min,
            self.throttle_max,
        ];
        if multipliers.iter().any(|m| !m.is_finite() || *m < 0.0) {
            return Err(DriveError::InvalidConfig("multipliers must be finite and non-negative"));
        }
        if self.throttle_min > self.throttle_max {
            return Err(DriveError::InvalidConfig("throttle_min must not exceed throttle_max"));
        }
        if !(self.max_speed > 0.0) || !self.max_speed.is_finite() {
            return Err(DriveError::InvalidConfig("max_speed must be positive"));
        }
        if !(self.max_angular_speed > 0.0) || !self.max_angular_speed.is_finite() {
            return Err(DriveError::InvalidConfig("max_angular_speed must be positive"));
        }
        Ok(())
    }
}
