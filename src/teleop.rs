// Operator input -> chassis velocity demand
//
// Deadbands each axis, picks the speed multiplier (precision, turbo or
// throttle), applies rotation lock and converts field-relative input into
// the chassis frame.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::TeleopConfig;
use crate::messages::OperatorInput;
use crate::swerve::DriveError;
use crate::swerve::geometry::{ChassisVelocity, Rotation2d};

/// Mode flags toggled by button edges and read once per cycle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DriveRuntimeState {
    pub field_relative: bool,
    pub rotation_locked: bool,
    /// Multiplier applied during the last cycle.
    pub speed_multiplier: f64,
    pub brake_mode: bool,
}

/// Zero inside `deadband`, rescaled so the output still spans [-1, 1] outside it.
pub fn apply_deadband(value: f64, deadband: f64) -> f64 {
    let magnitude = value.abs();
    if magnitude < deadband {
        return 0.0;
    }
    value.signum() * (magnitude - deadband) / (1.0 - deadband)
}

/// Map a raw throttle axis in [-1, 1] linearly onto `[min, max]`.
pub fn throttle_multiplier(raw: f64, min: f64, max: f64) -> f64 {
    let t = (sanitize_axis(raw) + 1.0) / 2.0;
    min + (max - min) * t
}

fn sanitize_axis(value: f64) -> f64 {
    if value.is_nan() { 0.0 } else { value.clamp(-1.0, 1.0) }
}

pub struct TeleopDrive {
    config: TeleopConfig,
    state: DriveRuntimeState,
}

impl TeleopDrive {
    pub fn new(config: TeleopConfig) -> Result<Self, DriveError> {
        config.validate()?;
        let state = DriveRuntimeState {
            field_relative: true,
            rotation_locked: false,
            speed_multiplier: config.normal_multiplier,
            brake_mode: true,
        };
        Ok(Self { config, state })
    }

    pub fn state(&self) -> &DriveRuntimeState {
        &self.state
    }

    /// Turn one cycle of operator input into a chassis-frame velocity.
    pub fn compute_demand(&mut self, input: &OperatorInput, heading: Rotation2d) -> ChassisVelocity {
        let cfg = &self.config;

        let forward = apply_deadband(sanitize_axis(input.forward), cfg.axis_deadband);
        let strafe = apply_deadband(sanitize_axis(input.strafe), cfg.axis_deadband);
        let rotation = apply_deadband(sanitize_axis(input.rotation), cfg.twist_deadband);

        // Held buttons override the throttle
        let multiplier = if input.precision {
            cfg.precision_multiplier
        } else if input.turbo {
            cfg.turbo_multiplier
        } else {
            match input.throttle {
                Some(raw) => throttle_multiplier(raw, cfg.throttle_min, cfg.throttle_max),
                None => cfg.normal_multiplier,
            }
        };

        let omega = if self.state.rotation_locked {
            0.0
        } else {
            rotation * multiplier * cfg.max_angular_speed
        };
        let demand = ChassisVelocity::new(
            forward * multiplier * cfg.max_speed,
            strafe * multiplier * cfg.max_speed,
            omega,
        );

        self.state.speed_multiplier = multiplier;

        let chassis = if self.state.field_relative {
            ChassisVelocity::from_field_relative(demand, heading)
        } else {
            demand
        };
        debug!("Teleop demand {} (x{:.2})", chassis, multiplier);
        chassis
    }

    pub fn toggle_field_relative(&mut self) {
        self.set_field_relative(!self.state.field_relative);
    }

    pub fn set_field_relative(&mut self, enabled: bool) {
        info!("Field-relative {}", if enabled { "on" } else { "off" });
        self.state.field_relative = enabled;
    }

    pub fn toggle_rotation_lock(&mut self) {
        self.set_rotation_lock(!self.state.rotation_locked);
    }

    pub fn set_rotation_lock(&mut self, locked: bool) {
        info!("Rotation lock {}", if locked { "on" } else { "off" });
        self.state.rotation_locked = locked;
    }

    pub fn set_brake_mode(&mut self, enable: bool) {
        self.state.brake_mode = enable;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MAX_ANGULAR_SPEED_RADIANS_PER_SECOND, MAX_SPEED_METERS_PER_SECOND};
    use approx::assert_relative_eq;

    fn robot_relative() -> TeleopDrive {
        let mut teleop = TeleopDrive::new(TeleopConfig::default()).unwrap();
        teleop.set_field_relative(false);
        teleop
    }

    fn full_stick() -> OperatorInput {
        OperatorInput {
            forward: 1.0,
            strafe: 1.0,
            rotation: 1.0,
            ..OperatorInput::default()
        }
    }

    #[test]
    fn test_deadband_zeroes_small_values() {
        for v in [0.0, 0.05, -0.05, 0.0999, -0.0999] {
            assert_eq!(apply_deadband(v, 0.1), 0.0);
        }
    }

    #[test]
    fn test_deadband_continuous_outside() {
        assert_eq!(apply_deadband(0.1, 0.1), 0.0);
        assert_relative_eq!(apply_deadband(1.0, 0.1), 1.0);
        assert_relative_eq!(apply_deadband(-1.0, 0.1), -1.0);
        assert_relative_eq!(apply_deadband(0.55, 0.1), 0.5, epsilon = 1e-12);
        assert_relative_eq!(apply_deadband(-0.55, 0.1), -0.5, epsilon = 1e-12);
        // Just past the threshold stays near zero and keeps its sign
        let just_above = apply_deadband(0.1001, 0.1);
        assert!(just_above > 0.0 && just_above < 1e-3);
        assert!(apply_deadband(-0.1001, 0.1) < 0.0);
    }

    #[test]
    fn test_throttle_remap() {
        assert_relative_eq!(throttle_multiplier(-1.0, 0.2, 1.0), 0.2);
        assert_relative_eq!(throttle_multiplier(0.0, 0.2, 1.0), 0.6);
        assert_relative_eq!(throttle_multiplier(1.0, 0.2, 1.0), 1.0);
        assert_relative_eq!(throttle_multiplier(5.0, 0.2, 1.0), 1.0);
    }

    #[test]
    fn test_precision_overrides_throttle() {
        let mut teleop = robot_relative();
        for throttle in [Some(-1.0), Some(0.3), Some(1.0), None] {
            let input = OperatorInput {
                precision: true,
                turbo: true,
                throttle,
                ..full_stick()
            };
            let demand = teleop.compute_demand(&input, Rotation2d::ZERO);
            assert_relative_eq!(demand.vx, 0.3 * MAX_SPEED_METERS_PER_SECOND);
            assert_relative_eq!(demand.vy, 0.3 * MAX_SPEED_METERS_PER_SECOND);
            assert_relative_eq!(demand.omega, 0.3 * MAX_ANGULAR_SPEED_RADIANS_PER_SECOND);
            assert_eq!(teleop.state().speed_multiplier, 0.3);
        }
    }

    #[test]
    fn test_turbo_and_throttle() {
        let mut teleop = robot_relative();
        let turbo = OperatorInput {
            turbo: true,
            throttle: Some(-1.0),
            ..full_stick()
        };
        assert_relative_eq!(
            teleop.compute_demand(&turbo, Rotation2d::ZERO).vx,
            MAX_SPEED_METERS_PER_SECOND
        );

        let throttled = OperatorInput {
            throttle: Some(0.0),
            ..full_stick()
        };
        assert_relative_eq!(
            teleop.compute_demand(&throttled, Rotation2d::ZERO).vx,
            0.6 * MAX_SPEED_METERS_PER_SECOND,
            epsilon = 1e-12
        );

        let no_throttle = full_stick();
        assert_relative_eq!(
            teleop.compute_demand(&no_throttle, Rotation2d::ZERO).vx,
            0.7 * MAX_SPEED_METERS_PER_SECOND,
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_rotation_lock_zeroes_omega() {
        let mut teleop = robot_relative();
        teleop.toggle_rotation_lock();
        assert!(teleop.state().rotation_locked);
        for rotation in [1.0, -1.0] {
            let input = OperatorInput {
                rotation,
                ..full_stick()
            };
            let demand = teleop.compute_demand(&input, Rotation2d::ZERO);
            assert_eq!(demand.omega, 0.0);
            assert!(demand.vx > 0.0);
        }
        teleop.set_rotation_lock(false);
        assert!(teleop.compute_demand(&full_stick(), Rotation2d::ZERO).omega > 0.0);
    }

    #[test]
    fn test_field_relative_uses_heading() {
        let mut teleop = TeleopDrive::new(TeleopConfig::default()).unwrap();
        assert!(teleop.state().field_relative);
        let input = OperatorInput {
            forward: 1.0,
            turbo: true,
            ..OperatorInput::default()
        };

        // Robot turned to face field +Y: field forward is chassis right
        let demand = teleop.compute_demand(&input, Rotation2d::from_degrees(90.0));
        assert_relative_eq!(demand.vx, 0.0, epsilon = 1e-9);
        assert_relative_eq!(demand.vy, -MAX_SPEED_METERS_PER_SECOND, epsilon = 1e-9);

        teleop.toggle_field_relative();
        let demand = teleop.compute_demand(&input, Rotation2d::from_degrees(90.0));
        assert_relative_eq!(demand.vx, MAX_SPEED_METERS_PER_SECOND);
        assert_eq!(demand.vy, 0.0);
    }

    #[test]
    fn test_rejects_full_range_deadband() {
        let config = TeleopConfig {
            axis_deadband: 1.0,
            ..TeleopConfig::default()
        };
        assert!(matches!(TeleopDrive::new(config), Err(DriveError::InvalidConfig(_))));
    }

    #[test]
    fn test_noise_inside_deadband_is_still() {
        let mut teleop = TeleopDrive::new(TeleopConfig::default()).unwrap();
        let input = OperatorInput {
            forward: 0.05,
            strafe: -0.08,
            rotation: 0.12,
            throttle: Some(1.0),
            ..OperatorInput::default()
        };
        assert!(teleop.compute_demand(&input, Rotation2d::from_degrees(33.0)).is_zero());
    }
}
