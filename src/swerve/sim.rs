// Simulated module hardware and gyro
//
// First-order DC actuator models stepped once per measurement read. Good
// enough to close the steering loop and exercise odometry without hardware.

use tracing::debug;

use super::geometry::{ChassisVelocity, Rotation2d};
use super::io::{Gyro, MAX_VOLTAGE, ModuleIo, ModuleMeasurement, clamp_voltage};

/// Wheel surface speed at full voltage (m/s)
pub const DRIVE_FREE_SPEED_MPS: f64 = 5.0;
/// Steering rate at full voltage (rad/s)
pub const TURN_FREE_SPEED_RAD_PER_SEC: f64 = 40.0;

const DRIVE_TIME_CONSTANT: f64 = 0.08;
const TURN_TIME_CONSTANT: f64 = 0.04;
// Shorter spin-down while braking with zero voltage
const BRAKE_TIME_CONSTANT: f64 = 0.03;

const DRIVE_STALL_CURRENT: f64 = 80.0;
const TURN_STALL_CURRENT: f64 = 40.0;
const AMBIENT_TEMP_C: f64 = 25.0;

/// First-order motor: velocity relaxes toward the voltage-proportional free speed.
#[derive(Debug, Clone, Copy, Default)]
struct SimActuator {
    position: f64,
    velocity: f64,
    applied_volts: f64,
    brake: bool,
}

impl SimActuator {
    fn step(&mut self, dt: f64, free_speed: f64, time_constant: f64) {
        let target = self.applied_volts / MAX_VOLTAGE * free_speed;
        let tau = if self.brake && self.applied_volts == 0.0 {
            BRAKE_TIME_CONSTANT
        } else {
            time_constant
        };
        let alpha = (dt / tau).min(1.0);
        self.velocity += (target - self.velocity) * alpha;
        self.position += self.velocity * dt;
    }

    /// Current drawn, from the gap between applied and back-EMF voltage.
    fn current(&self, free_speed: f64, stall_current: f64) -> f64 {
        let back_emf = self.velocity / free_speed * MAX_VOLTAGE;
        ((self.applied_volts - back_emf) / MAX_VOLTAGE * stall_current).abs()
    }
}

/// Simulated swerve module.
#[derive(Debug, Clone)]
pub struct SimModuleIo {
    period: f64,
    drive: SimActuator,
    turn: SimActuator,
    // Incremental steering encoder reads `turn.position - turn_encoder_zero`
    turn_encoder_zero: f64,
    drive_encoder_zero: f64,
}

impl SimModuleIo {
    /// A module stepped every `period` seconds, wheel initially at angle zero.
    pub fn new(period: f64) -> Self {
        Self::with_initial_angle(period, Rotation2d::ZERO)
    }

    /// The steering encoder boots reading zero while the wheel actually sits at
    /// `initial_angle`, like a real incremental encoder at power-on.
    pub fn with_initial_angle(period: f64, initial_angle: Rotation2d) -> Self {
        let turn = SimActuator {
            position: initial_angle.radians(),
            ..SimActuator::default()
        };
        Self {
            period,
            drive: SimActuator::default(),
            turn,
            turn_encoder_zero: initial_angle.radians(),
            drive_encoder_zero: 0.0,
        }
    }

    fn measure(&self) -> ModuleMeasurement {
        ModuleMeasurement {
            drive_position_meters: self.drive.position - self.drive_encoder_zero,
            drive_velocity_mps: self.drive.velocity,
            drive_applied_volts: self.drive.applied_volts,
            drive_current_amps: self.drive.current(DRIVE_FREE_SPEED_MPS, DRIVE_STALL_CURRENT),
            drive_temp_c: AMBIENT_TEMP_C,
            turn_absolute_angle: Rotation2d::from_radians(self.turn.position),
            turn_angle: Rotation2d::from_radians(self.turn.position - self.turn_encoder_zero),
            turn_velocity_rad_per_sec: self.turn.velocity,
            turn_applied_volts: self.turn.applied_volts,
            turn_current_amps: self.turn.current(TURN_FREE_SPEED_RAD_PER_SEC, TURN_STALL_CURRENT),
            turn_temp_c: AMBIENT_TEMP_C,
            turn_encoder_connected: true,
        }
    }
}

impl ModuleIo for SimModuleIo {
    fn update_measurement(&mut self) -> Option<ModuleMeasurement> {
        self.drive.step(self.period, DRIVE_FREE_SPEED_MPS, DRIVE_TIME_CONSTANT);
        self.turn.step(self.period, TURN_FREE_SPEED_RAD_PER_SEC, TURN_TIME_CONSTANT);
        Some(self.measure())
    }

    fn set_drive_voltage(&mut self, volts: f64) {
        self.drive.applied_volts = clamp_voltage(volts);
    }

    fn set_turn_voltage(&mut self, volts: f64) {
        self.turn.applied_volts = clamp_voltage(volts);
    }

    fn set_drive_brake_mode(&mut self, enable: bool) {
        self.drive.brake = enable;
    }

    fn set_turn_brake_mode(&mut self, enable: bool) {
        self.turn.brake = enable;
    }

    fn reset_drive_encoder(&mut self) {
        self.drive_encoder_zero = self.drive.position;
    }

    fn sync_turn_encoder_to_absolute(&mut self) {
        debug!(
            "Sim: syncing turn encoder ({:.3} rad offset)",
            self.turn_encoder_zero
        );
        self.turn_encoder_zero = 0.0;
    }
}

/// Gyro that integrates the chassis yaw rate measured by the modules.
///
/// Steps by the same `period` as [`SimModuleIo`] so heading and wheel travel
/// share one clock.
#[derive(Debug, Clone, Copy)]
pub struct SimGyro {
    period: f64,
    heading: f64,
}

impl SimGyro {
    pub fn new(period: f64) -> Self {
        Self::with_initial_heading(period, Rotation2d::ZERO)
    }

    pub fn with_initial_heading(period: f64, initial: Rotation2d) -> Self {
        Self {
            period,
            heading: initial.radians(),
        }
    }
}

impl Gyro for SimGyro {
    fn read_heading(&mut self, measured: &ChassisVelocity) -> Option<Rotation2d> {
        self.heading += measured.omega * self.period;
        Some(Rotation2d::from_radians(self.heading))
    }
}
