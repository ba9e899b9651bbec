// Hardware contract for one swerve module and the heading sensor
//
// Real actuators (via the zenoh bridge) and the simulation both implement
// these traits; the chassis never knows which one it is talking to.

use serde::{Deserialize, Serialize};

use super::geometry::{ChassisVelocity, Rotation2d};

/// Safe actuator voltage range is `[-MAX_VOLTAGE, MAX_VOLTAGE]`.
pub const MAX_VOLTAGE: f64 = 12.0;

/// Clamp a voltage request to the actuator range.
pub fn clamp_voltage(volts: f64) -> f64 {
    if volts.is_nan() {
        return 0.0;
    }
    volts.clamp(-MAX_VOLTAGE, MAX_VOLTAGE)
}

/// One sample of every sensor on a module
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModuleMeasurement {
    pub drive_position_meters: f64,
    pub drive_velocity_mps: f64,
    pub drive_applied_volts: f64,
    pub drive_current_amps: f64,
    pub drive_temp_c: f64,

    pub turn_absolute_angle: Rotation2d,
    pub turn_angle: Rotation2d,
    pub turn_velocity_rad_per_sec: f64,
    pub turn_applied_volts: f64,
    pub turn_current_amps: f64,
    pub turn_temp_c: f64,

    pub turn_encoder_connected: bool,
}

impl Default for ModuleMeasurement {
    fn default() -> Self {
        Self {
            drive_position_meters: 0.0,
            drive_velocity_mps: 0.0,
            drive_applied_volts: 0.0,
            drive_current_amps: 0.0,
            drive_temp_c: 0.0,
            turn_absolute_angle: Rotation2d::ZERO,
            turn_angle: Rotation2d::ZERO,
            turn_velocity_rad_per_sec: 0.0,
            turn_applied_volts: 0.0,
            turn_current_amps: 0.0,
            turn_temp_c: 0.0,
            turn_encoder_connected: true,
        }
    }
}

/// Capability set a physical or simulated module must provide.
pub trait ModuleIo {
    /// Read a fresh measurement. `None` means no new data this cycle; the
    /// caller keeps using the previous sample. Must not block.
    fn update_measurement(&mut self) -> Option<ModuleMeasurement>;

    /// Drive actuator voltage, clamped by the implementer to [`MAX_VOLTAGE`].
    fn set_drive_voltage(&mut self, volts: f64);

    /// Turn actuator voltage, clamped by the implementer to [`MAX_VOLTAGE`].
    fn set_turn_voltage(&mut self, volts: f64);

    /// Both voltages for one cycle. Override when the two should reach the
    /// hardware together.
    fn set_voltages(&mut self, drive_volts: f64, turn_volts: f64) {
        self.set_drive_voltage(drive_volts);
        self.set_turn_voltage(turn_volts);
    }

    fn set_drive_brake_mode(&mut self, enable: bool);

    fn set_turn_brake_mode(&mut self, enable: bool);

    /// Zero both actuators.
    fn stop(&mut self) {
        self.set_drive_voltage(0.0);
        self.set_turn_voltage(0.0);
    }

    fn reset_drive_encoder(&mut self) {}

    /// Align the incremental steering encoder with the absolute one.
    /// Idempotent; skipping it only costs steering accuracy.
    fn sync_turn_encoder_to_absolute(&mut self) {}
}

/// Source of the chassis heading used for odometry and field-relative drive.
pub trait Gyro {
    /// Latest heading, or `None` if the sensor has nothing new.
    ///
    /// `measured` is the chassis velocity reconstructed from this cycle's
    /// module measurements. Physical sensors ignore it; the simulated gyro
    /// integrates it over its own step period.
    fn read_heading(&mut self, measured: &ChassisVelocity) -> Option<Rotation2d>;
}
