// Per-module controller: owns one hardware interface, caches its latest
// measurement and turns a desired module state into actuator voltages.

use std::f64::consts::FRAC_PI_2;

use tracing::{debug, info, warn};

use super::geometry::{ModulePosition, ModuleState, Rotation2d};
use super::io::{ModuleIo, ModuleMeasurement};

/// Gains and limits used to turn a module state into voltages.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModuleGains {
    /// Speed that maps to full drive voltage (m/s).
    pub max_speed: f64,
    /// Steering volts per radian of angle error.
    pub turn_kp: f64,
    pub nominal_voltage: f64,
    /// Cycles a previous measurement may be reused before the module is stale.
    pub max_missed_measurements: u32,
}

/// Pick the equivalent state that needs at most a quarter turn from `current`.
///
/// If the target angle is more than 90° away, steer to the opposite angle and
/// run the wheel backwards instead.
pub fn optimize(desired: ModuleState, current: Rotation2d) -> ModuleState {
    let delta = desired.angle - current;
    if delta.radians().abs() > FRAC_PI_2 {
        ModuleState::new(-desired.speed, desired.angle.flipped())
    } else {
        desired
    }
}

pub struct SwerveModule {
    name: &'static str,
    io: Box<dyn ModuleIo>,
    gains: ModuleGains,
    measurement: ModuleMeasurement,
    has_measurement: bool,
    missed_measurements: u32,
    encoder_connected: bool,
    commanded: ModuleState,
}

impl SwerveModule {
    pub fn new(name: &'static str, io: Box<dyn ModuleIo>, gains: ModuleGains) -> Self {
        Self {
            name,
            io,
            gains,
            measurement: ModuleMeasurement::default(),
            has_measurement: false,
            missed_measurements: 0,
            encoder_connected: true,
            commanded: ModuleState::default(),
        }
    }

    /// Pull a fresh measurement from the hardware. Call once per cycle,
    /// before anything reads this module.
    pub fn update_measurement(&mut self) {
        let Some(mut sample) = self.io.update_measurement() else {
            self.missed_measurements = self.missed_measurements.saturating_add(1);
            if self.missed_measurements == self.gains.max_missed_measurements + 1 {
                warn!(
                    "Module {}: no measurement for {} cycles, treating as stale",
                    self.name, self.missed_measurements
                );
            }
            return;
        };

        if self.missed_measurements > self.gains.max_missed_measurements {
            info!("Module {}: measurements resumed", self.name);
        }

        if !sample.turn_encoder_connected {
            if self.encoder_connected {
                warn!(
                    "Module {}: turn encoder disconnected, holding last angle {}",
                    self.name, self.measurement.turn_angle
                );
            }
            // Keep steering on the last trusted angles
            sample.turn_angle = self.measurement.turn_angle;
            sample.turn_absolute_angle = self.measurement.turn_absolute_angle;
            sample.turn_velocity_rad_per_sec = 0.0;
        } else if !self.encoder_connected {
            info!("Module {}: turn encoder reconnected", self.name);
        }

        self.encoder_connected = sample.turn_encoder_connected;
        self.measurement = sample;
        self.has_measurement = true;
        self.missed_measurements = 0;
    }

    /// Optimize `desired` against the measured angle and command the actuators.
    ///
    /// Returns the state that was actually commanded.
    pub fn apply_desired_state(&mut self, desired: ModuleState) -> ModuleState {
        let current = self.measurement.turn_angle;
        let optimized = optimize(desired, current);

        // Open loop drive, proportional steering
        let drive_volts = optimized.speed / self.gains.max_speed * self.gains.nominal_voltage;
        let turn_error = (optimized.angle - current).radians();
        // The held angle never converges, so steering is left unpowered
        let turn_volts = if self.encoder_connected {
            turn_error * self.gains.turn_kp
        } else {
            0.0
        };

        debug!(
            "Module {}: speed={:.2} angle={} -> drive={:.2}V turn={:.2}V",
            self.name, optimized.speed, optimized.angle, drive_volts, turn_volts
        );

        self.io.set_voltages(drive_volts, turn_volts);
        self.commanded = optimized;
        optimized
    }

    /// Zero both actuators. Safe before the first measurement.
    pub fn stop(&mut self) {
        self.io.stop();
        self.commanded.speed = 0.0;
    }

    pub fn set_brake_mode(&mut self, enable: bool) {
        self.io.set_drive_brake_mode(enable);
        self.io.set_turn_brake_mode(enable);
    }

    pub fn reset_drive_encoder(&mut self) {
        self.io.reset_drive_encoder();
    }

    pub fn sync_turn_encoder_to_absolute(&mut self) {
        self.io.sync_turn_encoder_to_absolute();
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn measurement(&self) -> &ModuleMeasurement {
        &self.measurement
    }

    /// Measured wheel speed and steering angle.
    pub fn state(&self) -> ModuleState {
        ModuleState::new(self.measurement.drive_velocity_mps, self.measurement.turn_angle)
    }

    pub fn position(&self) -> ModulePosition {
        ModulePosition::new(
            self.measurement.drive_position_meters,
            self.measurement.turn_angle,
        )
    }

    pub fn commanded(&self) -> ModuleState {
        self.commanded
    }

    pub fn encoder_connected(&self) -> bool {
        self.encoder_connected
    }

    /// No usable measurement within the allowed number of missed cycles.
    pub fn is_stale(&self) -> bool {
        !self.has_measurement || self.missed_measurements > self.gains.max_missed_measurements
    }
}
