// Chassis coordinator for the four-module swerve base
//
// Combines module controllers, kinematics and odometry behind the API the
// runtime (or an autonomous routine) drives once per cycle.

use tracing::{debug, info, warn};

use super::DriveError;
use super::geometry::{ChassisVelocity, ModulePosition, ModuleState, Pose2d, Rotation2d};
use super::io::{Gyro, ModuleIo};
use super::kinematics::{SwerveKinematics, desaturate};
use super::module::SwerveModule;
use super::odometry::SwerveOdometry;
use crate::config::{MODULE_NAMES, SwerveConfig};

pub struct SwerveDrive {
    modules: [SwerveModule; 4],
    kinematics: SwerveKinematics,
    odometry: SwerveOdometry,
    gyro: Box<dyn Gyro>,
    heading: Rotation2d,
    max_speed: f64,
    brake_mode: bool,
    halted_for_stale: bool,
}

impl SwerveDrive {
    /// Build the chassis from four module interfaces in wiring order
    /// (front-left, front-right, back-left, back-right).
    pub fn new(
        config: &SwerveConfig,
        ios: [Box<dyn ModuleIo>; 4],
        gyro: Box<dyn Gyro>,
    ) -> Result<Self, DriveError> {
        config.validate()?;
        let kinematics = SwerveKinematics::new(config.module_offsets)?;

        let gains = config.gains();
        // `map` visits the array in order
        let mut index = 0;
        let modules = ios.map(|io| {
            let module = SwerveModule::new(MODULE_NAMES[index], io, gains);
            index += 1;
            module
        });

        info!(
            "Swerve drive ready: offsets {:?}, max speed {} m/s",
            config.module_offsets, config.max_speed
        );

        Ok(Self {
            modules,
            kinematics,
            odometry: SwerveOdometry::new(),
            gyro,
            heading: Rotation2d::ZERO,
            max_speed: config.max_speed,
            brake_mode: false,
            halted_for_stale: false,
        })
    }

    /// Refresh every module measurement and the heading. First step of a cycle.
    pub fn refresh(&mut self) {
        for module in &mut self.modules {
            module.update_measurement();
        }

        let measured = self.measured_velocity();
        if let Some(heading) = self.gyro.read_heading(&measured) {
            self.heading = heading;
        }
    }

    /// Drive with a chassis-frame velocity. Returns the commanded module states.
    pub fn drive(&mut self, velocity: ChassisVelocity) -> [ModuleState; 4] {
        let mut states = self.kinematics.to_module_states(velocity);
        desaturate(&mut states, self.max_speed);
        self.set_module_states(states)
    }

    /// Command module states directly, skipping kinematics.
    ///
    /// If any module has gone stale the chassis is stopped instead.
    pub fn set_module_states(&mut self, states: [ModuleState; 4]) -> [ModuleState; 4] {
        if self.any_stale() {
            if !self.halted_for_stale {
                warn!("Stale module measurements, stopping chassis");
                self.halted_for_stale = true;
            }
            self.stop();
            return self.commanded_states();
        }
        if self.halted_for_stale {
            info!("Module measurements fresh again, resuming drive");
            self.halted_for_stale = false;
        }

        let mut commanded = [ModuleState::default(); 4];
        for (i, module) in self.modules.iter_mut().enumerate() {
            commanded[i] = module.apply_desired_state(states[i]);
        }
        commanded
    }

    /// Zero every actuator.
    pub fn stop(&mut self) {
        debug!("Stopping all modules");
        for module in &mut self.modules {
            module.stop();
        }
    }

    pub fn set_brake_mode(&mut self, enable: bool) {
        info!("Setting {} mode", if enable { "brake" } else { "coast" });
        for module in &mut self.modules {
            module.set_brake_mode(enable);
        }
        self.brake_mode = enable;
    }

    pub fn brake_mode(&self) -> bool {
        self.brake_mode
    }

    /// Zero drive encoders and align steering encoders.
    ///
    /// Odometry stops tracking and picks up the new encoder positions on the
    /// next cycle where every module reports, keeping the pose it had.
    pub fn align_encoders(&mut self) {
        info!("Aligning module encoders");
        for module in &mut self.modules {
            module.reset_drive_encoder();
            module.sync_turn_encoder_to_absolute();
        }
        self.odometry.reset();
    }

    /// Integrate the measurements from [`refresh`](Self::refresh) into the pose.
    ///
    /// Tracking (re)starts on the first cycle where every module has reported.
    pub fn update_odometry(&mut self) -> Pose2d {
        let positions = self.module_positions();

        if !self.odometry.is_tracking() {
            if self.all_measured() {
                info!("Odometry tracking from heading {}", self.heading);
                let last = self.odometry.pose();
                self.odometry
                    .initialize_at(Pose2d::new(last.x, last.y, self.heading), positions);
            }
            return self.odometry.pose();
        }

        match self.odometry.update(&self.kinematics, self.heading, positions) {
            Ok(pose) => pose,
            Err(e) => {
                warn!("Odometry update failed: {}", e);
                self.odometry.pose()
            }
        }
    }

    pub fn pose(&self) -> Pose2d {
        self.odometry.pose()
    }

    pub fn heading(&self) -> Rotation2d {
        self.heading
    }

    /// Measured wheel speeds and angles.
    pub fn module_states(&self) -> [ModuleState; 4] {
        std::array::from_fn(|i| self.modules[i].state())
    }

    pub fn module_positions(&self) -> [ModulePosition; 4] {
        std::array::from_fn(|i| self.modules[i].position())
    }

    pub fn commanded_states(&self) -> [ModuleState; 4] {
        std::array::from_fn(|i| self.modules[i].commanded())
    }

    /// Chassis velocity reconstructed from measured module states.
    pub fn measured_velocity(&self) -> ChassisVelocity {
        self.kinematics.to_chassis_velocity(&self.module_states())
    }

    pub fn encoders_connected(&self) -> [bool; 4] {
        std::array::from_fn(|i| self.modules[i].encoder_connected())
    }

    pub fn any_stale(&self) -> bool {
        self.modules.iter().any(SwerveModule::is_stale)
    }

    pub fn modules(&self) -> &[SwerveModule; 4] {
        &self.modules
    }

    fn all_measured(&self) -> bool {
        // Stale covers both "never measured" and "gap too long"
        !self.any_stale()
    }
}

impl Drop for SwerveDrive {
    fn drop(&mut self) {
        // Never leave a nonzero actuation behind
        self.stop();
    }
}
