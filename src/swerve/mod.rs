// Swerve drive core for the four-module base
//
// Provides:
// - Planar geometry (angles, poses, chassis velocities)
// - Swerve kinematics with desaturation
// - Module hardware contract with simulated and zenoh-bridged backends
// - Per-module controller, odometry and the chassis coordinator

pub mod bridge;
mod drive;
pub mod geometry;
pub mod io;
pub mod kinematics;
pub mod module;
pub mod odometry;
pub mod sim;

pub use drive::SwerveDrive;
pub use geometry::{ChassisVelocity, ModulePosition, ModuleState, Pose2d, Rotation2d, Translation2d};
pub use io::{Gyro, ModuleIo, ModuleMeasurement};
pub use kinematics::{SwerveKinematics, desaturate};
pub use module::SwerveModule;
pub use odometry::SwerveOdometry;

/// Error types for the drive core
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DriveError {
    #[error("Module offsets are degenerate: chassis velocity cannot be recovered")]
    DegenerateGeometry,

    #[error("Odometry updated before initialization")]
    OdometryNotInitialized,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(&'static str),
}
