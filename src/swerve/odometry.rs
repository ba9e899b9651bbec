// Dead-reckoning pose estimation from module travel and an external heading.

use tracing::debug;

use super::DriveError;
use super::geometry::{ModulePosition, Pose2d, Rotation2d};
use super::kinematics::SwerveKinematics;

#[derive(Debug, Clone, Copy, PartialEq)]
enum Tracking {
    Uninitialized,
    Tracking {
        heading: Rotation2d,
        positions: [ModulePosition; 4],
    },
}

/// Integrates module position deltas into a field-frame pose.
///
/// The heading is always taken from the sensor; module data only supplies
/// the translation.
#[derive(Debug, Clone)]
pub struct SwerveOdometry {
    state: Tracking,
    pose: Pose2d,
}

impl Default for SwerveOdometry {
    fn default() -> Self {
        Self::new()
    }
}

impl SwerveOdometry {
    pub fn new() -> Self {
        Self {
            state: Tracking::Uninitialized,
            pose: Pose2d::default(),
        }
    }

    /// Start tracking from the origin. Calling it again resets the pose.
    pub fn initialize(&mut self, heading: Rotation2d, positions: [ModulePosition; 4]) {
        self.initialize_at(Pose2d::new(0.0, 0.0, heading), positions);
    }

    /// Start tracking from a known field position.
    pub fn initialize_at(&mut self, pose: Pose2d, positions: [ModulePosition; 4]) {
        self.state = Tracking::Tracking {
            heading: pose.heading,
            positions,
        };
        self.pose = pose;
    }

    /// Stop tracking but keep the last pose. The next `initialize_at` picks
    /// up new reference positions, e.g. after the encoders were re-zeroed.
    pub fn reset(&mut self) {
        self.state = Tracking::Uninitialized;
    }

    pub fn is_tracking(&self) -> bool {
        matches!(self.state, Tracking::Tracking { .. })
    }

    /// Advance the pose with the latest heading and module positions.
    pub fn update(
        &mut self,
        kinematics: &SwerveKinematics,
        heading: Rotation2d,
        positions: [ModulePosition; 4],
    ) -> Result<Pose2d, DriveError> {
        let Tracking::Tracking {
            heading: last_heading,
            positions: last_positions,
        } = self.state
        else {
            return Err(DriveError::OdometryNotInitialized);
        };

        let mut twist = kinematics.to_twist(&last_positions, &positions);
        // Heading change comes from the sensor, not from wheel slip-prone geometry
        twist.dtheta = (heading - last_heading).radians();

        let mut pose = self.pose.exp(twist);
        pose.heading = heading;

        debug!("Odometry twist {:?} -> pose {}", twist, pose);

        self.pose = pose;
        self.state = Tracking::Tracking { heading, positions };
        Ok(pose)
    }

    pub fn pose(&self) -> Pose2d {
        self.pose
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::swerve::kinematics::rectangular_layout;
    use approx::assert_relative_eq;
    use std::f64::consts::PI;

    fn kinematics() -> SwerveKinematics {
        SwerveKinematics::new(rectangular_layout(0.56, 0.56)).unwrap()
    }

    fn uniform(distance: f64, angle: Rotation2d) -> [ModulePosition; 4] {
        [ModulePosition::new(distance, angle); 4]
    }

    #[test]
    fn test_update_requires_initialize() {
        let mut odometry = SwerveOdometry::new();
        let result = odometry.update(&kinematics(), Rotation2d::ZERO, uniform(0.0, Rotation2d::ZERO));
        assert!(matches!(result, Err(DriveError::OdometryNotInitialized)));
        assert!(!odometry.is_tracking());
    }

    #[test]
    fn test_constant_inputs_leave_pose_unchanged() {
        let kinematics = kinematics();
        let mut odometry = SwerveOdometry::new();
        let heading = Rotation2d::from_degrees(30.0);
        odometry.initialize(heading, uniform(0.0, Rotation2d::ZERO));

        let moved = odometry
            .update(&kinematics, heading, uniform(1.0, Rotation2d::ZERO))
            .unwrap();
        let again = odometry
            .update(&kinematics, heading, uniform(1.0, Rotation2d::ZERO))
            .unwrap();
        assert_eq!(moved, again);
    }

    #[test]
    fn test_straight_travel_follows_heading() {
        let kinematics = kinematics();
        let mut odometry = SwerveOdometry::new();
        let heading = Rotation2d::from_degrees(90.0);
        odometry.initialize(heading, uniform(0.0, Rotation2d::ZERO));

        // Wheels point chassis-forward, chassis faces field +Y
        let pose = odometry
            .update(&kinematics, heading, uniform(2.0, Rotation2d::ZERO))
            .unwrap();
        assert_relative_eq!(pose.x, 0.0, epsilon = 1e-9);
        assert_relative_eq!(pose.y, 2.0, epsilon = 1e-9);
        assert_eq!(pose.heading, heading);
    }

    #[test]
    fn test_strafe_with_steered_wheels() {
        let kinematics = kinematics();
        let mut odometry = SwerveOdometry::new();
        let left = Rotation2d::from_degrees(90.0);
        odometry.initialize(Rotation2d::ZERO, uniform(0.0, left));

        let pose = odometry
            .update(&kinematics, Rotation2d::ZERO, uniform(0.5, left))
            .unwrap();
        assert_relative_eq!(pose.x, 0.0, epsilon = 1e-9);
        assert_relative_eq!(pose.y, 0.5, epsilon = 1e-9);
    }

    #[test]
    fn test_spin_in_place_stays_at_origin() {
        let kinematics = kinematics();
        let mut odometry = SwerveOdometry::new();
        let tangent = [
            Rotation2d::from_degrees(135.0),
            Rotation2d::from_degrees(45.0),
            Rotation2d::from_degrees(-135.0),
            Rotation2d::from_degrees(-45.0),
        ];
        let positions = |d: f64| tangent.map(|a| ModulePosition::new(d, a));
        odometry.initialize(Rotation2d::ZERO, positions(0.0));

        let radius = kinematics.modules()[0].norm();
        let pose = odometry
            .update(&kinematics, Rotation2d::from_radians(PI / 4.0), positions(radius * PI / 4.0))
            .unwrap();
        assert_relative_eq!(pose.x, 0.0, epsilon = 1e-9);
        assert_relative_eq!(pose.y, 0.0, epsilon = 1e-9);
        assert_relative_eq!(pose.heading.radians(), PI / 4.0, epsilon = 1e-12);
    }

    #[test]
    fn test_reinitialize_resets_pose() {
        let kinematics = kinematics();
        let mut odometry = SwerveOdometry::new();
        odometry.initialize(Rotation2d::ZERO, uniform(0.0, Rotation2d::ZERO));
        odometry
            .update(&kinematics, Rotation2d::ZERO, uniform(3.0, Rotation2d::ZERO))
            .unwrap();

        odometry.initialize(Rotation2d::ZERO, uniform(3.0, Rotation2d::ZERO));
        assert_eq!(odometry.pose(), Pose2d::default());
    }

    #[test]
    fn test_reset_keeps_pose_until_reinitialized() {
        let kinematics = kinematics();
        let mut odometry = SwerveOdometry::new();
        odometry.initialize(Rotation2d::ZERO, uniform(0.0, Rotation2d::ZERO));
        let pose = odometry
            .update(&kinematics, Rotation2d::ZERO, uniform(2.0, Rotation2d::ZERO))
            .unwrap();

        odometry.reset();
        assert!(!odometry.is_tracking());
        assert_eq!(odometry.pose(), pose);
        // Encoders were re-zeroed: no update until new reference positions
        let result = odometry.update(&kinematics, Rotation2d::ZERO, uniform(0.0, Rotation2d::ZERO));
        assert!(matches!(result, Err(DriveError::OdometryNotInitialized)));

        odometry.initialize_at(pose, uniform(0.0, Rotation2d::ZERO));
        let moved = odometry
            .update(&kinematics, Rotation2d::ZERO, uniform(0.5, Rotation2d::ZERO))
            .unwrap();
        assert_relative_eq!(moved.x, pose.x + 0.5, epsilon = 1e-9);
    }
}
