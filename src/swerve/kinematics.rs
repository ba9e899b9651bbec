// Swerve inverse and forward kinematics for the four-module chassis
// Converts chassis velocities to per-module (speed, angle) and back.

use nalgebra::{Matrix3, SMatrix, SVector};

use super::DriveError;
use super::geometry::{ChassisVelocity, ModulePosition, ModuleState, Rotation2d, Translation2d, Twist2d};

/// Module vectors shorter than this have no meaningful direction.
const MIN_MODULE_SPEED: f64 = 1e-9;

/// Rows `2i` and `2i + 1` map `[vx, vy, omega]` to the x/y velocity of module `i`.
type InverseMatrix = SMatrix<f64, 8, 3>;
/// Least-squares inverse of [`InverseMatrix`].
type ForwardMatrix = SMatrix<f64, 3, 8>;

/// Kinematics for four modules at fixed offsets from the chassis center.
///
/// Module order is front-left, front-right, back-left, back-right and must
/// match the order of every state and position array passed in.
#[derive(Debug, Clone)]
pub struct SwerveKinematics {
    modules: [Translation2d; 4],
    forward: ForwardMatrix,
    // Last commanded angle per module, held while a module is at rest
    headings: [Rotation2d; 4],
}

impl SwerveKinematics {
    pub fn new(modules: [Translation2d; 4]) -> Result<Self, DriveError> {
        let mut inverse = InverseMatrix::zeros();
        for (i, offset) in modules.iter().enumerate() {
            inverse[(2 * i, 0)] = 1.0;
            inverse[(2 * i, 2)] = -offset.y;
            inverse[(2 * i + 1, 1)] = 1.0;
            inverse[(2 * i + 1, 2)] = offset.x;
        }

        let normal: Matrix3<f64> = inverse.transpose() * inverse;
        let normal_inv = normal
            .try_inverse()
            .ok_or(DriveError::DegenerateGeometry)?;
        let forward = normal_inv * inverse.transpose();

        Ok(Self {
            modules,
            forward,
            headings: [Rotation2d::ZERO; 4],
        })
    }

    pub fn modules(&self) -> &[Translation2d; 4] {
        &self.modules
    }

    /// Convert a chassis-frame velocity into the four module states.
    ///
    /// A module whose velocity vector is ~0 keeps its previous angle instead
    /// of snapping back to zero, so wheels do not twitch when the chassis stops.
    pub fn to_module_states(&mut self, velocity: ChassisVelocity) -> [ModuleState; 4] {
        let mut states = [ModuleState::default(); 4];

        for (i, offset) in self.modules.iter().enumerate() {
            // v_module = v + omega x r
            let vx = velocity.vx - velocity.omega * offset.y;
            let vy = velocity.vy + velocity.omega * offset.x;
            let speed = vx.hypot(vy);

            states[i] = if speed < MIN_MODULE_SPEED {
                ModuleState::new(0.0, self.headings[i])
            } else {
                let angle = Rotation2d::from_xy(vx, vy);
                self.headings[i] = angle;
                ModuleState::new(speed, angle)
            };
        }

        states
    }

    /// Least-squares chassis velocity that best explains the module states.
    pub fn to_chassis_velocity(&self, states: &[ModuleState; 4]) -> ChassisVelocity {
        let mut module_velocities = SVector::<f64, 8>::zeros();
        for (i, state) in states.iter().enumerate() {
            module_velocities[2 * i] = state.speed * state.angle.cos();
            module_velocities[2 * i + 1] = state.speed * state.angle.sin();
        }

        let chassis = self.forward * module_velocities;
        ChassisVelocity::new(chassis[0], chassis[1], chassis[2])
    }

    /// Chassis-frame displacement between two sets of module positions.
    ///
    /// Each module's travel is taken along its angle at `end`.
    pub fn to_twist(&self, start: &[ModulePosition; 4], end: &[ModulePosition; 4]) -> Twist2d {
        let mut module_deltas = SVector::<f64, 8>::zeros();
        for i in 0..4 {
            let distance = end[i].distance - start[i].distance;
            module_deltas[2 * i] = distance * end[i].angle.cos();
            module_deltas[2 * i + 1] = distance * end[i].angle.sin();
        }

        let twist = self.forward * module_deltas;
        Twist2d {
            dx: twist[0],
            dy: twist[1],
            dtheta: twist[2],
        }
    }
}

/// Uniformly scale module speeds so none exceeds `max_speed`.
///
/// Angles and speed ratios between modules are left untouched.
pub fn desaturate(states: &mut [ModuleState; 4], max_speed: f64) {
    let max_observed = states.iter().map(|s| s.speed.abs()).fold(0.0f64, f64::max);

    if max_observed > max_speed {
        let scale = max_speed / max_observed;
        for state in states.iter_mut() {
            state.speed *= scale;
        }
    }
}

/// Module offsets for a rectangular frame, in wiring order.
pub fn rectangular_layout(wheelbase: f64, track_width: f64) -> [Translation2d; 4] {
    let (x, y) = (wheelbase / 2.0, track_width / 2.0);
    [
        Translation2d::new(x, y),   // front left
        Translation2d::new(x, -y),  // front right
        Translation2d::new(-x, y),  // back left
        Translation2d::new(-x, -y), // back right
    ]
}
