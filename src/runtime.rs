// 50 Hz drive loop with watchdog
// Note: a watchdog is a safety mechanism that triggers a safe action if something goes wrong
// Eg. if teleop crashes and stops sending input, the chassis is stopped instead of running on the last demand
//
// Each cycle runs in a fixed order: refresh measurements, evaluate the demand,
// kinematics + module actuation, odometry.

use std::time::{Duration, Instant};

use serde::de::DeserializeOwned;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{info, warn};
use zenoh::handlers::FifoChannelHandler;
use zenoh::pubsub::Subscriber;
use zenoh::sample::Sample;

use crate::config::{
    CMD_TIMEOUT, MODULE_NAMES, SwerveConfig, TOPIC_CMD_BASE, TOPIC_CMD_EVENT, TOPIC_CMD_INPUT,
    TOPIC_HEALTH, TOPIC_POSE, TeleopConfig,
};
use crate::messages::{BaseCommand, DriveEvent, OperatorInput, PoseTelemetry, RuntimeHealth};
use crate::swerve::bridge::{BridgeGyro, BridgeModuleIo};
use crate::swerve::sim::{SimGyro, SimModuleIo};
use crate::swerve::{ChassisVelocity, DriveError, ModuleIo, Pose2d, Rotation2d, SwerveDrive};
use crate::teleop::TeleopDrive;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Where module hardware lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Backend {
    /// In-process actuator models
    Sim,
    /// Remote hardware process over zenoh
    Bridge,
}

// Wheels in the simulation power up pointing somewhere other than forward
const SIM_INITIAL_ANGLES_DEG: [f64; 4] = [0.0, 12.0, -20.0, 7.5];

/// Latest demand, from whichever source spoke last
#[derive(Debug, Clone, Copy)]
enum Demand {
    Operator(OperatorInput),
    Base(BaseCommand),
}

pub struct Runtime {
    drive: SwerveDrive,
    teleop: TeleopDrive,
    latest: Option<Demand>,
    cmd_received_at: Instant,
    cmd_timeout: Duration,
    health: RuntimeHealth,
}

impl Runtime {
    pub fn new(drive: SwerveDrive, teleop: TeleopDrive) -> Self {
        Self {
            drive,
            teleop,
            latest: None,
            cmd_received_at: Instant::now(),
            cmd_timeout: CMD_TIMEOUT,
            health: RuntimeHealth::CmdStale, // Start stale until first input
        }
    }

    /// Runtime over simulated modules stepped every `period` seconds.
    pub fn simulated(
        config: &SwerveConfig,
        teleop: TeleopConfig,
        period: f64,
    ) -> Result<Self, DriveError> {
        let ios = SIM_INITIAL_ANGLES_DEG.map(|deg| {
            Box::new(SimModuleIo::with_initial_angle(period, Rotation2d::from_degrees(deg)))
                as Box<dyn ModuleIo>
        });
        let mut drive = SwerveDrive::new(config, ios, Box::new(SimGyro::new(period)))?;
        drive.align_encoders();
        Ok(Self::new(drive, TeleopDrive::new(teleop)?))
    }

    pub fn with_cmd_timeout(mut self, timeout: Duration) -> Self {
        self.cmd_timeout = timeout;
        self
    }

    /// Process operator input
    pub fn on_input(&mut self, input: OperatorInput) {
        self.latest = Some(Demand::Operator(input));
        self.cmd_received_at = Instant::now();
    }

    /// Process a direct chassis demand
    pub fn on_base_command(&mut self, cmd: BaseCommand) {
        info!("Received base command: {:?}", &cmd);
        self.latest = Some(Demand::Base(cmd));
        self.cmd_received_at = Instant::now();
    }

    /// Apply a discrete operator action; the next cycle sees the new state.
    pub fn on_event(&mut self, event: DriveEvent) {
        info!("Received event: {:?}", event);
        match event {
            DriveEvent::Brake => self.teleop.set_brake_mode(true),
            DriveEvent::Coast => self.teleop.set_brake_mode(false),
            DriveEvent::Stop => {
                // Drop the demand so the next cycle does not resume it
                self.latest = None;
                self.drive.stop();
            }
            DriveEvent::ToggleFieldRelative => self.teleop.toggle_field_relative(),
            DriveEvent::SetFieldRelative { enabled } => self.teleop.set_field_relative(enabled),
            DriveEvent::ToggleRotationLock => self.teleop.toggle_rotation_lock(),
            DriveEvent::SetRotationLock { locked } => self.teleop.set_rotation_lock(locked),
            DriveEvent::AlignEncoders => self.drive.align_encoders(),
        }
    }

    /// Demand for this cycle, `None` when the watchdog has tripped
    fn compute_demand(&mut self) -> Option<ChassisVelocity> {
        let cmd_age = self.cmd_received_at.elapsed();

        if cmd_age > self.cmd_timeout {
            // Watchdog triggered - stop the robot
            if self.latest.is_some() {
                warn!("Command stale ({:?} old), stopping robot", cmd_age);
                self.latest = None;
            }
            return None;
        }

        match self.latest {
            Some(Demand::Operator(input)) => {
                Some(self.teleop.compute_demand(&input, self.drive.heading()))
            }
            Some(Demand::Base(ref cmd)) => Some(ChassisVelocity::from(cmd)),
            None => None,
        }
    }

    /// Run one control cycle
    pub fn cycle(&mut self) -> Pose2d {
        // 1. Fresh measurements and heading
        self.drive.refresh();

        let brake = self.teleop.state().brake_mode;
        if self.drive.brake_mode() != brake {
            self.drive.set_brake_mode(brake);
        }

        // 2. Demand (includes watchdog logic)
        let demand = self.compute_demand();

        // 3 + 4. Kinematics, desaturation and module actuation
        match demand {
            Some(velocity) => {
                self.drive.drive(velocity);
            }
            None => self.drive.stop(),
        }

        // 5. Odometry from the measurements taken in step 1
        let pose = self.drive.update_odometry();

        self.update_health(demand.is_some());
        pose
    }

    fn update_health(&mut self, commanded: bool) {
        let health = if self.drive.any_stale() {
            RuntimeHealth::Degraded
        } else if !commanded {
            RuntimeHealth::CmdStale
        } else if self.drive.encoders_connected().contains(&false) {
            RuntimeHealth::EncoderFault
        } else {
            RuntimeHealth::Ok
        };

        if health != self.health {
            info!("Health: {:?} -> {:?}", self.health, health);
        }
        self.health = health;
    }

    pub fn health(&self) -> RuntimeHealth {
        self.health
    }

    pub fn telemetry(&self) -> PoseTelemetry {
        let state = self.teleop.state();
        PoseTelemetry {
            pose: self.drive.pose(),
            measured: self.drive.measured_velocity(),
            encoders_connected: self.drive.encoders_connected(),
            field_relative: state.field_relative,
            rotation_locked: state.rotation_locked,
            speed_multiplier: state.speed_multiplier,
        }
    }

    pub fn drive(&self) -> &SwerveDrive {
        &self.drive
    }

    /// Stop every module. Runs on every exit path of [`run`].
    pub fn shutdown(&mut self) {
        info!("Shutting down, stopping chassis");
        self.drive.stop();
    }
}

/// Decode every pending sample, skipping malformed ones.
fn drain<T: DeserializeOwned>(
    subscriber: &Subscriber<FifoChannelHandler<Sample>>,
    mut handle: impl FnMut(T),
) {
    while let Ok(Some(sample)) = subscriber.try_recv() {
        let payload = sample.payload().to_bytes();
        match serde_json::from_slice::<T>(&payload) {
            Ok(msg) => handle(msg),
            Err(e) => warn!("Failed to parse message on {}: {}", sample.key_expr(), e),
        }
    }
}

async fn bridged_drive(session: &zenoh::Session, config: &SwerveConfig) -> Result<SwerveDrive, BoxError> {
    let mut ios: Vec<Box<dyn ModuleIo>> = Vec::with_capacity(4);
    for name in MODULE_NAMES {
        ios.push(Box::new(BridgeModuleIo::open(session, name).await?));
    }
    let ios: [Box<dyn ModuleIo>; 4] = ios
        .try_into()
        .map_err(|_| "expected exactly four bridged modules")?;
    let gyro = BridgeGyro::open(session).await?;

    let mut drive = SwerveDrive::new(config, ios, Box::new(gyro))?;
    drive.align_encoders();
    Ok(drive)
}

pub async fn run(backend: Backend, loop_hz: u64) -> Result<(), BoxError> {
    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;

    info!("Setting up publishers and subscribers...");
    let sub_input = session.declare_subscriber(TOPIC_CMD_INPUT).await?;
    let sub_base = session.declare_subscriber(TOPIC_CMD_BASE).await?;
    let sub_event = session.declare_subscriber(TOPIC_CMD_EVENT).await?;
    let pub_pose = session.declare_publisher(TOPIC_POSE).await?;
    let pub_health = session.declare_publisher(TOPIC_HEALTH).await?;

    let loop_hz = loop_hz.max(1);
    let period = Duration::from_secs_f64(1.0 / loop_hz as f64);
    let config = SwerveConfig::default();

    let mut runtime = match backend {
        Backend::Sim => Runtime::simulated(&config, TeleopConfig::default(), period.as_secs_f64())?,
        Backend::Bridge => Runtime::new(
            bridged_drive(&session, &config).await?,
            TeleopDrive::new(TeleopConfig::default())?,
        ),
    };

    let mut tick = interval(period);
    // A late cycle runs once, it does not fire a burst of catch-up ticks
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    info!(
        "Runtime started: {:?} backend, {}Hz loop, {}ms watchdog timeout",
        backend,
        loop_hz,
        CMD_TIMEOUT.as_millis()
    );
    info!("Subscribed to: {}, {}, {}", TOPIC_CMD_INPUT, TOPIC_CMD_BASE, TOPIC_CMD_EVENT);
    info!("Publishing to: {}, {}", TOPIC_POSE, TOPIC_HEALTH);

    let result: Result<(), BoxError> = async {
        loop {
            tokio::select! {
                _ = tick.tick() => {}
                _ = &mut ctrl_c => {
                    info!("Interrupted");
                    return Ok(());
                }
            }

            // 1. Drain all pending messages (non-blocking)
            drain(&sub_event, |event: DriveEvent| runtime.on_event(event));
            drain(&sub_base, |cmd: BaseCommand| runtime.on_base_command(cmd));
            drain(&sub_input, |input: OperatorInput| runtime.on_input(input));

            // 2. Run the control cycle
            runtime.cycle();

            // 3. Publish pose and health
            let pose_json = serde_json::to_string(&runtime.telemetry())?;
            pub_pose.put(pose_json).await?;

            let health_json = serde_json::to_string(&runtime.health())?;
            pub_health.put(health_json).await?;
        }
    }
    .await;

    runtime.shutdown();
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::swerve::ModuleMeasurement;
    use crate::swerve::module::tests::{ScriptedIo, at_angle};

    const DT: f64 = 0.02;

    /// Runtime over scripted modules: `odd` replays its samples, the rest
    /// always report `steady`.
    fn scripted_runtime(
        odd: usize,
        samples: Vec<Option<ModuleMeasurement>>,
        steady: ModuleMeasurement,
    ) -> Runtime {
        let mut samples = Some(samples);
        let ios: [Box<dyn ModuleIo>; 4] = std::array::from_fn(|i| {
            let replay = if i == odd { samples.take() } else { None };
            let io = match replay {
                Some(samples) => ScriptedIo::scripted(samples).0,
                None => ScriptedIo::steady(steady).0,
            };
            Box::new(io) as Box<dyn ModuleIo>
        });
        let drive =
            SwerveDrive::new(&SwerveConfig::default(), ios, Box::new(SimGyro::new(DT))).unwrap();
        Runtime::new(drive, TeleopDrive::new(TeleopConfig::default()).unwrap())
    }

    fn runtime() -> Runtime {
        Runtime::simulated(&SwerveConfig::default(), TeleopConfig::default(), DT).unwrap()
    }

    fn forward() -> OperatorInput {
        OperatorInput {
            forward: 1.0,
            ..OperatorInput::default()
        }
    }

    #[test]
    fn test_idle_without_input() {
        let mut rt = runtime();
        for _ in 0..10 {
            rt.cycle();
        }
        assert_eq!(rt.health(), RuntimeHealth::CmdStale);
        for state in rt.drive().commanded_states() {
            assert_eq!(state.speed, 0.0);
        }
        let pose = rt.drive().pose();
        assert!(pose.x.abs() < 1e-9 && pose.y.abs() < 1e-9);
    }

    #[test]
    fn test_operator_forward_moves_pose() {
        let mut rt = runtime();
        rt.on_event(DriveEvent::SetFieldRelative { enabled: false });
        for _ in 0..100 {
            rt.on_input(forward());
            rt.cycle();
        }
        assert_eq!(rt.health(), RuntimeHealth::Ok);

        let pose = rt.drive().pose();
        assert!(pose.x > 3.0, "pose {pose}");
        assert!(pose.y.abs() < 0.5, "pose {pose}");
        assert!(pose.heading.degrees().abs() < 10.0, "pose {pose}");
        assert!((rt.telemetry().speed_multiplier - 0.7).abs() < 1e-12);
    }

    #[test]
    fn test_base_command_strafes() {
        let mut rt = runtime();
        for _ in 0..100 {
            rt.on_base_command(BaseCommand {
                vx: 0.0,
                vy: 1.0,
                omega: 0.0,
            });
            rt.cycle();
        }
        let pose = rt.drive().pose();
        assert!(pose.y > 1.0, "pose {pose}");
        assert!(pose.x.abs() < 0.5, "pose {pose}");
    }

    #[test]
    fn test_rotation_lock_holds_heading() {
        let mut rt = runtime();
        rt.on_event(DriveEvent::ToggleRotationLock);
        for _ in 0..50 {
            rt.on_input(OperatorInput {
                rotation: 1.0,
                ..OperatorInput::default()
            });
            rt.cycle();
        }
        assert!(rt.drive().heading().degrees().abs() < 1e-6);
        assert!(rt.telemetry().rotation_locked);
    }

    #[test]
    fn test_spin_turns_heading() {
        let mut rt = runtime();
        for _ in 0..25 {
            rt.on_input(OperatorInput {
                rotation: 0.5,
                ..OperatorInput::default()
            });
            rt.cycle();
        }
        assert!(rt.drive().heading().radians() > 0.1);
    }

    #[test]
    fn test_stop_event_clears_demand() {
        let mut rt = runtime();
        rt.on_input(forward());
        rt.cycle();
        assert!(rt.drive().commanded_states()[0].speed.abs() > 0.0);

        rt.on_event(DriveEvent::Stop);
        for state in rt.drive().commanded_states() {
            assert_eq!(state.speed, 0.0);
        }
        rt.cycle();
        assert_eq!(rt.health(), RuntimeHealth::CmdStale);
        for state in rt.drive().commanded_states() {
            assert_eq!(state.speed, 0.0);
        }
    }

    #[test]
    fn test_watchdog_stops_on_stale_input() {
        let mut rt = runtime().with_cmd_timeout(Duration::from_millis(1));
        rt.on_input(forward());
        std::thread::sleep(Duration::from_millis(5));
        rt.cycle();
        assert_eq!(rt.health(), RuntimeHealth::CmdStale);
        for state in rt.drive().commanded_states() {
            assert_eq!(state.speed, 0.0);
        }
    }

    #[test]
    fn test_brake_mode_applied_next_cycle() {
        let mut rt = runtime();
        rt.cycle();
        assert!(rt.drive().brake_mode());

        rt.on_event(DriveEvent::Coast);
        assert!(rt.drive().brake_mode());
        rt.cycle();
        assert!(!rt.drive().brake_mode());
    }

    #[test]
    fn test_missing_measurements_degrade_and_stop() {
        let mut rt = scripted_runtime(0, vec![Some(at_angle(0.0))], at_angle(0.0));

        rt.on_input(forward());
        rt.cycle();
        assert_eq!(rt.health(), RuntimeHealth::Ok);

        // One reused sample is tolerated
        rt.on_input(forward());
        rt.cycle();
        assert_eq!(rt.health(), RuntimeHealth::Ok);

        rt.on_input(forward());
        rt.cycle();
        assert_eq!(rt.health(), RuntimeHealth::Degraded);
        for state in rt.drive().commanded_states() {
            assert_eq!(state.speed, 0.0);
        }
    }

    #[test]
    fn test_degraded_outranks_stale_command() {
        let mut rt = scripted_runtime(2, vec![Some(at_angle(0.0))], at_angle(0.0));
        for _ in 0..3 {
            rt.cycle();
        }
        assert_eq!(rt.health(), RuntimeHealth::Degraded);
    }

    #[test]
    fn test_disconnected_encoder_reports_fault() {
        let disconnected = ModuleMeasurement {
            turn_encoder_connected: false,
            ..at_angle(0.0)
        };
        let mut rt = scripted_runtime(1, vec![Some(at_angle(0.0))], disconnected);

        rt.on_input(forward());
        rt.cycle();
        assert_eq!(rt.health(), RuntimeHealth::EncoderFault);
        assert_eq!(rt.telemetry().encoders_connected, [false, true, false, false]);
        // Still driving on the held angles
        assert!(rt.drive().commanded_states()[0].speed.abs() > 0.0);
    }

    #[test]
    fn test_stale_command_outranks_encoder_fault() {
        let disconnected = ModuleMeasurement {
            turn_encoder_connected: false,
            ..at_angle(0.0)
        };
        let mut rt = scripted_runtime(0, vec![Some(disconnected)], disconnected);
        rt.cycle();
        assert_eq!(rt.health(), RuntimeHealth::CmdStale);

        rt.on_input(forward());
        rt.cycle();
        assert_eq!(rt.health(), RuntimeHealth::EncoderFault);
    }
}
