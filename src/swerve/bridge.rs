// Module hardware and gyro reached over zenoh
//
// A separate hardware process owns the motor controllers and encoders. It
// publishes measurements per module and listens for actuation/config
// requests; this side only exchanges JSON and never blocks on a read.

use serde::Serialize;
use tracing::{debug, info, warn};
use zenoh::Wait;
use zenoh::handlers::FifoChannelHandler;
use zenoh::pubsub::{Publisher, Subscriber};
use zenoh::sample::Sample;

use super::geometry::{ChassisVelocity, Rotation2d};
use super::io::{Gyro, ModuleIo, ModuleMeasurement, clamp_voltage};
use crate::config::{TOPIC_HW_ACTUATION, TOPIC_HW_CONFIG, TOPIC_HW_GYRO, TOPIC_HW_MEASUREMENT, hw_topic};
use crate::messages::{GyroReading, ModuleActuation, ModuleConfigRequest};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Decode payloads in arrival order and keep the newest one that parses.
fn newest<T, P>(payloads: impl IntoIterator<Item = P>, what: &str) -> Option<T>
where
    T: serde::de::DeserializeOwned,
    P: AsRef<[u8]>,
{
    let mut newest = None;
    for payload in payloads {
        match serde_json::from_slice::<T>(payload.as_ref()) {
            Ok(value) => newest = Some(value),
            Err(e) => warn!("Failed to parse {}: {}", what, e),
        }
    }
    newest
}

/// Drain a subscriber without blocking and decode the newest payload.
fn latest<T: serde::de::DeserializeOwned>(
    subscriber: &Subscriber<FifoChannelHandler<Sample>>,
    what: &str,
) -> Option<T> {
    let pending = std::iter::from_fn(|| subscriber.try_recv().ok().flatten())
        .map(|sample| sample.payload().to_bytes().into_owned());
    newest(pending, what)
}

fn publish<T: Serialize>(publisher: &Publisher<'static>, message: &T) {
    let json = match serde_json::to_string(message) {
        Ok(json) => json,
        Err(e) => {
            warn!("Failed to encode {}: {}", publisher.key_expr(), e);
            return;
        }
    };
    if let Err(e) = publisher.put(json).wait() {
        warn!("Failed to publish on {}: {}", publisher.key_expr(), e);
    }
}

/// One swerve module behind the zenoh hardware bridge.
pub struct BridgeModuleIo {
    name: &'static str,
    actuation: Publisher<'static>,
    config: Publisher<'static>,
    measurements: Subscriber<FifoChannelHandler<Sample>>,
    request: ModuleActuation,
}

impl BridgeModuleIo {
    pub async fn open(session: &zenoh::Session, name: &'static str) -> Result<Self, BoxError> {
        let actuation = session
            .declare_publisher(hw_topic(TOPIC_HW_ACTUATION, name))
            .await?;
        let config = session
            .declare_publisher(hw_topic(TOPIC_HW_CONFIG, name))
            .await?;
        let measurements = session
            .declare_subscriber(hw_topic(TOPIC_HW_MEASUREMENT, name))
            .await?;

        info!("Bridged module {} on {}", name, actuation.key_expr());
        Ok(Self {
            name,
            actuation,
            config,
            measurements,
            request: ModuleActuation::default(),
        })
    }

    fn send_config(&self, request: ModuleConfigRequest) {
        debug!("Module {}: config {:?}", self.name, request);
        publish(&self.config, &request);
    }
}

impl ModuleIo for BridgeModuleIo {
    fn update_measurement(&mut self) -> Option<ModuleMeasurement> {
        latest(&self.measurements, self.name)
    }

    fn set_drive_voltage(&mut self, volts: f64) {
        self.request.drive_volts = clamp_voltage(volts);
        publish(&self.actuation, &self.request);
    }

    fn set_turn_voltage(&mut self, volts: f64) {
        self.request.turn_volts = clamp_voltage(volts);
        publish(&self.actuation, &self.request);
    }

    fn set_voltages(&mut self, drive_volts: f64, turn_volts: f64) {
        // One message per cycle so the bridge never pairs old and new values
        self.request = ModuleActuation {
            drive_volts: clamp_voltage(drive_volts),
            turn_volts: clamp_voltage(turn_volts),
        };
        publish(&self.actuation, &self.request);
    }

    fn set_drive_brake_mode(&mut self, enable: bool) {
        self.send_config(ModuleConfigRequest::DriveBrake { enable });
    }

    fn set_turn_brake_mode(&mut self, enable: bool) {
        self.send_config(ModuleConfigRequest::TurnBrake { enable });
    }

    fn stop(&mut self) {
        // One message so both actuators stop together
        self.request = ModuleActuation::default();
        publish(&self.actuation, &self.request);
    }

    fn reset_drive_encoder(&mut self) {
        self.send_config(ModuleConfigRequest::ResetDriveEncoder);
    }

    fn sync_turn_encoder_to_absolute(&mut self) {
        self.send_config(ModuleConfigRequest::SyncTurnEncoder);
    }
}

/// Heading published by the hardware process.
pub struct BridgeGyro {
    readings: Subscriber<FifoChannelHandler<Sample>>,
}

impl BridgeGyro {
    pub async fn open(session: &zenoh::Session) -> Result<Self, BoxError> {
        let readings = session.declare_subscriber(TOPIC_HW_GYRO).await?;
        Ok(Self { readings })
    }
}

impl Gyro for BridgeGyro {
    fn read_heading(&mut self, _measured: &ChassisVelocity) -> Option<Rotation2d> {
        latest::<GyroReading>(&self.readings, "gyro reading").map(|r| r.heading)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_newest_keeps_last_valid_sample() {
        let payloads = [
            r#"{"drive_volts": 1.0, "turn_volts": 0.0}"#,
            r#"{"drive_volts": 2.0, "turn_volts": -1.0}"#,
            "not json",
        ];
        let actuation: Option<ModuleActuation> = newest(payloads, "actuation");
        assert_eq!(
            actuation,
            Some(ModuleActuation {
                drive_volts: 2.0,
                turn_volts: -1.0
            })
        );
    }

    #[test]
    fn test_newest_empty_or_garbage_is_none() {
        let none: Option<GyroReading> = newest(Vec::<Vec<u8>>::new(), "gyro");
        assert_eq!(none, None);
        let garbage: Option<GyroReading> = newest([b"{}".to_vec(), b"[1]".to_vec()], "gyro");
        assert_eq!(garbage, None);
    }

    #[test]
    fn test_measurement_from_bridge_json() {
        let json = r#"{
            "drive_position_meters": 1.25,
            "drive_velocity_mps": 0.5,
            "drive_applied_volts": 3.0,
            "drive_current_amps": 4.0,
            "drive_temp_c": 30.0,
            "turn_absolute_angle": 0.5,
            "turn_angle": 0.25,
            "turn_velocity_rad_per_sec": 0.0,
            "turn_applied_volts": 1.0,
            "turn_current_amps": 2.0,
            "turn_temp_c": 31.0,
            "turn_encoder_connected": false
        }"#;
        let m: ModuleMeasurement = newest([json], "measurement").unwrap();
        assert_eq!(m.drive_position_meters, 1.25);
        assert!((m.turn_angle.radians() - 0.25).abs() < 1e-12);
        assert!((m.turn_absolute_angle.radians() - 0.5).abs() < 1e-12);
        assert!(!m.turn_encoder_connected);
    }
}
