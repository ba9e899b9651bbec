// Keyboard teleop: WASD move, Z/X rotate, R/F throttle, P precision, T turbo, Q quit
// Events: B brake, C coast, Space stop, G field-relative, L rotation lock, E align encoders
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use std::time::{Duration, Instant};
use tracing::info;

use swerve_zenoh_runtime::config::{TOPIC_CMD_EVENT, TOPIC_CMD_INPUT};
use swerve_zenoh_runtime::messages::{DriveEvent, OperatorInput};

const THROTTLE_STEPS: [f64; 3] = [-1.0, 0.0, 1.0]; // raw throttle axis
const INPUT_TIMEOUT_MS: u64 = 100; // Release axes and buttons after this much time with no input

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;
    let pub_input = session.declare_publisher(TOPIC_CMD_INPUT).await?;
    let pub_event = session.declare_publisher(TOPIC_CMD_EVENT).await?;

    info!("Controls: WASD=move, Z/X=rotate, R/F=throttle, P=precision, T=turbo, Q=quit");
    info!("Events: B=brake, C=coast, Space=stop, G=field-relative, L=rotation lock, E=align");
    info!("Throttle: LOW");

    enable_raw_mode()?;
    let result = run_teleop(&pub_input, &pub_event).await;
    disable_raw_mode()?;

    result
}

async fn send_event(
    publisher: &zenoh::pubsub::Publisher<'_>,
    event: DriveEvent,
) -> Result<(), BoxError> {
    info!("Event: {:?}", event);
    publisher.put(serde_json::to_string(&event)?).await?;
    Ok(())
}

async fn run_teleop(
    pub_input: &zenoh::pubsub::Publisher<'_>,
    pub_event: &zenoh::pubsub::Publisher<'_>,
) -> Result<(), BoxError> {
    let mut throttle_idx: usize = 0;

    // Persistent stick state
    let mut input = OperatorInput::default();
    let mut last_movement_input = Instant::now();

    loop {
        // Poll for key with 20ms timeout (50Hz effective rate)
        if event::poll(Duration::from_millis(20))? {
            if let Event::Key(KeyEvent { code, kind, .. }) = event::read()? {
                let pressed = kind == KeyEventKind::Press || kind == KeyEventKind::Repeat;
                // Discrete actions fire once per press, not on repeat
                let edge = kind == KeyEventKind::Press;

                match code {
                    // Movement - update axes and refresh timestamp
                    KeyCode::Char('w') if pressed => {
                        input.forward = 1.0;
                        last_movement_input = Instant::now();
                    }
                    KeyCode::Char('s') if pressed => {
                        input.forward = -1.0;
                        last_movement_input = Instant::now();
                    }
                    KeyCode::Char('a') if pressed => {
                        input.strafe = 1.0;
                        last_movement_input = Instant::now();
                    }
                    KeyCode::Char('d') if pressed => {
                        input.strafe = -1.0;
                        last_movement_input = Instant::now();
                    }

                    // Rotation
                    KeyCode::Char('z') if pressed => {
                        input.rotation = 1.0;
                        last_movement_input = Instant::now();
                    }
                    KeyCode::Char('x') if pressed => {
                        input.rotation = -1.0;
                        last_movement_input = Instant::now();
                    }

                    // Speed modifiers, held like the movement keys
                    KeyCode::Char('p') if pressed => {
                        input.precision = true;
                        last_movement_input = Instant::now();
                    }
                    KeyCode::Char('t') if pressed => {
                        input.turbo = true;
                        last_movement_input = Instant::now();
                    }

                    // Throttle
                    KeyCode::Char('r') if pressed => {
                        throttle_idx = (throttle_idx + 1).min(2);
                        print_throttle(throttle_idx);
                    }
                    KeyCode::Char('f') if pressed => {
                        throttle_idx = throttle_idx.saturating_sub(1);
                        print_throttle(throttle_idx);
                    }

                    // Events
                    KeyCode::Char('b') if edge => send_event(pub_event, DriveEvent::Brake).await?,
                    KeyCode::Char('c') if edge => send_event(pub_event, DriveEvent::Coast).await?,
                    KeyCode::Char(' ') if edge => send_event(pub_event, DriveEvent::Stop).await?,
                    KeyCode::Char('g') if edge => {
                        send_event(pub_event, DriveEvent::ToggleFieldRelative).await?
                    }
                    KeyCode::Char('l') if edge => {
                        send_event(pub_event, DriveEvent::ToggleRotationLock).await?
                    }
                    KeyCode::Char('e') if edge => {
                        send_event(pub_event, DriveEvent::AlignEncoders).await?
                    }

                    // Quit
                    KeyCode::Char('q') | KeyCode::Esc if pressed => break,

                    _ => {}
                }
            }
        }

        // Release everything if no movement input for INPUT_TIMEOUT_MS
        if last_movement_input.elapsed() > Duration::from_millis(INPUT_TIMEOUT_MS) {
            input = OperatorInput::default();
        }
        input.throttle = Some(THROTTLE_STEPS[throttle_idx]);

        // Always publish at ~50Hz
        pub_input.put(serde_json::to_string(&input)?).await?;
    }

    Ok(())
}

fn print_throttle(idx: usize) {
    let label = ["LOW", "MED", "HIGH"][idx];
    info!("Throttle: {}", label);
}
