// Keyboard jog: 1-5 select joint, W/S jog, A/D gripper, R/F step size, H homing, Q quit
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use std::time::{Duration, Instant};
use tracing::info;

use pegasus_arm_runtime::config::TOPIC_CMD_JOINTS;
use pegasus_arm_runtime::messages::JointReference;

const JOINTS: usize = 5;
const STEPS: [f64; 3] = [0.01, 0.05, 0.15]; // rad per key press
const GRIPPER_SPEED: f64 = 150.0; // PWM
const INPUT_TIMEOUT_MS: u64 = 100; // Stop the gripper after this much time with no input

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;
    let publisher = session.declare_publisher(TOPIC_CMD_JOINTS).await?;

    info!("Controls: 1-5=joint, W/S=jog, A/D=gripper, R/F=step, H=homing, Q=quit");
    info!("Joint 0, step {} rad", STEPS[0]);

    enable_raw_mode()?;
    let result = run_jog(&publisher).await;
    disable_raw_mode()?;

    result
}

async fn run_jog(
    publisher: &zenoh::pubsub::Publisher<'_>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut joint: usize = 0;
    let mut step_idx: usize = 0;

    // Persistent reference state
    let mut angles = [0.0; JOINTS];
    let mut gripper = 0.0;
    let mut homing = false;
    let mut last_gripper_input = Instant::now();

    loop {
        // Poll for key with 20ms timeout (50Hz effective rate)
        if event::poll(Duration::from_millis(20))? {
            if let Event::Key(KeyEvent { code, kind, .. }) = event::read()? {
                let pressed = kind == KeyEventKind::Press || kind == KeyEventKind::Repeat;

                match code {
                    // Joint selection
                    KeyCode::Char(c @ '1'..='5') if pressed => {
                        joint = (c as usize) - ('1' as usize);
                        info!("Joint {}: {:.3} rad", joint, angles[joint]);
                    }

                    // Jog the selected joint
                    KeyCode::Char('w') if pressed => {
                        angles[joint] += STEPS[step_idx];
                        info!("Joint {}: {:.3} rad", joint, angles[joint]);
                    }
                    KeyCode::Char('s') if pressed => {
                        angles[joint] -= STEPS[step_idx];
                        info!("Joint {}: {:.3} rad", joint, angles[joint]);
                    }

                    // Gripper, only while held
                    KeyCode::Char('a') if pressed => {
                        gripper = GRIPPER_SPEED;
                        last_gripper_input = Instant::now();
                    }
                    KeyCode::Char('d') if pressed => {
                        gripper = -GRIPPER_SPEED;
                        last_gripper_input = Instant::now();
                    }

                    // Step size
                    KeyCode::Char('r') if pressed => {
                        step_idx = (step_idx + 1).min(STEPS.len() - 1);
                        info!("Step {} rad", STEPS[step_idx]);
                    }
                    KeyCode::Char('f') if pressed => {
                        step_idx = step_idx.saturating_sub(1);
                        info!("Step {} rad", STEPS[step_idx]);
                    }

                    KeyCode::Char('h') if pressed => {
                        homing = !homing;
                        info!("Homing {}", if homing { "on" } else { "off" });
                    }

                    // Quit
                    KeyCode::Char('q') | KeyCode::Esc if pressed => break,

                    _ => {}
                }
            }
        }

        if last_gripper_input.elapsed() > Duration::from_millis(INPUT_TIMEOUT_MS) {
            gripper = 0.0;
        }

        // Always publish at ~50Hz so the runtime watchdog stays fed
        let reference = JointReference {
            angles: angles.to_vec(),
            gripper,
            homing,
        };
        publisher.put(serde_json::to_string(&reference)?).await?;
    }

    Ok(())
}
