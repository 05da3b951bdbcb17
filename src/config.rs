// Timeouts, topics, MCU link, and the loadable runtime configuration
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::control::PidGains;
use crate::model::RobotDescription;
use crate::telemetry::TelemetryLayout;

// Runtime loop frequency
pub const LOOP_HZ: u64 = 50;
pub const MAX_LOOP_HZ: u64 = 1000;

// Reference timeout for watchdog
pub const CMD_TIMEOUT: Duration = Duration::from_millis(250);

// Zenoh topics
pub const TOPIC_CMD_JOINTS: &str = "pegasus/cmd/joints"; // joint references
pub const TOPIC_STATE_JOINTS: &str = "pegasus/state/joints"; // decoded joint state
pub const TOPIC_HEALTH: &str = "pegasus/state/health"; // health status
pub const TOPIC_FAULTS: &str = "pegasus/state/faults"; // safety faults, when any

// MCU configuration
// Serial port of the arm microcontroller
pub const MCU_PORT: &str = "/dev/ttyACM0";

// Must match the MCU firmware
pub const MCU_BAUDRATE: u32 = 115_200;

// Enable the serial link (set to false for simulation/testing)
pub const MCU_ENABLED: bool = true;

// Largest PWM value the MCU accepts
pub const MAX_MOTOR_SPEED: u16 = 255;

#[derive(Debug, thiserror::Error)]
pub enum ConfigFileError {
    #[error("Cannot read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("Invalid config: {0}")]
    Json(#[from] serde_json::Error),
}

/// Everything the runtime needs to know about the arm.
/// Missing fields fall back to the Pegasus defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub robot: RobotDescription,
    pub telemetry: TelemetryLayout,
    /// Gains map radians of error to motor speed units
    pub pid: PidGains,
    /// m/s^2 in the space frame
    pub gravity: [f64; 3],
    pub max_speed: u16,
    /// Speed units per N*m of feed-forward torque; 0 disables feed-forward
    pub feed_forward_gain: f64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            robot: RobotDescription::pegasus(),
            telemetry: TelemetryLayout::pegasus(),
            pid: PidGains {
                kp: vec![180.0, 220.0, 200.0, 120.0, 120.0],
                ki: vec![20.0, 30.0, 25.0, 10.0, 10.0],
                kd: vec![4.0, 6.0, 5.0, 2.0, 2.0],
                integral_limit: vec![60.0, 80.0, 70.0, 40.0, 40.0],
            },
            gravity: [0.0, 0.0, -9.81],
            max_speed: MAX_MOTOR_SPEED,
            feed_forward_gain: 0.0,
        }
    }
}

impl RuntimeConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigFileError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigFileError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Ok(serde_json::from_str(&text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_round_trip() {
        let config = RuntimeConfig::default();
        let json = serde_json::to_string_pretty(&config).unwrap();
        let back: RuntimeConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: RuntimeConfig =
            serde_json::from_str(r#"{"max_speed": 180, "feed_forward_gain": 12.5}"#).unwrap();
        assert_eq!(config.max_speed, 180);
        assert_eq!(config.feed_forward_gain, 12.5);
        assert_eq!(config.robot, RobotDescription::pegasus());
        assert_eq!(config.pid.kp.len(), 5);
    }

    #[test]
    fn test_load_missing_file() {
        let err = RuntimeConfig::load(Path::new("/nonexistent/pegasus.json")).unwrap_err();
        assert!(matches!(err, ConfigFileError::Io { .. }));
    }

    #[test]
    fn test_default_lengths_agree() {
        let config = RuntimeConfig::default();
        let joints = config.robot.joints.len();
        assert_eq!(config.pid.kp.len(), joints);
        assert_eq!(config.pid.integral_limit.len(), joints);
        assert_eq!(config.telemetry.len(), joints + 1);
    }
}
