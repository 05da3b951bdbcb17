// High-level driver for the Pegasus arm MCU
//
// Wraps the serial link with the telemetry frame format and makes sure the
// motors are stopped when the driver goes away.

use tracing::{debug, info, warn};

use super::link::{LinkError, SerialLink};
use crate::telemetry::{MotorCommand, encode_commands, stop_frame};

pub struct ArmDriver {
    link: SerialLink,
    channels: usize,
}

impl ArmDriver {
    /// Open the MCU link for a layout with `channels` motors
    pub fn new(port: &str, baudrate: u32, channels: usize) -> Result<Self, LinkError> {
        info!("Opening MCU link on {} at {} baud", port, baudrate);
        let link = SerialLink::open_with_baudrate(port, baudrate)?;
        Ok(Self { link, channels })
    }

    /// Newest telemetry line, if one has arrived
    pub fn poll_telemetry(&mut self) -> Result<Option<Vec<u8>>, LinkError> {
        self.link.poll_line()
    }

    /// Discard buffered input after a malformed frame
    pub fn flush(&mut self) -> Result<(), LinkError> {
        debug!("Flushing MCU input");
        self.link.flush_input()
    }

    pub fn send_commands(&mut self, commands: &[MotorCommand]) -> Result<(), LinkError> {
        let line = encode_commands(commands);
        debug!("Sending {}", line.trim_end());
        self.link.send(&line)
    }

    /// Zero speed and zero homing on every motor
    pub fn stop(&mut self) -> Result<(), LinkError> {
        info!("Stopping all motors");
        self.link.send(&stop_frame(self.channels))
    }
}

impl Drop for ArmDriver {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!("Failed to stop motors on drop: {}", e);
        }
    }
}
