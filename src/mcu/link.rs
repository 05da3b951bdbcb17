// Line-oriented serial link to the Pegasus MCU
//
// The MCU streams one telemetry line per control period. Reads never block:
// if nothing is waiting the caller runs the cycle on stale state. When several
// lines have piled up, only the newest complete one is kept.

use serialport::{self, ClearBuffer, SerialPort};
use std::io::{Read, Write};
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_TIMEOUT_MS: u64 = 10;

/// Bytes held without seeing a newline before the partial line is dropped
const MAX_PENDING: usize = 4096;

#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, LinkError>;

pub struct SerialLink {
    port: Box<dyn SerialPort>,
    pending: Vec<u8>,
}

impl SerialLink {
    pub fn open_with_baudrate(port_name: &str, baudrate: u32) -> Result<Self> {
        let port = serialport::new(port_name, baudrate)
            .timeout(Duration::from_millis(DEFAULT_TIMEOUT_MS))
            .open()?;

        Ok(Self {
            port,
            pending: Vec::new(),
        })
    }

    /// Newest complete line received since the last call, without its terminator.
    /// Returns `None` when nothing is waiting or no line has completed yet.
    pub fn poll_line(&mut self) -> Result<Option<Vec<u8>>> {
        let waiting = self.port.bytes_to_read()? as usize;
        if waiting == 0 {
            return Ok(None);
        }

        let mut chunk = vec![0u8; waiting];
        let read = self.port.read(&mut chunk)?;
        self.pending.extend_from_slice(&chunk[..read]);

        let line = take_latest_line(&mut self.pending);
        if line.is_none() && self.pending.len() > MAX_PENDING {
            debug!("Dropping {} bytes without a line ending", self.pending.len());
            self.pending.clear();
        }
        Ok(line)
    }

    /// Drop everything buffered, both here and in the OS input queue
    pub fn flush_input(&mut self) -> Result<()> {
        self.pending.clear();
        self.port.clear(ClearBuffer::Input)?;
        Ok(())
    }

    pub fn send(&mut self, line: &str) -> Result<()> {
        self.port.write_all(line.as_bytes())?;
        self.port.flush()?;
        Ok(())
    }
}

/// Remove every complete line from `pending` and return the last non-empty one.
/// A trailing partial line stays in `pending`.
fn take_latest_line(pending: &mut Vec<u8>) -> Option<Vec<u8>> {
    let end = pending.iter().rposition(|&b| b == b'\n')?;
    let complete: Vec<u8> = pending.drain(..=end).collect();

    complete
        .split(|&b| b == b'\n')
        .map(|line| line.strip_suffix(b"\r").unwrap_or(line))
        .filter(|line| !line.is_empty())
        .next_back()
        .map(|line| line.to_vec())
}
