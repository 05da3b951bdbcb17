// MCU wire format
//
// Inbound (one line per cycle): [count|dir(|homing(|current))]...
// Outbound (one line per cycle): [speed|dir|homing]...
// Segments are concatenated with no separator. Lines end in '\n'.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::layout::LayoutError;

/// Errors raised while parsing an inbound telemetry line
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FrameError {
    #[error("Expected {expected} segments, got {got}")]
    SegmentCount { expected: usize, got: usize },

    #[error("Frame is not bracket delimited: {0:?}")]
    Delimiters(String),

    #[error("Segment {segment}: {reason}")]
    Field { segment: usize, reason: String },

    #[error("Frame is not valid UTF-8")]
    Encoding,

    #[error("Frame does not fit the channel layout: {0}")]
    Layout(#[from] LayoutError),
}

/// Rotation direction flag as used on the wire: 0 drives the angle up, 1 drives it down
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    #[default]
    Increasing,
    Decreasing,
}

impl Direction {
    pub fn from_wire(value: u8) -> Option<Self> {
        match value {
            0 => Some(Direction::Increasing),
            1 => Some(Direction::Decreasing),
            _ => None,
        }
    }

    pub fn wire(self) -> u8 {
        match self {
            Direction::Increasing => 0,
            Direction::Decreasing => 1,
        }
    }

    /// Direction of a signed effort; zero counts as increasing
    pub fn of(effort: f64) -> Self {
        if effort >= 0.0 {
            Direction::Increasing
        } else {
            Direction::Decreasing
        }
    }

    pub fn sign(self) -> f64 {
        match self {
            Direction::Increasing => 1.0,
            Direction::Decreasing => -1.0,
        }
    }
}

/// One inbound segment
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    /// Cumulative encoder count since power-up
    pub count: i64,
    pub direction: Direction,
    pub homing: Option<u8>,
    pub current: Option<f64>,
}

impl Segment {
    fn parse(index: usize, text: &str) -> Result<Self, FrameError> {
        let fields: Vec<&str> = text.split('|').collect();
        if !(2..=4).contains(&fields.len()) {
            return Err(FrameError::Field {
                segment: index,
                reason: format!("expected 2 to 4 fields, got {}", fields.len()),
            });
        }

        let count = parse_field::<i64>(index, "count", fields[0])?;
        let dir = parse_field::<u8>(index, "direction", fields[1])?;
        let direction = Direction::from_wire(dir).ok_or_else(|| FrameError::Field {
            segment: index,
            reason: format!("direction must be 0 or 1, got {}", dir),
        })?;
        let homing = match fields.get(2) {
            Some(f) => Some(parse_field::<u8>(index, "homing", f)?),
            None => None,
        };
        let current = match fields.get(3) {
            Some(f) => Some(parse_field::<f64>(index, "current", f)?),
            None => None,
        };

        Ok(Self {
            count,
            direction,
            homing,
            current,
        })
    }
}

fn parse_field<T: FromStr>(segment: usize, name: &str, text: &str) -> Result<T, FrameError>
where
    T::Err: fmt::Display,
{
    text.trim().parse::<T>().map_err(|e| FrameError::Field {
        segment,
        reason: format!("bad {} {:?}: {}", name, text, e),
    })
}

/// Parse one telemetry line into exactly `expected` segments
pub fn parse_frame(line: &str, expected: usize) -> Result<Vec<Segment>, FrameError> {
    let line = line.trim_end_matches(['\r', '\n']);
    let body = line
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
        .ok_or_else(|| FrameError::Delimiters(line.to_string()))?;

    let parts: Vec<&str> = body.split("][").collect();
    if parts.len() != expected {
        return Err(FrameError::SegmentCount {
            expected,
            got: parts.len(),
        });
    }

    parts
        .iter()
        .enumerate()
        .map(|(i, part)| Segment::parse(i, part))
        .collect()
}

/// Same as `parse_frame` on raw bytes
pub fn parse_frame_bytes(bytes: &[u8], expected: usize) -> Result<Vec<Segment>, FrameError> {
    let line = std::str::from_utf8(bytes).map_err(|_| FrameError::Encoding)?;
    parse_frame(line, expected)
}

/// One outbound motor command
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MotorCommand {
    /// PWM magnitude, 0..=255 on the Pegasus MCU
    pub speed: u16,
    pub direction: Direction,
    pub homing: u8,
}

impl MotorCommand {
    pub const STOP: MotorCommand = MotorCommand {
        speed: 0,
        direction: Direction::Increasing,
        homing: 0,
    };
}

impl fmt::Display for MotorCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}|{}|{}]", self.speed, self.direction.wire(), self.homing)
    }
}

/// Encode a full outbound line, newline included
pub fn encode_commands(commands: &[MotorCommand]) -> String {
    let mut line: String = commands.iter().map(|c| c.to_string()).collect();
    line.push('\n');
    line
}

/// Zero speed, zero homing on every channel
pub fn stop_frame(channels: usize) -> String {
    encode_commands(&vec![MotorCommand::STOP; channels])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_two_field_frame() {
        let segs = parse_frame("[1234|0][-56|1]", 2).unwrap();
        assert_eq!(segs[0].count, 1234);
        assert_eq!(segs[0].direction, Direction::Increasing);
        assert_eq!(segs[1].count, -56);
        assert_eq!(segs[1].direction, Direction::Decreasing);
        assert_eq!(segs[1].homing, None);
        assert_eq!(segs[1].current, None);
    }

    #[test]
    fn test_parse_optional_fields() {
        let segs = parse_frame("[10|0|1][20|1|0|0.75][30|0]\r\n", 3).unwrap();
        assert_eq!(segs[0].homing, Some(1));
        assert_eq!(segs[0].current, None);
        assert_eq!(segs[1].homing, Some(0));
        assert_eq!(segs[1].current, Some(0.75));
        assert_eq!(segs[2].homing, None);
    }

    #[test]
    fn test_segment_count_mismatch() {
        assert_eq!(
            parse_frame("[1|0][2|0]", 6),
            Err(FrameError::SegmentCount { expected: 6, got: 2 })
        );
    }

    #[test]
    fn test_bad_delimiters() {
        assert!(matches!(parse_frame("1|0][2|0]", 2), Err(FrameError::Delimiters(_))));
        assert!(matches!(parse_frame("", 1), Err(FrameError::Delimiters(_))));
    }

    #[test]
    fn test_malformed_fields() {
        assert!(matches!(
            parse_frame("[1|0][x|0]", 2),
            Err(FrameError::Field { segment: 1, .. })
        ));
        assert!(matches!(
            parse_frame("[1|2]", 1),
            Err(FrameError::Field { segment: 0, .. })
        ));
        assert!(matches!(
            parse_frame("[1]", 1),
            Err(FrameError::Field { segment: 0, .. })
        ));
        assert!(matches!(
            parse_frame("[1|0|0|0|0]", 1),
            Err(FrameError::Field { segment: 0, .. })
        ));
    }

    #[test]
    fn test_invalid_utf8() {
        assert_eq!(parse_frame_bytes(&[b'[', 0xFF, b']'], 1), Err(FrameError::Encoding));
        assert!(parse_frame_bytes(b"[5|1]\n", 1).is_ok());
    }

    #[test]
    fn test_encode_commands() {
        let cmds = [
            MotorCommand {
                speed: 120,
                direction: Direction::Decreasing,
                homing: 0,
            },
            MotorCommand {
                speed: 0,
                direction: Direction::Increasing,
                homing: 1,
            },
        ];
        assert_eq!(encode_commands(&cmds), "[120|1|0][0|0|1]\n");
    }

    #[test]
    fn test_stop_frame() {
        assert_eq!(stop_frame(3), "[0|0|0][0|0|0][0|0|0]\n");
    }

    #[test]
    fn test_direction_of_effort() {
        assert_eq!(Direction::of(3.0), Direction::Increasing);
        assert_eq!(Direction::of(0.0), Direction::Increasing);
        assert_eq!(Direction::of(-0.1), Direction::Decreasing);
        assert_eq!(Direction::Decreasing.wire(), 1);
    }
}
