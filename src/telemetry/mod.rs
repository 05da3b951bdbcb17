// Encoder telemetry: wire frames, channel layout, decoding and safety checks

pub mod decoder;
pub mod frame;
pub mod layout;
pub mod safety;

pub use decoder::{ChannelState, TelemetryState, quantize};
pub use frame::{
    Direction, FrameError, MotorCommand, Segment, encode_commands, parse_frame, stop_frame,
};
pub use layout::{ChannelKind, ChannelSpec, Coupling, DiffRole, LayoutError, TelemetryLayout};
pub use safety::{SafetyFault, check_comm_faults, enforce};
