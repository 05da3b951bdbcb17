pub mod config;
pub mod control;
pub mod dynamics;
pub mod mcu;
pub mod messages;
pub mod model;
pub mod runtime;
pub mod telemetry;
