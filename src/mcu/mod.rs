// Serial transport to the Pegasus arm microcontroller
//
// Provides:
// - Non-blocking, latest-line serial link
// - Arm driver that speaks the bracketed command frame and stops on drop

mod driver;
pub mod link;

pub use driver::ArmDriver;
pub use link::{LinkError, SerialLink};
