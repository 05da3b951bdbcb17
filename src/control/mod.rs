// Joint-space feedback control

mod pid;

pub use pid::{Pid, PidError, PidGains};
