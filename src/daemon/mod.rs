// Daemon module - single-instance enforcement for the supervisor

pub mod pid;

pub use pid::{read_pid, PidLock};
