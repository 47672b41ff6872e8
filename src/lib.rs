// Library exports for the beacon worker supervisor

pub mod cli;
pub mod config;
pub mod daemon;
pub mod error;
pub mod events;
pub mod health;
pub mod logging;
pub mod process;
pub mod registry;
pub mod supervisor;
