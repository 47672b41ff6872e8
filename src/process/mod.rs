// Process module - worker lifecycle management

mod controller;
pub mod spawner;
mod types;

pub use controller::LifecycleController;
pub use spawner::{spawn_worker, SpawnedWorker};
pub use types::{ProcessState, WorkerStats};
