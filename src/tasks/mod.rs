//! Background Tasks Module
//!
//! Contains background tasks that run periodically while a cache is started.
//!
//! # Tasks
//! - Sweep: Removes expired and corrupted records at configured intervals

mod sweep;

pub use sweep::spawn_sweep_task;
