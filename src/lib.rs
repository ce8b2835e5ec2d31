pub mod auth;
pub mod config;
pub mod error;
pub mod head;
pub mod proxy;
pub mod tracking;

pub use error::{TrackerError, TrackerResult};
