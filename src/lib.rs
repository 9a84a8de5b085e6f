pub mod config;
pub mod error;
pub mod fields;
pub mod hwpx;
pub mod metrics;
pub mod progress;
pub mod session;
pub mod textutil;
pub mod verify;
