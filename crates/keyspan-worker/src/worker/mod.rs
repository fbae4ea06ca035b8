pub mod client;
pub mod config;
pub mod cracker;
pub mod telemetry;
