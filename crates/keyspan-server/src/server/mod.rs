pub mod config;
pub mod dispatch;
pub mod error;
pub mod inspector;
pub mod report;
pub mod service;
pub mod session;
pub mod state;
pub mod telemetry;
