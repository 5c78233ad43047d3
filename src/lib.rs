pub mod capture;
pub mod configuration;
pub mod detection;
pub mod error_handling;
pub mod event_log;
pub mod network;
