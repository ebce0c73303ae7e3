//! The live pipeline: capture → recognition → translation fan-out →
//! ordered, reviewed delivery.

pub mod agent;
pub mod capture;
pub mod controller;
pub mod monitor;
pub mod pausable;
pub mod supervisor;
pub mod transcript;

pub use agent::Agent;
pub use controller::Controller;
pub use supervisor::Supervisor;
