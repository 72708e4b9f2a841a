//! Build lifecycle services.

pub mod build_service;
pub mod executor;
pub mod step_executor;
