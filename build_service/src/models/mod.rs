//! Build service data models.

pub mod build;
