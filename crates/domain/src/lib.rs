//! archive-poster domain crate
//!
//! This crate contains the core domain logic following hexagonal architecture:
//! - `model`: Domain entities and value objects
//! - `ports`: Trait definitions for external dependencies (adapters)
//! - `usecases`: Record lifecycle, caption composition and the run orchestrator
//! - `planning`: Queue date labelling used by operator tooling

pub mod model;
pub mod planning;
pub mod ports;
pub mod usecases;

pub use model::*;
pub use ports::*;
