//! Application use cases / business logic

pub mod caption;
pub mod lifecycle;
pub mod run_once;

pub use caption::{AssistedComposer, CaptionLimits, DeterministicComposer};
pub use lifecycle::{LifecycleError, LifecycleManager};
pub use run_once::{RunConfig, RunError, RunOnce};
