//! Loop management module.
//!
//! The core iteration machinery:
//!
//! - [`controller`] - Top-level state machine that drives iterations
//! - [`iteration`] - One invoke-and-observe cycle
//! - [`completion`] - Completion sentinel detection
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐     ┌────────────────┐     ┌──────────────┐
//! │ LoopRunner   │────>│ IterationExec  │────>│ AgentRunner  │
//! │ (controller) │     │ (iteration)    │     │ + monitor    │
//! └──────────────┘     └────────────────┘     └──────────────┘
//!        │                     │                     │
//!        v                     v                     v
//! ┌──────────────┐     ┌────────────────┐     ┌──────────────┐
//! │ StateStore   │     │ ChangeTracker  │     │ Completion   │
//! │              │     │                │     │ Detector     │
//! └──────────────┘     └────────────────┘     └──────────────┘
//! ```

pub mod completion;
pub mod controller;
pub mod iteration;

// Re-exports for convenience
pub use controller::{LoopOptions, LoopOutcome, LoopRunner};
pub use iteration::IterationOutcome;
