//! Core orchestration logic.
//!
//! This module contains:
//! - Router: correlation-keyed waiter registry over the channel's events
//! - Workflow: reusable workflow shapes built on the router
//! - Timer: scheduled commands and guaranteed release
//! - Orchestrator: the operation catalog

pub mod orchestrator;
pub mod router;
pub mod timer;
pub mod workflow;

// Re-export commonly used types
pub use orchestrator::Orchestrator;
pub use router::{EventRouter, RouterError, WaitHandle, WaitOutcome, Waiter, WaiterClosed};
pub use timer::ScheduledCommand;
pub use workflow::{
    with_deadline, GatedOutcome, RaceOutcome, SideEffect, StateTable, Transition, WorkflowEngine,
    WorkflowError,
};
