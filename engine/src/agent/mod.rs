//! Agent Loop Core
//!
//! This module drives a goal through an iterative plan-act-observe cycle.
//! The planner proposes one [`Step`] at a time, the core executes it and
//! feeds the result forward, until the run reaches a terminal [`RunStatus`].

pub mod core;
pub mod planner;
pub mod step;

pub use core::{repetition_hint, AgentCore, RunReport, RunStatus, StepError, StepRecord};
pub use planner::{LlmStepPlanner, PlannerError, StepPlanner, StepRequest, ToolDescriptor};
pub use step::{Step, StepContractError, StepInstruction, StepKind, StepProposal, ToolInvocation};
