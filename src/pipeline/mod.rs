//! Orchestration engine: mode policy, stage graph, wave scheduler, merge, and the service
//! facade tying them to storage.
//!
//! A run flows through the pieces in order:
//!
//! 1. [`Mode::decide`] picks Reduced or Full from the requested facets.
//! 2. [`StageGraph::plan`] closes the required stages over their dependencies and layers them
//!    into waves.
//! 3. [`Scheduler::run`] executes the waves and collects a [`RunContext`].
//! 4. [`crate::store::gateway::PersistenceGateway`] merges the outcomes into the freshest stored
//!    document and commits it.

pub mod context;
pub mod graph;
pub mod merge;
pub mod mode;
pub mod quality;
pub mod scheduler;
pub mod service;
pub mod status;
pub mod types;

pub use context::{AttemptRecord, FacetOutcome, OutcomeResult, RunContext};
pub use graph::{GraphError, Stage, StageGraph};
pub use merge::{FacetDecision, MergeDecision, MergeResult, merge};
pub use mode::Mode;
pub use quality::{QualityAssessment, QualityFlag, assess};
pub use scheduler::{CancelHandle, ScheduleError, Scheduler};
pub use service::{PipelineApi, PipelineService};
pub use status::{PipelineStatus, RunState, StatusBoard};
pub use types::{FacetStatus, PipelineError, ProcessRequest, RunReport};
