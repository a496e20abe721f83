#![deny(missing_docs)]

//! Core library for the facetflow enrichment pipeline.

/// Capability adapters and the reference providers behind each facet.
pub mod adapter;
/// Environment-driven configuration management.
pub mod config;
/// Document and facet data model.
pub mod document;
/// Structured logging and tracing setup.
pub mod logging;
/// Pipeline activity counters.
pub mod metrics;
/// Mode policy, stage graph, scheduler, merge, and the service entry points.
pub mod pipeline;
/// Document stores and the persistence gateway.
pub mod store;

pub use document::{Document, Facet, FacetSlot, FacetValue};
pub use pipeline::{CancelHandle, Mode, PipelineApi, PipelineError, PipelineService, RunReport};
