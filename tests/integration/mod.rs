//! Integration tests for evaluation generation

mod cli_workflow;
mod context_aggregation;
mod direct_generation;
mod job_lifecycle;
mod orchestrator_passes;
mod store_cas;
mod support;
