//! guardgen: Evaluation Generation for Governed AI Use Cases
//!
//! Aggregates a use case's assessments and guardrails into a generation context, drives a
//! completion provider through staged or multi-agent generation passes, and stores the
//! sanitized evaluation artifact. Long runs are tracked as persisted jobs with
//! check-and-set state transitions and monotonic progress.

pub mod cli;
pub mod config;
pub mod context;
pub mod document;
pub mod error;
pub mod generation;
pub mod job;
pub mod logging;
pub mod orchestrator;
pub mod pipeline;
pub mod provider;
pub mod sanitize;
pub mod service;
pub mod store;
