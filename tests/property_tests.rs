//! Property-based tests for sanitization, synthesis and job progress

mod property;
