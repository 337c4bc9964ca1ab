//! Integration tests for evaluation generation

mod integration;
