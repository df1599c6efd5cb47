//! Shared functionality
//!
//! This crate supplies the plumbing the strix crates have in common: the
//! byte-to-code-point input stream and the fatal error/result types.

pub mod byte_stream;
pub mod types;
