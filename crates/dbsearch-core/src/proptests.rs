//! Property-based tests for identifier utilities.
