//! Property-based tests for value conversion and word scoring.
