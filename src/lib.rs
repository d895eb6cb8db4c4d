//! Workspace test package. The cross-crate integration tests live in
//! `tests/`; the crates under `crates/` hold the implementation.
