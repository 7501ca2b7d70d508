//! # CRDT Reconciliation Layer
//!
//! Deterministic application of incoming messages. Two engines that apply the
//! same set of messages, in any order and any number of times, end up holding
//! the same component state.

mod reconcile;

pub use reconcile::{apply_batch, resolve_lww, ApplyOutcome, ApplyReport, LwwResolution};
