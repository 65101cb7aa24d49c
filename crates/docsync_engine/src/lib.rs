//! # docsync Engine
//!
//! Store reconciliation engine for docsync replicas.
//!
//! This crate provides:
//! - Message normalization (strict and soft merge modes)
//! - Batch coordination with paused observers
//! - Reset of a replica before a full snapshot
//! - A registry of named stores with queuing for unknown collections
//! - An async replicator that drives one worker per collection
//!
//! ## Architecture
//!
//! ```text
//! frames ─▶ Replicator ─▶ StoreRegistry ─▶ Reconciler ─▶ normalize ─▶ ReplicaTarget
//! ```
//!
//! A batch is bracketed by `beginUpdate` / `endUpdate`. Batches with more
//! than one message, or with `reset` set, pause the target's observers so
//! that observers see the whole batch as one step.
//!
//! ## Key Invariants
//!
//! - Messages apply in order; batches apply in delivery order per collection
//! - A reset clears the replica before any message of its batch
//! - Observers are resumed on every exit path, including errors
//! - Strict mode never absorbs a protocol violation

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod normalizer;
mod reconciler;
mod registry;
mod replicator;
mod target;
mod transport;

pub use config::{EngineConfig, MergeMode};
pub use error::{EngineError, EngineResult, ProtocolViolation};
pub use normalizer::{normalize, TableOp};
pub use reconciler::{Batch, ReconcileStats, Reconciler};
pub use registry::{ReplicaStore, StoreRegistry};
pub use replicator::{ReplicationStats, Replicator};
pub use target::ReplicaTarget;
pub use transport::{CborFrameSource, FrameSource, MemoryFrameSource};
