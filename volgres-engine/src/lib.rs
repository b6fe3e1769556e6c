//! Volgres resize engine: storage auto-resize decisions for Postgres
//! clusters on Kubernetes.
//!
//! The engine watches per-volume disk utilization and grows persistent
//! volumes before they fill, while refusing to grow a volume when that
//! would only mask a stalled WAL archiver or an abandoned replication
//! slot. Decisions run through a short-circuiting gate sequence
//! ([`decision`]); the rate-limit budget is derived purely from the
//! persisted event history ([`ledger`], [`events`]).

pub mod clamp;
pub mod decision;
pub mod error;
pub mod events;
pub mod executor;
pub mod k8s;
pub mod ledger;
pub mod sampler;
pub mod status;
pub mod validate;
pub mod wal;

pub use decision::{BlockReason, GateInput, Outcome};
pub use error::{PatchError, ProbeError};
pub use events::EventStore;
pub use executor::{history_cap, InstancePassReport, ResizeEngine, VolumeAction, VolumeReport};
pub use status::{probe_instance, InstanceStatus};
