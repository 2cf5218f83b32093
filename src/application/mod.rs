//! Application layer - admission, supervision and process lifecycle
//!
//! This layer orchestrates the gateway:
//! - Binding the configured recorder backend
//! - Filtering inbound INVITEs
//! - Supervising the bound handler for every admitted call
//! - The process-wide fault policy

pub mod admission;
pub mod binder;
pub mod dispatcher;
pub mod fault_policy;
pub mod handler;
pub mod supervisor;

pub use admission::{Admission, AdmissionPolicy};
pub use binder::{bind, BoundRecorder};
pub use dispatcher::{Dispatched, Dispatcher};
pub use fault_policy::{FaultPolicy, FAULT_EXIT_CODE};
pub use handler::{CallHandler, DtmfListener, RecorderBackends, RtpEngineBinding};
pub use supervisor::Supervisor;
