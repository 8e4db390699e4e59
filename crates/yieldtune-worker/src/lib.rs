//! Worker-process backend for yieldtune.
//!
//! Model loading, quantization, adapters, the fit loop and sampling live in an
//! external program. This crate launches it, hands it a JSON request and
//! turns its JSON-lines output into progress events and results. A reference
//! worker script ships in [`reference`].

pub mod generator;
pub mod process;
pub mod protocol;
pub mod reference;
pub mod trainer;

pub use generator::WorkerGenerator;
pub use process::WorkerProcess;
pub use protocol::{parse_event, WorkerEvent, WorkerRequest};
pub use reference::{REFERENCE_WORKER_FILE, REFERENCE_WORKER_SOURCE};
pub use trainer::WorkerTrainer;
