//! On-device firmware control plane for a remotely managed node: a
//! line/binary-framed UART command protocol, a two-thread execution
//! model (COMM + RUNNER), and a WebAssembly sandbox module lifecycle.
//!
//! See [`agent`] for the top-level owned state and thread wiring,
//! [`comm`]/[`runner`] for the C4/C5 controllers, and [`protocol`] for
//! the exact wire formats.

pub mod agent;
pub mod comm;
pub mod config;
pub mod crc32;
pub mod error;
pub mod framer;
pub mod gpio;
pub mod module_slot;
pub mod parser;
pub mod protocol;
pub mod queue;
pub mod request;
pub mod runner;
pub mod sandbox;
pub mod semaphore;
pub mod transport;

pub use error::{AgentError, Result};
