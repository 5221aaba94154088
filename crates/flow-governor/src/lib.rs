//! Adaptive flow setup governor for SONiC.
//!
//! Installing a datapath flow for every new flow wastes fast-path table
//! capacity on short-lived, low-volume traffic. The governor sits in front
//! of flow installation and only lets a flow through once it has been seen
//! [`FLOW_SETUP_THRESHOLD`] times within one generation.
//!
//! - [`Governor`]: the admission controller (counting table + generations)
//! - [`FlowSetupGate`]: engages a governor under flow table pressure and
//!   retires it when idle
//! - [`GovernorConfig`]: tunable parameters, defaulting to the fixed
//!   contract constants
//! - [`Clock`] / [`DiagnosticsSink`]: injected time source and log output
//!
//! # Architecture
//!
//! ```text
//!  packet batch (hash, n)
//!          │
//!          ▼
//!   FlowSetupGate ──(no governor)──> install
//!          │
//!          ▼
//!      Governor ──> CountingTable (2 x 4-bit counters per byte)
//!          │
//!          ├──> install / slow path
//!          └──> generation rollover ──> resize (x2 / ÷2 / keep)
//! ```
//!
//! # Example
//!
//! ```
//! use sonic_flow_governor::Governor;
//!
//! let mut governor = Governor::new("br0").unwrap();
//! let hash = 0x1234_5678;
//!
//! let decisions: Vec<bool> = (0..5)
//!     .map(|_| governor.should_install_flow(hash, 1))
//!     .collect();
//! assert_eq!(decisions, [false, false, false, false, true]);
//! ```
//!
//! # Concurrency
//!
//! A governor is single-owner and synchronous. Callers processing packets on
//! several threads keep one governor per shard or serialize access.

pub mod clock;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod gate;
pub mod governor;
pub mod sketch;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{
    GovernorConfig, FLOW_SETUP_THRESHOLD, MAX_ELAPSED, MAX_SIZE, MIN_ELAPSED, MIN_SIZE,
};
pub use diagnostics::{DiagnosticsSink, GovernorEvent, RecordingSink, TracingSink};
pub use error::{GovernorError, GovernorResult};
pub use gate::FlowSetupGate;
pub use governor::{Governor, GovernorStats};
pub use sketch::CountingTable;
