//! nodekeeper-controller — the per-invocation control loop.
//!
//! # Architecture
//!
//! ```text
//! Controller::run_control_loop()
//!   ├── for each kind: list_resources(kind, population filter)
//!   │   └── for each resource, in fetch order:
//!   │       ConcurrencyLimiter::acquire()   (FIFO, capacity K)
//!   │       spawn → PolicyEngine::evaluate(resource, now)
//!   ├── drain every task (failures are counted, never propagated)
//!   ├── ReactivationMonitor::run(now)
//!   └── Summary
//! ```
//!
//! The limiter is the only state shared between evaluations. Dependency
//! cascades run inside the slot of the evaluation that triggered them.

pub mod controller;
pub mod error;
pub mod limiter;
pub mod summary;

pub use controller::Controller;
pub use error::{LimiterError, LimiterResult};
pub use limiter::{ConcurrencyLimiter, Slot};
pub use summary::{KindSummary, Summary};
