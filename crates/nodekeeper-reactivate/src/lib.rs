//! nodekeeper-reactivate — demand-triggered restarts.
//!
//! After the tag-driven pass, the monitor looks at every load balancer.
//! A balancer with no healthy target and recent requests is "demanded";
//! every stopped scaling group and database instance whose `AssociatedELB`
//! tag names it is started directly.
//!
//! # Architecture
//!
//! ```text
//! ReactivationMonitor::run(now)
//!   └── for each load balancer
//!       ├── target_health()            → no handlers available?
//!       ├── request_count(window, now) → incoming requests?
//!       └── both → start associated groups and database instances
//!                  (no dependency cascade, no schedule or idle check)
//! ```
//!
//! Failures are isolated per balancer and per resource; the monitor always
//! finishes and reports what it did.

pub mod demand;
pub mod monitor;

pub use demand::DemandStatus;
pub use monitor::{ReactivationMonitor, ReactivationReport};
