//! nodekeeper-policy — the per-resource decision table.
//!
//! # Components
//!
//! - **`actuator`** — kind-aware start/stop/terminate verbs (scaling groups
//!   are driven through desired capacity)
//! - **`resolver`** — dependency cascades under a per-cascade visited set,
//!   and the live-dependents veto
//! - **`engine`** — one evaluation per resource, at most one action per
//!   branch
//!
//! # Decision order
//!
//! ```text
//! Stopped and ((AutoStart and start-schedule matches) or to-be-started)
//!     → start dependencies, start, clear to-be-started, done
//! Running and AutoStop
//!     depends-on present          → veto
//!     stop-schedule or idle       → stop unless a live dependent exists
//! Running and AutoTerminate (compute only, independent of the stop branch)
//!     max-runtime exceeded        → tag TerminationInProgress, terminate
//!                                   unless a live dependent exists
//! ```

pub mod actuator;
pub mod engine;
pub mod error;
pub mod resolver;

pub use actuator::Actuator;
pub use engine::{Action, Evaluation, PolicyEngine, StartTrigger, StopReason, Veto};
pub use error::{PolicyError, PolicyResult};
pub use resolver::{DependencyResolver, VisitedSet};
