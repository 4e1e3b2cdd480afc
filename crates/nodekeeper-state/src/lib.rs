//! nodekeeper-state — embedded fleet inventory for Nodekeeper.
//!
//! Backed by [redb](https://docs.rs/redb). The `InventoryStore` holds a
//! snapshot of the managed fleet (resources, load balancers with their
//! target health, metric samples) and implements every collaborator trait
//! from `nodekeeper-core`, so the controller can run against it exactly as
//! it would against a cloud binding.
//!
//! # Architecture
//!
//! ```text
//! resources       {kind}/{id}                  → ManagedResource (JSON)
//! load_balancers  {arn}                        → LoadBalancerRecord (JSON)
//! metric_samples  {subject}|{metric}|{millis}  → MetricSample (JSON)
//! journal         seq (u64)                    → JournalEntry (JSON)
//! ```
//!
//! Every mutating provider call writes the resource change and its journal
//! entry in one write transaction. The journal is append-only and ordered
//! by sequence number, which makes it the record of "which calls were
//! issued, in what order".
//!
//! The store is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`).

pub mod error;
pub mod idle;
pub mod provider;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use store::InventoryStore;
pub use types::*;
