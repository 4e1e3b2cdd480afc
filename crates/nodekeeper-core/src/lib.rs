//! nodekeeper-core — shared vocabulary for the Nodekeeper controller.
//!
//! Every other crate speaks in these terms:
//!
//! - **`types`** — `ManagedResource`, `ResourceKind`, `LifecycleState`, load
//!   balancer records and idle queries
//! - **`reference`** — `ResourceRef`, the kind-prefixed string pointer used by
//!   the `depends-on` tag
//! - **`tags`** — the tag taxonomy and `PolicySpec`, the policy derived from a
//!   resource's tags at evaluation time
//! - **`provider`** — collaborator traits for the cloud provider (resources,
//!   load balancers, metrics), injected so the policy engine runs against fakes
//! - **`config`** — `nodekeeper.toml` parsing with environment overrides
//!
//! Nothing in this crate performs I/O except `NodekeeperConfig::from_file`.

pub mod config;
pub mod error;
pub mod provider;
pub mod reference;
pub mod tags;
pub mod types;

pub use config::NodekeeperConfig;
pub use error::{ConfigError, ProviderError, ProviderResult, TagError};
pub use provider::{LoadBalancerProvider, MetricsProvider, ProviderFuture, Providers, ResourceProvider};
pub use reference::ResourceRef;
pub use tags::PolicySpec;
pub use types::*;
