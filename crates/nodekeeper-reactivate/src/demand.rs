//! Demand status of one load balancer.

use serde::Serialize;

use nodekeeper_core::TargetHealth;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DemandStatus {
    /// No target in any target group reports healthy.
    pub no_handlers_available: bool,
    /// The trailing request count is above zero.
    pub has_incoming_requests: bool,
}

impl DemandStatus {
    pub fn new(health: TargetHealth, request_count: f64) -> Self {
        Self {
            no_handlers_available: !health.has_healthy_target,
            has_incoming_requests: request_count > 0.0,
        }
    }

    /// Traffic is arriving and nothing can serve it.
    pub fn needs_reactivation(&self) -> bool {
        self.no_handlers_available && self.has_incoming_requests
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reactivation_needs_both_conditions() {
        let unhealthy = TargetHealth {
            has_healthy_target: false,
        };
        let healthy = TargetHealth {
            has_healthy_target: true,
        };

        assert!(DemandStatus::new(unhealthy, 42.0).needs_reactivation());
        assert!(!DemandStatus::new(unhealthy, 0.0).needs_reactivation());
        assert!(!DemandStatus::new(healthy, 42.0).needs_reactivation());
        assert!(!DemandStatus::new(healthy, 0.0).needs_reactivation());
    }
}
