//! Typed references to managed resources.
//!
//! A reference is the string stored in a `depends-on` tag. The kind is
//! encoded in its prefix, so a database-cluster reference and a compute
//! instance reference are textually distinguishable:
//!
//! ```text
//! arn:aws:ec2:<region>:<account>:instance/<instance-id>
//! arn:aws:rds:<region>:<account>:db:<db-identifier>
//! arn:aws:rds:<region>:<account>:cluster:<cluster-identifier>
//! arn:aws:autoscaling:<region>:<account>:autoScalingGroup:<uuid>:autoScalingGroupName/<name>
//! ```
//!
//! Two references are equal when they name the same kind and identifier,
//! regardless of region/account spelling. Resolution always goes through
//! the provider; a reference is never an in-process pointer.

use std::fmt;
use std::hash::{Hash, Hasher};

use crate::types::ResourceKind;

const EC2_PREFIX: &str = "arn:aws:ec2:";
const RDS_PREFIX: &str = "arn:aws:rds:";
const AUTOSCALING_PREFIX: &str = "arn:aws:autoscaling:";

/// A typed pointer to another managed resource.
#[derive(Debug, Clone)]
pub struct ResourceRef {
    kind: ResourceKind,
    id: String,
    arn: String,
}

impl ResourceRef {
    pub fn new(kind: ResourceKind, id: &str, arn: &str) -> Self {
        Self {
            kind,
            id: id.to_string(),
            arn: arn.to_string(),
        }
    }

    /// Parse a kind-prefixed reference string.
    ///
    /// Returns `None` for unrecognised prefixes or an empty identifier.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        let (kind, id) = if raw.starts_with(EC2_PREFIX) {
            let last = raw.rsplit(':').next()?;
            (ResourceKind::ComputeInstance, last.rsplit('/').next()?)
        } else if raw.starts_with(RDS_PREFIX) {
            let kind = if raw.contains(":cluster:") {
                ResourceKind::DatabaseCluster
            } else {
                ResourceKind::DatabaseInstance
            };
            (kind, raw.rsplit(':').next()?)
        } else if raw.starts_with(AUTOSCALING_PREFIX) {
            let last = raw.rsplit(':').next()?;
            (ResourceKind::ScalingGroup, last.rsplit('/').next()?)
        } else {
            return None;
        };

        if id.is_empty() {
            return None;
        }
        Some(Self::new(kind, id, raw))
    }

    /// Build the canonical reference string for a resource.
    pub fn format_arn(kind: ResourceKind, region: &str, account: &str, id: &str) -> String {
        match kind {
            ResourceKind::ComputeInstance => format!("{EC2_PREFIX}{region}:{account}:instance/{id}"),
            ResourceKind::DatabaseInstance => format!("{RDS_PREFIX}{region}:{account}:db:{id}"),
            ResourceKind::DatabaseCluster => format!("{RDS_PREFIX}{region}:{account}:cluster:{id}"),
            ResourceKind::ScalingGroup => format!(
                "{AUTOSCALING_PREFIX}{region}:{account}:autoScalingGroup:*:autoScalingGroupName/{id}"
            ),
        }
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn arn(&self) -> &str {
        &self.arn
    }
}

impl PartialEq for ResourceRef {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.id == other.id
    }
}

impl Eq for ResourceRef {}

impl Hash for ResourceRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.kind.hash(state);
        self.id.hash(state);
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.arn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn parses_compute_reference() {
        let r = ResourceRef::parse("arn:aws:ec2:us-east-1:123456789012:instance/i-0abc").unwrap();
        assert_eq!(r.kind(), ResourceKind::ComputeInstance);
        assert_eq!(r.id(), "i-0abc");
    }

    #[test]
    fn parses_database_instance_and_cluster() {
        let db = ResourceRef::parse("arn:aws:rds:us-east-1:123456789012:db:orders").unwrap();
        assert_eq!(db.kind(), ResourceKind::DatabaseInstance);
        assert_eq!(db.id(), "orders");

        let cluster =
            ResourceRef::parse("arn:aws:rds:us-east-1:123456789012:cluster:orders-aurora").unwrap();
        assert_eq!(cluster.kind(), ResourceKind::DatabaseCluster);
        assert_eq!(cluster.id(), "orders-aurora");
    }

    #[test]
    fn parses_scaling_group_reference() {
        let r = ResourceRef::parse(
            "arn:aws:autoscaling:us-east-1:123456789012:autoScalingGroup:5e1c:autoScalingGroupName/web",
        )
        .unwrap();
        assert_eq!(r.kind(), ResourceKind::ScalingGroup);
        assert_eq!(r.id(), "web");
    }

    #[test]
    fn rejects_unknown_prefix_and_empty_id() {
        assert!(ResourceRef::parse("i-0abc").is_none());
        assert!(ResourceRef::parse("arn:aws:s3:::bucket").is_none());
        assert!(ResourceRef::parse("arn:aws:rds:us-east-1:123456789012:db:").is_none());
    }

    #[test]
    fn equality_ignores_region_and_account() {
        let a = ResourceRef::parse("arn:aws:ec2:us-east-1:111111111111:instance/i-1").unwrap();
        let b = ResourceRef::parse("arn:aws:ec2:*:*:instance/i-1").unwrap();
        let c = ResourceRef::parse("arn:aws:rds:us-east-1:111111111111:db:i-1").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);

        let set: HashSet<_> = [a, b, c].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn formatted_arns_parse_back() {
        for kind in ResourceKind::ALL {
            let arn = ResourceRef::format_arn(kind, "eu-west-1", "123456789012", "thing");
            let r = ResourceRef::parse(&arn).unwrap();
            assert_eq!(r.kind(), kind);
            assert_eq!(r.id(), "thing");
            assert_eq!(r.to_string(), arn);
        }
    }
}
