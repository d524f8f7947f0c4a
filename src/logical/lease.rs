//! Lease-bearing payloads: secrets, auth metadata and identity aliases.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::time::Duration;

use super::DataMap;

/// Lease options embedded in every [`Secret`] and [`Auth`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LeaseOptions {
    pub ttl: Duration,
    pub max_ttl: Duration,
    pub renewable: bool,
    /// Requested extension on renew.
    pub increment: Duration,
    pub issue_time: Option<DateTime<Utc>>,
}

impl LeaseOptions {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, ..Default::default() }
    }

    pub fn renewable(mut self, renewable: bool) -> Self {
        self.renewable = renewable;
        self
    }

    pub fn with_max_ttl(mut self, max_ttl: Duration) -> Self {
        self.max_ttl = max_ttl;
        self
    }

    /// Expiry time derived from issue time and TTL.
    pub fn expiration_time(&self) -> Option<DateTime<Utc>> {
        let issued = self.issue_time?;
        let ttl = chrono::Duration::from_std(self.ttl).ok()?;
        issued.checked_add_signed(ttl)
    }
}

/// Lease-bearing payload returned by a secret engine.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Secret {
    pub lease: LeaseOptions,
    /// Backend-private data round-tripped through the lease.
    pub internal_data: Option<DataMap>,
    pub lease_id: String,
}

impl Secret {
    pub fn new(lease: LeaseOptions) -> Self {
        Self { lease, ..Default::default() }
    }
}

/// External identity produced by a login.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Alias {
    pub mount_type: String,
    pub mount_accessor: String,
    pub name: String,
}

impl Alias {
    pub fn new(
        mount_type: impl Into<String>,
        mount_accessor: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self { mount_type: mount_type.into(), mount_accessor: mount_accessor.into(), name: name.into() }
    }
}

/// Credential and lease metadata produced by an auth method.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Auth {
    pub lease: LeaseOptions,
    pub internal_data: Option<DataMap>,
    pub display_name: String,
    pub policies: Vec<String>,
    pub metadata: HashMap<String, String>,
    pub client_token: String,
    pub accessor: String,
    pub period: Duration,
    pub explicit_max_ttl: Duration,
    pub num_uses: u32,
    pub entity_id: String,
    pub alias: Option<Alias>,
    pub group_aliases: Vec<Alias>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_expiration_time() {
        let mut lease = LeaseOptions::new(Duration::from_secs(3600));
        assert!(lease.expiration_time().is_none());

        let issued = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        lease.issue_time = Some(issued);
        assert_eq!(lease.expiration_time(), Some(Utc.with_ymd_and_hms(2024, 1, 1, 1, 0, 0).unwrap()));
    }

    #[test]
    fn test_lease_builder() {
        let lease = LeaseOptions::new(Duration::from_secs(60))
            .renewable(true)
            .with_max_ttl(Duration::from_secs(120));
        assert!(lease.renewable);
        assert_eq!(lease.max_ttl, Duration::from_secs(120));
    }
}
