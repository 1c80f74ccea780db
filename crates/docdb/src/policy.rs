//! Connection policy and regional endpoint selection.
//!
//! A [`ConnectionPolicy`] is computed once at startup. Its preferred-location
//! list starts with the application's home region, followed by every other
//! region the database account reports as readable, in the order the service
//! reports them. [`resolve_endpoints`] turns that list plus the account
//! description into the concrete hosts used for reads and writes.

use std::fmt;
use std::time::Duration;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::types::{AccountLocation, DatabaseAccount};

/// How the client reaches the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionMode {
    /// All requests go through the account's gateway endpoint.
    Gateway,
    /// Requests go straight to the backing replicas.
    Direct,
}

impl fmt::Display for ConnectionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionMode::Gateway => write!(f, "gateway"),
            ConnectionMode::Direct => write!(f, "direct"),
        }
    }
}

/// Wire protocol used in direct mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// HTTPS.
    Https,
    /// Raw TCP.
    Tcp,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Https => write!(f, "https"),
            Protocol::Tcp => write!(f, "tcp"),
        }
    }
}

/// Client connection policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionPolicy {
    /// Transport mode.
    pub connection_mode: ConnectionMode,
    /// Wire protocol.
    pub protocol: Protocol,
    /// Regions to prefer for reads, most preferred first.
    pub preferred_locations: Vec<String>,
    /// Per-request timeout.
    pub request_timeout: Duration,
    /// Maximum retries of a throttled request.
    pub max_retry_attempts: u32,
    /// Maximum cumulative wait across throttling retries.
    pub max_retry_wait: Duration,
}

impl Default for ConnectionPolicy {
    fn default() -> Self {
        Self {
            connection_mode: ConnectionMode::Gateway,
            protocol: Protocol::Https,
            preferred_locations: Vec::new(),
            request_timeout: Duration::from_millis(30_000),
            max_retry_attempts: 9,
            max_retry_wait: Duration::from_millis(30_000),
        }
    }
}

impl ConnectionPolicy {
    /// Creates a policy with the given transport settings and no preferred locations.
    pub fn new(connection_mode: ConnectionMode, protocol: Protocol) -> Self {
        Self {
            connection_mode,
            protocol,
            ..Default::default()
        }
    }

    /// Puts `region` at the head of the preferred-location list.
    pub fn with_home_region(mut self, region: impl Into<String>) -> Self {
        let region = region.into();
        self.preferred_locations
            .retain(|existing| !same_region(existing, &region));
        self.preferred_locations.insert(0, region);
        self
    }

    /// Appends every readable location not already preferred.
    pub fn with_readable_locations(mut self, locations: &[AccountLocation]) -> Self {
        for location in locations {
            let known = self
                .preferred_locations
                .iter()
                .any(|existing| same_region(existing, &location.name));
            if !known {
                self.preferred_locations.push(location.name.clone());
            }
        }
        self
    }

    /// Sets the per-request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the throttling retry budget.
    pub fn with_retry_options(mut self, max_attempts: u32, max_wait: Duration) -> Self {
        self.max_retry_attempts = max_attempts;
        self.max_retry_wait = max_wait;
        self
    }

    /// Returns the home region, if one was set.
    pub fn home_region(&self) -> Option<&str> {
        self.preferred_locations.first().map(String::as_str)
    }
}

/// Region names are compared the way the service does: case and spaces ignored.
fn same_region(a: &str, b: &str) -> bool {
    normalize_region(a) == normalize_region(b)
}

fn normalize_region(name: &str) -> String {
    name.chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// The hosts selected for reads and writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedEndpoints {
    /// Endpoint serving reads and queries.
    pub read: Url,
    /// Endpoint serving writes.
    pub write: Url,
}

impl ResolvedEndpoints {
    /// Both reads and writes go to `endpoint`.
    pub fn single(endpoint: Url) -> Self {
        Self {
            read: endpoint.clone(),
            write: endpoint,
        }
    }
}

/// Selects read and write endpoints for `account` under `policy`.
///
/// Reads use the first preferred location the account lists as readable.
/// Writes use the first preferred writable location when the account accepts
/// writes in several regions, and otherwise the account's single write
/// region. Anything unresolvable falls back to `default_endpoint`.
pub fn resolve_endpoints(
    account: &DatabaseAccount,
    policy: &ConnectionPolicy,
    default_endpoint: &Url,
) -> ResolvedEndpoints {
    let read = pick_preferred(&account.readable_locations, &policy.preferred_locations)
        .or_else(|| first_endpoint(&account.readable_locations))
        .unwrap_or_else(|| default_endpoint.clone());

    let write = if account.enable_multiple_write_locations {
        pick_preferred(&account.writable_locations, &policy.preferred_locations)
            .or_else(|| first_endpoint(&account.writable_locations))
    } else {
        first_endpoint(&account.writable_locations)
    }
    .unwrap_or_else(|| default_endpoint.clone());

    ResolvedEndpoints { read, write }
}

fn pick_preferred(locations: &[AccountLocation], preferred: &[String]) -> Option<Url> {
    preferred.iter().find_map(|region| {
        locations
            .iter()
            .find(|location| same_region(&location.name, region))
            .and_then(|location| Url::parse(&location.database_account_endpoint).ok())
    })
}

fn first_endpoint(locations: &[AccountLocation]) -> Option<Url> {
    locations
        .iter()
        .find_map(|location| Url::parse(&location.database_account_endpoint).ok())
}
