//! Endpoint resolution
//!
//! Turns a configured hostname into the set of candidate endpoints a
//! request may be sent to:
//! - literal IP addresses are used as-is
//! - other names are looked up as `_vsc-api-server._tcp.<name>` SRV records
//! - a name without SRV records falls back to the plain name
//!
//! SRV priorities and weights are not honored; every record is an equally
//! eligible candidate.

use std::{fmt, net::IpAddr};

use hickory_resolver::{
    Resolver,
    error::{ResolveError, ResolveErrorKind},
    proto::op::ResponseCode,
};
use tracing::debug;

use crate::{
    constants::{DEFAULT_PORT, SRV_PREFIX},
    error::{Result, VscError},
};

/// One resolved endpoint eligible to receive a request
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct EndpointCandidate {
    pub host: String,
    pub port: u16,
}

impl EndpointCandidate {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// `host:port`, with IPv6 literals bracketed
    pub fn authority(&self) -> String {
        match self.host.parse::<IpAddr>() {
            Ok(IpAddr::V6(_)) => format!("[{}]:{}", self.host, self.port),
            _ => format!("{}:{}", self.host, self.port),
        }
    }
}

impl fmt::Display for EndpointCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.authority())
    }
}

/// DNS service discovery backend
pub trait ServiceLocator: Send + Sync {
    /// Look up the SRV records published under `service_name`.
    ///
    /// Returns `Ok(None)` when DNS authoritatively reports that the name
    /// does not exist. Any other lookup failure is an error.
    fn lookup_srv(&self, service_name: &str) -> Result<Option<Vec<EndpointCandidate>>>;
}

/// `ServiceLocator` backed by the system DNS configuration
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemServiceLocator;

impl ServiceLocator for SystemServiceLocator {
    fn lookup_srv(&self, service_name: &str) -> Result<Option<Vec<EndpointCandidate>>> {
        let resolver = Resolver::from_system_conf().map_err(|e| {
            VscError::no_alive_servers("cannot load system DNS configuration", e)
        })?;

        match resolver.srv_lookup(service_name) {
            Ok(lookup) => Ok(Some(
                lookup
                    .iter()
                    .map(|srv| {
                        let target = srv.target().to_utf8();
                        EndpointCandidate::new(target.trim_end_matches('.'), srv.port())
                    })
                    .collect(),
            )),
            Err(e) if is_nxdomain(&e) => Ok(None),
            Err(e) => Err(VscError::no_alive_servers(
                format!("SRV lookup for {service_name} failed"),
                e,
            )),
        }
    }
}

fn is_nxdomain(error: &ResolveError) -> bool {
    matches!(
        error.kind(),
        ResolveErrorKind::NoRecordsFound { response_code, .. }
            if *response_code == ResponseCode::NXDomain
    )
}

/// SRV name queried for `hostname`
pub fn service_name(hostname: &str) -> String {
    if hostname.starts_with(SRV_PREFIX) {
        hostname.to_string()
    } else {
        format!("{SRV_PREFIX}{hostname}")
    }
}

/// Resolve `hostname` into candidate endpoints. Never returns an empty
/// list on success.
pub fn resolve(
    hostname: &str,
    port: Option<u16>,
    locator: &dyn ServiceLocator,
) -> Result<Vec<EndpointCandidate>> {
    let fallback = || vec![EndpointCandidate::new(hostname, port.unwrap_or(DEFAULT_PORT))];

    if hostname.parse::<IpAddr>().is_ok() {
        debug!("{} is a literal IP address, skipping discovery", hostname);
        return Ok(fallback());
    }

    let srv_name = service_name(hostname);
    match locator.lookup_srv(&srv_name)? {
        Some(candidates) if !candidates.is_empty() => {
            debug!(
                "Discovered {} endpoint(s) under {}",
                candidates.len(),
                srv_name
            );
            Ok(candidates)
        }
        Some(_) => Err(VscError::NoAliveServers {
            reason: format!("SRV lookup for {srv_name} returned no records"),
            source: None,
        }),
        None => {
            debug!("No SRV records under {}, using plain name", srv_name);
            Ok(fallback())
        }
    }
}
