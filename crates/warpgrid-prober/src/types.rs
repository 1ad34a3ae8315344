//! Value types identifying what is probed and who to notify.

use std::fmt;
use std::net::Ipv6Addr;

use http::uri::{Authority, Scheme, Uri};
use serde::{Deserialize, Serialize};

use crate::error::{ProberError, ProberResult};

/// Namespaced identity of the resource that owns a probe target.
///
/// Only used as a correlation token when signalling the reconciler.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceKey {
    pub namespace: String,
    pub name: String,
}

impl ResourceKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// A logical probe target plus the resource it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Addressable {
    /// Absolute URL of the logical target.
    pub address: Uri,
    /// Resource to enqueue when probing settles.
    pub resource_key: ResourceKey,
}

impl Addressable {
    /// Parse `address` as an absolute URL.
    pub fn new(address: &str, resource_key: ResourceKey) -> ProberResult<Self> {
        let uri = address.parse::<Uri>().map_err(|e: http::uri::InvalidUri| {
            ProberError::InvalidAddress {
                address: address.to_string(),
                reason: e.to_string(),
            }
        })?;

        if uri.scheme().is_none() || uri.authority().is_none() {
            return Err(ProberError::InvalidAddress {
                address: address.to_string(),
                reason: "address must be absolute".to_string(),
            });
        }
        check_scheme(&uri)?;

        Ok(Self {
            address: uri,
            resource_key,
        })
    }

    /// The same target, addressed at one concrete endpoint.
    pub fn for_endpoint(&self, endpoint: &str) -> ProberResult<Self> {
        Ok(Self {
            address: endpoint_address(&self.address, endpoint)?,
            resource_key: self.resource_key.clone(),
        })
    }
}

/// Fail unless `uri` uses plain `http`, the only scheme the probe client
/// can connect with.
pub fn check_scheme(uri: &Uri) -> ProberResult<()> {
    match uri.scheme_str() {
        Some("http") | None => Ok(()),
        Some(other) => Err(ProberError::InvalidAddress {
            address: uri.to_string(),
            reason: format!("unsupported scheme {other:?}, only http is probed"),
        }),
    }
}

/// Rewrite `address` so that its host is `endpoint`.
///
/// Path and query are kept. The port of `address` is kept unless
/// `endpoint` already carries one. Bare IPv6 addresses are bracketed.
pub fn endpoint_address(address: &Uri, endpoint: &str) -> ProberResult<Uri> {
    check_scheme(address)?;
    let invalid = |reason: String| ProberError::InvalidAddress {
        address: endpoint.to_string(),
        reason,
    };

    let host = if endpoint.parse::<Ipv6Addr>().is_ok() {
        format!("[{endpoint}]")
    } else {
        endpoint.to_string()
    };

    let parsed = host
        .parse::<Authority>()
        .map_err(|e: http::uri::InvalidUri| invalid(e.to_string()))?;
    let authority = match (parsed.port_u16(), address.port_u16()) {
        (None, Some(port)) => format!("{host}:{port}")
            .parse::<Authority>()
            .map_err(|e: http::uri::InvalidUri| invalid(e.to_string()))?,
        _ => parsed,
    };

    let path = address
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");

    Uri::builder()
        .scheme(Scheme::HTTP)
        .authority(authority)
        .path_and_query(path)
        .build()
        .map_err(|e| invalid(e.to_string()))
}
