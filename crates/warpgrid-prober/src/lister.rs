//! Endpoint listers.
//!
//! A lister turns a logical target into the concrete endpoints that
//! back it. The manager calls it once per probe request and takes the
//! returned list as the complete target set for that attempt.

use crate::error::ProberResult;
use crate::types::{Addressable, ResourceKey};

/// Resolves an addressable into endpoint hosts (IPs or DNS names,
/// optionally with a port).
pub trait IpsLister: Send + Sync {
    fn list(&self, addressable: &Addressable) -> ProberResult<Vec<String>>;
}

impl<F> IpsLister for F
where
    F: Fn(&Addressable) -> ProberResult<Vec<String>> + Send + Sync,
{
    fn list(&self, addressable: &Addressable) -> ProberResult<Vec<String>> {
        self(addressable)
    }
}

/// A lister that always yields the cluster DNS name of `svc`.
///
/// Fan-out to pods is left to the Service's own load balancing.
pub fn from_service(svc: ResourceKey) -> impl IpsLister {
    move |_: &Addressable| -> ProberResult<Vec<String>> {
        Ok(vec![format!("{}.{}.svc", svc.name, svc.namespace)])
    }
}
