//! warpgrid-prober: readiness probing for multi-endpoint targets.
//!
//! Answers "is every endpoint behind this target serving yet?" for a
//! reconcile loop, without blocking it. Probing runs in the background
//! with backoff until the answer matches what the caller expects, then
//! the owning resource is enqueued once so the reconciler re-evaluates.
//!
//! # Architecture
//!
//! ```text
//! Manager (impl Prober)
//!   ├── IpsLister → endpoint set for the Addressable
//!   ├── Session per ResourceKey (superseded when the target changes)
//!   │   ├── endpoint loop per endpoint
//!   │   │   ├── Prober::probe() → Status   (http_prober by default)
//!   │   │   └── Backoff (exponential, capped, jittered)
//!   │   └── aggregator task → watch<SessionSnapshot>
//!   └── EnqueueFunc(ResourceKey) once per settled session
//! ```
//!
//! # Probe requests
//!
//! Each probe is an HTTP GET carrying `K-Network-Probe: probe` and
//! `K-Network-Hash: probe`. HTTP 200 is `Ready`, any other status is
//! `NotReady`, and transport failures or cancellation are `Unknown`.
//! Every outcome except a match with the expected status is retried.

pub mod backoff;
pub mod client;
pub mod config;
pub mod error;
pub mod lister;
pub mod manager;
pub mod probe;
pub mod prober;
pub mod status;
pub mod types;

pub use backoff::Backoff;
pub use client::{BoxFuture, HttpClient, HyperClient, ProbeBody};
pub use config::ProberConfig;
pub use error::{ProberError, ProberResult};
pub use lister::{from_service, IpsLister};
pub use manager::{EndpointState, EnqueueFunc, Manager, SessionPhase, SessionSnapshot};
pub use probe::{probe, HASH_HEADER_NAME, HASH_HEADER_VALUE, PROBE_HEADER_NAME, PROBE_HEADER_VALUE};
pub use prober::{http_prober, Func, Prober};
pub use status::{aggregate, Status};
pub use types::{Addressable, ResourceKey};
