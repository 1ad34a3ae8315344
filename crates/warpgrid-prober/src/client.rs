//! HTTP client seam used by the probe function.
//!
//! The probe only needs the response head, so clients hand back a
//! `Response<()>` and drop the body.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use http::{Request, Response};
use http_body_util::Empty;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;

use crate::error::{ProberError, ProberResult};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Body type of probe requests.
pub type ProbeBody = Empty<Bytes>;

/// Something that can execute a probe request.
pub trait HttpClient: Send + Sync {
    fn send(&self, request: Request<ProbeBody>) -> BoxFuture<'_, ProberResult<Response<()>>>;
}

/// HTTP/1 client backed by hyper's pooled legacy client.
#[derive(Clone)]
pub struct HyperClient {
    inner: Client<HttpConnector, ProbeBody>,
    timeout: Duration,
}

impl HyperClient {
    /// Create a client whose connect and request phases are bounded by `timeout`.
    pub fn new(timeout: Duration) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(timeout));
        let inner = Client::builder(TokioExecutor::new()).build(connector);
        Self { inner, timeout }
    }
}

impl HttpClient for HyperClient {
    fn send(&self, request: Request<ProbeBody>) -> BoxFuture<'_, ProberResult<Response<()>>> {
        Box::pin(async move {
            match tokio::time::timeout(self.timeout, self.inner.request(request)).await {
                Ok(Ok(response)) => {
                    let (parts, _body) = response.into_parts();
                    Ok(Response::from_parts(parts, ()))
                }
                Ok(Err(e)) => Err(ProberError::Transport(e.to_string())),
                Err(_) => Err(ProberError::Timeout(self.timeout)),
            }
        })
    }
}
