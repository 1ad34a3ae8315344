//! Single-endpoint probe.
//!
//! Sends one GET and classifies the answer. There is no retry here;
//! the manager owns retries.

use bytes::Bytes;
use http::header::USER_AGENT;
use http::{Method, Request, StatusCode};
use http_body_util::Empty;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::client::{HttpClient, ProbeBody};
use crate::error::ProberResult;
use crate::status::Status;
use crate::types::check_scheme;

/// Header marking a request as a synthetic probe rather than user traffic.
pub const PROBE_HEADER_NAME: &str = "K-Network-Probe";
/// Value of [`PROBE_HEADER_NAME`].
pub const PROBE_HEADER_VALUE: &str = "probe";
/// Routing/hash header. Receivers may special-case the sentinel value.
pub const HASH_HEADER_NAME: &str = "K-Network-Hash";
/// Sentinel value sent in [`HASH_HEADER_NAME`].
pub const HASH_HEADER_VALUE: &str = "probe";

const PROBE_USER_AGENT: &str = concat!("warpgrid-prober/", env!("CARGO_PKG_VERSION"));

/// Build the probe request for `address`.
pub fn probe_request(address: &str) -> ProberResult<Request<ProbeBody>> {
    let request = Request::builder()
        .method(Method::GET)
        .uri(address)
        .header(PROBE_HEADER_NAME, PROBE_HEADER_VALUE)
        .header(HASH_HEADER_NAME, HASH_HEADER_VALUE)
        .header(USER_AGENT, PROBE_USER_AGENT)
        .body(Empty::<Bytes>::new())?;
    check_scheme(request.uri())?;
    Ok(request)
}

/// Probe `address` once.
///
/// Returns `Ready` for HTTP 200, `NotReady` for any other status, and
/// `Unknown` when the request cannot be built, fails in transport, or
/// `ctx` is canceled before or during the request.
pub async fn probe<C>(ctx: &CancellationToken, client: &C, address: &str) -> Status
where
    C: HttpClient + ?Sized,
{
    debug!(%address, "sending probe request");

    let request = match probe_request(address) {
        Ok(r) => r,
        Err(e) => {
            error!(%address, error = %e, "failed to create probe request");
            return Status::Unknown;
        }
    };

    if ctx.is_cancelled() {
        return Status::Unknown;
    }

    let response = tokio::select! {
        biased;
        _ = ctx.cancelled() => {
            debug!(%address, "probe canceled in flight");
            return Status::Unknown;
        }
        response = client.send(request) => response,
    };

    match response {
        Err(e) => {
            warn!(%address, error = %e, "failed probe");
            Status::Unknown
        }
        Ok(resp) if resp.status() != StatusCode::OK => {
            info!(%address, status_code = resp.status().as_u16(), "resource not ready");
            Status::NotReady
        }
        Ok(_) => Status::Ready,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use http::{HeaderMap, Response};

    use super::*;
    use crate::client::BoxFuture;
    use crate::error::ProberError;

    enum Reply {
        Status(u16),
        Refused,
        Hang,
    }

    struct FakeClient {
        reply: Reply,
        calls: AtomicUsize,
        headers: Mutex<Option<HeaderMap>>,
    }

    impl FakeClient {
        fn new(reply: Reply) -> Self {
            Self {
                reply,
                calls: AtomicUsize::new(0),
                headers: Mutex::new(None),
            }
        }
    }

    impl HttpClient for FakeClient {
        fn send(&self, request: Request<ProbeBody>) -> BoxFuture<'_, ProberResult<Response<()>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.headers.lock().unwrap() = Some(request.headers().clone());
            Box::pin(async move {
                match self.reply {
                    Reply::Status(code) => Ok(Response::builder().status(code).body(()).unwrap()),
                    Reply::Refused => Err(ProberError::Transport("connection refused".into())),
                    Reply::Hang => {
                        tokio::time::sleep(Duration::from_secs(3600)).await;
                        Ok(Response::new(()))
                    }
                }
            })
        }
    }

    const ADDR: &str = "http://10.0.0.1:8080/ns/name";

    #[tokio::test]
    async fn ok_is_ready() {
        let client = FakeClient::new(Reply::Status(200));
        let status = probe(&CancellationToken::new(), &client, ADDR).await;
        assert_eq!(status, Status::Ready);
    }

    #[tokio::test]
    async fn non_ok_is_not_ready() {
        for code in [201, 204, 301, 404, 500, 503] {
            let client = FakeClient::new(Reply::Status(code));
            let status = probe(&CancellationToken::new(), &client, ADDR).await;
            assert_eq!(status, Status::NotReady, "status code {code}");
        }
    }

    #[tokio::test]
    async fn transport_error_is_unknown() {
        let client = FakeClient::new(Reply::Refused);
        let status = probe(&CancellationToken::new(), &client, ADDR).await;
        assert_eq!(status, Status::Unknown);
    }

    #[tokio::test]
    async fn canceled_context_skips_network() {
        let client = FakeClient::new(Reply::Status(200));
        let ctx = CancellationToken::new();
        ctx.cancel();
        let status = probe(&ctx, &client, ADDR).await;
        assert_eq!(status, Status::Unknown);
        assert_eq!(client.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_interrupts_in_flight_request() {
        let client = FakeClient::new(Reply::Hang);
        let ctx = CancellationToken::new();
        let cancel = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            cancel.cancel();
        });
        let status = probe(&ctx, &client, ADDR).await;
        assert_eq!(status, Status::Unknown);
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn malformed_address_is_unknown() {
        let client = FakeClient::new(Reply::Status(200));
        let status = probe(&CancellationToken::new(), &client, "http://bad host/").await;
        assert_eq!(status, Status::Unknown);
        assert_eq!(client.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn https_address_is_unknown_without_sending() {
        let client = FakeClient::new(Reply::Status(200));
        let status = probe(&CancellationToken::new(), &client, "https://10.0.0.1/").await;
        assert_eq!(status, Status::Unknown);
        assert_eq!(client.calls.load(Ordering::SeqCst), 0);
        assert!(matches!(
            probe_request("https://10.0.0.1/"),
            Err(ProberError::InvalidAddress { .. })
        ));
    }

    #[tokio::test]
    async fn request_carries_probe_markers() {
        let client = FakeClient::new(Reply::Status(200));
        probe(&CancellationToken::new(), &client, ADDR).await;

        let headers = client.headers.lock().unwrap().clone().unwrap();
        assert_eq!(headers.get(PROBE_HEADER_NAME).unwrap(), "probe");
        assert_eq!(headers.get(HASH_HEADER_NAME).unwrap(), "probe");
        assert!(
            headers
                .get(USER_AGENT)
                .unwrap()
                .to_str()
                .unwrap()
                .starts_with("warpgrid-prober/")
        );
    }

    #[test]
    fn probe_request_is_get() {
        let request = probe_request(ADDR).unwrap();
        assert_eq!(request.method(), Method::GET);
        assert_eq!(request.uri().to_string(), ADDR);
    }
}
