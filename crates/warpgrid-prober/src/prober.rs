//! The `Prober` contract and its closure adapter.

use std::future::Future;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::client::{BoxFuture, HttpClient};
use crate::probe::probe;
use crate::status::Status;
use crate::types::Addressable;

/// Probes an addressable resource and reports its status.
///
/// `expected` lets callers probe for absence (waiting for `NotReady`
/// during a drain) as well as presence.
pub trait Prober: Send + Sync {
    fn probe<'a>(
        &'a self,
        ctx: &'a CancellationToken,
        addressable: &'a Addressable,
        expected: Status,
    ) -> BoxFuture<'a, Status>;
}

/// Adapter that lets an ordinary function act as a [`Prober`].
///
/// The function receives owned copies of its arguments, so the returned
/// future may be `'static`.
pub struct Func<F>(pub F);

impl<F, Fut> Prober for Func<F>
where
    F: Fn(CancellationToken, Addressable, Status) -> Fut + Send + Sync,
    Fut: Future<Output = Status> + Send + 'static,
{
    fn probe<'a>(
        &'a self,
        ctx: &'a CancellationToken,
        addressable: &'a Addressable,
        expected: Status,
    ) -> BoxFuture<'a, Status> {
        Box::pin((self.0)(ctx.clone(), addressable.clone(), expected))
    }
}

impl<P> Prober for Arc<P>
where
    P: Prober + ?Sized,
{
    fn probe<'a>(
        &'a self,
        ctx: &'a CancellationToken,
        addressable: &'a Addressable,
        expected: Status,
    ) -> BoxFuture<'a, Status> {
        (**self).probe(ctx, addressable, expected)
    }
}

/// A prober that sends one HTTP probe to `addressable.address`.
///
/// `expected` is ignored; classification does not depend on it.
pub fn http_prober<C>(client: Arc<C>) -> impl Prober
where
    C: HttpClient + ?Sized + 'static,
{
    Func(move |ctx: CancellationToken, addressable: Addressable, _expected: Status| {
        let client = client.clone();
        let span = tracing::debug_span!(
            "http_probe",
            key = %addressable.resource_key,
            address = %addressable.address,
        );
        async move { probe(&ctx, client.as_ref(), &addressable.address.to_string()).await }
            .instrument(span)
    })
}
