use std::sync::Arc;
use std::time::Duration;

use tower::limit::{RateLimit, RateLimitLayer as InnerRateLimitLayer};
use tower::{Layer, Service};

/// Thin wrapper around `tower::limit::RateLimitLayer` so callers pass a
/// burst size and a refill window instead of juggling the inner type's
/// `num`/`per` naming. `QPS ~= burst / per`.
#[derive(Clone)]
pub struct RateLimitLayer {
    inner: Arc<InnerRateLimitLayer>,
}

impl RateLimitLayer {
    pub fn new(burst: u64, per: Duration) -> Self {
        Self {
            inner: Arc::new(InnerRateLimitLayer::new(burst, per)),
        }
    }
}

impl<S> Layer<S> for RateLimitLayer {
    type Service = RateLimit<S>;

    fn layer(&self, inner: S) -> Self::Service {
        self.inner.layer(inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::task::{Context, Poll};
    use tower::ServiceExt;

    #[derive(Clone)]
    struct Echo;

    impl Service<u32> for Echo {
        type Response = u32;
        type Error = std::convert::Infallible;
        type Future = std::future::Ready<Result<u32, Self::Error>>;

        fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, req: u32) -> Self::Future {
            std::future::ready(Ok(req))
        }
    }

    #[tokio::test]
    async fn allows_requests_within_burst() {
        let layer = RateLimitLayer::new(400, Duration::from_secs(2));
        let mut svc = layer.layer(Echo);
        let res = svc.ready().await.unwrap().call(7).await.unwrap();
        assert_eq!(res, 7);
    }
}
