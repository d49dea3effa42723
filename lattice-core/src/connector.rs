//! Client-side connector for the resource store RPC surface.
//!
//! tonic has no service-config retries, so the UNAVAILABLE retry policy is
//! applied here: exponential backoff from 5s capped at 30s, at most 5
//! attempts, with a little jitter so herds of projectors do not reconnect in
//! lockstep.

use std::time::Duration;

use rand::Rng;
use tonic::transport::{Channel, Endpoint};
use tracing::{info, warn};

use lattice_proto::services::resource_store_client::ResourceStoreClient;

use crate::error::{LatticeError, Result};

const RETRY_INITIAL_BACKOFF: Duration = Duration::from_secs(5);
const RETRY_MAX_BACKOFF: Duration = Duration::from_secs(30);
const RETRY_MAX_ATTEMPTS: u32 = 5;

#[derive(Debug, Clone)]
pub struct StoreConnector {
    address: String,
}

impl StoreConnector {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
        }
    }

    /// Dials the store, retrying UNAVAILABLE-style connection failures with
    /// exponential backoff.
    pub async fn connect(&self) -> Result<ResourceStoreClient<Channel>> {
        let endpoint = Endpoint::from_shared(self.address.clone())
            .map_err(|err| LatticeError::Config(format!("invalid store address: {err}")))?
            .connect_timeout(Duration::from_secs(10));

        let mut backoff = RETRY_INITIAL_BACKOFF;

        for attempt in 1..=RETRY_MAX_ATTEMPTS {
            match endpoint.connect().await {
                Ok(channel) => {
                    info!(address = %self.address, "connected to resource store");
                    return Ok(ResourceStoreClient::new(channel));
                }
                Err(err) if attempt < RETRY_MAX_ATTEMPTS => {
                    let jitter = {
                        let mut rng = rand::rng();
                        Duration::from_millis(rng.random_range(0..500))
                    };
                    warn!(
                        address = %self.address,
                        attempt,
                        error = %err,
                        "resource store unavailable, backing off"
                    );
                    tokio::time::sleep(backoff + jitter).await;
                    backoff = (backoff * 2).min(RETRY_MAX_BACKOFF);
                }
                Err(err) => return Err(err.into()),
            }
        }

        unreachable!("retry loop returns on success or final error")
    }
}

/// Retries one unary store call on UNAVAILABLE, per the connector policy.
pub async fn with_unavailable_retry<T, F, Fut>(mut call: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = std::result::Result<T, tonic::Status>>,
{
    let mut backoff = RETRY_INITIAL_BACKOFF;

    for attempt in 1..=RETRY_MAX_ATTEMPTS {
        match call().await {
            Ok(value) => return Ok(value),
            Err(status)
                if status.code() == tonic::Code::Unavailable && attempt < RETRY_MAX_ATTEMPTS =>
            {
                warn!(attempt, "store call unavailable, backing off");
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(RETRY_MAX_BACKOFF);
            }
            Err(status) => return Err(status.into()),
        }
    }

    unreachable!("retry loop returns on success or final error")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn unary_retry_stops_on_success() {
        let attempts = AtomicU32::new(0);

        let value = with_unavailable_retry(|| {
            let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if attempt < 3 {
                    Err(tonic::Status::unavailable("try again"))
                } else {
                    Ok(attempt)
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(value, 3);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn non_unavailable_errors_are_not_retried() {
        let attempts = AtomicU32::new(0);

        let err = with_unavailable_retry::<(), _, _>(|| {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err(tonic::Status::invalid_argument("bad")) }
        })
        .await
        .unwrap_err();

        assert!(matches!(err, LatticeError::InvalidArgument(_)));
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_are_bounded() {
        let attempts = AtomicU32::new(0);

        let err = with_unavailable_retry::<(), _, _>(|| {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err(tonic::Status::unavailable("still down")) }
        })
        .await
        .unwrap_err();

        assert!(matches!(err, LatticeError::Transport(_)));
        assert_eq!(attempts.load(Ordering::SeqCst), RETRY_MAX_ATTEMPTS);
    }
}
