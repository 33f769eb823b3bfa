use std::sync::atomic::{AtomicU64, Ordering};

use crate::auth::{authenticate, AllowedClientKeys};
use crate::config::AppConfig;
use crate::error::BridgeError;
use crate::upstream::QueueClient;

/// Shared application state accessible to all handlers.
///
/// Everything here is immutable or lock-free; pipelines share nothing
/// mutable with each other.
pub struct AppState {
    pub config: AppConfig,
    pub client: QueueClient,
    allowed_client_keys: AllowedClientKeys,
    request_ids: RequestIdGenerator,
}

impl AppState {
    #[must_use]
    pub fn new(
        config: AppConfig,
        client: QueueClient,
        allowed_client_keys: AllowedClientKeys,
    ) -> Self {
        Self {
            config,
            client,
            allowed_client_keys,
            request_ids: RequestIdGenerator::new(),
        }
    }

    /// Check the request's bearer key against the configured allow-list.
    ///
    /// # Errors
    ///
    /// Returns `BridgeError::Auth` when the key is missing or invalid.
    pub fn authorize(&self, headers: &http::HeaderMap) -> Result<(), BridgeError> {
        authenticate(headers, &self.allowed_client_keys)
    }

    /// Allocate the outbound stream id for one request.
    #[must_use]
    pub fn next_request_id(&self) -> String {
        let seq = self.request_ids.next_seq();
        format!("req-{}", self.request_ids.request_uuid(seq))
    }

    /// The model name echoed in outbound chunks: the request's, or the
    /// configured default alias.
    #[must_use]
    pub fn resolve_model<'a>(&'a self, requested: Option<&'a str>) -> &'a str {
        match requested {
            Some(model) if !model.is_empty() => model,
            _ => &self.config.features.default_model,
        }
    }
}

struct RequestIdGenerator {
    seed: u128,
    counter: AtomicU64,
}

impl RequestIdGenerator {
    #[must_use]
    fn new() -> Self {
        let seed_hi = u128::from(fastrand::u64(..));
        let seed_lo = u128::from(fastrand::u64(..));
        Self {
            seed: (seed_hi << 64) | seed_lo,
            counter: AtomicU64::new(1),
        }
    }

    fn next_seq(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::Relaxed)
    }

    #[must_use]
    fn request_uuid(&self, request_seq: u64) -> uuid::Uuid {
        uuid::Uuid::from_u128(self.seed ^ u128::from(request_seq))
    }
}
