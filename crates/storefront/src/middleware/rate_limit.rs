//! Rate limiting middleware using governor and `tower_governor`.
//!
//! - `login_rate_limiter`: strict, for `POST /api/admin/login` (~10/min)
//! - `checkout_rate_limiter`: order creation and payment initiation (~30/min)
//! - `api_rate_limiter`: everything else under `/api` (~60/min)
//!
//! The payment callback is never rate limited; PhonePe retries on failure.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::extract::ConnectInfo;
use axum::http::Request;
use governor::clock::QuantaInstant;
use governor::middleware::NoOpMiddleware;
use tower_governor::{GovernorError, GovernorLayer, governor::GovernorConfigBuilder};

/// Proxy headers carrying the client address, most trusted first.
const CLIENT_IP_HEADERS: [&str; 3] = ["cf-connecting-ip", "x-real-ip", "x-forwarded-for"];

/// Key extractor that prefers proxy headers and falls back to the peer
/// address from `ConnectInfo`.
#[derive(Clone, Copy, Debug, Default)]
pub struct ClientIpKeyExtractor;

impl ClientIpKeyExtractor {
    fn from_headers<T>(req: &Request<T>) -> Option<IpAddr> {
        CLIENT_IP_HEADERS.iter().find_map(|name| {
            req.headers()
                .get(*name)
                .and_then(|v| v.to_str().ok())
                // X-Forwarded-For: first entry is the client
                .and_then(|s| s.split(',').next())
                .and_then(|s| s.trim().parse::<IpAddr>().ok())
        })
    }
}

impl tower_governor::key_extractor::KeyExtractor for ClientIpKeyExtractor {
    type Key = IpAddr;

    fn extract<T>(&self, req: &Request<T>) -> Result<Self::Key, GovernorError> {
        Self::from_headers(req)
            .or_else(|| {
                req.extensions()
                    .get::<ConnectInfo<SocketAddr>>()
                    .map(|ConnectInfo(addr)| addr.ip())
            })
            .ok_or(GovernorError::UnableToExtractKey)
    }
}

/// Rate limiter layer type for Axum.
pub type RateLimiterLayer =
    GovernorLayer<ClientIpKeyExtractor, NoOpMiddleware<QuantaInstant>, axum::body::Body>;

fn limiter(replenish_every_secs: u64, burst: u32) -> RateLimiterLayer {
    let config = GovernorConfigBuilder::default()
        .key_extractor(ClientIpKeyExtractor)
        .per_second(replenish_every_secs)
        .burst_size(burst)
        .finish()
        .expect("rate limiter period and burst are non-zero constants");
    GovernorLayer::new(Arc::new(config))
}

/// ~10 requests per minute per IP, burst of 5.
///
/// # Panics
///
/// Never; the configuration uses fixed non-zero values.
#[must_use]
pub fn login_rate_limiter() -> RateLimiterLayer {
    limiter(6, 5)
}

/// ~30 requests per minute per IP, burst of 10.
///
/// # Panics
///
/// Never; the configuration uses fixed non-zero values.
#[must_use]
pub fn checkout_rate_limiter() -> RateLimiterLayer {
    limiter(2, 10)
}

/// ~60 requests per minute per IP, burst of 50.
///
/// # Panics
///
/// Never; the configuration uses fixed non-zero values.
#[must_use]
pub fn api_rate_limiter() -> RateLimiterLayer {
    limiter(1, 50)
}
