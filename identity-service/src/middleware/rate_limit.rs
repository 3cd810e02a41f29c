use axum::{
    extract::{ConnectInfo, Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use governor::{
    clock::{Clock, DefaultClock},
    state::keyed::DashMapStateStore,
    Quota, RateLimiter,
};
use std::{
    net::{IpAddr, SocketAddr},
    num::NonZeroU32,
    sync::Arc,
    time::Duration,
};

use crate::services::AuthError;
use crate::AppState;

/// Per-origin request limiter. The seam exists so tests can swap in a
/// deterministic implementation.
pub trait OriginLimiter: Send + Sync {
    /// `Ok` to admit, or the number of seconds the origin must wait.
    fn check_origin(&self, origin: IpAddr) -> Result<(), u64>;
}

/// Governor-backed limiter keyed by client IP. State is in-memory only, so
/// counters reset on restart and are per-instance.
pub struct GovernorOriginLimiter {
    limiter: RateLimiter<IpAddr, DashMapStateStore<IpAddr>, DefaultClock>,
    clock: DefaultClock,
}

/// Create the login limiter: `attempts` per `window_seconds` per origin.
pub fn create_login_limiter(attempts: u32, window_seconds: u64) -> Arc<GovernorOriginLimiter> {
    let attempts = NonZeroU32::new(attempts).unwrap_or(NonZeroU32::MIN);
    let period = Duration::from_secs((window_seconds / u64::from(attempts.get())).max(1));
    let quota = Quota::with_period(period)
        .unwrap_or_else(|| Quota::per_minute(NonZeroU32::MIN))
        .allow_burst(attempts);

    Arc::new(GovernorOriginLimiter {
        limiter: RateLimiter::dashmap(quota),
        clock: DefaultClock::default(),
    })
}

impl OriginLimiter for GovernorOriginLimiter {
    fn check_origin(&self, origin: IpAddr) -> Result<(), u64> {
        match self.limiter.check_key(&origin) {
            Ok(_) => Ok(()),
            Err(not_until) => {
                let wait = not_until.wait_time_from(self.clock.now());
                Err(wait.as_secs().max(1))
            }
        }
    }
}

/// Middleware limiting login attempts per client IP.
///
/// When no client IP can be determined the request is admitted with a
/// warning: behind a misconfigured proxy, collapsing every caller onto one
/// shared counter would deny service to everyone at once.
pub async fn login_rate_limit(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let ip = client_ip(request.headers(), request.extensions().get::<ConnectInfo<SocketAddr>>());

    match ip {
        Some(ip) => match state.login_limiter.check_origin(ip) {
            Ok(()) => Ok(next.run(request).await),
            Err(retry_after_secs) => {
                tracing::warn!(origin = %ip, retry_after_secs, "Login rate limit exceeded");
                Err(AuthError::RateLimited { retry_after_secs })
            }
        },
        None => {
            tracing::warn!("No client IP available for rate limiting; admitting request");
            Ok(next.run(request).await)
        }
    }
}

/// Client IP: first `X-Forwarded-For` entry, falling back to the socket
/// peer address.
pub fn client_ip(headers: &HeaderMap, peer: Option<&ConnectInfo<SocketAddr>>) -> Option<IpAddr> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .and_then(|value| value.trim().parse::<IpAddr>().ok());

    forwarded.or_else(|| peer.map(|ConnectInfo(addr)| addr.ip()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limiter_allows_within_quota_per_origin() {
        let limiter = create_login_limiter(3, 60);
        let alice: IpAddr = "10.0.0.1".parse().unwrap();
        let bob: IpAddr = "10.0.0.2".parse().unwrap();

        for _ in 0..3 {
            assert!(limiter.check_origin(alice).is_ok());
        }
        let wait = limiter.check_origin(alice).unwrap_err();
        assert!(wait >= 1);

        // A different origin is unaffected
        assert!(limiter.check_origin(bob).is_ok());
    }

    #[test]
    fn test_forwarded_header_wins_over_peer() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "203.0.113.9, 10.0.0.1".parse().unwrap());
        let peer = ConnectInfo("10.0.0.250:40000".parse::<SocketAddr>().unwrap());

        let ip = client_ip(&headers, Some(&peer)).unwrap();
        assert_eq!(ip, "203.0.113.9".parse::<IpAddr>().unwrap());

        let headers = HeaderMap::new();
        let ip = client_ip(&headers, Some(&peer)).unwrap();
        assert_eq!(ip, "10.0.0.250".parse::<IpAddr>().unwrap());

        assert!(client_ip(&HeaderMap::new(), None).is_none());
    }

    #[test]
    fn test_garbage_forwarded_header_falls_back() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "not-an-ip".parse().unwrap());
        let peer = ConnectInfo("10.0.0.250:40000".parse::<SocketAddr>().unwrap());

        let ip = client_ip(&headers, Some(&peer)).unwrap();
        assert_eq!(ip, "10.0.0.250".parse::<IpAddr>().unwrap());
    }
}
