use axum::{
    extract::Request,
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use std::{
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};
use tracing::{debug, error};

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub anonymous_limit: u32,
    pub authenticated_limit: u32,
    pub window_secs: u64,
    pub burst_size: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            anonymous_limit: 100,
            authenticated_limit: 500,
            window_secs: 60,
            burst_size: 30,
        }
    }
}

impl RateLimitConfig {
    pub fn read_heavy() -> Self {
        Self {
            anonymous_limit: 150,
            authenticated_limit: 1000,
            window_secs: 60,
            burst_size: 50,
        }
    }

    // check-in/check-out and funding mutations get the tight tier
    pub fn write_heavy() -> Self {
        Self {
            anonymous_limit: 50,
            authenticated_limit: 200,
            window_secs: 60,
            burst_size: 20,
        }
    }
}

#[derive(Debug, Clone)]
struct RateLimitEntry {
    count: u32,
    window_start: u64,
}

#[derive(Debug, Clone)]
pub struct RateLimitResult {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset_at: u64,
}

#[derive(Clone)]
pub struct RateLimitLayer {
    store: Arc<DashMap<String, RateLimitEntry>>,
    config: RateLimitConfig,
}

impl RateLimitLayer {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            store: Arc::new(DashMap::new()),
            config,
        }
    }

    fn check(&self, key: &str, limit: u32) -> Result<RateLimitResult, String> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| e.to_string())?
            .as_secs();

        let window_secs = self.config.window_secs;
        let window_start = (now / window_secs) * window_secs;
        let total_limit = limit + self.config.burst_size;

        let mut entry = self.store.entry(key.to_string()).or_insert(RateLimitEntry {
            count: 0,
            window_start,
        });

        if entry.window_start < window_start {
            entry.count = 0;
            entry.window_start = window_start;
        }

        if entry.count >= total_limit {
            return Ok(RateLimitResult {
                allowed: false,
                limit: total_limit,
                remaining: 0,
                reset_at: window_start + window_secs,
            });
        }

        entry.count += 1;

        Ok(RateLimitResult {
            allowed: true,
            limit: total_limit,
            remaining: total_limit.saturating_sub(entry.count),
            reset_at: window_start + window_secs,
        })
    }

    pub async fn middleware(&self, headers: HeaderMap, request: Request, next: Next) -> Response {
        let (key, limit) = self.extract_caller(&headers);

        debug!("Rate limit check - key: {}, limit: {}", key, limit);

        match self.check(&key, limit) {
            Ok(result) => {
                if result.allowed {
                    let mut response = next.run(request).await;
                    add_rate_limit_headers(&mut response, &result);
                    response
                } else {
                    debug!("Rate limit exceeded for {}", key);
                    rate_limit_exceeded_response(&result)
                }
            }
            Err(e) => {
                // fail open - rate limiting should never take the service down
                error!("Rate limit check error: {}", e);
                next.run(request).await
            }
        }
    }

    fn extract_caller(&self, headers: &HeaderMap) -> (String, u32) {
        // authenticated callers are keyed by user id from the identity layer
        if let Some(user_id) = headers.get("x-user-id").and_then(|h| h.to_str().ok()) {
            return (format!("user:{}", user_id), self.config.authenticated_limit);
        }

        let ip = headers
            .get("x-forwarded-for")
            .and_then(|h| h.to_str().ok())
            .and_then(|s| s.split(',').next())
            .map(|s| s.trim().to_string())
            .or_else(|| {
                headers
                    .get("x-real-ip")
                    .and_then(|h| h.to_str().ok())
                    .map(|s| s.to_string())
            })
            .unwrap_or_else(|| "127.0.0.1".to_string());

        (format!("ip:{}", ip), self.config.anonymous_limit)
    }
}

fn add_rate_limit_headers(response: &mut Response, result: &RateLimitResult) {
    let headers = response.headers_mut();
    if let Ok(v) = result.limit.to_string().parse() {
        headers.insert("X-RateLimit-Limit", v);
    }
    if let Ok(v) = result.remaining.to_string().parse() {
        headers.insert("X-RateLimit-Remaining", v);
    }
    if let Ok(v) = result.reset_at.to_string().parse() {
        headers.insert("X-RateLimit-Reset", v);
    }
}

fn rate_limit_exceeded_response(result: &RateLimitResult) -> Response {
    let retry_after = result.reset_at.saturating_sub(
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0),
    );

    let body = serde_json::json!({
        "error": "Rate limit exceeded",
        "code": "RATE_LIMITED",
        "retry_after": retry_after,
    });

    let mut response = (
        StatusCode::TOO_MANY_REQUESTS,
        [(axum::http::header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
        .into_response();

    add_rate_limit_headers(&mut response, result);
    if let Ok(v) = retry_after.to_string().parse() {
        response.headers_mut().insert("Retry-After", v);
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_plus_burst_then_blocked() {
        let layer = RateLimitLayer::new(RateLimitConfig {
            anonymous_limit: 5,
            authenticated_limit: 10,
            window_secs: 60,
            burst_size: 2,
        });

        for i in 1..=7 {
            let result = layer.check("test_user", 5).unwrap();
            assert!(result.allowed, "request {} should be allowed", i);
        }

        let result = layer.check("test_user", 5).unwrap();
        assert!(!result.allowed, "request over limit+burst should be blocked");
    }

    #[test]
    fn different_callers_do_not_share_a_bucket() {
        let layer = RateLimitLayer::new(RateLimitConfig::default());
        let limit = layer.config.anonymous_limit;

        for _ in 0..limit + layer.config.burst_size {
            layer.check("user1", limit).unwrap();
        }

        let result = layer.check("user2", limit).unwrap();
        assert!(result.allowed);
    }
}
