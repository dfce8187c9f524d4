//! 限流
//! 按 IP 的固定窗口计数：全站基线 600 次/分，详情页另加 120 次/分 (反爬)

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use parking_lot::Mutex;
use tracing::warn;

const WINDOW: Duration = Duration::from_secs(60);
/// 窗口表超过这个规模就清一遍过期项
const SWEEP_THRESHOLD: usize = 10_000;

#[derive(Clone)]
pub struct FixedWindowLimiter {
    max: u32,
    inner: Arc<Mutex<HashMap<IpAddr, (Instant, u32)>>>,
}

impl FixedWindowLimiter {
    pub fn new(max_per_minute: u32) -> Self {
        Self {
            max: max_per_minute,
            inner: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// 放行返回 Ok，超限返回建议的 Retry-After 秒数
    pub fn check(&self, ip: IpAddr) -> Result<(), u64> {
        let now = Instant::now();
        let mut map = self.inner.lock();
        if map.len() > SWEEP_THRESHOLD {
            map.retain(|_, (start, _)| now.duration_since(*start) < WINDOW);
        }
        let slot = map.entry(ip).or_insert((now, 0));
        if now.duration_since(slot.0) >= WINDOW {
            *slot = (now, 0);
        }
        if slot.1 >= self.max {
            let retry = WINDOW
                .saturating_sub(now.duration_since(slot.0))
                .as_secs()
                .max(1);
            return Err(retry);
        }
        slot.1 += 1;
        Ok(())
    }
}

/// 取客户端 IP：反代优先 X-Forwarded-For 首跳，其次 socket 地址
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> IpAddr {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|v| v.trim().parse().ok())
        .or(peer.map(|p| p.ip()))
        .unwrap_or(IpAddr::from([127, 0, 0, 1]))
}

fn too_many(retry_secs: u64) -> Response {
    (
        StatusCode::TOO_MANY_REQUESTS,
        [("retry-after", retry_secs.to_string())],
        "Too Many Requests",
    )
        .into_response()
}

/// 全站基线限流中间件
pub async fn general_limit(
    State(limiter): State<FixedWindowLimiter>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    req: Request,
    next: Next,
) -> Response {
    let ip = client_ip(req.headers(), Some(peer));
    match limiter.check(ip) {
        Ok(()) => next.run(req).await,
        Err(retry) => {
            warn!("[limit] {} blocked on {}", ip, req.uri().path());
            too_many(retry)
        }
    }
}

/// 详情页加强限流中间件
pub async fn detail_limit(
    State(limiter): State<FixedWindowLimiter>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    req: Request,
    next: Next,
) -> Response {
    let ip = client_ip(req.headers(), Some(peer));
    match limiter.check(ip) {
        Ok(()) => next.run(req).await,
        Err(retry) => too_many(retry),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(last: u8) -> IpAddr {
        IpAddr::from([10, 0, 0, last])
    }

    #[test]
    fn test_allows_up_to_max() {
        let limiter = FixedWindowLimiter::new(3);
        assert!(limiter.check(ip(1)).is_ok());
        assert!(limiter.check(ip(1)).is_ok());
        assert!(limiter.check(ip(1)).is_ok());
        let retry = limiter.check(ip(1)).unwrap_err();
        assert!(retry >= 1 && retry <= 60);
    }

    #[test]
    fn test_ips_isolated() {
        let limiter = FixedWindowLimiter::new(1);
        assert!(limiter.check(ip(1)).is_ok());
        assert!(limiter.check(ip(2)).is_ok());
        assert!(limiter.check(ip(1)).is_err());
    }

    #[test]
    fn test_client_ip_forwarded_first_hop() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "203.0.113.9, 10.0.0.1".parse().unwrap());
        assert_eq!(
            client_ip(&headers, None),
            "203.0.113.9".parse::<IpAddr>().unwrap()
        );
        // 没有头就用 socket 地址
        let peer: SocketAddr = "192.0.2.4:5555".parse().unwrap();
        assert_eq!(
            client_ip(&HeaderMap::new(), Some(peer)),
            "192.0.2.4".parse::<IpAddr>().unwrap()
        );
    }
}
