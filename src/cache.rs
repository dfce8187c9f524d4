//! 进程内 TTL 缓存
//! sitemap 响应体专用：纯 key -> (过期时刻, 字节) 映射，进程重启即清空

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;

#[derive(Default)]
pub struct TtlCache {
    inner: RwLock<HashMap<String, (Instant, Arc<Vec<u8>>)>>,
}

impl TtlCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<Arc<Vec<u8>>> {
        let guard = self.inner.read();
        match guard.get(key) {
            Some((expires, body)) if *expires > Instant::now() => Some(body.clone()),
            _ => None,
        }
    }

    pub fn put(&self, key: &str, body: Vec<u8>, ttl: Duration) -> Arc<Vec<u8>> {
        let body = Arc::new(body);
        let mut guard = self.inner.write();
        // 顺手清掉过期项，键空间就 sitemap 那几个，不需要淘汰策略
        let now = Instant::now();
        guard.retain(|_, (expires, _)| *expires > now);
        guard.insert(key.to_string(), (now + ttl, body.clone()));
        body
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_before_expiry() {
        let cache = TtlCache::new();
        cache.put("k", b"body".to_vec(), Duration::from_secs(60));
        assert_eq!(cache.get("k").unwrap().as_slice(), b"body");
        assert!(cache.get("other").is_none());
    }

    #[test]
    fn test_miss_after_expiry() {
        let cache = TtlCache::new();
        cache.put("k", b"body".to_vec(), Duration::from_millis(0));
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get("k").is_none());
    }

    #[test]
    fn test_overwrite() {
        let cache = TtlCache::new();
        cache.put("k", b"v1".to_vec(), Duration::from_secs(60));
        cache.put("k", b"v2".to_vec(), Duration::from_secs(60));
        assert_eq!(cache.get("k").unwrap().as_slice(), b"v2");
    }
}
