use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

pub const CSRF_TTL: Duration = Duration::from_secs(60 * 60);

struct CachedToken {
    value: String,
    fetched_at: Instant,
}

/// Anti-forgery token cache shared by clones of the client.
#[derive(Clone)]
pub struct CsrfCache {
    inner: Arc<RwLock<Option<CachedToken>>>,
    ttl: Duration,
}

impl Default for CsrfCache {
    fn default() -> Self {
        Self::new(CSRF_TTL)
    }
}

impl CsrfCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Arc::new(RwLock::new(None)),
            ttl,
        }
    }

    pub async fn get(&self) -> Option<String> {
        let cache = self.inner.read().await;
        cache
            .as_ref()
            .filter(|t| t.fetched_at.elapsed() < self.ttl)
            .map(|t| t.value.clone())
    }

    pub async fn put(&self, value: String) {
        *self.inner.write().await = Some(CachedToken {
            value,
            fetched_at: Instant::now(),
        });
    }

    pub async fn invalidate(&self) {
        *self.inner.write().await = None;
    }
}

/// Django reports a rejected anti-forgery token as a 403 whose detail
/// mentions CSRF.
pub fn is_csrf_rejection(status: u16, body: &str) -> bool {
    status == 403 && body.contains("CSRF")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cached_token_expires_after_ttl() {
        let cache = CsrfCache::new(Duration::from_millis(0));
        cache.put("t1".into()).await;
        assert!(cache.get().await.is_none());

        let cache = CsrfCache::default();
        cache.put("t2".into()).await;
        assert_eq!(cache.get().await.as_deref(), Some("t2"));
        cache.invalidate().await;
        assert!(cache.get().await.is_none());
    }

    #[test]
    fn detects_csrf_rejection() {
        assert!(is_csrf_rejection(403, r#"{"detail":"CSRF Failed: token missing"}"#));
        assert!(!is_csrf_rejection(403, r#"{"detail":"Permission denied"}"#));
        assert!(!is_csrf_rejection(400, "CSRF"));
    }
}
