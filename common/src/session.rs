use crate::error::Result;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Holder of an authenticated API session (ticket, token).
///
/// The lock is held across a refresh, so concurrent callers that find no
/// session wait for the first refresh instead of starting their own.
#[derive(Debug)]
pub struct SessionCache<S> {
    current: Mutex<Option<Arc<S>>>,
}

impl<S> Default for SessionCache<S> {
    fn default() -> Self {
        Self {
            current: Mutex::new(None),
        }
    }
}

impl<S> SessionCache<S> {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get_or_refresh<F, Fut>(&self, refresh: F) -> Result<Arc<S>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<S>>,
    {
        let mut current = self.current.lock().await;
        if let Some(session) = current.as_ref() {
            return Ok(session.clone());
        }
        let session = Arc::new(refresh().await?);
        *current = Some(session.clone());
        Ok(session)
    }

    /// Drops the cached session if it is still `stale`. A session refreshed
    /// by another caller in the meantime is kept.
    pub async fn invalidate(&self, stale: &Arc<S>) {
        let mut current = self.current.lock().await;
        if current
            .as_ref()
            .is_some_and(|session| Arc::ptr_eq(session, stale))
        {
            *current = None;
        }
    }

    pub async fn current(&self) -> Option<Arc<S>> {
        self.current.lock().await.clone()
    }
}
