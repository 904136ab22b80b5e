//! Reload collaborator
//!
//! A zero-argument operation that re-runs the underlying query. The context
//! receives one at construction and triggers it directly or after a batch.

use std::future::Future;

use async_trait::async_trait;
use eyre::Result;
use tracing::debug;

/// Re-executes the query the filters apply to
#[async_trait]
pub trait ReloadData: Send + Sync {
    async fn reload(&self) -> Result<()>;
}

#[async_trait]
impl<F, Fut> ReloadData for F
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<()>> + Send,
{
    async fn reload(&self) -> Result<()> {
        (self)().await
    }
}

/// Reload collaborator for hosts with nothing to re-run
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopReload;

#[async_trait]
impl ReloadData for NoopReload {
    async fn reload(&self) -> Result<()> {
        debug!("NoopReload::reload: called");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[tokio::test]
    async fn test_closure_is_a_reload_collaborator() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        let reload: Arc<dyn ReloadData> = Arc::new(move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                eyre::Ok(())
            }
        });

        reload.reload().await.unwrap();
        reload.reload().await.unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_closure_errors_propagate() {
        let reload: Arc<dyn ReloadData> = Arc::new(|| async { Err::<(), _>(eyre::eyre!("query failed")) });
        let err = reload.reload().await.unwrap_err();
        assert_eq!(err.to_string(), "query failed");
    }

    #[tokio::test]
    async fn test_noop_reload() {
        assert!(NoopReload.reload().await.is_ok());
    }
}
