//! Filter controllers
//!
//! A controller reacts to a filter value's updates without owning the state.
//! It declares the element type it expects and the context checks that
//! against the attached value before handing out a handle.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::domain::TypeDescriptor;
use crate::value::{FilterElement, FilterSource, FilterValue};

/// Consumer of a filter value's notifications
#[async_trait]
pub trait FilterController: Send + Sync {
    /// Element type this controller expects
    fn value_type(&self) -> TypeDescriptor;

    /// The value changed; `Null` means absent
    async fn on_value_updated(&self, value: &Value);

    /// The value's state changed without a new value
    async fn on_state_changed(&self);
}

/// Controller that decodes updates into `T` and publishes them on a watch channel
pub struct WatchController<T> {
    value_type: TypeDescriptor,
    tx: watch::Sender<Option<T>>,
    state_changes: AtomicU64,
}

impl<T: FilterElement> WatchController<T> {
    /// Controller for a non-nullable or nullable `T`
    pub fn new(nullable: bool) -> Self {
        let (tx, _rx) = watch::channel(None);
        let value_type = TypeDescriptor::of::<T>();
        let nullable = value_type.is_nullable() || nullable;
        Self {
            value_type: value_type.with_nullable(nullable),
            tx,
            state_changes: AtomicU64::new(0),
        }
    }

    /// Controller whose expected type matches the given value exactly
    pub fn for_value(value: &FilterValue<T>) -> Self {
        let nullable = FilterSource::value_type(value).is_nullable();
        Self::new(nullable)
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<T>> {
        self.tx.subscribe()
    }

    /// Most recent value delivered
    pub fn latest(&self) -> Option<T> {
        self.tx.borrow().clone()
    }

    pub fn state_changes(&self) -> u64 {
        self.state_changes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<T: FilterElement> FilterController for WatchController<T> {
    fn value_type(&self) -> TypeDescriptor {
        self.value_type.clone()
    }

    async fn on_value_updated(&self, value: &Value) {
        let decoded = if value.is_null() {
            None
        } else {
            match serde_json::from_value::<T>(value.clone()) {
                Ok(decoded) => Some(decoded),
                Err(e) => {
                    warn!(error = %e, "WatchController::on_value_updated: undecodable update, ignoring");
                    return;
                }
            }
        };
        debug!("WatchController::on_value_updated: publishing");
        self.tx.send_replace(decoded);
    }

    async fn on_state_changed(&self) {
        self.state_changes.fetch_add(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_publishes_decoded_values() {
        let controller = WatchController::<i64>::new(false);
        let mut rx = controller.subscribe();

        controller.on_value_updated(&json!(5)).await;
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), Some(5));
        assert_eq!(controller.latest(), Some(5));
    }

    #[tokio::test]
    async fn test_null_clears() {
        let controller = WatchController::<String>::new(true);
        controller.on_value_updated(&json!("x")).await;
        controller.on_value_updated(&Value::Null).await;
        assert_eq!(controller.latest(), None);
    }

    #[tokio::test]
    async fn test_undecodable_update_is_ignored() {
        let controller = WatchController::<i64>::new(false);
        controller.on_value_updated(&json!(1)).await;
        controller.on_value_updated(&json!("not a number")).await;
        assert_eq!(controller.latest(), Some(1));
    }

    #[tokio::test]
    async fn test_counts_state_changes() {
        let controller = WatchController::<i64>::new(false);
        controller.on_state_changed().await;
        controller.on_state_changed().await;
        assert_eq!(controller.state_changes(), 2);
    }

    #[test]
    fn test_declared_type() {
        assert_eq!(
            FilterController::value_type(&WatchController::<i64>::new(true)),
            TypeDescriptor::nullable::<i64>()
        );
    }
}
