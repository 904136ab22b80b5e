//! Value and controller handles
//!
//! A handle is the only channel between an attached value or controller and
//! its context. Each wraps a state record that is cleared exactly once, on
//! detach. After that, notification-style calls are silent no-ops (an
//! in-flight call may finish after its owner was torn down) while property
//! access fails with [`FilterError::HandleDetached`].

use std::sync::{Arc, Mutex, Weak};

use eyre::Result;
use serde_json::Value;
use tracing::debug;

use super::core::ContextInner;
use crate::controller::FilterController;
use crate::domain::{FilterKey, TypeDescriptor};
use crate::error::FilterError;
use crate::sync::lock;
use crate::value::FilterSource;

struct ValueHandleState {
    context: Weak<ContextInner>,
    value: Arc<dyn FilterSource>,
}

struct ValueHandleInner {
    id: u64,
    key: FilterKey,
    value_type: TypeDescriptor,
    state: Mutex<Option<ValueHandleState>>,
}

/// Handle returned when a filter value attaches
#[derive(Clone)]
pub struct ValueHandle {
    inner: Arc<ValueHandleInner>,
}

impl ValueHandle {
    pub(crate) fn new(id: u64, key: FilterKey, context: Weak<ContextInner>, value: Arc<dyn FilterSource>) -> Self {
        debug!(%key, id, "ValueHandle::new: called");
        let value_type = value.value_type();
        Self {
            inner: Arc::new(ValueHandleInner {
                id,
                key,
                value_type,
                state: Mutex::new(Some(ValueHandleState { context, value })),
            }),
        }
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn key(&self) -> &FilterKey {
        &self.inner.key
    }

    /// Element type the value published when it attached
    pub fn value_type(&self) -> &TypeDescriptor {
        &self.inner.value_type
    }

    pub fn is_attached(&self) -> bool {
        lock(&self.inner.state).is_some()
    }

    /// The attached value
    pub fn value(&self) -> Result<Arc<dyn FilterSource>, FilterError> {
        self.source().ok_or_else(|| self.detached())
    }

    /// Ask the context to reload; deferred to the batch end if a batch is open
    pub async fn reload_data(&self) -> Result<()> {
        let Some(context) = self.context() else {
            debug!(key = %self.inner.key, "ValueHandle::reload_data: detached, ignoring");
            return Ok(());
        };
        context.reload_data().await
    }

    /// Tell the context the value changed; fans out to the key's controllers
    pub async fn notify_value_updated(&self, value: Value) -> Result<(), FilterError> {
        let Some(context) = self.context() else {
            debug!(key = %self.inner.key, "ValueHandle::notify_value_updated: detached, ignoring");
            return Ok(());
        };
        context.notify_value_updated(&self.inner.key, value).await
    }

    /// Tell the context the value's state changed without a new value
    pub async fn notify_state_changed(&self) -> Result<(), FilterError> {
        let Some(context) = self.context() else {
            debug!(key = %self.inner.key, "ValueHandle::notify_state_changed: detached, ignoring");
            return Ok(());
        };
        context.notify_state_changed(&self.inner.key).await
    }

    /// Detach from the context; only the first call has any effect
    pub fn dispose(&self) {
        let Some(state) = lock(&self.inner.state).take() else {
            debug!(key = %self.inner.key, "ValueHandle::dispose: already detached");
            return;
        };
        if let Some(context) = state.context.upgrade() {
            context.detach_value(self);
        }
    }

    /// Clear the state without calling back into the context
    pub(crate) fn invalidate(&self) {
        lock(&self.inner.state).take();
    }

    pub(crate) fn source(&self) -> Option<Arc<dyn FilterSource>> {
        lock(&self.inner.state).as_ref().map(|s| s.value.clone())
    }

    fn context(&self) -> Option<Arc<ContextInner>> {
        lock(&self.inner.state).as_ref().and_then(|s| s.context.upgrade())
    }

    fn detached(&self) -> FilterError {
        FilterError::HandleDetached {
            key: self.inner.key.clone(),
        }
    }
}

impl std::fmt::Debug for ValueHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValueHandle")
            .field("id", &self.inner.id)
            .field("key", &self.inner.key)
            .field("attached", &self.is_attached())
            .finish()
    }
}

struct ControllerHandleState {
    context: Weak<ContextInner>,
    controller: Arc<dyn FilterController>,
}

struct ControllerHandleInner {
    id: u64,
    key: FilterKey,
    state: Mutex<Option<ControllerHandleState>>,
}

/// Handle returned when a filter controller attaches
#[derive(Clone)]
pub struct ControllerHandle {
    inner: Arc<ControllerHandleInner>,
}

impl ControllerHandle {
    pub(crate) fn new(
        id: u64,
        key: FilterKey,
        context: Weak<ContextInner>,
        controller: Arc<dyn FilterController>,
    ) -> Self {
        debug!(%key, id, "ControllerHandle::new: called");
        Self {
            inner: Arc::new(ControllerHandleInner {
                id,
                key,
                state: Mutex::new(Some(ControllerHandleState { context, controller })),
            }),
        }
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn key(&self) -> &FilterKey {
        &self.inner.key
    }

    pub fn is_attached(&self) -> bool {
        lock(&self.inner.state).is_some()
    }

    /// The controller this handle delivers to
    pub fn controller(&self) -> Result<Arc<dyn FilterController>, FilterError> {
        lock(&self.inner.state)
            .as_ref()
            .map(|s| s.controller.clone())
            .ok_or_else(|| self.detached())
    }

    /// The filter value currently attached under the controller's key
    ///
    /// Resolved through the context on every call, so a value reattached
    /// under the same key is picked up.
    pub fn value(&self) -> Result<Arc<dyn FilterSource>, FilterError> {
        let context = self.context().ok_or_else(|| self.detached())?;
        context
            .value_for(&self.inner.key)
            .ok_or_else(|| FilterError::MissingValue {
                key: self.inner.key.clone(),
            })
    }

    /// Current value of the targeted filter, `Null` when absent
    pub fn current_value(&self) -> Result<Value, FilterError> {
        Ok(self.value()?.current_value())
    }

    /// Ask the context to reload on behalf of the controller
    pub async fn reload_data(&self) -> Result<()> {
        let Some(context) = self.context() else {
            debug!(key = %self.inner.key, "ControllerHandle::reload_data: detached, ignoring");
            return Ok(());
        };
        context.reload_data().await
    }

    /// Detach from the context; only the first call has any effect
    pub fn dispose(&self) {
        let Some(state) = lock(&self.inner.state).take() else {
            debug!(key = %self.inner.key, "ControllerHandle::dispose: already detached");
            return;
        };
        if let Some(context) = state.context.upgrade() {
            context.detach_controller(self);
        }
    }

    /// Deliver a value update; false if the handle detached before delivery
    pub(crate) async fn deliver_value_updated(&self, value: &Value) -> bool {
        let Some(controller) = self.live_controller() else {
            return false;
        };
        controller.on_value_updated(value).await;
        true
    }

    /// Deliver a state change; false if the handle detached before delivery
    pub(crate) async fn deliver_state_changed(&self) -> bool {
        let Some(controller) = self.live_controller() else {
            return false;
        };
        controller.on_state_changed().await;
        true
    }

    fn live_controller(&self) -> Option<Arc<dyn FilterController>> {
        lock(&self.inner.state).as_ref().map(|s| s.controller.clone())
    }

    fn context(&self) -> Option<Arc<ContextInner>> {
        lock(&self.inner.state).as_ref().and_then(|s| s.context.upgrade())
    }

    fn detached(&self) -> FilterError {
        FilterError::HandleDetached {
            key: self.inner.key.clone(),
        }
    }
}

impl std::fmt::Debug for ControllerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControllerHandle")
            .field("id", &self.inner.id)
            .field("key", &self.inner.key)
            .field("attached", &self.is_attached())
            .finish()
    }
}
