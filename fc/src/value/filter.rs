//! Typed filter value

use std::sync::{Arc, Mutex, OnceLock};

use async_trait::async_trait;
use eyre::{Context, Result};
use serde_json::Value;
use tokio::sync::OnceCell;
use tracing::{debug, error, warn};

use super::{FilterElement, FilterSource, UpdateFlags};
use crate::context::{FilterContext, ValueHandle};
use crate::domain::{FilterKey, QueryRequest, TypeDescriptor};
use crate::error::FilterError;
use crate::persistence::Persistence;
use crate::sync::lock;

/// Lifecycle of a single filter value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueState {
    Created,
    Attached,
    Initializing,
    Ready,
    Detached,
}

impl std::fmt::Display for ValueState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "Created"),
            Self::Attached => write!(f, "Attached"),
            Self::Initializing => write!(f, "Initializing"),
            Self::Ready => write!(f, "Ready"),
            Self::Detached => write!(f, "Detached"),
        }
    }
}

/// How a filter value keys, persists and defaults itself
#[derive(Debug, Clone)]
pub struct FilterValueOptions<T> {
    key: FilterKey,
    default: Option<T>,
    persist: bool,
    persistence_key: Option<String>,
    nullable: Option<bool>,
}

impl<T> FilterValueOptions<T> {
    /// Persisted under the context's prefix, no default, nullable
    pub fn new(key: impl Into<FilterKey>) -> Self {
        Self {
            key: key.into(),
            default: None,
            persist: true,
            persistence_key: None,
            nullable: None,
        }
    }

    pub fn default_value(mut self, value: T) -> Self {
        self.default = Some(value);
        self
    }

    /// Turn persistence on or off
    pub fn persisted(mut self, persist: bool) -> Self {
        self.persist = persist;
        self
    }

    /// Persist under an explicit key instead of the prefixed filter key
    ///
    /// Only takes effect while persistence is on; `persisted(false)` wins
    /// regardless of call order.
    pub fn persistence_key(mut self, key: impl Into<String>) -> Self {
        self.persistence_key = Some(key.into());
        self
    }

    /// Override nullability; by default a value without a default is nullable
    pub fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = Some(nullable);
        self
    }
}

/// A typed piece of filter state attached to a context
pub struct FilterValue<T> {
    key: FilterKey,
    persistence_key: Option<String>,
    default: Option<T>,
    value_type: TypeDescriptor,
    current: Mutex<Option<T>>,
    state: Mutex<ValueState>,
    persistence: Arc<dyn Persistence>,
    handle: OnceLock<ValueHandle>,
    init: OnceCell<()>,
}

impl<T: FilterElement> FilterValue<T> {
    /// Create a value and attach it to the context
    pub fn attach(context: &FilterContext, options: FilterValueOptions<T>) -> Result<Arc<Self>, FilterError> {
        let FilterValueOptions {
            key,
            default,
            persist,
            persistence_key,
            nullable,
        } = options;
        debug!(%key, persist, "FilterValue::attach: called");

        let persistence_key = persist.then(|| persistence_key.unwrap_or_else(|| context.config().persistence_key(key.as_str())));
        let value_type = TypeDescriptor::of::<T>();
        let nullable = value_type.is_nullable() || nullable.unwrap_or(default.is_none());

        let value = Arc::new(Self {
            key: key.clone(),
            persistence_key,
            default,
            value_type: value_type.with_nullable(nullable),
            current: Mutex::new(None),
            state: Mutex::new(ValueState::Created),
            persistence: context.persistence(),
            handle: OnceLock::new(),
            init: OnceCell::new(),
        });

        let source: Arc<dyn FilterSource> = value.clone();
        context.attach_value(key, source)?;
        Ok(value)
    }

    pub fn key(&self) -> &FilterKey {
        &self.key
    }

    pub fn persistence_key(&self) -> Option<&str> {
        self.persistence_key.as_deref()
    }

    pub fn default_value(&self) -> Option<&T> {
        self.default.as_ref()
    }

    pub fn state(&self) -> ValueState {
        *lock(&self.state)
    }

    pub fn handle(&self) -> Option<&ValueHandle> {
        self.handle.get()
    }

    /// Current value
    pub fn get(&self) -> Option<T> {
        lock(&self.current).clone()
    }

    /// Load the persisted value, or fall back to the default
    ///
    /// Runs once; later calls wait for the first. The initial assignment
    /// never notifies, reloads or persists.
    pub async fn initialise(&self) -> Result<()> {
        self.init.get_or_try_init(|| self.load()).await?;
        Ok(())
    }

    async fn load(&self) -> Result<()> {
        debug!(key = %self.key, "FilterValue::load: called");
        self.set_state(ValueState::Initializing);

        let initial = match &self.persistence_key {
            Some(persistence_key) => {
                let stored = self
                    .persistence
                    .get(persistence_key)
                    .await
                    .context(format!("Failed to load persisted filter '{}'", self.key))?;
                match stored {
                    None => {
                        debug!(key = %self.key, "FilterValue::load: nothing persisted, using default");
                        self.default.clone()
                    }
                    Some(Value::Null) => None,
                    Some(stored) => match serde_json::from_value::<T>(stored) {
                        Ok(value) => Some(value),
                        Err(e) => {
                            warn!(key = %self.key, error = %e, "Persisted filter value could not be decoded, using default");
                            self.default.clone()
                        }
                    },
                }
            }
            None => self.default.clone(),
        };

        *lock(&self.current) = initial;
        self.set_state(ValueState::Ready);
        Ok(())
    }

    /// Update with the default behaviour: set, persist, notify and reload
    pub async fn update(&self, value: Option<T>) -> Result<()> {
        self.set_value(value, UpdateFlags::default()).await
    }

    /// Update with an explicit set of side effects
    ///
    /// Effects run in order: set, persist, notify, reload.
    pub async fn set_value(&self, value: Option<T>, flags: UpdateFlags) -> Result<()> {
        debug!(key = %self.key, ?flags, "FilterValue::set_value: called");
        let encoded = serde_json::to_value(&value).context(format!("Failed to encode filter '{}'", self.key))?;

        if flags.contains(UpdateFlags::SET_VALUE) {
            *lock(&self.current) = value;
        }

        if flags.contains(UpdateFlags::PERSIST_VALUE)
            && let Some(persistence_key) = &self.persistence_key
        {
            self.persistence
                .set(persistence_key, encoded.clone())
                .await
                .context(format!("Failed to persist filter '{}'", self.key))?;
        }

        if flags.contains(UpdateFlags::NOTIFY_CONTEXT)
            && let Some(handle) = self.handle()
        {
            handle.notify_value_updated(encoded).await?;
        }

        if flags.contains(UpdateFlags::RELOAD_DATA)
            && let Some(handle) = self.handle()
        {
            handle.reload_data().await?;
        }

        Ok(())
    }

    /// Return to the default value with the given side effects
    pub async fn reset(&self, flags: UpdateFlags) -> Result<()> {
        self.set_value(self.default.clone(), flags).await
    }

    /// Tell controllers the value's state changed without a new value
    pub async fn notify_state_changed(&self) -> Result<(), FilterError> {
        match self.handle() {
            Some(handle) => handle.notify_state_changed().await,
            None => Ok(()),
        }
    }

    /// Detach from the context
    pub fn dispose(&self) {
        if let Some(handle) = self.handle() {
            handle.dispose();
        }
        self.set_state(ValueState::Detached);
    }

    fn set_state(&self, state: ValueState) {
        let mut current = lock(&self.state);
        if *current == ValueState::Detached {
            return;
        }
        debug!(key = %self.key, from = %*current, to = %state, "FilterValue::set_state: transition");
        *current = state;
    }
}

#[async_trait]
impl<T: FilterElement> FilterSource for FilterValue<T> {
    fn value_type(&self) -> TypeDescriptor {
        self.value_type.clone()
    }

    fn current_value(&self) -> Value {
        let current = lock(&self.current).clone();
        serde_json::to_value(current).unwrap_or_else(|e| {
            warn!(key = %self.key, error = %e, "Filter value could not be encoded");
            Value::Null
        })
    }

    async fn ensure_initialised(&self) -> Result<()> {
        self.initialise().await?;
        // Initial assignment is silent, but controllers may already be attached
        if let Some(handle) = self.handle() {
            handle.notify_value_updated(self.current_value()).await?;
        }
        Ok(())
    }

    fn attached(&self, handle: &ValueHandle) {
        if self.handle.set(handle.clone()).is_err() {
            error!(key = %self.key, "FilterValue::attached: value is already attached");
            debug_assert!(false, "filter value '{}' attached twice", self.key);
            return;
        }
        self.set_state(ValueState::Attached);
    }

    fn configure_request(&self, request: &mut QueryRequest) {
        let Some(current) = self.get() else {
            return;
        };
        match serde_json::to_value(current) {
            Ok(value) => {
                request.set(self.key.as_str(), value);
            }
            Err(e) => warn!(key = %self.key, error = %e, "Filter value could not be written to the request"),
        }
    }
}

impl<T> std::fmt::Debug for FilterValue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilterValue")
            .field("key", &self.key)
            .field("persistence_key", &self.persistence_key)
            .field("value_type", &self.value_type)
            .finish()
    }
}
