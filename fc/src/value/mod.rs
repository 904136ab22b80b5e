//! Filter values
//!
//! A filter value owns one piece of filter state. It attaches to its context
//! once, when it is created, and is driven through initialisation by the
//! context. [`FilterSource`] is the type-erased face the context sees;
//! [`FilterValue`] is the typed implementation hosts use.

mod filter;
mod flags;

use async_trait::async_trait;
use eyre::Result;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::context::ValueHandle;
use crate::domain::{QueryRequest, TypeDescriptor};

pub use filter::{FilterValue, FilterValueOptions, ValueState};
pub use flags::UpdateFlags;

/// Element types a [`FilterValue`] can hold
pub trait FilterElement: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

impl<T> FilterElement for T where T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

/// What the context needs from an attached filter value
#[async_trait]
pub trait FilterSource: Send + Sync {
    /// Descriptor controllers are checked against when they attach
    fn value_type(&self) -> TypeDescriptor;

    /// Current value, `Null` when absent
    fn current_value(&self) -> Value;

    /// Finish initialising, then report the current value to the context
    async fn ensure_initialised(&self) -> Result<()>;

    /// Write this value's fields into the outbound request
    fn configure_request(&self, request: &mut QueryRequest);

    /// Called once the context has registered the value, before any initialisation
    fn attached(&self, _handle: &ValueHandle) {}
}
