//! FilterContext - shared filter state for independently-lifecycled UI elements
//!
//! Filter values (pieces of filter state) and filter controllers (the controls
//! driving them) never talk to each other directly. They attach to one
//! [`FilterContext`] per view and communicate through the handles it returns.
//!
//! # Core Concepts
//!
//! - **Handles Only**: a value or controller reaches its context only through its handle
//! - **One Signal**: initialisation publishes its completion signal before any work starts
//! - **Ordered Fan-out**: controllers hear about updates in attachment order
//! - **Coalesced Commits**: a batch turns N writes into one bulk write and at most one reload
//!
//! # Modules
//!
//! - [`context`] - The coordinator, its handles and initialisation signal
//! - [`value`] - Filter values and their update flags
//! - [`controller`] - Controller trait and a watch-channel controller
//! - [`persistence`] - Persistence trait, stores and the batching wrapper
//! - [`reload`] - Reload collaborator
//! - [`hot_reload`] - Development-time hot-reload subject
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod cli;
pub mod config;
pub mod context;
pub mod controller;
pub mod domain;
pub mod error;
pub mod hot_reload;
pub mod persistence;
pub mod reload;
pub mod value;

mod sync;

// Re-export commonly used types
pub use config::Config;
pub use context::{
    ControllerHandle, FilterContext, FilterContextConfig, FilterContextMetrics, InitPhase, InitSignal, ValueHandle,
};
pub use controller::{FilterController, WatchController};
pub use domain::{FilterKey, QueryRequest, TypeCompatibility, TypeDescriptor};
pub use error::FilterError;
pub use hot_reload::{HotReloadEvent, HotReloadListener, HotReloadWatcher, SubscriptionId};
pub use persistence::{BatchUpdateQueue, BatchingPersistence, JsonFileStore, MemoryStore, Persistence, WriteRecord};
pub use reload::{NoopReload, ReloadData};
pub use value::{FilterElement, FilterSource, FilterValue, FilterValueOptions, UpdateFlags, ValueState};
