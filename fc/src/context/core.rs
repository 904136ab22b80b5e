//! Main filter context implementation

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use eyre::Result;
use futures::future::join_all;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use super::config::FilterContextConfig;
use super::handle::{ControllerHandle, ValueHandle};
use super::metrics::{Counters, FilterContextMetrics};
use super::signal::{InitPhase, InitSignal, SignalResolver};
use crate::controller::FilterController;
use crate::domain::{FilterKey, QueryRequest, TypeCompatibility};
use crate::error::FilterError;
use crate::hot_reload::{HotReloadEvent, HotReloadListener, HotReloadWatcher, SubscriptionId};
use crate::persistence::{BatchingPersistence, Persistence};
use crate::reload::ReloadData;
use crate::sync::lock;
use crate::value::FilterSource;

/// Initialisation bookkeeping; always locked before the registry
struct InitTracker {
    phase: InitPhase,
    signal: Option<InitSignal>,
}

/// Attached values and controllers
#[derive(Default)]
struct Registry {
    next_id: u64,
    values: HashMap<FilterKey, ValueHandle>,
    /// Controllers per key, in attachment order
    controllers: HashMap<FilterKey, Vec<ControllerHandle>>,
}

impl Registry {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    /// Values in attachment order
    fn values_in_order(&self) -> Vec<ValueHandle> {
        let mut values: Vec<_> = self.values.values().cloned().collect();
        values.sort_by_key(|h| h.id());
        values
    }

    fn controller_count(&self) -> usize {
        self.controllers.values().map(|c| c.len()).sum()
    }
}

/// Shared state behind a [`FilterContext`]; handles hold it weakly
pub(crate) struct ContextInner {
    config: FilterContextConfig,
    persistence: Arc<BatchingPersistence>,
    reload: Arc<dyn ReloadData>,
    init: Mutex<InitTracker>,
    registry: Mutex<Registry>,
    live_reattach: AtomicBool,
    disposed: AtomicBool,
    hot_reload: Mutex<Option<(Arc<HotReloadWatcher>, SubscriptionId)>>,
    counters: Counters,
}

impl ContextInner {
    fn phase(&self) -> InitPhase {
        lock(&self.init).phase
    }

    pub(crate) fn attach_value(
        self: &Arc<Self>,
        key: FilterKey,
        value: Arc<dyn FilterSource>,
    ) -> Result<ValueHandle, FilterError> {
        debug!(%key, "attach_value: called");
        if key.is_empty() {
            return Err(FilterError::KeyEmpty);
        }

        let init = lock(&self.init);
        let reattach = self.live_reattach.load(Ordering::SeqCst);
        if init.phase.has_started() && !reattach {
            return Err(FilterError::lifecycle("attach a filter value", init.phase));
        }

        let mut registry = lock(&self.registry);
        if registry.values.contains_key(&key) {
            if !reattach {
                return Err(FilterError::DuplicateAttachment { key });
            }
            if let Some(evicted) = registry.values.remove(&key) {
                warn!(%key, evicted_id = evicted.id(), "attach_value: live reattach evicting previous value");
                evicted.invalidate();
            }
        }

        let id = registry.next_id();
        let handle = ValueHandle::new(id, key.clone(), Arc::downgrade(self), value.clone());
        registry.values.insert(key.clone(), handle.clone());
        info!(%key, id, value_type = %handle.value_type(), "Filter value attached");

        let late = init.phase.has_started();
        drop(registry);
        drop(init);

        value.attached(&handle);
        // initialise() only drives the values present when it started
        if late {
            self.spawn_late_init(key, value);
        }
        Ok(handle)
    }

    fn spawn_late_init(&self, key: FilterKey, value: Arc<dyn FilterSource>) {
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                debug!(%key, "spawn_late_init: initialising reattached value");
                runtime.spawn(async move {
                    if let Err(e) = value.ensure_initialised().await {
                        error!(%key, error = %format!("{:#}", e), "Reattached filter value failed to initialise");
                    }
                });
            }
            Err(_) => {
                error!(%key, "spawn_late_init: no tokio runtime, reattached value stays uninitialised");
            }
        }
    }

    /// The live value attached under `key`
    pub(crate) fn value_for(&self, key: &FilterKey) -> Option<Arc<dyn FilterSource>> {
        lock(&self.registry).values.get(key).and_then(|h| h.source())
    }

    pub(crate) fn detach_value(&self, handle: &ValueHandle) {
        let key = handle.key();
        let mut registry = lock(&self.registry);
        match registry.values.get(key) {
            Some(current) if current.id() == handle.id() => {
                registry.values.remove(key);
                info!(%key, id = handle.id(), "Filter value detached");
            }
            Some(_) => debug!(%key, id = handle.id(), "detach_value: key owned by a newer value, ignoring"),
            None => debug!(%key, id = handle.id(), "detach_value: key already gone, ignoring"),
        }
    }

    pub(crate) fn attach_controller(
        self: &Arc<Self>,
        key: FilterKey,
        controller: Arc<dyn FilterController>,
    ) -> Result<ControllerHandle, FilterError> {
        debug!(%key, "attach_controller: called");
        if key.is_empty() {
            return Err(FilterError::KeyEmpty);
        }

        let mut registry = lock(&self.registry);
        let Some(value_handle) = registry.values.get(&key) else {
            return Err(FilterError::MissingValue { key });
        };

        let value_type = value_handle.value_type().clone();
        let expected = controller.value_type();
        match value_type.compatibility(&expected) {
            TypeCompatibility::Compatible => {}
            TypeCompatibility::NullabilityOnly => {
                return Err(FilterError::NullabilityMismatch {
                    key,
                    value: value_type,
                    controller: expected,
                });
            }
            TypeCompatibility::Incompatible => {
                return Err(FilterError::TypeMismatch {
                    key,
                    value: value_type,
                    controller: expected,
                });
            }
        }

        let id = registry.next_id();
        let handle = ControllerHandle::new(id, key.clone(), Arc::downgrade(self), controller);
        registry.controllers.entry(key.clone()).or_default().push(handle.clone());
        info!(%key, id, "Filter controller attached");
        Ok(handle)
    }

    pub(crate) fn detach_controller(&self, handle: &ControllerHandle) {
        let key = handle.key();
        let mut registry = lock(&self.registry);
        let Some(handles) = registry.controllers.get_mut(key) else {
            error!(%key, id = handle.id(), "detach_controller: no controllers registered for key");
            debug_assert!(false, "controller set for '{}' missing on detach", key);
            return;
        };

        match handles.iter().position(|h| h.id() == handle.id()) {
            Some(pos) => {
                handles.remove(pos);
                if handles.is_empty() {
                    registry.controllers.remove(key);
                }
                info!(%key, id = handle.id(), "Filter controller detached");
            }
            None => {
                error!(%key, id = handle.id(), "detach_controller: handle missing from its key's set");
                debug_assert!(false, "controller {} missing from set for '{}'", handle.id(), key);
            }
        }
    }

    fn controllers_for(&self, operation: &'static str, key: &FilterKey) -> Result<Vec<ControllerHandle>, FilterError> {
        let phase = self.phase();
        if !phase.has_started() {
            return Err(FilterError::lifecycle(operation, phase));
        }
        if key.is_empty() {
            return Err(FilterError::KeyEmpty);
        }
        Ok(lock(&self.registry).controllers.get(key).cloned().unwrap_or_default())
    }

    pub(crate) async fn notify_value_updated(&self, key: &FilterKey, value: Value) -> Result<(), FilterError> {
        let controllers = self.controllers_for("notify controllers of a value update", key)?;
        debug!(%key, count = controllers.len(), "notify_value_updated: dispatching");

        let mut delivered = 0;
        for controller in &controllers {
            if controller.deliver_value_updated(&value).await {
                delivered += 1;
            }
        }
        Counters::add(&self.counters.notifications_dispatched, delivered);
        Ok(())
    }

    pub(crate) async fn notify_state_changed(&self, key: &FilterKey) -> Result<(), FilterError> {
        let controllers = self.controllers_for("notify controllers of a state change", key)?;
        debug!(%key, count = controllers.len(), "notify_state_changed: dispatching");

        let mut delivered = 0;
        for controller in &controllers {
            if controller.deliver_state_changed().await {
                delivered += 1;
            }
        }
        Counters::add(&self.counters.notifications_dispatched, delivered);
        Ok(())
    }

    pub(crate) async fn reload_data(&self) -> Result<()> {
        if self.persistence.request_reload() {
            debug!("reload_data: batch open, deferring reload");
            Counters::bump(&self.counters.reloads_deferred);
            return Ok(());
        }

        debug!("reload_data: reloading now");
        Counters::bump(&self.counters.reloads_triggered);
        self.reload.reload().await
    }

    fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some((watcher, id)) = lock(&self.hot_reload).take() {
            watcher.unsubscribe(id);
        }
        info!("Filter context disposed");
    }
}

impl HotReloadListener for ContextInner {
    fn on_hot_reload(&self, event: HotReloadEvent) {
        if self.disposed.load(Ordering::SeqCst) {
            debug!(%event, "on_hot_reload: context disposed, ignoring");
            return;
        }
        match event {
            HotReloadEvent::ClearCache => debug!("on_hot_reload: nothing cached, ignoring clear-cache"),
            HotReloadEvent::UpdateApplication => {
                info!("Application updated, live reattachment of filter values enabled");
                self.live_reattach.store(true, Ordering::SeqCst);
            }
        }
    }
}

/// Per-view coordinator for filter values and the controllers driving them
///
/// Values attach before initialisation; controllers may attach at any time
/// once their value exists. Dropping the context disposes it.
pub struct FilterContext {
    inner: Arc<ContextInner>,
}

impl FilterContext {
    /// Create a new context over a persistence store and a reload collaborator
    pub fn new(config: FilterContextConfig, persistence: Arc<dyn Persistence>, reload: Arc<dyn ReloadData>) -> Self {
        debug!(?config, "FilterContext::new: called");
        let live_reattach = config.allow_live_reattach;
        Self {
            inner: Arc::new(ContextInner {
                config,
                persistence: Arc::new(BatchingPersistence::new(persistence)),
                reload,
                init: Mutex::new(InitTracker {
                    phase: InitPhase::NotStarted,
                    signal: None,
                }),
                registry: Mutex::new(Registry::default()),
                live_reattach: AtomicBool::new(live_reattach),
                disposed: AtomicBool::new(false),
                hot_reload: Mutex::new(None),
                counters: Counters::default(),
            }),
        }
    }

    /// Create a new context subscribed to a hot-reload watcher
    pub fn with_hot_reload(
        config: FilterContextConfig,
        persistence: Arc<dyn Persistence>,
        reload: Arc<dyn ReloadData>,
        watcher: Arc<HotReloadWatcher>,
    ) -> Self {
        let context = Self::new(config, persistence, reload);
        let listener: Weak<ContextInner> = Arc::downgrade(&context.inner);
        let id = watcher.subscribe(listener);
        *lock(&context.inner.hot_reload) = Some((watcher, id));
        context
    }

    pub fn config(&self) -> &FilterContextConfig {
        &self.inner.config
    }

    /// Persistence view for filter values; writes are batched while a batch is open
    pub fn persistence(&self) -> Arc<dyn Persistence> {
        self.inner.persistence.clone()
    }

    pub fn phase(&self) -> InitPhase {
        self.inner.phase()
    }

    pub fn is_initialised(&self) -> bool {
        self.phase() == InitPhase::Completed
    }

    pub fn is_faulted(&self) -> bool {
        self.phase() == InitPhase::Faulted
    }

    pub fn is_batching(&self) -> bool {
        self.inner.persistence.is_batching()
    }

    /// True once live reattachment of values is permitted
    pub fn live_reattach_enabled(&self) -> bool {
        self.inner.live_reattach.load(Ordering::SeqCst)
    }

    pub fn attach_value(&self, key: impl Into<FilterKey>, value: Arc<dyn FilterSource>) -> Result<ValueHandle, FilterError> {
        self.inner.attach_value(key.into(), value)
    }

    pub fn detach_value(&self, handle: &ValueHandle) {
        self.inner.detach_value(handle)
    }

    pub fn attach_controller(
        &self,
        key: impl Into<FilterKey>,
        controller: Arc<dyn FilterController>,
    ) -> Result<ControllerHandle, FilterError> {
        self.inner.attach_controller(key.into(), controller)
    }

    pub fn detach_controller(&self, handle: &ControllerHandle) {
        self.inner.detach_controller(handle)
    }

    /// Initialise every attached value
    ///
    /// The completion signal is published before any value starts, then the
    /// values initialise concurrently. One failure faults the whole context
    /// but does not cancel the others.
    pub async fn initialise(&self) -> Result<(), FilterError> {
        let (guard, values) = {
            let mut init = lock(&self.inner.init);
            if init.phase.has_started() {
                return Err(FilterError::lifecycle("initialise", init.phase));
            }
            let (resolver, signal) = InitSignal::pending();
            init.signal = Some(signal);
            init.phase = InitPhase::Initializing;
            let values = lock(&self.inner.registry).values_in_order();
            (InitGuard::new(&self.inner, resolver), values)
        };

        info!(count = values.len(), "Initialising filter context");
        let results = join_all(values.iter().map(|handle| async move {
            let outcome = match handle.source() {
                Some(value) => value.ensure_initialised().await,
                None => Ok(()),
            };
            (handle.key().clone(), outcome)
        }))
        .await;

        let failures: Vec<String> = results
            .into_iter()
            .filter_map(|(key, outcome)| outcome.err().map(|e| format!("{}: {:#}", key, e)))
            .collect();

        let outcome = if failures.is_empty() {
            info!("Filter context initialised");
            Ok(())
        } else {
            for failure in &failures {
                error!(%failure, "Filter value failed to initialise");
            }
            Err(FilterError::Faulted {
                reason: failures.join("; "),
            })
        };

        guard.finish(&outcome);
        outcome
    }

    /// The signal published by [`initialise`](Self::initialise)
    pub fn wait_for_initialised(&self) -> Result<InitSignal, FilterError> {
        let init = lock(&self.inner.init);
        match &init.signal {
            Some(signal) => Ok(signal.clone()),
            None => Err(FilterError::lifecycle("wait for initialisation", init.phase)),
        }
    }

    pub async fn notify_value_updated(&self, key: impl Into<FilterKey>, value: Value) -> Result<(), FilterError> {
        self.inner.notify_value_updated(&key.into(), value).await
    }

    pub async fn notify_state_changed(&self, key: impl Into<FilterKey>) -> Result<(), FilterError> {
        self.inner.notify_state_changed(&key.into()).await
    }

    /// Let every attached value write its fields into the outbound request
    pub fn configure_request(&self, request: &mut QueryRequest) -> Result<(), FilterError> {
        let values = {
            let init = lock(&self.inner.init);
            match init.phase {
                InitPhase::Completed => {}
                InitPhase::Faulted => {
                    return Err(FilterError::Faulted {
                        reason: "cannot configure a request on a faulted context".to_string(),
                    });
                }
                phase => return Err(FilterError::lifecycle("configure a request", phase)),
            }
            lock(&self.inner.registry).values_in_order()
        };

        debug!(count = values.len(), "configure_request: configuring");
        for value in values.iter().filter_map(|h| h.source()) {
            value.configure_request(request);
        }
        Ok(())
    }

    /// Reload now, or once at the end of the open batch
    pub async fn reload_data(&self) -> Result<()> {
        self.inner.reload_data().await
    }

    /// Run `action` with persistence writes and reloads batched
    ///
    /// If the action succeeds, its writes land as one bulk write followed by
    /// at most one reload. If it fails, the batch is discarded.
    pub async fn batch_update_values<F, Fut>(&self, action: F) -> Result<()>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        if !self.inner.persistence.begin() {
            return Err(FilterError::lifecycle("open a batch", "already batching").into());
        }
        debug!("batch_update_values: batch opened");

        let guard = BatchGuard(&self.inner.persistence);
        let outcome = action().await;
        let queue = guard.close();

        match (outcome, queue) {
            (Err(e), _) => {
                warn!(error = %e, "Batch action failed, discarding queued updates");
                Counters::bump(&self.inner.counters.batches_discarded);
                Err(e)
            }
            (Ok(()), Some(mut queue)) => {
                let writes = queue.pending_writes().len();
                let reload = queue.reload_requested();
                info!(writes, reload, "Flushing filter batch");
                if reload {
                    Counters::bump(&self.inner.counters.reloads_triggered);
                }
                Counters::bump(&self.inner.counters.batches_flushed);
                queue
                    .flush(self.inner.persistence.inner().as_ref(), self.inner.reload.as_ref())
                    .await
            }
            (Ok(()), None) => {
                error!("batch_update_values: batch closed by someone else");
                debug_assert!(false, "batch closed while its action was running");
                Ok(())
            }
        }
    }

    pub fn value_count(&self) -> usize {
        lock(&self.inner.registry).values.len()
    }

    pub fn controller_count(&self, key: &FilterKey) -> usize {
        lock(&self.inner.registry).controllers.get(key).map_or(0, |c| c.len())
    }

    /// Keys of attached values, in attachment order
    pub fn keys(&self) -> Vec<FilterKey> {
        lock(&self.inner.registry)
            .values_in_order()
            .into_iter()
            .map(|h| h.key().clone())
            .collect()
    }

    pub fn metrics(&self) -> FilterContextMetrics {
        let (values, controllers) = {
            let registry = lock(&self.inner.registry);
            (registry.values.len(), registry.controller_count())
        };
        self.inner.counters.snapshot(values, controllers)
    }

    /// Unsubscribe from the hot-reload watcher; also runs on drop
    pub fn dispose(&self) {
        self.inner.dispose()
    }
}

impl Drop for FilterContext {
    fn drop(&mut self) {
        self.inner.dispose();
    }
}

/// Settles initialisation; faults the context if `initialise` is dropped mid-flight
struct InitGuard<'a> {
    inner: &'a ContextInner,
    resolver: Option<SignalResolver>,
}

impl<'a> InitGuard<'a> {
    fn new(inner: &'a ContextInner, resolver: SignalResolver) -> Self {
        Self {
            inner,
            resolver: Some(resolver),
        }
    }

    fn finish(mut self, outcome: &Result<(), FilterError>) {
        let phase = if outcome.is_ok() {
            InitPhase::Completed
        } else {
            InitPhase::Faulted
        };
        self.settle(phase, outcome);
    }

    fn settle(&mut self, phase: InitPhase, outcome: &Result<(), FilterError>) {
        let Some(resolver) = self.resolver.take() else {
            return;
        };
        lock(&self.inner.init).phase = phase;
        resolver.settle(outcome);
    }
}

impl Drop for InitGuard<'_> {
    fn drop(&mut self) {
        if self.resolver.is_some() {
            warn!("InitGuard::drop: initialisation abandoned before it finished, faulting context");
            let outcome = Err(FilterError::Faulted {
                reason: "initialisation was abandoned before it finished".to_string(),
            });
            self.settle(InitPhase::Faulted, &outcome);
        }
    }
}

/// Closes the batch even if the action future is dropped mid-flight
struct BatchGuard<'a>(&'a BatchingPersistence);

impl BatchGuard<'_> {
    fn close(self) -> Option<crate::persistence::BatchUpdateQueue> {
        self.0.take()
    }
}

impl Drop for BatchGuard<'_> {
    fn drop(&mut self) {
        if self.0.take().is_some() {
            debug!("BatchGuard::drop: discarding unfinished batch");
        }
    }
}
