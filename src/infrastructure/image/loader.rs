//! Async image loading pipeline for recycled display slots.
//!
//! Resolution order is memory -> disk -> image source. A memory hit is
//! applied synchronously; everything else runs on a bounded pool of
//! background tasks and comes back through a completion queue drained on
//! the UI thread.
//!
//! Each slot has at most one bound [`LoadTask`]. A completion is only
//! applied if its task is still the slot's binding, so late results for a
//! slot that has since been reassigned are dropped. Slots are held weakly
//! and looked up by [`SlotId`]; the pipeline never keeps a slot alive.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::runtime::Handle;
use tokio::sync::{Semaphore, mpsc};
use tracing::{debug, info, trace, warn};

use crate::domain::entities::{CacheKey, ImageSource, LoadedImage, SharedImage, SlotId};
use crate::domain::errors::{CacheError, CacheResult};
use crate::domain::ports::{DisplaySlot, ImageSourcePort, Transition};
use crate::infrastructure::config::PipelineConfig;

use super::image_cache::ImageCache;

/// Runtime switches shared by the pipeline and its in-flight tasks.
///
/// Every flag may be flipped at any time; tasks only read them.
#[derive(Debug)]
pub struct PipelineSettings {
    exit_early: AtomicBool,
    always_revalidate: AtomicBool,
    fade_in: AtomicBool,
    fade_in_ms: AtomicU64,
    placeholder: RwLock<Option<SharedImage>>,
}

impl PipelineSettings {
    fn from_config(config: &PipelineConfig) -> Self {
        Self {
            exit_early: AtomicBool::new(false),
            always_revalidate: AtomicBool::new(config.always_revalidate),
            fade_in: AtomicBool::new(config.fade_in),
            fade_in_ms: AtomicU64::new(config.fade_in_ms),
            placeholder: RwLock::new(None),
        }
    }

    /// Whether in-flight and new tasks should give up.
    pub fn exit_early(&self) -> bool {
        self.exit_early.load(Ordering::Relaxed)
    }

    /// Whether cache hits are followed by a forced refetch.
    pub fn always_revalidate(&self) -> bool {
        self.always_revalidate.load(Ordering::Relaxed)
    }

    /// The placeholder shown while loading.
    pub fn placeholder(&self) -> Option<SharedImage> {
        self.placeholder.read().clone()
    }

    /// Transition used when a background result is applied.
    pub fn transition(&self) -> Transition {
        if self.fade_in.load(Ordering::Relaxed) {
            Transition::CrossFade {
                duration: Duration::from_millis(self.fade_in_ms.load(Ordering::Relaxed)),
                underlay: self.placeholder(),
            }
        } else {
            Transition::Immediate
        }
    }
}

/// One unit of background work resolving one key for one slot.
#[derive(Debug)]
pub struct LoadTask {
    id: u64,
    key: CacheKey,
    slot_id: SlotId,
    slot: Weak<dyn DisplaySlot>,
    force_fetch: bool,
    cancelled: AtomicBool,
}

impl LoadTask {
    /// Key being resolved.
    #[must_use]
    pub const fn key(&self) -> &CacheKey {
        &self.key
    }

    /// True for revalidation tasks.
    #[must_use]
    pub const fn is_revalidation(&self) -> bool {
        self.force_fetch
    }

    /// True once superseded or cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::AcqRel) {
            trace!(task = self.id, key = %self.key, "Cancelled load task");
        }
    }

    fn slot(&self) -> Option<Arc<dyn DisplaySlot>> {
        self.slot.upgrade()
    }
}

/// What `load_into` did synchronously.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadDispatch {
    /// The memory tier had the image and it was applied.
    Applied,
    /// A background task was started and the placeholder shown.
    Started,
    /// The slot already has a task in flight for the same key.
    AlreadyPending,
}

/// Final state of a background task.
#[derive(Debug, Clone)]
pub enum LoadStatus {
    /// The image was applied to the slot.
    Applied(ImageSource),
    /// A revalidation found the displayed content current.
    Unchanged,
    /// The task was superseded, cancelled or its slot is gone.
    Abandoned,
    /// No image was produced; the slot keeps its placeholder.
    Failed(CacheError),
}

/// Outcome of one completion, reported to whoever drains the queue.
#[derive(Debug, Clone)]
pub struct LoadOutcome {
    /// Target slot.
    pub slot: SlotId,
    /// Requested key.
    pub key: CacheKey,
    /// True if this was a revalidation pass.
    pub revalidation: bool,
    /// What happened.
    pub status: LoadStatus,
}

struct Completion {
    task: Arc<LoadTask>,
    /// `None` if the task gave up before producing anything.
    result: Option<CacheResult<LoadedImage>>,
}

struct Shared {
    cache: Arc<ImageCache>,
    source: Arc<dyn ImageSourcePort>,
    settings: PipelineSettings,
    bindings: Mutex<HashMap<SlotId, Arc<LoadTask>>>,
    workers: Arc<Semaphore>,
    completion_tx: mpsc::UnboundedSender<Completion>,
    next_task_id: AtomicU64,
    runtime: Handle,
}

impl Shared {
    fn new_task(
        &self,
        slot_id: SlotId,
        slot: Weak<dyn DisplaySlot>,
        key: CacheKey,
        force_fetch: bool,
    ) -> Arc<LoadTask> {
        Arc::new(LoadTask {
            id: self.next_task_id.fetch_add(1, Ordering::Relaxed),
            key,
            slot_id,
            slot,
            force_fetch,
            cancelled: AtomicBool::new(false),
        })
    }

    fn is_bound(&self, task: &Arc<LoadTask>) -> bool {
        self.bindings
            .lock()
            .get(&task.slot_id)
            .is_some_and(|bound| Arc::ptr_eq(bound, task))
    }

    fn should_abandon(&self, task: &Arc<LoadTask>) -> bool {
        task.is_cancelled()
            || self.settings.exit_early()
            || task.slot.strong_count() == 0
            || !self.is_bound(task)
    }

    fn spawn(self: &Arc<Self>, task: Arc<LoadTask>) {
        let shared = self.clone();
        self.runtime.spawn(async move {
            let result = shared.resolve(&task).await;
            if shared.completion_tx.send(Completion { task, result }).is_err() {
                trace!("Completion queue closed");
            }
        });
    }

    /// Binds a revalidation task to the slot without touching its content.
    fn start_revalidation(self: &Arc<Self>, slot_id: SlotId, slot: Weak<dyn DisplaySlot>, key: CacheKey) {
        let task = self.new_task(slot_id, slot, key, true);
        if let Some(old) = self.bindings.lock().insert(slot_id, task.clone()) {
            old.cancel();
        }
        debug!(key = %task.key, slot = %slot_id, "Starting revalidation");
        self.spawn(task);
    }

    async fn resolve(&self, task: &Arc<LoadTask>) -> Option<CacheResult<LoadedImage>> {
        let Ok(_permit) = self.workers.clone().acquire_owned().await else {
            return None;
        };

        if self.should_abandon(task) {
            trace!(key = %task.key, "Abandoning before disk lookup");
            return None;
        }

        if !task.force_fetch {
            match self.cache.get_from_disk(&task.key).await {
                Ok(Some(image)) => {
                    self.cache.add_to_cache(&task.key, &image).await;
                    return Some(Ok(LoadedImage {
                        key: task.key.clone(),
                        image,
                        source: ImageSource::DiskCache,
                        unchanged: false,
                    }));
                }
                Ok(None) => {}
                Err(e) => debug!(key = %task.key, error = %e, "Disk tier entry unusable"),
            }

            if self.should_abandon(task) {
                trace!(key = %task.key, "Abandoning before processing");
                return None;
            }
        }

        let result = self.source.process(&task.key, task.force_fetch).await;

        // Results are cached even if the task was superseded meanwhile.
        if let Ok(loaded) = &result {
            if task.force_fetch && !loaded.unchanged {
                self.cache.replace_in_cache(&task.key, &loaded.image).await;
            } else {
                self.cache.add_to_cache(&task.key, &loaded.image).await;
            }
        }

        Some(result)
    }
}

/// Loads images into display slots.
pub struct LoadPipeline {
    shared: Arc<Shared>,
    completion_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Completion>>,
}

impl std::fmt::Debug for LoadPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadPipeline")
            .field("settings", &self.shared.settings)
            .field("pending", &self.pending_count())
            .finish_non_exhaustive()
    }
}

impl LoadPipeline {
    /// Creates a pipeline bound to the current tokio runtime.
    ///
    /// # Errors
    /// Returns `CacheError::RuntimeUnavailable` outside a tokio runtime.
    pub fn new(
        cache: Arc<ImageCache>,
        source: Arc<dyn ImageSourcePort>,
        config: &PipelineConfig,
    ) -> CacheResult<Self> {
        let runtime = Handle::try_current()
            .map_err(|e| CacheError::RuntimeUnavailable(e.to_string()))?;
        Ok(Self::with_runtime(cache, source, config, runtime))
    }

    /// Creates a pipeline spawning background work on `runtime`.
    #[must_use]
    pub fn with_runtime(
        cache: Arc<ImageCache>,
        source: Arc<dyn ImageSourcePort>,
        config: &PipelineConfig,
        runtime: Handle,
    ) -> Self {
        let (completion_tx, completion_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            cache,
            source,
            settings: PipelineSettings::from_config(config),
            bindings: Mutex::new(HashMap::new()),
            workers: Arc::new(Semaphore::new(config.max_concurrent_loads.max(1))),
            completion_tx,
            next_task_id: AtomicU64::new(1),
            runtime,
        });
        Self {
            shared,
            completion_rx: tokio::sync::Mutex::new(completion_rx),
        }
    }

    /// The cache this pipeline reads and writes.
    #[must_use]
    pub fn cache(&self) -> &Arc<ImageCache> {
        &self.shared.cache
    }

    /// Current runtime switches.
    #[must_use]
    pub fn settings(&self) -> &PipelineSettings {
        &self.shared.settings
    }

    /// Sets the image shown while a load is pending.
    pub fn set_placeholder(&self, image: Option<SharedImage>) {
        *self.shared.settings.placeholder.write() = image;
    }

    /// Enables refetching after every cache hit.
    pub fn set_always_revalidate(&self, value: bool) {
        self.shared
            .settings
            .always_revalidate
            .store(value, Ordering::Relaxed);
    }

    /// Makes all current and future tasks give up at their next check.
    pub fn set_exit_early(&self, value: bool) {
        self.shared.settings.exit_early.store(value, Ordering::Relaxed);
    }

    /// Enables a cross-fade of `duration_ms` when background results land.
    pub fn set_fade_in_enabled(&self, enabled: bool, duration_ms: u64) {
        self.shared.settings.fade_in.store(enabled, Ordering::Relaxed);
        self.shared
            .settings
            .fade_in_ms
            .store(duration_ms, Ordering::Relaxed);
    }

    /// Requests `key` for `slot`.
    ///
    /// Never blocks on I/O: a memory hit is applied immediately, anything
    /// else is handed to a background task.
    pub fn load_into<S>(&self, slot: &Arc<S>, key: impl Into<CacheKey>) -> LoadDispatch
    where
        S: DisplaySlot + 'static,
    {
        let key = key.into();
        let slot_id = slot.slot_id();
        let weak: Weak<S> = Arc::downgrade(slot);
        let weak: Weak<dyn DisplaySlot> = weak;

        if let Some(image) = self.shared.cache.get_from_memory(&key) {
            let revalidating = {
                let mut bindings = self.shared.bindings.lock();
                match bindings.get(&slot_id) {
                    Some(bound) if bound.key == key && bound.force_fetch && !bound.is_cancelled() => {
                        true
                    }
                    _ => {
                        if let Some(old) = bindings.remove(&slot_id) {
                            old.cancel();
                        }
                        false
                    }
                }
            };

            trace!(key = %key, slot = %slot_id, "Applying from memory cache");
            slot.show_image(image, Transition::Immediate);

            if !revalidating && self.shared.settings.always_revalidate() {
                self.shared.start_revalidation(slot_id, weak, key);
            }
            return LoadDispatch::Applied;
        }

        let task = {
            let mut bindings = self.shared.bindings.lock();
            bindings.retain(|_, bound| bound.slot.strong_count() > 0);

            if let Some(bound) = bindings.get(&slot_id) {
                if bound.key == key && !bound.is_cancelled() {
                    trace!(key = %key, slot = %slot_id, "Load already in flight");
                    return LoadDispatch::AlreadyPending;
                }
                bound.cancel();
            }

            let task = self.shared.new_task(slot_id, weak, key, false);
            bindings.insert(slot_id, task.clone());
            task
        };

        debug!(key = %task.key, slot = %slot_id, task = task.id, "Starting background load");
        slot.show_placeholder(self.shared.settings.placeholder());
        self.shared.spawn(task);
        LoadDispatch::Started
    }

    /// Cancels whatever is bound to `slot`. Returns true if a task was bound.
    pub fn cancel<S: DisplaySlot + ?Sized>(&self, slot: &S) -> bool {
        let removed = self.shared.bindings.lock().remove(&slot.slot_id());
        removed.is_some_and(|task| {
            task.cancel();
            debug!(key = %task.key, slot = %task.slot_id, "Cancelled work for slot");
            true
        })
    }

    /// Cancels every bound task.
    pub fn cancel_all(&self) {
        let drained: Vec<_> = self.shared.bindings.lock().drain().collect();
        for (_, task) in &drained {
            task.cancel();
        }
        if !drained.is_empty() {
            debug!(count = drained.len(), "Cancelled all pending loads");
        }
    }

    /// Stops all work: sets the exit-early flag and cancels every binding.
    pub fn shutdown(&self) {
        self.set_exit_early(true);
        self.cancel_all();
        info!("Load pipeline shut down");
    }

    /// Returns true if `slot` has a task in flight.
    pub fn is_loading<S: DisplaySlot + ?Sized>(&self, slot: &S) -> bool {
        self.shared.bindings.lock().contains_key(&slot.slot_id())
    }

    /// Number of slots with a task in flight.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.shared.bindings.lock().len()
    }

    /// Applies every completion that is ready. Never blocks.
    pub fn dispatch_completions(&self) -> Vec<LoadOutcome> {
        let Ok(mut rx) = self.completion_rx.try_lock() else {
            return Vec::new();
        };
        let mut outcomes = Vec::new();
        while let Ok(completion) = rx.try_recv() {
            outcomes.push(self.complete(completion));
        }
        outcomes
    }

    /// Waits for the next completion and applies it.
    pub async fn next_outcome(&self) -> Option<LoadOutcome> {
        let completion = self.completion_rx.lock().await.recv().await?;
        Some(self.complete(completion))
    }

    fn complete(&self, completion: Completion) -> LoadOutcome {
        let Completion { task, result } = completion;

        let current = {
            let mut bindings = self.shared.bindings.lock();
            let current = bindings
                .get(&task.slot_id)
                .is_some_and(|bound| Arc::ptr_eq(bound, &task));
            if current {
                bindings.remove(&task.slot_id);
            }
            current
        };

        let slot = task.slot();
        let status = match (result, slot) {
            _ if !current || task.is_cancelled() || self.shared.settings.exit_early() => {
                trace!(key = %task.key, task = task.id, "Dropping superseded completion");
                LoadStatus::Abandoned
            }
            (None, _) | (_, None) => LoadStatus::Abandoned,
            (Some(Ok(loaded)), Some(slot)) => {
                if task.force_fetch && loaded.unchanged {
                    trace!(key = %task.key, "Revalidation found content current");
                    LoadStatus::Unchanged
                } else {
                    slot.show_image(loaded.image, self.shared.settings.transition());
                    if !task.force_fetch
                        && loaded.source.is_cache_hit()
                        && self.shared.settings.always_revalidate()
                    {
                        self.shared
                            .start_revalidation(task.slot_id, task.slot.clone(), task.key.clone());
                    }
                    LoadStatus::Applied(loaded.source)
                }
            }
            (Some(Err(e)), Some(_)) => {
                warn!(key = %task.key, error = %e, "Image load failed");
                LoadStatus::Failed(e)
            }
        };

        LoadOutcome {
            slot: task.slot_id,
            key: task.key.clone(),
            revalidation: task.force_fetch,
            status,
        }
    }
}

impl Drop for LoadPipeline {
    fn drop(&mut self) {
        self.shared.settings.exit_early.store(true, Ordering::Relaxed);
        for (_, task) in self.shared.bindings.lock().drain() {
            task.cancel();
        }
    }
}
