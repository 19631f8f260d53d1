//! Background loader thread
//!
//! The worker sleeps until flushed, then drains the load queue in small
//! batches. After each batch it evicts least recently used octants while the
//! resident star count is over budget. Scene registration is never done here;
//! it is posted to the main thread through the dispatcher.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::config::LoaderConfig;
use crate::constants::loader::{MAX_LOADED_IDS, WORKER_THREAD_NAME};
use crate::error::StreamResult;
use crate::octree::{LoadStatus, OctreeNode};
use crate::scene::{MainThreadDispatcher, ParticleGroup};

use super::error::StreamingErrorContext;
use super::load_queue::LoadQueue;
use super::source::OctantSource;
use super::unload_queue::UnloadQueue;

/// What the worker thread is doing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Idle, blocked until flushed
    Waiting,
    /// Draining the load queue
    Draining,
    /// Shut down
    Stopped,
}

#[derive(Debug)]
struct SignalState {
    state: WorkerState,
    wake: bool,
    stop: bool,
}

/// Wake-up channel between the facade and the worker
#[derive(Debug)]
pub struct WorkerSignal {
    inner: Mutex<SignalState>,
    cv: Condvar,
}

impl Default for WorkerSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkerSignal {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(SignalState {
                state: WorkerState::Waiting,
                wake: false,
                stop: false,
            }),
            cv: Condvar::new(),
        }
    }

    pub fn state(&self) -> WorkerState {
        self.inner.lock().state
    }

    /// Request a drain pass; returns whether the worker was idle
    ///
    /// A wake-up posted while the worker drains is remembered and costs one
    /// extra look at the queue.
    pub fn wake(&self) -> bool {
        let mut inner = self.inner.lock();
        let idle = inner.state == WorkerState::Waiting && !inner.wake;
        inner.wake = true;
        self.cv.notify_all();
        idle
    }

    pub fn stop(&self) {
        let mut inner = self.inner.lock();
        inner.stop = true;
        self.cv.notify_all();
    }

    pub fn is_stopping(&self) -> bool {
        self.inner.lock().stop
    }

    /// Park the worker until woken, stopped or timed out
    ///
    /// Returns false once a stop was requested. The abort flag only applies
    /// to the batch in flight, so it is cleared at both edges of the wait.
    fn wait(&self, timeout: Option<Duration>, abort: &AtomicBool) -> bool {
        let mut inner = self.inner.lock();
        if !inner.wake && !inner.stop {
            inner.state = WorkerState::Waiting;
            abort.store(false, Ordering::Release);
            self.cv.notify_all();

            match timeout {
                Some(timeout) => {
                    let deadline = Instant::now() + timeout;
                    while !inner.wake && !inner.stop {
                        if self.cv.wait_until(&mut inner, deadline).timed_out() {
                            break;
                        }
                    }
                }
                None => {
                    while !inner.wake && !inner.stop {
                        self.cv.wait(&mut inner);
                    }
                }
            }
        }

        if inner.stop {
            inner.state = WorkerState::Stopped;
            self.cv.notify_all();
            return false;
        }
        inner.wake = false;
        inner.state = WorkerState::Draining;
        abort.store(false, Ordering::Release);
        true
    }

    /// Block until the worker is idle and `drained()` holds, or `timeout` passes
    pub fn wait_until_idle(&self, timeout: Duration, drained: impl Fn() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        let mut inner = self.inner.lock();
        loop {
            let settled = match inner.state {
                WorkerState::Waiting => !inner.wake,
                WorkerState::Stopped => true,
                WorkerState::Draining => false,
            };
            if settled && drained() {
                return true;
            }
            if self.cv.wait_until(&mut inner, deadline).timed_out() {
                let settled = inner.state != WorkerState::Draining && !inner.wake;
                return settled && drained();
            }
        }
    }

    fn mark_stopped(&self) {
        let mut inner = self.inner.lock();
        inner.state = WorkerState::Stopped;
        self.cv.notify_all();
    }
}

/// Counters exposed for monitoring
#[derive(Debug, Default)]
pub struct LoaderStats {
    pub octants_loaded: AtomicU64,
    pub octants_unloaded: AtomicU64,
    pub batches_aborted: AtomicU64,
    pub batches_failed: AtomicU64,
}

/// Point-in-time copy of `LoaderStats`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoaderStatsSnapshot {
    pub octants_loaded: u64,
    pub octants_unloaded: u64,
    pub batches_aborted: u64,
    pub batches_failed: u64,
}

impl LoaderStats {
    pub fn snapshot(&self) -> LoaderStatsSnapshot {
        LoaderStatsSnapshot {
            octants_loaded: self.octants_loaded.load(Ordering::Relaxed),
            octants_unloaded: self.octants_unloaded.load(Ordering::Relaxed),
            batches_aborted: self.batches_aborted.load(Ordering::Relaxed),
            batches_failed: self.batches_failed.load(Ordering::Relaxed),
        }
    }
}

/// Collects loaded page ids so loads are reported in batches
#[derive(Debug, Default)]
struct LoadedLog {
    ids: Vec<i64>,
    objects: usize,
}

impl LoadedLog {
    fn record(&mut self, page_id: i64, objects: usize) {
        if self.ids.len() >= MAX_LOADED_IDS {
            self.flush();
        }
        self.ids.push(page_id);
        self.objects += objects;
    }

    fn flush(&mut self) {
        if let (Some(first), Some(last)) = (self.ids.first(), self.ids.last()) {
            log::info!(
                "{} objects loaded in {} octants [{}, ..., {}]",
                self.objects,
                self.ids.len(),
                first,
                last
            );
        }
        self.ids.clear();
        self.objects = 0;
    }
}

/// State shared by the loader facade and the worker thread
pub struct StreamingContext {
    pub config: LoaderConfig,
    pub load_queue: LoadQueue,
    pub unload_queue: UnloadQueue,
    pub signal: WorkerSignal,
    pub stats: LoaderStats,
    source: Arc<dyn OctantSource>,
    dispatcher: MainThreadDispatcher,
    paused: AtomicBool,
    abort: AtomicBool,
    resident_stars: AtomicI64,
    loaded_log: Mutex<LoadedLog>,
}

impl StreamingContext {
    pub fn new(
        config: LoaderConfig,
        source: Arc<dyn OctantSource>,
        dispatcher: MainThreadDispatcher,
    ) -> Self {
        Self {
            load_queue: LoadQueue::new(
                config.load_queue_capacity,
                config.min_queue_clear_interval(),
            ),
            unload_queue: UnloadQueue::new(config.preload_depth),
            signal: WorkerSignal::new(),
            stats: LoaderStats::default(),
            source,
            dispatcher,
            paused: AtomicBool::new(false),
            abort: AtomicBool::new(false),
            resident_stars: AtomicI64::new(0),
            loaded_log: Mutex::new(LoadedLog::default()),
            config,
        }
    }

    pub fn dispatcher(&self) -> &MainThreadDispatcher {
        &self.dispatcher
    }

    pub fn resident_stars(&self) -> i64 {
        self.resident_stars.load(Ordering::Acquire)
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    pub fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::Release);
    }

    /// Ask the worker to drop the rest of its current batch
    pub fn request_abort(&self) {
        self.abort.store(true, Ordering::Release);
    }

    pub fn abort_requested(&self) -> bool {
        self.abort.load(Ordering::Acquire)
    }

    /// Load one octant and post its scene registration
    ///
    /// Returns false when the octant is already resident, or when the source
    /// has no data for it; the octant is then back at `NotLoaded`.
    pub fn load_octant(&self, octant: &OctreeNode) -> StreamResult<bool> {
        if octant.status() == LoadStatus::Loaded {
            return Ok(false);
        }
        let page_id = octant.page_id();
        let records = match self.source.load_octant(page_id) {
            Ok(Some(records)) => records,
            Ok(None) => {
                octant.transition(LoadStatus::Queued, LoadStatus::NotLoaded);
                return Ok(false);
            }
            Err(e) => {
                octant.transition(LoadStatus::Queued, LoadStatus::NotLoaded);
                return Err(e);
            }
        };

        let group = Arc::new(ParticleGroup::new(page_id, records, self.config.epoch_jd));
        let stars = octant.attach(Arc::clone(&group));
        self.resident_stars.fetch_add(stars as i64, Ordering::AcqRel);
        self.unload_queue.touch(octant);
        self.dispatcher
            .post(move |scene| scene.add_node_auxiliary_info(&group));

        self.stats.octants_loaded.fetch_add(1, Ordering::Relaxed);
        self.loaded_log.lock().record(page_id, stars);
        Ok(true)
    }

    /// Load a polled batch, honouring abort requests between octants
    ///
    /// On abort or error the octants not yet loaded go back to `NotLoaded`.
    /// Returns the number of octants that received data.
    pub fn load_batch(&self, batch: &[OctreeNode]) -> StreamResult<usize> {
        let mut loaded = 0;
        let mut result = Ok(());

        for (i, octant) in batch.iter().enumerate() {
            if self.abort.swap(false, Ordering::AcqRel) {
                let rolled_back = Self::roll_back(&batch[i..]);
                self.stats.batches_aborted.fetch_add(1, Ordering::Relaxed);
                log::debug!("Load batch aborted, {} octants returned to the tree", rolled_back);
                break;
            }
            match self.load_octant(octant) {
                Ok(true) => loaded += 1,
                Ok(false) => {}
                Err(e) => {
                    Self::roll_back(&batch[i + 1..]);
                    self.stats.batches_failed.fetch_add(1, Ordering::Relaxed);
                    result = Err(e);
                    break;
                }
            }
        }

        self.loaded_log.lock().flush();
        result.map(|_| loaded)
    }

    fn roll_back(octants: &[OctreeNode]) -> usize {
        octants
            .iter()
            .filter(|o| o.transition(LoadStatus::Queued, LoadStatus::NotLoaded))
            .count()
    }

    /// Detach an octant's groups and post their scene deregistration
    pub fn unload_octant(&self, octant: &OctreeNode) -> usize {
        self.unload_queue.remove(octant);
        let groups = octant.detach_all();
        let stars: usize = groups.iter().map(|g| g.star_count()).sum();
        self.resident_stars.fetch_sub(stars as i64, Ordering::AcqRel);
        for group in groups {
            self.dispatcher
                .post(move |scene| scene.remove_node_auxiliary_info(&group));
        }
        self.stats.octants_unloaded.fetch_add(1, Ordering::Relaxed);
        stars
    }

    /// Evict least recently used octants once the budget is reached
    ///
    /// Eviction continues down to the hysteresis floor or until nothing
    /// evictable is left. Returns the number of octants unloaded.
    pub fn release_resources(&self) -> usize {
        if self.resident_stars() < self.config.max_loaded_stars {
            return 0;
        }

        let floor = self.config.unload_floor();
        let mut unloaded = 0;
        let mut freed = 0;
        while self.resident_stars() > floor {
            let Some(octant) = self.unload_queue.evict_one() else {
                break;
            };
            if octant.status() != LoadStatus::Loaded {
                continue;
            }
            freed += self.unload_octant(&octant);
            unloaded += 1;
        }

        if unloaded > 0 {
            log::debug!(
                "Unloaded {} octants ({} stars), {} stars resident",
                unloaded,
                freed,
                self.resident_stars()
            );
        }
        unloaded
    }

    /// Load the queue empty, batch by batch
    fn drain(&self) {
        loop {
            if self.signal.is_stopping() || self.is_paused() {
                return;
            }
            let batch = self.load_queue.poll_batch(self.config.batch_size);
            if batch.is_empty() {
                return;
            }

            if let Err(e) = self.load_batch(&batch) {
                log::debug!("Octant batch failed: {}", e);
            }
            self.release_resources();
        }
    }
}

impl std::fmt::Debug for StreamingContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingContext")
            .field("load_queue", &self.load_queue.len())
            .field("unload_queue", &self.unload_queue.len())
            .field("resident_stars", &self.resident_stars())
            .field("paused", &self.is_paused())
            .field("state", &self.signal.state())
            .finish()
    }
}

/// Owner of the loader thread
#[derive(Debug)]
pub struct StreamingWorker {
    context: Arc<StreamingContext>,
    worker_thread: Option<thread::JoinHandle<()>>,
}

impl StreamingWorker {
    pub fn new(context: Arc<StreamingContext>) -> Self {
        Self {
            context,
            worker_thread: None,
        }
    }

    /// Start the background thread
    pub fn start(&mut self) -> StreamResult<()> {
        if self.worker_thread.is_some() {
            return Ok(());
        }
        let context = Arc::clone(&self.context);
        let handle = thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || Self::worker_loop(context))
            .streaming_context("spawn loader thread")?;
        self.worker_thread = Some(handle);
        Ok(())
    }

    /// Stop the background thread and wait for it to exit
    pub fn stop(&mut self) {
        self.context.signal.stop();
        self.context.request_abort();
        if let Some(handle) = self.worker_thread.take() {
            if handle.join().is_err() {
                log::error!("Octree loader thread panicked");
            }
        }
        self.context.signal.mark_stopped();
    }

    pub fn is_running(&self) -> bool {
        self.worker_thread.is_some()
    }

    fn worker_loop(context: Arc<StreamingContext>) {
        log::debug!("Octree loader thread started");
        let timeout = context.config.auto_flush_interval();
        while context.signal.wait(timeout, &context.abort) {
            context.drain();
        }
        log::debug!("Octree loader thread stopped");
    }
}

impl Drop for StreamingWorker {
    fn drop(&mut self) {
        self.stop();
    }
}
