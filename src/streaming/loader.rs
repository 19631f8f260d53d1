//! Public face of the streaming loader
//!
//! Owns the octree index, the shared streaming context and the worker
//! thread. Camera code calls `queue` / `touch` for the octants it observes
//! and `flush` once per frame; the main loop drains the dispatcher.

use std::sync::Arc;
use std::time::Duration;

use crate::config::LoaderConfig;
use crate::error::{StreamError, StreamResult};
use crate::octree::{OctreeIndex, OctreeNode};
use crate::scene::MainThreadDispatcher;

use super::load_queue::OfferOutcome;
use super::source::{FileOctantSource, OctantSource};
use super::worker::{LoaderStatsSnapshot, StreamingContext, StreamingWorker, WorkerState};

/// Streaming loader for an octree star catalog
#[derive(Debug)]
pub struct OctreeLoader {
    index: Arc<OctreeIndex>,
    context: Arc<StreamingContext>,
    worker: StreamingWorker,
}

impl OctreeLoader {
    /// Open the on-disk dataset named by `config`
    ///
    /// Reads the metadata, preloads the top levels and starts the worker.
    pub fn open(config: LoaderConfig, dispatcher: MainThreadDispatcher) -> StreamResult<Self> {
        config.validate()?;
        if !config.metadata_file.is_file() {
            log::info!(
                "Dataset not found: {} - {}",
                config.metadata_file.display(),
                config.particles_dir.display()
            );
            return Err(StreamError::DatasetNotFound {
                metadata: config.metadata_file.clone(),
                particles: config.particles_dir.clone(),
            });
        }

        let index = OctreeIndex::build_from_metadata(&config.metadata_file)?;
        let source = FileOctantSource::from_config(&config)?;
        Self::start(config, index, Arc::new(source), dispatcher)
    }

    /// Start streaming an already built index from any source
    pub fn start(
        config: LoaderConfig,
        index: OctreeIndex,
        source: Arc<dyn OctantSource>,
        dispatcher: MainThreadDispatcher,
    ) -> StreamResult<Self> {
        config.validate()?;
        let context = Arc::new(StreamingContext::new(config, source, dispatcher));
        let mut loader = Self {
            index: Arc::new(index),
            worker: StreamingWorker::new(Arc::clone(&context)),
            context,
        };

        let preloaded = loader.preload();
        log::info!(
            "{} stars preloaded in {} octants",
            loader.resident_stars(),
            preloaded
        );
        loader.worker.start()?;
        Ok(loader)
    }

    /// Synchronously load every octant down to the preload depth
    ///
    /// Children without catalogued objects are skipped. Returns the number
    /// of octants that received data.
    pub fn preload(&self) -> usize {
        let max_depth = self.context.config.preload_depth;
        let mut loaded = 0;
        let mut pending = vec![self.index.root().clone()];
        while let Some(octant) = pending.pop() {
            match self.context.load_octant(&octant) {
                Ok(true) => loaded += 1,
                Ok(false) => {}
                Err(e) => log::error!("Failed to preload octant {}: {}", octant.page_id(), e),
            }
            if octant.depth() < max_depth {
                pending.extend(
                    octant
                        .children()
                        .filter(|child| child.catalog_objects_rec() > 0)
                        .cloned(),
                );
            }
        }
        loaded
    }

    /// Request loading of `octant`
    pub fn queue(&self, octant: &OctreeNode) -> OfferOutcome {
        if self.context.is_paused() {
            return OfferOutcome::Paused;
        }
        self.context.load_queue.offer(octant)
    }

    /// Report that `octant` was observed this frame
    pub fn touch(&self, octant: &OctreeNode) -> bool {
        self.context.unload_queue.touch(octant)
    }

    /// Wake the worker if there is anything to load
    pub fn flush(&self) -> bool {
        if self.context.is_paused() || self.context.load_queue.is_empty() {
            return false;
        }
        self.context.signal.wake()
    }

    /// Drop the remainder of the batch being loaded
    pub fn abort_current(&self) {
        self.context.request_abort();
    }

    /// Clear the load queue (rate limited) and abort the current batch
    pub fn empty_queue(&self) -> Option<usize> {
        let cleared = self.context.load_queue.clear();
        if let Some(n) = cleared.filter(|&n| n > 0) {
            log::info!("{} octants removed from the load queue", n);
        }
        self.abort_current();
        cleared
    }

    /// Stop admitting octants and drop all pending work
    pub fn pause(&self) {
        self.context.set_paused(true);
        self.context.load_queue.force_clear();
        self.abort_current();
        log::info!("Background data loading paused");
    }

    pub fn resume(&self) {
        self.context.set_paused(false);
        log::info!("Background data loading resumed");
    }

    pub fn is_paused(&self) -> bool {
        self.context.is_paused()
    }

    /// Block until the worker is idle with an empty queue
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let context = &self.context;
        context
            .signal
            .wait_until_idle(timeout, || context.load_queue.is_empty())
    }

    pub fn load_queue_len(&self) -> usize {
        self.context.load_queue.len()
    }

    pub fn unload_queue_len(&self) -> usize {
        self.context.unload_queue.len()
    }

    pub fn resident_stars(&self) -> i64 {
        self.context.resident_stars()
    }

    pub fn worker_state(&self) -> WorkerState {
        self.context.signal.state()
    }

    pub fn stats(&self) -> LoaderStatsSnapshot {
        self.context.stats.snapshot()
    }

    pub fn index(&self) -> &OctreeIndex {
        &self.index
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.context.config
    }

    pub fn dispatcher(&self) -> &MainThreadDispatcher {
        self.context.dispatcher()
    }

    /// Shut the worker down; queued octants return to `NotLoaded`
    pub fn stop(&mut self) {
        if !self.worker.is_running() {
            return;
        }
        self.context.load_queue.force_clear();
        self.worker.stop();
        log::debug!("Octree loader stopped");
    }
}

impl Drop for OctreeLoader {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::ParticleRecord;
    use crate::octree::{BoundingBox, LoadStatus};
    use crate::streaming::source::MemoryOctantSource;
    use glam::DVec3;

    fn records(n: usize) -> Vec<ParticleRecord> {
        (0..n)
            .map(|i| ParticleRecord::new([0.0; 6], [0.0; 8], i as i64, vec![String::new()]))
            .collect()
    }

    /// Root with two children, the second one with one grandchild
    fn small_tree() -> OctreeIndex {
        let bounds = BoundingBox::from_center_half(DVec3::ZERO, DVec3::splat(8.0));
        let root = OctreeNode::new(0, 0, bounds, 30, 10);
        let a = OctreeNode::new(1, 1, bounds.child_box(0), 5, 5);
        let b = OctreeNode::new(2, 1, bounds.child_box(7), 15, 10);
        let c = OctreeNode::new(3, 2, bounds.child_box(7).child_box(0), 5, 5);

        let mut b_children: [Option<OctreeNode>; 8] = Default::default();
        b_children[0] = Some(c);
        b.set_children(b_children);
        let mut root_children: [Option<OctreeNode>; 8] = Default::default();
        root_children[0] = Some(a);
        root_children[7] = Some(b);
        root.set_children(root_children);

        OctreeIndex::from_root(root).expect("Failed to index tree")
    }

    fn source() -> Arc<MemoryOctantSource> {
        let source = MemoryOctantSource::new();
        source.insert(0, records(10));
        source.insert(1, records(5));
        source.insert(2, records(10));
        source.insert(3, records(5));
        Arc::new(source)
    }

    fn config(preload_depth: u32) -> LoaderConfig {
        LoaderConfig {
            preload_depth,
            auto_flush_ms: 0,
            ..Default::default()
        }
    }

    #[test]
    fn test_preload_loads_top_levels() {
        let loader =
            OctreeLoader::start(config(1), small_tree(), source(), MainThreadDispatcher::new())
                .expect("Failed to start loader");
        let index = loader.index();
        for id in [0, 1, 2] {
            assert_eq!(index.get(id).map(OctreeNode::status), Some(LoadStatus::Loaded));
        }
        assert_eq!(index.get(3).map(OctreeNode::status), Some(LoadStatus::NotLoaded));
        assert_eq!(loader.resident_stars(), 25);
        assert_eq!(loader.unload_queue_len(), 0);
        assert_eq!(loader.load_queue_len(), 0);
    }

    #[test]
    fn test_repeated_preload_keeps_one_copy() {
        let loader =
            OctreeLoader::start(config(1), small_tree(), source(), MainThreadDispatcher::new())
                .expect("Failed to start loader");
        let root = loader.index().root().clone();
        assert_eq!(loader.resident_stars(), 25);
        assert_eq!(root.num_objects_rec(), 25);

        assert_eq!(loader.preload(), 0);
        assert_eq!(loader.resident_stars(), 25);
        assert_eq!(root.num_objects_rec(), 25);
        for id in [0, 1, 2] {
            assert_eq!(loader.index().get(id).map(OctreeNode::object_groups), Some(1));
        }
        assert_eq!(loader.stats().octants_loaded, 3);

        let mut scene = crate::scene::CountingSceneIndex::default();
        assert_eq!(loader.dispatcher().run_pending(&mut scene), 3);
        assert_eq!(scene.stars, 25);
    }

    #[test]
    fn test_queue_rejected_while_paused() {
        let loader =
            OctreeLoader::start(config(0), small_tree(), source(), MainThreadDispatcher::new())
                .expect("Failed to start loader");
        let octant = loader.index().get(3).cloned().expect("octant 3");

        loader.pause();
        assert_eq!(loader.queue(&octant), OfferOutcome::Paused);
        assert!(!loader.flush());

        loader.resume();
        assert!(loader.queue(&octant).is_queued());
        assert!(loader.flush());
        assert!(loader.wait_idle(Duration::from_secs(10)));
        assert_eq!(octant.status(), LoadStatus::Loaded);
    }

    #[test]
    fn test_pause_clears_queue() {
        let loader =
            OctreeLoader::start(config(0), small_tree(), source(), MainThreadDispatcher::new())
                .expect("Failed to start loader");
        let octants: Vec<OctreeNode> = [1, 2, 3]
            .iter()
            .filter_map(|id| loader.index().get(*id).cloned())
            .collect();
        for o in &octants {
            assert!(loader.queue(o).is_queued());
        }
        loader.pause();
        assert_eq!(loader.load_queue_len(), 0);
        assert!(octants.iter().all(|o| o.status() == LoadStatus::NotLoaded));
        assert!(loader.is_paused());
    }

    #[test]
    fn test_stop_is_idempotent() {
        let mut loader =
            OctreeLoader::start(config(0), small_tree(), source(), MainThreadDispatcher::new())
                .expect("Failed to start loader");
        loader.stop();
        assert_eq!(loader.worker_state(), WorkerState::Stopped);
        loader.stop();
    }
}
