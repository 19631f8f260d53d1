/// Command line driver for the octree loader
/// Opens a dataset, requests the first level below the preloaded ones and
/// pumps the main-thread dispatcher until everything requested is resident.

use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};

use starfield_streamer::{
    CountingSceneIndex, LoadStatus, LoaderConfig, MainThreadDispatcher, OctreeLoader, WorkerState,
};

const FRAME: Duration = Duration::from_millis(16);
const DRAIN_TIMEOUT: Duration = Duration::from_secs(60);

fn load_config(arg: &str) -> Result<LoaderConfig> {
    let path = Path::new(arg);
    if path.is_dir() {
        return Ok(LoaderConfig::for_dataset(path));
    }
    LoaderConfig::load(path).with_context(|| format!("Failed to read config {}", path.display()))
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("info,starfield_streamer=debug"),
    )
    .init();

    let Some(arg) = std::env::args().nth(1) else {
        bail!("usage: starfield-streamer <dataset dir | config.toml | config.json>");
    };
    let config = load_config(&arg)?;
    let request_depth = config.preload_depth + 1;

    let dispatcher = MainThreadDispatcher::new();
    let mut loader = OctreeLoader::open(config, dispatcher.clone())
        .context("Failed to open octree dataset")?;
    let mut scene = CountingSceneIndex::default();
    dispatcher.run_pending(&mut scene);

    let octants = loader.index().nodes_at_depth(request_depth);
    let queued = octants
        .iter()
        .filter(|octant| loader.queue(octant).is_queued())
        .count();
    log::info!("{} octants requested at depth {}", queued, request_depth);

    let start = Instant::now();
    loop {
        loader.flush();
        for octant in octants.iter().filter(|o| o.status() == LoadStatus::Loaded) {
            loader.touch(octant);
        }
        dispatcher.run_pending(&mut scene);

        let idle = loader.worker_state() == WorkerState::Waiting;
        if idle && loader.load_queue_len() == 0 && dispatcher.pending() == 0 {
            break;
        }
        if start.elapsed() > DRAIN_TIMEOUT {
            log::warn!("Gave up waiting for the load queue to drain");
            break;
        }
        std::thread::sleep(FRAME);
    }

    let stats = loader.stats();
    println!("Octants in tree:   {}", loader.index().len());
    println!("Octants loaded:    {}", stats.octants_loaded);
    println!("Octants unloaded:  {}", stats.octants_unloaded);
    println!("Batches aborted:   {}", stats.batches_aborted);
    println!("Batches failed:    {}", stats.batches_failed);
    println!("Resident stars:    {}", loader.resident_stars());
    println!("Scene groups:      {} ({} stars)", scene.groups, scene.stars);
    println!("Elapsed:           {:.2?}", start.elapsed());

    loader.stop();
    Ok(())
}
