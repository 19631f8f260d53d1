use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::scene::SceneIndex;

/// Work that must run on the thread owning the scene index
pub type MainThreadTask = Box<dyn FnOnce(&mut dyn SceneIndex) + Send + 'static>;

/// Hand-off from the streaming worker to the main (render) thread
///
/// The worker posts, the main loop drains with `run_pending` once per frame.
/// Tasks run in submission order.
#[derive(Clone)]
pub struct MainThreadDispatcher {
    tx: Sender<MainThreadTask>,
    rx: Receiver<MainThreadTask>,
}

impl Default for MainThreadDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl MainThreadDispatcher {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self { tx, rx }
    }

    /// Queue a task for the main thread
    pub fn post<F>(&self, task: F)
    where
        F: FnOnce(&mut dyn SceneIndex) + Send + 'static,
    {
        // Both ends live in self, so the channel cannot be disconnected here
        let _ = self.tx.send(Box::new(task));
    }

    /// Run every task posted so far; returns how many ran
    pub fn run_pending(&self, scene: &mut dyn SceneIndex) -> usize {
        let mut ran = 0;
        while let Ok(task) = self.rx.try_recv() {
            task(scene);
            ran += 1;
        }
        ran
    }

    pub fn pending(&self) -> usize {
        self.rx.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::ParticleGroup;

    #[derive(Default)]
    struct Recorder {
        added: Vec<i64>,
        removed: Vec<i64>,
    }

    impl SceneIndex for Recorder {
        fn add_node_auxiliary_info(&mut self, group: &ParticleGroup) {
            self.added.push(group.page_id());
        }

        fn remove_node_auxiliary_info(&mut self, group: &ParticleGroup) {
            self.removed.push(group.page_id());
        }
    }

    #[test]
    fn test_tasks_run_in_submission_order() {
        let dispatcher = MainThreadDispatcher::new();
        let worker_side = dispatcher.clone();

        let handle = std::thread::spawn(move || {
            for page in 0..4 {
                let group = ParticleGroup::new(page, Vec::new(), 0.0);
                worker_side.post(move |scene| scene.add_node_auxiliary_info(&group));
            }
        });
        handle.join().expect("Poster thread panicked");

        assert_eq!(dispatcher.pending(), 4);
        let mut scene = Recorder::default();
        assert_eq!(dispatcher.run_pending(&mut scene), 4);
        assert_eq!(scene.added, vec![0, 1, 2, 3]);
        assert!(scene.removed.is_empty());
        assert_eq!(dispatcher.run_pending(&mut scene), 0);
    }
}
