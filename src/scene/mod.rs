//! Narrow interface to the scene graph owned by the render thread

pub mod dispatcher;
pub mod group;

pub use dispatcher::{MainThreadDispatcher, MainThreadTask};
pub use group::ParticleGroup;

/// Registration hooks of the live scene index
///
/// Called on the main thread only, through `MainThreadDispatcher`.
pub trait SceneIndex {
    fn add_node_auxiliary_info(&mut self, group: &ParticleGroup);
    fn remove_node_auxiliary_info(&mut self, group: &ParticleGroup);
}

/// Scene index that only counts registrations
#[derive(Debug, Default)]
pub struct CountingSceneIndex {
    pub groups: usize,
    pub stars: usize,
    pub added: u64,
    pub removed: u64,
}

impl SceneIndex for CountingSceneIndex {
    fn add_node_auxiliary_info(&mut self, group: &ParticleGroup) {
        self.groups += 1;
        self.stars += group.star_count();
        self.added += 1;
    }

    fn remove_node_auxiliary_info(&mut self, group: &ParticleGroup) {
        self.groups = self.groups.saturating_sub(1);
        self.stars = self.stars.saturating_sub(group.star_count());
        self.removed += 1;
    }
}
