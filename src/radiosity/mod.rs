//! Progressive radiosity over the lightmaps of a [`World`](crate::world::World).
//!
//! Every lightmapped polygon becomes a [`RadPatch`]. The solver repeatedly
//! takes the patch with the most unshot light out of a [`PatchQueue`],
//! shoots that light through the portal traversal onto every visible patch
//! and puts the patches back with their new priorities.

mod heap;
mod patch;
mod solver;
mod tree;

pub use heap::PatchHeap;
pub use patch::RadPatch;
pub use solver::{Radiosity, RadiosityReport, RadiosityStep, StopReason};
pub use tree::{RadList, RadTree};

/// Index of a patch inside the solver's patch list.
pub type PatchIndex = usize;

/// Patches ordered by priority, highest first out.
pub trait PatchQueue {
    /// Queues `patch`; a patch that is already queued is moved to the new
    /// priority.
    fn insert(&mut self, patch: PatchIndex, priority: f32);

    /// Returns false when `patch` was not queued.
    fn remove(&mut self, patch: PatchIndex) -> bool;

    fn pop_highest(&mut self) -> Option<(PatchIndex, f32)>;

    fn peek_highest(&self) -> Option<(PatchIndex, f32)>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Queued patches in ascending priority.
    fn entries(&self) -> Vec<(PatchIndex, f32)>;
}
