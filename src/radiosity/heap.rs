use super::{PatchIndex, PatchQueue};

/// Indexed binary max-heap of patches. Each patch knows its slot, so a
/// patch whose priority changed can be pulled out without a search.
#[derive(Debug, Clone, Default)]
pub struct PatchHeap {
    entries: Vec<(f32, PatchIndex)>,
    slots: Vec<Option<usize>>,
}

impl PatchHeap {
    pub fn new() -> Self {
        Self::default()
    }

    fn swap(&mut self, a: usize, b: usize) {
        self.entries.swap(a, b);
        self.slots[self.entries[a].1] = Some(a);
        self.slots[self.entries[b].1] = Some(b);
    }

    fn sift_up(&mut self, mut i: usize) {
        while i > 0 {
            let parent = (i - 1) / 2;
            if self.entries[i].0 <= self.entries[parent].0 {
                break;
            }
            self.swap(i, parent);
            i = parent;
        }
    }

    fn sift_down(&mut self, mut i: usize) {
        let n = self.entries.len();
        loop {
            let (left, right) = (2 * i + 1, 2 * i + 2);
            let mut largest = i;
            if left < n && self.entries[left].0 > self.entries[largest].0 {
                largest = left;
            }
            if right < n && self.entries[right].0 > self.entries[largest].0 {
                largest = right;
            }
            if largest == i {
                break;
            }
            self.swap(i, largest);
            i = largest;
        }
    }

    fn remove_slot(&mut self, slot: usize) -> (f32, PatchIndex) {
        let last = self.entries.len() - 1;
        if slot != last {
            self.swap(slot, last);
        }
        let removed = self.entries.pop().unwrap_or((0.0, 0));
        self.slots[removed.1] = None;
        if slot < self.entries.len() {
            self.sift_down(slot);
            self.sift_up(slot);
        }
        removed
    }
}

impl PatchQueue for PatchHeap {
    fn insert(&mut self, patch: PatchIndex, priority: f32) {
        if patch >= self.slots.len() {
            self.slots.resize(patch + 1, None);
        }
        if let Some(slot) = self.slots[patch] {
            self.remove_slot(slot);
        }
        self.entries.push((priority, patch));
        let slot = self.entries.len() - 1;
        self.slots[patch] = Some(slot);
        self.sift_up(slot);
    }

    fn remove(&mut self, patch: PatchIndex) -> bool {
        match self.slots.get(patch).copied().flatten() {
            Some(slot) => {
                self.remove_slot(slot);
                true
            }
            None => false,
        }
    }

    fn pop_highest(&mut self) -> Option<(PatchIndex, f32)> {
        if self.entries.is_empty() {
            return None;
        }
        let (priority, patch) = self.remove_slot(0);
        Some((patch, priority))
    }

    fn peek_highest(&self) -> Option<(PatchIndex, f32)> {
        self.entries.first().map(|&(priority, patch)| (patch, priority))
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn entries(&self) -> Vec<(PatchIndex, f32)> {
        let mut sorted: Vec<(PatchIndex, f32)> = self.entries.iter().map(|&(k, p)| (p, k)).collect();
        sorted.sort_by(|a, b| a.1.total_cmp(&b.1));
        sorted
    }
}
