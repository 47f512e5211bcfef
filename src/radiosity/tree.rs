use super::{PatchIndex, PatchQueue};

#[derive(Debug, Clone)]
struct Node {
    key: f32,
    patch: PatchIndex,
    left: Option<usize>,
    right: Option<usize>,
}

/// Where a node hangs.
#[derive(Debug, Clone, Copy)]
enum Link {
    Root,
    Left(usize),
    Right(usize),
}

/// Binary search tree of patches keyed by priority. Equal keys go to the
/// right, so the most recently inserted of several equal patches is the
/// highest. Nodes live in an arena and freed slots are reused.
#[derive(Debug, Clone, Default)]
pub struct RadTree {
    nodes: Vec<Node>,
    free: Vec<usize>,
    root: Option<usize>,
    len: usize,
}

impl RadTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn insert(&mut self, key: f32, patch: PatchIndex) {
        let node = Node {
            key,
            patch,
            left: None,
            right: None,
        };
        let index = match self.free.pop() {
            Some(slot) => {
                self.nodes[slot] = node;
                slot
            }
            None => {
                self.nodes.push(node);
                self.nodes.len() - 1
            }
        };
        let mut link = Link::Root;
        let mut current = self.root;
        while let Some(i) = current {
            if key < self.nodes[i].key {
                link = Link::Left(i);
                current = self.nodes[i].left;
            } else {
                link = Link::Right(i);
                current = self.nodes[i].right;
            }
        }
        self.set_link(link, Some(index));
        self.len += 1;
    }

    /// Removes `patch`, which must have been inserted with `key`. Returns
    /// false when it is not in the tree.
    pub fn delete(&mut self, key: f32, patch: PatchIndex) -> bool {
        let mut link = Link::Root;
        let mut current = self.root;
        while let Some(i) = current {
            let node = &self.nodes[i];
            if node.patch == patch {
                self.unlink(link, i);
                return true;
            }
            if key < node.key {
                link = Link::Left(i);
                current = node.left;
            } else {
                link = Link::Right(i);
                current = node.right;
            }
        }
        false
    }

    /// Removes and returns the right-most entry.
    pub fn pop_highest(&mut self) -> Option<(PatchIndex, f32)> {
        let mut link = Link::Root;
        let mut current = self.root?;
        while let Some(right) = self.nodes[current].right {
            link = Link::Right(current);
            current = right;
        }
        let Node { key, patch, .. } = self.nodes[current];
        self.unlink(link, current);
        Some((patch, key))
    }

    pub fn peek_highest(&self) -> Option<(PatchIndex, f32)> {
        let mut current = self.root?;
        while let Some(right) = self.nodes[current].right {
            current = right;
        }
        let node = &self.nodes[current];
        Some((node.patch, node.key))
    }

    /// Entries in ascending key order.
    pub fn in_order(&self) -> Vec<(PatchIndex, f32)> {
        let mut out = Vec::with_capacity(self.len);
        let mut stack = Vec::new();
        let mut current = self.root;
        while current.is_some() || !stack.is_empty() {
            while let Some(i) = current {
                stack.push(i);
                current = self.nodes[i].left;
            }
            if let Some(i) = stack.pop() {
                out.push((self.nodes[i].patch, self.nodes[i].key));
                current = self.nodes[i].right;
            }
        }
        out
    }

    fn set_link(&mut self, link: Link, target: Option<usize>) {
        match link {
            Link::Root => self.root = target,
            Link::Left(parent) => self.nodes[parent].left = target,
            Link::Right(parent) => self.nodes[parent].right = target,
        }
    }

    /// Detaches node `i` hanging at `link`. A node with two children takes
    /// the payload of the left-most node of its right subtree, which is
    /// detached instead.
    fn unlink(&mut self, link: Link, i: usize) {
        let (left, right) = (self.nodes[i].left, self.nodes[i].right);
        let removed = match (left, right) {
            (Some(_), Some(right)) => {
                let mut successor_link = Link::Right(i);
                let mut successor = right;
                while let Some(next) = self.nodes[successor].left {
                    successor_link = Link::Left(successor);
                    successor = next;
                }
                self.nodes[i].key = self.nodes[successor].key;
                self.nodes[i].patch = self.nodes[successor].patch;
                let successor_right = self.nodes[successor].right;
                self.set_link(successor_link, successor_right);
                successor
            }
            (child, None) | (None, child) => {
                self.set_link(link, child);
                i
            }
        };
        self.free.push(removed);
        self.len -= 1;
    }
}

/// Patch queue backed by a [`RadTree`]. Remembers the key each patch was
/// queued with so it can be found again after its priority changed.
#[derive(Debug, Clone, Default)]
pub struct RadList {
    tree: RadTree,
    keys: Vec<Option<f32>>,
}

impl RadList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tree(&self) -> &RadTree {
        &self.tree
    }
}

impl PatchQueue for RadList {
    fn insert(&mut self, patch: PatchIndex, priority: f32) {
        if patch >= self.keys.len() {
            self.keys.resize(patch + 1, None);
        }
        if let Some(old) = self.keys[patch].take() {
            self.tree.delete(old, patch);
        }
        self.keys[patch] = Some(priority);
        self.tree.insert(priority, patch);
    }

    fn remove(&mut self, patch: PatchIndex) -> bool {
        match self.keys.get_mut(patch).and_then(Option::take) {
            Some(key) => self.tree.delete(key, patch),
            None => false,
        }
    }

    fn pop_highest(&mut self) -> Option<(PatchIndex, f32)> {
        let (patch, key) = self.tree.pop_highest()?;
        self.keys[patch] = None;
        Some((patch, key))
    }

    fn peek_highest(&self) -> Option<(PatchIndex, f32)> {
        self.tree.peek_highest()
    }

    fn len(&self) -> usize {
        self.tree.len()
    }

    fn entries(&self) -> Vec<(PatchIndex, f32)> {
        self.tree.in_order()
    }
}
