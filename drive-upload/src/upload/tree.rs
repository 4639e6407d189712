use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use drive_core::{DriveItem, TreeDelta};

/// Receiver of tree-cache mutations. The uploader only writes through this
/// port and never reads the cache back.
pub trait DeltaSink: Send + Sync {
    fn apply_delta(&self, delta: TreeDelta);
}

/// Items by id plus child ids by parent id.
#[derive(Debug, Default)]
pub struct MemoryTree {
    inner: Mutex<TreeInner>,
}

#[derive(Debug, Default)]
struct TreeInner {
    items: HashMap<String, DriveItem>,
    children: HashMap<String, Vec<String>>,
}

impl MemoryTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, id: &str) -> Option<DriveItem> {
        self.lock().items.get(id).cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, TreeInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl TreeInner {
    fn upsert(&mut self, item: DriveItem) {
        let previous_parent = self
            .items
            .get(&item.id)
            .and_then(|previous| previous.parent_id.clone());
        if let Some(parent) = previous_parent
            && item.parent_id.as_ref() != Some(&parent)
        {
            self.unlink(&parent, &item.id);
        }
        if let Some(parent) = &item.parent_id {
            let siblings = self.children.entry(parent.clone()).or_default();
            if !siblings.contains(&item.id) {
                siblings.push(item.id.clone());
            }
        }
        self.items.insert(item.id.clone(), item);
    }

    fn remove(&mut self, id: &str) {
        if let Some(item) = self.items.remove(id)
            && let Some(parent) = item.parent_id
        {
            self.unlink(&parent, id);
        }
        if let Some(children) = self.children.remove(id) {
            for child in children {
                self.remove(&child);
            }
        }
    }

    fn unlink(&mut self, parent: &str, id: &str) {
        if let Some(siblings) = self.children.get_mut(parent) {
            siblings.retain(|sibling| sibling != id);
        }
    }
}

impl DeltaSink for MemoryTree {
    fn apply_delta(&self, delta: TreeDelta) {
        let mut inner = self.lock();
        for id in &delta.deleted {
            inner.remove(id);
        }
        for item in delta.added.into_iter().chain(delta.updated) {
            inner.upsert(item);
        }
    }
}
