use std::collections::BTreeMap;
use std::sync::Arc;

pub(crate) type Writes = BTreeMap<Vec<u8>, Option<Vec<u8>>>;

/// Frozen set of writes stacked on a parent layer. `None` values are deletions.
#[derive(Debug)]
pub(crate) struct Layer {
    parent: Option<Arc<Layer>>,
    writes: Writes,
    depth: usize,
}

impl Layer {
    pub(crate) fn root(writes: Writes) -> Self {
        Self {
            parent: None,
            writes: writes.into_iter().filter(|(_, v)| v.is_some()).collect(),
            depth: 0,
        }
    }

    fn child(parent: Arc<Layer>, writes: Writes) -> Self {
        let depth = parent.depth.saturating_add(1);
        Self {
            parent: Some(parent),
            writes,
            depth,
        }
    }

    pub(crate) fn depth(&self) -> usize {
        self.depth
    }

    fn get(&self, key: &[u8]) -> Option<&[u8]> {
        let mut layer = self;
        loop {
            if let Some(value) = layer.writes.get(key) {
                return value.as_deref();
            }
            match &layer.parent {
                Some(parent) => layer = parent.as_ref(),
                None => return None,
            }
        }
    }

    /// Collapses the chain into a single root layer holding the visible values.
    pub(crate) fn flatten(&self) -> Layer {
        let mut chain = Vec::with_capacity(self.depth + 1);
        let mut layer = Some(self);
        while let Some(current) = layer {
            chain.push(current);
            layer = current.parent.as_deref();
        }

        let mut merged = Writes::new();
        for layer in chain.into_iter().rev() {
            for (key, value) in &layer.writes {
                merged.insert(key.clone(), value.clone());
            }
        }
        Layer::root(merged)
    }
}

#[derive(Debug, Clone)]
struct JournalEntry {
    key: Vec<u8>,
    previous: Option<Option<Vec<u8>>>,
}

/// Position in a view's write journal that [`View::rollback`] can return to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checkpoint(usize);

/// Copy-on-write view over a frozen layer chain.
///
/// Writes accumulate in a pending overlay and never touch the layers underneath, so any
/// number of views can fork from the same parent and diverge independently. A view
/// becomes canonical only when handed to [`StateStore::commit`](super::StateStore::commit).
#[derive(Debug, Clone)]
pub struct View {
    base: Arc<Layer>,
    pending: Writes,
    journal: Vec<JournalEntry>,
}

impl View {
    pub(crate) fn over(base: Arc<Layer>) -> Self {
        Self {
            base,
            pending: Writes::new(),
            journal: Vec::new(),
        }
    }

    pub fn get(&self, key: &[u8]) -> Option<&[u8]> {
        match self.pending.get(key) {
            Some(value) => value.as_deref(),
            None => self.base.get(key),
        }
    }

    pub fn contains(&self, key: &[u8]) -> bool {
        self.get(key).is_some()
    }

    pub fn insert(&mut self, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) {
        self.write(key.into(), Some(value.into()));
    }

    pub fn remove(&mut self, key: &[u8]) {
        self.write(key.to_vec(), None);
    }

    fn write(&mut self, key: Vec<u8>, value: Option<Vec<u8>>) {
        let previous = self.pending.insert(key.clone(), value);
        self.journal.push(JournalEntry { key, previous });
    }

    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint(self.journal.len())
    }

    /// Undoes every write made after `checkpoint`.
    pub fn rollback(&mut self, checkpoint: Checkpoint) {
        while self.journal.len() > checkpoint.0 {
            let Some(entry) = self.journal.pop() else {
                break;
            };
            match entry.previous {
                Some(previous) => {
                    self.pending.insert(entry.key, previous);
                }
                None => {
                    self.pending.remove(&entry.key);
                }
            }
        }
    }

    pub fn writes_since(&self, checkpoint: Checkpoint) -> usize {
        self.journal.len().saturating_sub(checkpoint.0)
    }

    /// Returns a new empty overlay on top of this view's current contents.
    pub fn fork(&self) -> View {
        View::over(self.freeze())
    }

    /// Keys written by this view (not by its ancestors), in key order.
    pub fn diff(&self) -> impl Iterator<Item = (&[u8], Option<&[u8]>)> {
        self.pending
            .iter()
            .map(|(key, value)| (key.as_slice(), value.as_deref()))
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub(crate) fn freeze(&self) -> Arc<Layer> {
        if self.pending.is_empty() {
            return Arc::clone(&self.base);
        }
        Arc::new(Layer::child(Arc::clone(&self.base), self.pending.clone()))
    }
}
