use super::view::{Layer, View, Writes};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub const DEFAULT_MAX_LAYER_DEPTH: usize = 32;

/// Canonical state: a pointer to the committed layer chain.
///
/// Views fork from the canonical layer without copying it. `commit` swaps the pointer in
/// one step, so readers observe either the previous or the new state, never a mix.
#[derive(Debug)]
pub struct StateStore {
    root: RwLock<Arc<Layer>>,
    max_depth: usize,
    version: AtomicU64,
}

impl StateStore {
    pub fn new(max_depth: usize) -> Self {
        Self {
            root: RwLock::new(Arc::new(Layer::root(Writes::new()))),
            max_depth: max_depth.max(1),
            version: AtomicU64::new(0),
        }
    }

    /// Fresh view over the canonical state.
    pub fn view(&self) -> View {
        View::over(Arc::clone(&self.root.read()))
    }

    pub fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.view().get(key).map(<[u8]>::to_vec)
    }

    /// Makes `view` the canonical state and returns the new version.
    ///
    /// Chains deeper than the configured limit are compacted into a single root layer;
    /// views forked earlier keep their own references and are unaffected.
    pub fn commit(&self, view: &View) -> u64 {
        let mut layer = view.freeze();
        if layer.depth() > self.max_depth {
            let depth = layer.depth();
            layer = Arc::new(layer.flatten());
            tracing::debug!(depth, "compacted state layers");
        }

        *self.root.write() = layer;
        self.version.fetch_add(1, Ordering::SeqCst).saturating_add(1)
    }

    pub fn version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }

    pub fn depth(&self) -> usize {
        self.root.read().depth()
    }
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LAYER_DEPTH)
    }
}
