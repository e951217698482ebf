//! [`ChannelStore`] – thread-safe latest-value store keyed by channel name.
//!
//! The datagram listener writes into the store from its own thread while the
//! host's sample tick reads from it at an unrelated cadence.  Only the most
//! recent sample per channel is kept; there is no history and no eviction.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use mocap_types::ChannelSample;

/// Point-in-time copy of every channel in the store.
pub type ChannelSnapshot = HashMap<String, ChannelSample>;

/// Shared latest-value store.  Clone it cheaply – all clones share the same
/// underlying map.
#[derive(Clone, Debug, Default)]
pub struct ChannelStore {
    inner: Arc<RwLock<ChannelSnapshot>>,
}

impl ChannelStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the sample for `name`.
    pub fn put(&self, name: impl Into<String>, sample: ChannelSample) {
        self.write().insert(name.into(), sample);
    }

    /// Overwrite several channels under a single lock acquisition, so a
    /// reader sees either none or all of them.
    pub fn put_many<I>(&self, samples: I) -> usize
    where
        I: IntoIterator<Item = (String, ChannelSample)>,
    {
        let mut map = self.write();
        let mut written = 0;
        for (name, sample) in samples {
            map.insert(name, sample);
            written += 1;
        }
        written
    }

    /// Latest sample for `name`, if one has been received.
    pub fn get(&self, name: &str) -> Option<ChannelSample> {
        self.read().get(name).copied()
    }

    /// Consistent copy of every channel.
    pub fn snapshot(&self) -> ChannelSnapshot {
        self.read().clone()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Drop every channel.
    pub fn clear(&self) {
        self.write().clear();
    }

    // Every mutation is a plain insert or clear, so a poisoned map is still
    // consistent.
    fn read(&self) -> std::sync::RwLockReadGuard<'_, ChannelSnapshot> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, ChannelSnapshot> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}
