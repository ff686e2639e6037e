// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! At-most-once tracking of capture paths
//!
//! Every path moves `Unseen -> Processing -> Processed` and never goes back.
//! Two registries are provided: an unbounded set that remembers every path
//! for the life of the process, and an LRU-bounded set for long-running
//! watchers where forgetting very old paths is acceptable.

use lru::LruCache;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathState {
    Unseen,
    Processing,
    Processed,
}

/// Shared registry of path states
pub trait PathRegistry: Send + Sync {
    fn state(&self, path: &Path) -> PathState;

    /// Move an unseen path to `Processing`. Returns false for any path
    /// already known, which makes the caller's event a no-op.
    fn claim(&self, path: &Path) -> bool;

    /// Mark a path as terminally handled, whatever the outcome was
    fn complete(&self, path: &Path);

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Unbounded registry; grows monotonically
#[derive(Debug, Default)]
pub struct ProcessedPathSet {
    states: Mutex<HashMap<PathBuf, PathState>>,
}

impl ProcessedPathSet {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PathRegistry for ProcessedPathSet {
    fn state(&self, path: &Path) -> PathState {
        lock(&self.states).get(path).copied().unwrap_or(PathState::Unseen)
    }

    fn claim(&self, path: &Path) -> bool {
        let mut states = lock(&self.states);
        if states.contains_key(path) {
            debug!("Ignoring repeat event for {:?}", path);
            return false;
        }
        states.insert(path.to_path_buf(), PathState::Processing);
        true
    }

    fn complete(&self, path: &Path) {
        lock(&self.states).insert(path.to_path_buf(), PathState::Processed);
    }

    fn len(&self) -> usize {
        lock(&self.states).len()
    }
}

/// Registry that remembers at most `capacity` paths.
///
/// The least recently touched path is evicted when full and reads as
/// `Unseen` again afterwards.
pub struct BoundedPathSet {
    states: Mutex<LruCache<PathBuf, PathState>>,
}

impl BoundedPathSet {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            states: Mutex::new(LruCache::new(capacity)),
        }
    }
}

impl PathRegistry for BoundedPathSet {
    fn state(&self, path: &Path) -> PathState {
        lock(&self.states).peek(path).copied().unwrap_or(PathState::Unseen)
    }

    fn claim(&self, path: &Path) -> bool {
        let mut states = lock(&self.states);
        if states.contains(path) {
            debug!("Ignoring repeat event for {:?}", path);
            return false;
        }
        if let Some((evicted, _)) = states.push(path.to_path_buf(), PathState::Processing) {
            debug!("Evicted {:?} from processed-path registry", evicted);
        }
        true
    }

    fn complete(&self, path: &Path) {
        let mut states = lock(&self.states);
        match states.get_mut(path) {
            Some(state) => *state = PathState::Processed,
            None => {
                states.put(path.to_path_buf(), PathState::Processed);
            }
        }
    }

    fn len(&self) -> usize {
        lock(&self.states).len()
    }
}

/// Build the registry selected by `watch.dedup_capacity`
pub fn registry_for(capacity: Option<usize>) -> Arc<dyn PathRegistry> {
    match capacity.and_then(NonZeroUsize::new) {
        Some(cap) => Arc::new(BoundedPathSet::new(cap)),
        None => Arc::new(ProcessedPathSet::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn walk_state_machine(registry: &dyn PathRegistry) {
        let path = Path::new("/shots/capture1.png");
        assert_eq!(registry.state(path), PathState::Unseen);

        assert!(registry.claim(path));
        assert_eq!(registry.state(path), PathState::Processing);
        assert!(!registry.claim(path));

        registry.complete(path);
        assert_eq!(registry.state(path), PathState::Processed);
        assert!(!registry.claim(path));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_unbounded_state_machine() {
        walk_state_machine(&ProcessedPathSet::new());
    }

    #[test]
    fn test_bounded_state_machine() {
        walk_state_machine(&BoundedPathSet::new(NonZeroUsize::new(8).unwrap()));
    }

    #[test]
    fn test_bounded_evicts_least_recent() {
        let registry = BoundedPathSet::new(NonZeroUsize::new(2).unwrap());
        let (a, b, c) = (Path::new("a.png"), Path::new("b.png"), Path::new("c.png"));

        assert!(registry.claim(a));
        assert!(registry.claim(b));
        assert!(registry.claim(c));

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.state(a), PathState::Unseen);
        assert_eq!(registry.state(c), PathState::Processing);
    }

    #[test]
    fn test_complete_without_claim_is_terminal() {
        let registry = ProcessedPathSet::new();
        let path = Path::new("dropped.png");
        registry.complete(path);
        assert_eq!(registry.state(path), PathState::Processed);
        assert!(!registry.claim(path));
    }

    #[test]
    fn test_registry_for_selects_implementation() {
        let unbounded = registry_for(None);
        let bounded = registry_for(Some(1));
        for i in 0..3 {
            let path = PathBuf::from(format!("{i}.png"));
            unbounded.claim(&path);
            bounded.claim(&path);
        }
        assert_eq!(unbounded.len(), 3);
        assert_eq!(bounded.len(), 1);
    }

    #[test]
    fn test_concurrent_claims_admit_one() {
        let registry = Arc::new(ProcessedPathSet::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                std::thread::spawn(move || registry.claim(Path::new("race.png")))
            })
            .collect();
        let admitted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|claimed| *claimed)
            .count();
        assert_eq!(admitted, 1);
    }
}
