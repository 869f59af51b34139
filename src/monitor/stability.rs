use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Where a watched path stands on its way to "finished writing"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stability {
    /// Never observed
    Unseen,
    /// Observed, but its size changed within the stability window
    Growing,
    /// Same size for at least the stability window
    Stable,
}

#[derive(Debug, Clone, Copy)]
struct Observation {
    size: u64,
    /// When `size` was first seen; only moves forward
    changed_at: Instant,
}

/// Per-path size history used to guess when a file stopped growing
///
/// Owned by a single task; nothing here locks.
#[derive(Debug)]
pub struct StabilityTracker {
    stable_after: Duration,
    entries: HashMap<PathBuf, Observation>,
}

impl StabilityTracker {
    /// Create a tracker that calls a path stable after `stable_after` without change
    pub fn new(stable_after: Duration) -> Self {
        Self {
            stable_after,
            entries: HashMap::new(),
        }
    }

    /// Record `size` for `path` at `now` and return the resulting state
    pub fn observe(&mut self, path: &Path, size: u64, now: Instant) -> Stability {
        match self.entries.get_mut(path) {
            None => {
                self.entries.insert(
                    path.to_path_buf(),
                    Observation {
                        size,
                        changed_at: now,
                    },
                );
                Stability::Growing
            }
            Some(seen) if seen.size != size => {
                seen.size = size;
                seen.changed_at = seen.changed_at.max(now);
                Stability::Growing
            }
            Some(seen) => Self::classify(seen, self.stable_after, now),
        }
    }

    /// Record every part of a multi-part group; stable only if each part is
    ///
    /// All parts are observed even once one is known to be growing, so each
    /// part's clock keeps running. An empty group is [`Stability::Unseen`].
    pub fn observe_group(&mut self, parts: &[(PathBuf, u64)], now: Instant) -> Stability {
        if parts.is_empty() {
            return Stability::Unseen;
        }

        let mut all_stable = true;
        for (path, size) in parts {
            if self.observe(path, *size, now) != Stability::Stable {
                all_stable = false;
            }
        }

        if all_stable {
            Stability::Stable
        } else {
            Stability::Growing
        }
    }

    /// State of `path` at `now` without recording a new observation
    pub fn state_of(&self, path: &Path, now: Instant) -> Stability {
        match self.entries.get(path) {
            None => Stability::Unseen,
            Some(seen) => Self::classify(seen, self.stable_after, now),
        }
    }

    /// Drop the history for `path`; it starts over as unseen
    pub fn forget(&mut self, path: &Path) {
        self.entries.remove(path);
    }

    /// Drop the history for every path in `parts`
    pub fn forget_group<P: AsRef<Path>>(&mut self, parts: &[P]) {
        for part in parts {
            self.forget(part.as_ref());
        }
    }

    /// Keep only entries whose path satisfies `keep`
    pub fn retain(&mut self, mut keep: impl FnMut(&Path) -> bool) {
        self.entries.retain(|path, _| keep(path));
    }

    /// Number of tracked paths
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is tracked
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn classify(seen: &Observation, stable_after: Duration, now: Instant) -> Stability {
        if now.saturating_duration_since(seen.changed_at) >= stable_after {
            Stability::Stable
        } else {
            Stability::Growing
        }
    }
}
