//! LRU cache for rendered dot tiles.
//!
//! Rendered tile bytes are keyed by tile coordinates and stamped with the
//! data state they were computed from. A lookup is a hit only while that
//! state still matches; a stale entry is dropped on the spot so the renderer
//! regenerates it. An atomic counter tracks in-flight renders, letting the
//! map layer observe "still generating" without polling.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use super::tile::TileCoordinates;

/// The inputs a rendered tile was computed from. A tile is reusable only
/// while all three still match the live store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileDataState {
    pub incident_id: i64,
    pub tile_case_count: i64,
    pub incident_case_count: i64,
}

/// Rendered tile bytes plus the state stamp.
#[derive(Debug, Clone)]
pub struct RenderedTile {
    pub data: Vec<u8>,
    pub state: TileDataState,
}

struct Entry {
    tile: RenderedTile,
    accessed_tick: u64,
}

struct Inner {
    entries: HashMap<TileCoordinates, Entry>,
    tick: u64,
    hits: u64,
    misses: u64,
}

/// Cache counters, for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileCacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
}

pub struct TileCache {
    inner: Mutex<Inner>,
    capacity: usize,
    rendering: AtomicUsize,
}

pub const DEFAULT_TILE_CAPACITY: usize = 128;

impl Default for TileCache {
    fn default() -> Self {
        Self::new(DEFAULT_TILE_CAPACITY)
    }
}

impl TileCache {
    /// A zero capacity is bumped to one so `put` always retains something.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                tick: 0,
                hits: 0,
                misses: 0,
            }),
            capacity: capacity.max(1),
            rendering: AtomicUsize::new(0),
        }
    }

    /// Returns the cached bytes when present and still computed from
    /// `current` state. A state mismatch evicts the entry and reports a miss.
    #[must_use]
    pub fn get(&self, coords: TileCoordinates, current: &TileDataState) -> Option<Vec<u8>> {
        let mut inner = self.lock_inner();
        inner.tick += 1;
        let tick = inner.tick;
        let data = match inner.entries.get_mut(&coords) {
            Some(entry) if entry.tile.state == *current => {
                entry.accessed_tick = tick;
                Some(entry.tile.data.clone())
            }
            Some(_) => {
                inner.entries.remove(&coords);
                None
            }
            None => None,
        };
        if data.is_some() {
            inner.hits += 1;
        } else {
            inner.misses += 1;
        }
        data
    }

    pub fn put(&self, coords: TileCoordinates, tile: RenderedTile) {
        let mut inner = self.lock_inner();
        inner.tick += 1;
        let tick = inner.tick;
        inner.entries.insert(
            coords,
            Entry {
                tile,
                accessed_tick: tick,
            },
        );
        while inner.entries.len() > self.capacity {
            let Some(oldest) = inner
                .entries
                .iter()
                .min_by_key(|(_, e)| e.accessed_tick)
                .map(|(k, _)| *k)
            else {
                break;
            };
            inner.entries.remove(&oldest);
            tracing::trace!(x = oldest.x, y = oldest.y, zoom = oldest.zoom, "evicted tile");
        }
    }

    /// Drops every entry, e.g. when the selected incident changes.
    pub fn clear(&self) {
        self.lock_inner().entries.clear();
    }

    #[must_use]
    pub fn stats(&self) -> TileCacheStats {
        let inner = self.lock_inner();
        TileCacheStats {
            entries: inner.entries.len(),
            hits: inner.hits,
            misses: inner.misses,
        }
    }

    /// Marks one render as in flight until the guard drops.
    #[must_use]
    pub fn begin_render(&self) -> RenderGuard<'_> {
        self.rendering.fetch_add(1, Ordering::SeqCst);
        RenderGuard { cache: self }
    }

    /// Number of renders currently in flight.
    #[must_use]
    pub fn rendering_count(&self) -> usize {
        self.rendering.load(Ordering::SeqCst)
    }

    fn lock_inner(&self) -> std::sync::MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            // Entry state is revalidated on every read.
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

pub struct RenderGuard<'a> {
    cache: &'a TileCache,
}

impl Drop for RenderGuard<'_> {
    fn drop(&mut self) {
        self.cache.rendering.fetch_sub(1, Ordering::SeqCst);
    }
}
