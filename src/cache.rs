//! Page caches.
//!
//! Every scope stores sealed pages in a [`PageCache`]. The session's default
//! cache is bounded: once it holds more than `max_pages_per_session` pages
//! the pages stored earliest are evicted first. Page ids are handed out when
//! rendering starts, so a slow response can be stored after a faster one
//! with a higher id; eviction follows storage order, not id order. The
//! user-session and application
//! caches are unbounded and only shrink through explicit removal.
//!
//! Pages are stored behind `Arc` and never mutated after insertion, so a
//! reader always sees either the whole page or nothing.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::state::{Page, State};

/// A map from page id to sealed page, optionally bounded.
#[derive(Debug)]
pub struct PageCache {
    capacity: Option<usize>,
    pages: RwLock<Pages>,
}

#[derive(Debug, Default)]
struct Pages {
    by_id: BTreeMap<u64, Arc<Page>>,
    /// Page ids in storage order, oldest first
    stored: VecDeque<u64>,
}

impl Pages {
    fn forget_removed(&mut self) {
        let by_id = &self.by_id;
        self.stored.retain(|id| by_id.contains_key(id));
    }
}

impl PageCache {
    /// Creates a cache that retains at most `capacity` pages.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is 0.
    pub fn bounded(capacity: usize) -> Self {
        assert!(capacity > 0, "capacity must be greater than 0");
        Self {
            capacity: Some(capacity),
            pages: RwLock::new(Pages::default()),
        }
    }

    /// Creates a cache with no automatic eviction.
    pub fn unbounded() -> Self {
        Self {
            capacity: None,
            pages: RwLock::new(Pages::default()),
        }
    }

    /// Returns the retention bound, if any.
    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    /// Stores a sealed page and returns its id.
    ///
    /// On a bounded cache the pages stored earliest are dropped, one at a
    /// time, until the count is back within bound. The page just stored is
    /// never the one dropped.
    pub fn put(&self, page: Arc<Page>) -> u64 {
        let page_id = page.id();
        let mut pages = self.pages.write();
        if pages.by_id.insert(page_id, page).is_some() {
            pages.stored.retain(|id| *id != page_id);
        }
        pages.stored.push_back(page_id);

        if let Some(capacity) = self.capacity {
            while pages.by_id.len() > capacity {
                let Some(evicted) = pages.stored.pop_front() else {
                    break;
                };
                if pages.by_id.remove(&evicted).is_some() {
                    tracing::debug!(page_id = evicted, capacity, "evicted page from cache");
                }
            }
        }
        page_id
    }

    /// Returns a state of a cached page.
    pub fn get(&self, page_id: u64, state_index: usize) -> Option<Arc<State>> {
        self.pages
            .read()
            .by_id
            .get(&page_id)
            .and_then(|page| page.state(state_index).cloned())
    }

    /// Returns a cached page.
    pub fn page(&self, page_id: u64) -> Option<Arc<Page>> {
        self.pages.read().by_id.get(&page_id).cloned()
    }

    /// Returns true if the page is cached.
    pub fn contains(&self, page_id: u64) -> bool {
        self.pages.read().by_id.contains_key(&page_id)
    }

    /// Removes one page. Returns true if it was present.
    pub fn remove(&self, page_id: u64) -> bool {
        let mut pages = self.pages.write();
        let removed = pages.by_id.remove(&page_id).is_some();
        if removed {
            pages.forget_removed();
        }
        removed
    }

    /// Removes every page tagged with `flow_id` and returns how many were removed.
    pub fn remove_flow(&self, flow_id: &str) -> usize {
        let mut pages = self.pages.write();
        let before = pages.by_id.len();
        pages.by_id.retain(|_, page| !page.belongs_to_flow(flow_id));
        let removed = before - pages.by_id.len();
        if removed > 0 {
            pages.forget_removed();
            tracing::debug!(flow_id, removed, "removed flow pages from cache");
        }
        removed
    }

    /// Drops every page.
    pub fn clear(&self) {
        let mut pages = self.pages.write();
        pages.by_id.clear();
        pages.stored.clear();
    }

    /// Returns the number of retained pages.
    pub fn len(&self) -> usize {
        self.pages.read().by_id.len()
    }

    /// Returns true if no page is retained.
    pub fn is_empty(&self) -> bool {
        self.pages.read().by_id.is_empty()
    }

    /// Returns the retained page ids in ascending order.
    pub fn page_ids(&self) -> Vec<u64> {
        self.pages.read().by_id.keys().copied().collect()
    }
}
