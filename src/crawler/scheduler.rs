//! Frontier scheduler for a single crawl job
//!
//! This module handles:
//! - The ordered queue of `(url, depth)` pairs awaiting processing
//! - The visited set that guarantees a URL is yielded at most once
//! - The depth ceiling applied to every enqueued pair
//! - Priority insertion at the head of the queue for advised URLs
//!
//! Discovered links are processed breadth-first in insertion order. Priority
//! URLs jump the queue: each priority batch keeps its own order and is placed
//! in front of everything already queued, so the most recent batch is served
//! first. This is the one deliberate departure from plain BFS.

use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use url::Url;

/// A URL waiting in the frontier together with its distance from the root
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrontierEntry {
    pub url: Url,
    pub depth: u32,
}

impl FrontierEntry {
    pub fn new(url: Url, depth: u32) -> Self {
        Self { url, depth }
    }
}

/// Scheduler owning a job's frontier queue and visited set
#[derive(Debug, Clone)]
pub struct FrontierScheduler {
    /// Deepest level that may enter the queue (root is depth 0)
    max_depth: u32,

    /// Pairs awaiting processing, front is served first
    queue: VecDeque<FrontierEntry>,

    /// URLs currently in `queue`
    queued: HashSet<String>,

    /// URLs already handed out by `next`; never shrinks
    visited: HashSet<String>,

    /// Number of URLs handed out whose pipeline has not finished
    in_flight: usize,
}

impl FrontierScheduler {
    pub fn new(max_depth: u32) -> Self {
        Self {
            max_depth,
            queue: VecDeque::new(),
            queued: HashSet::new(),
            visited: HashSet::new(),
            in_flight: 0,
        }
    }

    /// Initializes the frontier with the root URL at depth 0
    ///
    /// Seeding is a no-op once the crawl has made progress, so a resumed job
    /// keeps its frontier untouched.
    ///
    /// # Returns
    ///
    /// `true` if the root was queued
    pub fn seed(&mut self, root: Url) -> bool {
        if !self.visited.is_empty() || !self.queue.is_empty() {
            return false;
        }
        self.queued.insert(root.as_str().to_string());
        self.queue.push_back(FrontierEntry::new(root, 0));
        true
    }

    /// Removes the earliest queued, unvisited pair and marks it visited
    ///
    /// The pair counts as in flight until [`FrontierScheduler::finish`] is
    /// called for it.
    pub fn next(&mut self) -> Option<FrontierEntry> {
        while let Some(entry) = self.queue.pop_front() {
            let key = entry.url.as_str().to_string();
            self.queued.remove(&key);

            if self.visited.insert(key) {
                self.in_flight += 1;
                return Some(entry);
            }
            tracing::trace!("Skipping already visited {}", entry.url);
        }
        None
    }

    /// Marks the pipeline of the last yielded URL as finished
    pub fn finish(&mut self) {
        self.in_flight = self.in_flight.saturating_sub(1);
    }

    /// Appends newly discovered URLs at `depth`
    ///
    /// URLs already visited or queued are ignored, as is the whole batch when
    /// `depth` exceeds the ceiling.
    ///
    /// # Returns
    ///
    /// The number of URLs added
    pub fn enqueue_discovered<I>(&mut self, urls: I, depth: u32) -> usize
    where
        I: IntoIterator<Item = Url>,
    {
        if depth > self.max_depth {
            return 0;
        }

        let mut added = 0;
        for url in urls {
            let key = url.as_str().to_string();
            if self.visited.contains(&key) || self.queued.contains(&key) {
                continue;
            }
            self.queued.insert(key);
            self.queue.push_back(FrontierEntry::new(url, depth));
            added += 1;
        }
        added
    }

    /// Inserts URLs at the head of the queue
    ///
    /// The batch keeps its internal order and lands in front of everything
    /// already queued. A URL that was already queued is moved to the head and
    /// keeps the smaller of its two depths.
    ///
    /// # Returns
    ///
    /// The number of URLs placed at the head
    pub fn enqueue_priority<I>(&mut self, urls: I, depth: u32) -> usize
    where
        I: IntoIterator<Item = Url>,
    {
        if depth > self.max_depth {
            return 0;
        }

        let mut batch: Vec<FrontierEntry> = Vec::new();
        let mut in_batch = HashSet::new();

        for url in urls {
            let key = url.as_str().to_string();
            if self.visited.contains(&key) || !in_batch.insert(key.clone()) {
                continue;
            }

            let mut entry_depth = depth;
            if self.queued.contains(&key) {
                if let Some(pos) = self.queue.iter().position(|e| e.url.as_str() == key) {
                    if let Some(existing) = self.queue.remove(pos) {
                        entry_depth = entry_depth.min(existing.depth);
                    }
                }
            }

            self.queued.insert(key);
            batch.push(FrontierEntry::new(url, entry_depth));
        }

        let added = batch.len();
        for entry in batch.into_iter().rev() {
            self.queue.push_front(entry);
        }
        added
    }

    /// True once nothing is queued and no pipeline is in flight
    pub fn is_exhausted(&self) -> bool {
        self.queue.is_empty() && self.in_flight == 0
    }

    /// Returns the number of queued pairs
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    pub fn max_depth(&self) -> u32 {
        self.max_depth
    }

    pub fn is_visited(&self, url: &Url) -> bool {
        self.visited.contains(url.as_str())
    }

    pub fn visited_count(&self) -> usize {
        self.visited.len()
    }

    /// Visited URLs in no particular order
    pub fn visited(&self) -> impl Iterator<Item = &str> {
        self.visited.iter().map(String::as_str)
    }

    /// Queued pairs in service order
    pub fn pending(&self) -> impl Iterator<Item = &FrontierEntry> {
        self.queue.iter()
    }
}
