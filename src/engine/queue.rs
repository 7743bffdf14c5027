use std::{collections::BTreeMap, rc::Rc};

use chrono::{DateTime, Utc};

use crate::{
    engine::Event,
    errors::{Error, Result},
};

/// Pending events, bucketed by time.
///
/// Events sharing a timestamp keep their insertion order and are always released
/// together by [`EventQueue::fetch_next_group`].
#[derive(Debug, Default)]
pub struct EventQueue {
    buckets: BTreeMap<DateTime<Utc>, Vec<Rc<dyn Event>>>,
    len: usize,
}

impl EventQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues an event after every event at the same or an earlier time.
    ///
    /// ### Returns
    /// False (and nothing is queued) if this very event instance is already queued.
    pub fn add(&mut self, event: Rc<dyn Event>) -> bool {
        let bucket = self.buckets.entry(event.time()).or_default();
        if bucket.iter().any(|e| Rc::ptr_eq(e, &event)) {
            return false;
        }
        bucket.push(event);
        self.len += 1;
        true
    }

    /// Returns true if this very event instance is queued.
    pub fn contains(&self, event: &Rc<dyn Event>) -> bool {
        self.buckets
            .get(&event.time())
            .is_some_and(|bucket| bucket.iter().any(|e| Rc::ptr_eq(e, event)))
    }

    /// Returns the number of queued events.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the earliest pending time.
    pub fn next_time(&self) -> Option<DateTime<Utc>> {
        self.buckets.first_key_value().map(|(time, _)| *time)
    }

    /// Removes and returns every event at the earliest pending time.
    ///
    /// ### Returns
    /// The shared timestamp with its events in insertion order, or [`Error::EmptyQueue`].
    pub fn fetch_next_group(&mut self) -> Result<(DateTime<Utc>, Vec<Rc<dyn Event>>)> {
        let (time, group) = self.buckets.pop_first().ok_or(Error::EmptyQueue)?;
        self.len -= group.len();
        Ok((time, group))
    }
}
