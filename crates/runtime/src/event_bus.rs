use std::collections::VecDeque;

/// One recorded event, tagged with the frame it happened in.
#[derive(Debug, Clone, PartialEq)]
pub struct Event<K> {
    pub frame_index: u64,
    pub kind: K,
}

/// Bounded in-memory event log for traceability.
///
/// Keeps at most `limit` events; the oldest are dropped first so a
/// long-running page never grows the log without bound.
#[derive(Debug)]
pub struct EventBus<K> {
    events: VecDeque<Event<K>>,
    limit: usize,
    dropped: u64,
}

impl<K> Default for EventBus<K> {
    fn default() -> Self {
        Self::with_limit(1024)
    }
}

impl<K> EventBus<K> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limit(limit: usize) -> Self {
        Self {
            events: VecDeque::new(),
            limit: limit.max(1),
            dropped: 0,
        }
    }

    pub fn emit(&mut self, frame_index: u64, kind: K) {
        if self.events.len() == self.limit {
            self.events.pop_front();
            self.dropped += 1;
        }
        self.events.push_back(Event { frame_index, kind });
    }

    pub fn events(&self) -> impl Iterator<Item = &Event<K>> {
        self.events.iter()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Number of events discarded because the log was full.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn drain(&mut self) -> Vec<Event<K>> {
        self.events.drain(..).collect()
    }
}
