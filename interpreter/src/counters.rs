use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

/// The named counters behind `COUNTER(name)`.
///
/// Every generation gets an empty registry unless the caller hands one in
/// through [`GenerateOptions::counters`](crate::GenerateOptions::counters);
/// clones share the same counts, so one registry can number a whole batch of
/// labels.
#[derive(Debug, Clone, Default)]
pub struct Counters(Arc<Mutex<HashMap<String, i64>>>);

impl Counters {
    pub fn new() -> Self {
        Counters::default()
    }

    /// Advance the counter called `name` and return its new value. The first
    /// call returns 1; `reset` sets the counter back to 0 instead.
    pub fn advance(&self, name: &str, reset: bool) -> i64 {
        let mut counts = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        let count = counts.entry(name.to_string()).or_insert(0);
        *count = if reset { 0 } else { count.saturating_add(1) };
        log::trace!("counter {name} = {count}");
        *count
    }
}
