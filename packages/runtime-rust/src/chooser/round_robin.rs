//! Round-robin selection with one cursor per service name.
//!
//! Cursors are monotonically increasing atomics stored in a `DashMap`. The
//! candidate index is the cursor reduced modulo the current list size, so a
//! list that shrinks between calls can never be indexed out of range.

use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashMap;
use lodestar_core::{ChooseError, ServiceChooser, ServiceDefinition};

#[derive(Debug, Default)]
pub struct RoundRobinServiceChooser {
    cursors: DashMap<String, AtomicUsize>,
}

impl RoundRobinServiceChooser {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cursor value and advances it by one.
    fn next_cursor(&self, service_name: &str) -> usize {
        if let Some(cursor) = self.cursors.get(service_name) {
            return cursor.fetch_add(1, Ordering::Relaxed);
        }
        self.cursors
            .entry(service_name.to_string())
            .or_default()
            .fetch_add(1, Ordering::Relaxed)
    }
}

impl ServiceChooser for RoundRobinServiceChooser {
    fn choose<'a>(
        &self,
        service_name: &str,
        candidates: &'a [ServiceDefinition],
    ) -> Result<&'a ServiceDefinition, ChooseError> {
        if candidates.is_empty() {
            return Err(ChooseError::NoCandidates {
                service: service_name.to_string(),
            });
        }
        let index = self.next_cursor(service_name) % candidates.len();
        Ok(&candidates[index])
    }
}
