//! Shared state of an in-flight session search.

use std::sync::{Mutex, MutexGuard, PoisonError};

use lobbyforge_protocol::{SessionDescriptor, SessionSearchParams};

/// A search request and the results a provider fills in for it.
///
/// The orchestrator creates one per find call and hands the provider an
/// `Arc` to it. The provider writes the results before sending
/// [`ProviderCompletion::Find`](crate::ProviderCompletion::Find); the
/// orchestrator reads them when that completion is handled.
#[derive(Debug)]
pub struct SearchState {
    params: SessionSearchParams,
    results: Mutex<Vec<SessionDescriptor>>,
}

impl SearchState {
    pub fn new(params: SessionSearchParams) -> Self {
        Self {
            params,
            results: Mutex::new(Vec::new()),
        }
    }

    pub fn params(&self) -> &SessionSearchParams {
        &self.params
    }

    /// Replaces the result set. Entries past `max_results` are dropped.
    pub fn set_results(&self, mut results: Vec<SessionDescriptor>) {
        results.truncate(self.params.max_results as usize);
        *self.lock() = results;
    }

    /// Returns a snapshot of the current results.
    pub fn results(&self) -> Vec<SessionDescriptor> {
        self.lock().clone()
    }

    pub fn result_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<SessionDescriptor>> {
        // A panic while holding this lock can only leave a half-written
        // Vec, which is still a valid Vec.
        self.results.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
