//! Search state actions.
//!
//! These are the only writers of the `search` and `registry.search_providers`
//! namespaces. [`trigger_search`] is the fan-out entry point: it invokes
//! every eligible provider concurrently and appends each provider's batch as
//! it settles — first to finish, first appended.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use tracing::warn;

use crate::state::StateStore;

use super::{SearchOptions, SearchProviderRegistration, SearchResult, SearchResults, SearchState};

/// Cancels an in-flight search. Returned by [`trigger_search`].
///
/// Cancelling discards any still-pending provider settlements, asks every
/// provider in the active set to stop via `cancel()`, and settles the search
/// immediately with whatever results have accumulated. Triggers that started
/// nothing return an inert canceller.
pub struct SearchCanceller {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl SearchCanceller {
    fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    fn inert() -> Self {
        Self { cancel: None }
    }

    /// True when this canceller has nothing to cancel.
    pub fn is_inert(&self) -> bool {
        self.cancel.is_none()
    }

    pub fn cancel(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

/// Record the current query text without searching.
pub fn set_search_input(store: &Arc<StateStore>, input: &str) {
    let input = input.to_string();
    store.update(move |state| {
        let mut next = state.clone();
        next.search.input = input;
        next
    });
}

/// Replace the search namespace for a fresh query lifecycle.
pub fn reset_search_results(store: &Arc<StateStore>, input: &str, loading: bool) {
    let input = input.to_string();
    store.update(move |state| {
        let mut next = state.clone();
        next.search = SearchState {
            input,
            results: SearchResults {
                loading,
                items: Vec::new(),
            },
        };
        next
    });
}

/// Append one provider's batch to the accumulated results. `done` clears the
/// loading flag.
pub fn append_search_results(store: &Arc<StateStore>, items: Vec<SearchResult>, done: bool) {
    store.update(move |state| {
        let mut next = state.clone();
        next.search.results.loading = !done;
        next.search.results.items.extend(items);
        next
    });
}

/// Like [`append_search_results`], but ahead of the accumulated results.
pub fn prepend_search_results(store: &Arc<StateStore>, items: Vec<SearchResult>, done: bool) {
    store.update(move |state| {
        let mut next = state.clone();
        next.search.results.loading = !done;
        let mut combined = items;
        combined.extend(next.search.results.items.drain(..));
        next.search.results.items = combined;
        next
    });
}

/// Append a settlement unless the search was cancelled. The flag is
/// rechecked inside the update closure, so a settlement racing the
/// canceller on another thread cannot land after cancellation.
fn append_if_active(
    store: &Arc<StateStore>,
    active: &Arc<AtomicBool>,
    items: Vec<SearchResult>,
    done: bool,
) {
    let active = active.clone();
    store.update(move |state| {
        if !active.load(Ordering::SeqCst) {
            return state.clone();
        }
        let mut next = state.clone();
        next.search.results.loading = !done;
        next.search.results.items.extend(items);
        next
    });
}

/// Add a provider registration under its globally unique id.
///
/// Registration never affects an in-flight search.
pub fn register_search_provider(
    store: &Arc<StateStore>,
    name: &str,
    registration: SearchProviderRegistration,
) {
    let name = name.to_string();
    store.update(move |state| {
        let mut next = state.clone();
        next.registry.search_providers.insert(name, registration);
        next
    });
}

/// Remove a provider registration.
pub fn unregister_search_provider(store: &Arc<StateStore>, name: &str) {
    let name = name.to_string();
    store.update(move |state| {
        let mut next = state.clone();
        next.registry.search_providers.remove(&name);
        next
    });
}

/// Fan a query out to every eligible provider.
///
/// `query` defaults to the current input. Re-triggering the query that is
/// already loading is a no-op (an inert canceller is returned), so duplicate
/// identical in-flight searches cannot pile up.
///
/// Providers flagged `only_immediate` join the active set only when
/// `immediate` is true. With a non-empty query and a non-empty active set
/// the search enters its loading phase. A non-empty query with no eligible
/// providers resets the results without entering the loading phase. An
/// empty query instead calls `clear()` on every registered provider,
/// including ones outside the active set, and leaves the accumulated
/// results untouched.
///
/// Must be called from within a tokio runtime; provider futures run as
/// spawned tasks.
pub fn trigger_search(
    store: &Arc<StateStore>,
    query: Option<&str>,
    immediate: bool,
) -> SearchCanceller {
    let state = store.read();
    let input = &state.search.input;
    let loading = state.search.results.loading;
    let query = match query {
        Some(query) => query.to_string(),
        None => input.clone(),
    };

    if *input == query && loading {
        return SearchCanceller::inert();
    }

    let providers = &state.registry.search_providers;
    let active_set: Vec<(String, SearchProviderRegistration)> = providers
        .iter()
        .filter(|(_, registration)| !registration.only_immediate || immediate)
        .map(|(name, registration)| (name.clone(), registration.clone()))
        .collect();

    if query.is_empty() {
        set_search_input(store, &query);
        for registration in providers.values() {
            registration.provider.clear();
        }
        return SearchCanceller::inert();
    }

    if active_set.is_empty() {
        reset_search_results(store, &query, false);
        return SearchCanceller::inert();
    }

    reset_search_results(store, &query, true);

    let active = Arc::new(AtomicBool::new(true));
    let remaining = Arc::new(AtomicUsize::new(active_set.len()));
    let options = Arc::new(SearchOptions {
        query,
        immediate,
    });

    for (name, registration) in &active_set {
        let store = store.clone();
        let active = active.clone();
        let remaining = remaining.clone();
        let options = options.clone();
        let name = name.clone();
        let provider = registration.provider.clone();

        tokio::spawn(async move {
            match provider.search(&options).await {
                Ok(items) => {
                    if active.load(Ordering::SeqCst) {
                        let done = remaining.fetch_sub(1, Ordering::SeqCst) == 1;
                        append_if_active(&store, &active, items, done);
                    }
                }
                Err(err) => {
                    warn!(provider = %name, error = %err, "search provider failed");
                    if active.load(Ordering::SeqCst)
                        && remaining.fetch_sub(1, Ordering::SeqCst) == 1
                    {
                        append_if_active(&store, &active, Vec::new(), true);
                    }
                }
            }
        });
    }

    let cancel_store = store.clone();
    let cancel_set: Vec<Arc<dyn super::SearchProvider>> = active_set
        .iter()
        .map(|(_, registration)| registration.provider.clone())
        .collect();

    SearchCanceller::new(move || {
        active.store(false, Ordering::SeqCst);
        for provider in &cancel_set {
            provider.cancel();
        }
        append_search_results(&cancel_store, Vec::new(), true);
    })
}
