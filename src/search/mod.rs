//! Concurrent search across independently registered providers.
//!
//! Each module may register any number of named search providers. A trigger
//! fans the query out to every eligible provider concurrently and appends
//! results as providers settle; a failing provider contributes nothing and
//! never fails the search. The whole lifecycle lives in the `search` and
//! `registry` namespaces of [`GlobalState`](crate::state::GlobalState).

pub mod actions;

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::api::{scoped_name, ApiExtensions, Capability, ModuleApi};
use crate::metadata::BoxError;
use crate::state::StateStore;

pub use actions::{set_search_input, trigger_search, SearchCanceller};

/// One search hit. Opaque to the core; the rendering collaborator decides
/// how to present it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,

    /// Provider-specific payload.
    #[serde(default)]
    pub data: Value,
}

impl SearchResult {
    pub fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            subtitle: None,
            data: Value::Null,
        }
    }

    pub fn with_subtitle(mut self, subtitle: &str) -> Self {
        self.subtitle = Some(subtitle.to_string());
        self
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }
}

/// The `search` namespace: current input plus accumulated results.
#[derive(Clone, Default)]
pub struct SearchState {
    pub input: String,
    pub results: SearchResults,
}

#[derive(Clone, Default)]
pub struct SearchResults {
    /// True from trigger until every provider in the active set has settled
    /// (or the search was cancelled).
    pub loading: bool,
    pub items: Vec<SearchResult>,
}

/// The `registry` namespace: provider registrations keyed by globally unique
/// id (`module#key`, or `global-N` for app-shell providers).
#[derive(Clone, Default)]
pub struct RegistryState {
    pub search_providers: HashMap<String, SearchProviderRegistration>,
}

/// Query options handed to each provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchOptions {
    pub query: String,
    pub immediate: bool,
}

/// A source of search results.
///
/// `search` may take as long as it likes; the orchestrator imposes no
/// timeout, so a provider that never settles is the provider's own problem.
/// `cancel` is a cooperative stop request for an in-flight search; `clear`
/// asks the provider to drop any internal result state (sent when the query
/// becomes empty).
#[async_trait]
pub trait SearchProvider: Send + Sync {
    async fn search(&self, options: &SearchOptions) -> Result<Vec<SearchResult>, BoxError>;

    fn cancel(&self) {}

    fn clear(&self) {}
}

/// A provider plus its registration settings, as stored in the registry
/// namespace.
#[derive(Clone)]
pub struct SearchProviderRegistration {
    /// Name of the module that registered this provider; `None` for
    /// app-shell providers.
    pub owner: Option<String>,

    /// Only participate in searches triggered with `immediate = true`.
    pub only_immediate: bool,

    pub provider: Arc<dyn SearchProvider>,
}

/// Registration settings a module may pass alongside a provider.
#[derive(Debug, Clone, Copy, Default)]
pub struct SearchSettings {
    pub only_immediate: bool,
}

/// An app-shell provider configured before any module loads.
pub struct InitialSearchProvider {
    pub provider: Arc<dyn SearchProvider>,
    pub settings: SearchSettings,
}

/// Configuration for the search capability.
#[derive(Default)]
pub struct SearchConfig {
    /// Providers supplied by the app shell, registered as `global-N`.
    pub providers: Vec<InitialSearchProvider>,

    /// Initial results shown before the first search.
    pub results: Vec<SearchResult>,

    /// Initial query text.
    pub query: String,
}

/// The search capability: seeds the `search` and `registry` namespaces and
/// gives every module a [`SearchApi`].
pub struct SearchCapability {
    config: SearchConfig,
}

impl SearchCapability {
    pub fn new(config: SearchConfig) -> Self {
        Self { config }
    }
}

impl Capability for SearchCapability {
    fn init(&self, store: &Arc<StateStore>) {
        let providers: HashMap<String, SearchProviderRegistration> = self
            .config
            .providers
            .iter()
            .enumerate()
            .map(|(i, initial)| {
                (
                    format!("global-{i}"),
                    SearchProviderRegistration {
                        owner: None,
                        only_immediate: initial.settings.only_immediate,
                        provider: initial.provider.clone(),
                    },
                )
            })
            .collect();
        let input = self.config.query.clone();
        let items = self.config.results.clone();

        store.update(move |state| {
            let mut next = state.clone();
            next.registry.search_providers = providers;
            next.search = SearchState {
                input,
                results: SearchResults {
                    loading: false,
                    items,
                },
            };
            next
        });
    }

    fn extend(&self, api: &ModuleApi, out: &mut ApiExtensions) {
        out.insert(SearchApi {
            store: api.store().clone(),
            owner: api.meta().name.clone(),
            next: AtomicUsize::new(0),
        });
    }
}

/// Per-module search operations.
pub struct SearchApi {
    store: Arc<StateStore>,
    owner: String,
    /// Numbers anonymous registrations; private to this module.
    next: AtomicUsize,
}

impl SearchApi {
    /// Register a provider under `module#name`. Passing `None` draws a fresh
    /// number from this module's counter. Returns the global id.
    pub fn register_search_provider(
        &self,
        name: Option<&str>,
        provider: Arc<dyn SearchProvider>,
        settings: SearchSettings,
    ) -> String {
        let key = match name {
            Some(name) => name.to_string(),
            None => self.next.fetch_add(1, Ordering::Relaxed).to_string(),
        };
        let id = scoped_name(&self.owner, key);

        actions::register_search_provider(
            &self.store,
            &id,
            SearchProviderRegistration {
                owner: Some(self.owner.clone()),
                only_immediate: settings.only_immediate,
                provider,
            },
        );

        id
    }

    /// Remove the provider this module registered under `name`.
    pub fn unregister_search_provider(&self, name: &str) {
        actions::unregister_search_provider(&self.store, &scoped_name(&self.owner, name));
    }
}
