//! Atrium - a runtime module host.
//!
//! Atrium lets a host application load independently-built modules at
//! runtime, hand each one an isolated extension of a shared API surface, and
//! let them read and write a common state store without corrupting each
//! other or crashing the host.
//!
//! # Architecture
//!
//! The library is organized into these main modules:
//!
//! - [`state`] - The immutable global state tree and its dispatch discipline
//! - [`api`] - Capability composition into per-module API objects
//! - [`loader`] - Catalog discovery, dependency resolution, code fetching,
//!   linking, and the development hot-swap channel
//! - [`host`] - The module host: boot, setup boundaries, hot-swap injection
//! - [`search`] - Concurrent search across registered providers
//! - [`containers`] - Per-instance private state slices with bound actions
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use atrium::loader::{HttpCatalogSource, HttpCodeFetcher, LoaderConfig, ModuleLoader};
//! use atrium::search::{SearchCapability, SearchConfig};
//! use atrium::{ApiFactory, GlobalState, ModuleHost, StateStore};
//!
//! let store = StateStore::new(GlobalState::default());
//! let factory = Arc::new(ApiFactory::new(store.clone(), vec![
//!     Arc::new(SearchCapability::new(SearchConfig::default())),
//!     Arc::new(atrium::containers::ContainersCapability),
//! ]));
//! let loader = ModuleLoader::new(LoaderConfig {
//!     catalog: Arc::new(HttpCatalogSource::new("https://feed.test/api/modules")),
//!     fetcher: Arc::new(HttpCodeFetcher::new()),
//!     linker,
//!     dependencies,
//! }, factory.clone());
//!
//! let host = Arc::new(ModuleHost::new(store, factory, loader));
//! host.boot().await;
//! ```

// Public modules
pub mod api;
pub mod containers;
pub mod host;
pub mod loader;
pub mod metadata;
pub mod search;
pub mod state;

// Internal modules
mod error;

// Re-export commonly used types for convenience
pub use api::{ApiFactory, Capability, ModuleApi};
pub use error::{AtriumError, AtriumResult};
pub use host::ModuleHost;
pub use metadata::{ModuleInstance, ModuleMetadata, ModuleState, ResolvedModule};
pub use search::{SearchProvider, SearchResult};
pub use state::{GlobalState, StateStore};
