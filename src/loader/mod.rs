//! Dynamic module loading.
//!
//! The loader turns catalog metadata into running modules: it resolves each
//! module's library requirements against the shared pool, fetches the
//! module's code (unless the metadata carries it inline), links it into an
//! executable instance, and builds the module's API object. Failures are
//! isolated per module — one bad entry never sinks the batch, and a failing
//! host catalog is treated as an empty one.

pub mod dependencies;
pub mod dev;
mod source;

use std::sync::Arc;

use tracing::warn;

use crate::api::ApiFactory;
use crate::error::{AtriumError, AtriumResult};
use crate::metadata::{ModuleMetadata, ModuleState, ResolvedModule};

use dependencies::resolve_requirements;

pub use dependencies::{
    merge_dependencies, shared_library, DependencyMap, DependencyOptions, SharedLibrary,
};
pub use dev::{socket_target, DevChannelOptions};
pub use source::{
    CachePolicy, CatalogSource, CodeFetcher, HttpCatalogSource, HttpCodeFetcher, ModuleLinker,
};

/// Collaborators and the effective shared pool for a [`ModuleLoader`].
pub struct LoaderConfig {
    pub catalog: Arc<dyn CatalogSource>,

    pub fetcher: Arc<dyn CodeFetcher>,

    pub linker: Arc<dyn ModuleLinker>,

    /// Effective shared dependency pool, already merged via
    /// [`merge_dependencies`]. Immutable for the rest of the process.
    pub dependencies: DependencyMap,
}

/// Produces a [`ResolvedModule`] for every available [`ModuleMetadata`].
pub struct ModuleLoader {
    config: LoaderConfig,
    factory: Arc<ApiFactory>,
}

impl ModuleLoader {
    pub fn new(config: LoaderConfig, factory: Arc<ApiFactory>) -> Self {
        Self { config, factory }
    }

    /// Fetch the host catalog. A failure is tolerated as "no modules".
    pub async fn fetch_available(&self) -> Vec<ModuleMetadata> {
        match self.config.catalog.fetch_catalog().await {
            Ok(catalog) => catalog,
            Err(err) => {
                warn!(error = %err, "catalog fetch failed, continuing without modules");
                Vec::new()
            }
        }
    }

    /// Resolve, fetch, and link one module, and build its API object.
    ///
    /// `setup` is not called here; the host runs it inside its failure
    /// boundary.
    pub async fn load(
        &self,
        meta: ModuleMetadata,
        cache: CachePolicy,
    ) -> AtriumResult<ResolvedModule> {
        let libraries = resolve_requirements(&meta, &self.config.dependencies)?;

        let source = match &meta.content {
            Some(inline) => inline.clone(),
            None => self
                .config
                .fetcher
                .fetch(&meta.link, cache)
                .await
                .map_err(|err| AtriumError::Fetch {
                    module: meta.name.clone(),
                    reason: err.to_string(),
                })?,
        };

        let instance = self.config.linker.link(&meta, &source, &libraries)?;
        let api = self.factory.create_api(meta.clone());

        Ok(ResolvedModule {
            meta,
            api,
            instance,
            libraries,
            state: ModuleState::Loaded,
        })
    }

    /// Load every module the catalog lists, skipping (and logging) the ones
    /// that fail.
    pub async fn load_available(&self) -> Vec<ResolvedModule> {
        let catalog = self.fetch_available().await;
        self.load_batch(catalog).await
    }

    /// Load a known batch of metadata with per-module failure isolation.
    pub async fn load_batch(&self, catalog: Vec<ModuleMetadata>) -> Vec<ResolvedModule> {
        let mut modules = Vec::with_capacity(catalog.len());

        for meta in catalog {
            let name = meta.name.clone();
            match self.load(meta, CachePolicy::Default).await {
                Ok(module) => modules.push(module),
                Err(err) => {
                    warn!(module = %name, error = %err, "module load failed, skipping");
                }
            }
        }

        modules
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use std::sync::atomic::Ordering;
    use std::sync::Mutex;

    #[tokio::test]
    async fn catalog_failure_yields_empty_batch() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let (loader, _) = loader_with(
            Err(AtriumError::Catalog("down".to_string())),
            DependencyMap::new(),
            &log,
        );

        let modules = loader.load_available().await;
        assert!(modules.is_empty());
    }

    #[tokio::test]
    async fn unresolved_requirement_skips_only_that_module() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let catalog = vec![
            ModuleMetadata::new("good", "1.0.0", "https://cdn.test/good.js"),
            ModuleMetadata::new("bad", "1.0.0", "https://cdn.test/bad.js")
                .with_requirement("missing"),
        ];
        let (loader, _) = loader_with(Ok(catalog), DependencyMap::new(), &log);

        let modules = loader.load_available().await;
        assert_eq!(modules.len(), 1);
        assert_eq!(modules[0].meta.name, "good");
        assert_eq!(modules[0].state, ModuleState::Loaded);
    }

    #[tokio::test]
    async fn inline_content_skips_the_code_fetch() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let catalog = vec![ModuleMetadata::new("inline", "1.0.0", "").with_content("local-source")];
        let (loader, fetcher) = loader_with(Ok(catalog), DependencyMap::new(), &log);

        let modules = loader.load_available().await;
        assert_eq!(modules.len(), 1);
        assert_eq!(fetcher.fetches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn resolved_module_carries_its_library_bindings() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut pool = DependencyMap::new();
        pool.insert("http".to_string(), shared_library(7_i32));
        pool.insert("render".to_string(), shared_library(8_i32));

        let catalog =
            vec![ModuleMetadata::new("app", "1.0.0", "https://cdn.test/app.js")
                .with_requirement("http")];
        let (loader, _) = loader_with(Ok(catalog), pool, &log);

        let modules = loader.load_available().await;
        assert_eq!(modules[0].libraries.len(), 1);
        assert!(modules[0].libraries.contains_key("http"));
    }

    #[tokio::test]
    async fn fetch_errors_are_wrapped_with_the_module_name() {
        struct RefusingFetcher;

        #[async_trait::async_trait]
        impl CodeFetcher for RefusingFetcher {
            async fn fetch(&self, _url: &str, _cache: CachePolicy) -> AtriumResult<String> {
                Err(AtriumError::Catalog("boom".to_string()))
            }
        }

        let log = Arc::new(Mutex::new(Vec::new()));
        let store = crate::state::StateStore::new(crate::state::GlobalState::default());
        let factory = Arc::new(ApiFactory::new(store, Vec::new()));
        let loader = ModuleLoader::new(
            LoaderConfig {
                catalog: Arc::new(FakeCatalog { entries: Ok(vec![]) }),
                fetcher: Arc::new(RefusingFetcher),
                linker: Arc::new(FakeLinker { log }),
                dependencies: DependencyMap::new(),
            },
            factory,
        );

        let err = match loader
            .load(
                ModuleMetadata::new("broken", "1.0.0", "https://cdn.test/broken.js"),
                CachePolicy::Default,
            )
            .await
        {
            Ok(_) => panic!("load unexpectedly succeeded"),
            Err(err) => err,
        };

        match err {
            AtriumError::Fetch { module, .. } => assert_eq!(module, "broken"),
            other => panic!("unexpected error: {other}"),
        }
    }
}
