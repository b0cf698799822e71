//! Module host - owns the store, the API pipeline, and the module list.
//!
//! The host is responsible for:
//! - Running every capability's one-time `init` at boot
//! - Loading all catalog modules through the [`ModuleLoader`]
//! - Calling each module's `setup` inside a failure boundary
//! - Superseding modules on hot-swap injection
//! - Publishing the installed module list into [`GlobalState`]
//!
//! A module whose `setup` returns an error or panics is marked
//! [`ModuleState::Failed`] and left in place; the host and all sibling
//! modules keep running.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex};

use tracing::{error, info};

use crate::api::ApiFactory;
use crate::error::AtriumResult;
use crate::loader::{CachePolicy, DevChannelOptions, ModuleLoader};
use crate::metadata::{ModuleMetadata, ModuleState, ResolvedModule};
use crate::state::StateStore;

/// The application shell that loads modules and owns the state store.
pub struct ModuleHost {
    store: Arc<StateStore>,
    factory: Arc<ApiFactory>,
    loader: ModuleLoader,
    modules: Mutex<Vec<ResolvedModule>>,
}

impl ModuleHost {
    pub fn new(store: Arc<StateStore>, factory: Arc<ApiFactory>, loader: ModuleLoader) -> Self {
        Self {
            store,
            factory,
            loader,
            modules: Mutex::new(Vec::new()),
        }
    }

    /// The shared state store.
    pub fn store(&self) -> &Arc<StateStore> {
        &self.store
    }

    /// Initialize all capabilities, then load and set up every catalog
    /// module.
    pub async fn boot(&self) {
        self.factory.init_all();

        let loaded = self.loader.load_available().await;
        for module in loaded {
            self.install(module);
        }
    }

    /// Like [`boot`](Self::boot), but seeded from a development target whose
    /// module participates even if the host catalog fails, and followed by a
    /// live hot-swap channel.
    ///
    /// A failing seed fetch is a developer-facing error and aborts the dev
    /// session; the returned task drives the hot-swap channel until it
    /// closes.
    pub async fn boot_with_dev(
        self: &Arc<Self>,
        options: DevChannelOptions,
    ) -> AtriumResult<tokio::task::JoinHandle<()>> {
        let seed = crate::loader::dev::seed_catalog(&options.target).await?;

        self.factory.init_all();

        let mut catalog = vec![seed];
        catalog.extend(self.loader.fetch_available().await);

        let loaded = self.loader.load_batch(catalog).await;
        for module in loaded {
            self.install(module);
        }

        let host = self.clone();
        Ok(tokio::spawn(async move {
            if let Err(err) = crate::loader::dev::run(host, options).await {
                error!(error = %err, "dev channel closed");
            }
        }))
    }

    /// Run `setup` inside the failure boundary, then insert the module,
    /// superseding any previous module of the same name for future renders.
    pub fn install(&self, mut module: ResolvedModule) {
        module.state = run_setup(&mut module);

        {
            let mut modules = self.modules.lock().unwrap();
            match modules.iter_mut().find(|m| m.meta.name == module.meta.name) {
                Some(existing) => *existing = module,
                None => modules.push(module),
            }
        }

        self.publish_modules();
    }

    /// Re-load one module from fresh source and inject it. Used by the
    /// hot-swap channel; load failures are logged, never propagated.
    pub async fn hot_swap(&self, meta: ModuleMetadata) {
        let name = meta.name.clone();
        info!(module = %name, version = %meta.version, "hot-swapping module");

        match self.loader.load(meta, CachePolicy::Bypass).await {
            Ok(module) => self.install(module),
            Err(err) => error!(module = %name, error = %err, "hot-swap load failed"),
        }
    }

    /// Metadata of every installed module, in installation order.
    pub fn modules(&self) -> Vec<ModuleMetadata> {
        self.modules
            .lock()
            .unwrap()
            .iter()
            .map(|m| m.meta.clone())
            .collect()
    }

    /// Lifecycle state of one installed module.
    pub fn module_state(&self, name: &str) -> Option<ModuleState> {
        self.modules
            .lock()
            .unwrap()
            .iter()
            .find(|m| m.meta.name == name)
            .map(|m| m.state)
    }

    /// Mirror the installed module list into the `modules` namespace so the
    /// rendering collaborator can observe it.
    fn publish_modules(&self) {
        let metas = self.modules();
        self.store.update(move |state| {
            let mut next = state.clone();
            next.modules = metas;
            next
        });
    }
}

/// Failure boundary around a module's `setup` entry point. Both `Err`
/// returns and panics are contained here.
fn run_setup(module: &mut ResolvedModule) -> ModuleState {
    let api = module.api.clone();
    let name = module.meta.name.clone();

    match catch_unwind(AssertUnwindSafe(|| module.instance.setup(api))) {
        Ok(Ok(())) => ModuleState::Active,
        Ok(Err(err)) => {
            error!(module = %name, error = %err, "module setup failed");
            ModuleState::Failed
        }
        Err(_) => {
            error!(module = %name, "module setup panicked");
            ModuleState::Failed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::test_support::{FakeCatalog, FakeFetcher, FakeLinker};
    use crate::loader::{DependencyMap, LoaderConfig};
    use crate::state::GlobalState;

    fn host_with_catalog(
        catalog: Vec<ModuleMetadata>,
        log: &Arc<Mutex<Vec<String>>>,
    ) -> Arc<ModuleHost> {
        let store = StateStore::new(GlobalState::default());
        let factory = Arc::new(ApiFactory::new(store.clone(), Vec::new()));
        let loader = ModuleLoader::new(
            LoaderConfig {
                catalog: Arc::new(FakeCatalog {
                    entries: Ok(catalog),
                }),
                fetcher: Arc::new(FakeFetcher::new("bundle")),
                linker: Arc::new(FakeLinker { log: log.clone() }),
                dependencies: DependencyMap::new(),
            },
            factory.clone(),
        );

        Arc::new(ModuleHost::new(store, factory, loader))
    }

    #[tokio::test]
    async fn failing_setup_leaves_siblings_functional() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let host = host_with_catalog(
            vec![
                ModuleMetadata::new("fail-first", "1.0.0", "https://cdn.test/a.js"),
                ModuleMetadata::new("second", "1.0.0", "https://cdn.test/b.js"),
            ],
            &log,
        );

        host.boot().await;

        assert_eq!(host.module_state("fail-first"), Some(ModuleState::Failed));
        assert_eq!(host.module_state("second"), Some(ModuleState::Active));
        // Both setups ran; the first one's failure did not stop the second.
        assert_eq!(log.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn panicking_setup_is_contained() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let host = host_with_catalog(
            vec![
                ModuleMetadata::new("panic-first", "1.0.0", "https://cdn.test/a.js"),
                ModuleMetadata::new("second", "1.0.0", "https://cdn.test/b.js"),
            ],
            &log,
        );

        host.boot().await;

        assert_eq!(host.module_state("panic-first"), Some(ModuleState::Failed));
        assert_eq!(host.module_state("second"), Some(ModuleState::Active));
    }

    #[tokio::test]
    async fn install_supersedes_modules_by_name() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let host = host_with_catalog(
            vec![ModuleMetadata::new(
                "app",
                "1.0.0",
                "https://cdn.test/app.js",
            )],
            &log,
        );
        host.boot().await;

        host.hot_swap(ModuleMetadata::new(
            "app",
            "1.0.1",
            "https://cdn.test/app.js",
        ))
        .await;

        let modules = host.modules();
        assert_eq!(modules.len(), 1);
        assert_eq!(modules[0].version, "1.0.1");
        // Setup ran once per generation.
        assert_eq!(log.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn hot_swap_bypasses_the_fetch_cache() {
        use std::sync::atomic::Ordering;

        let log = Arc::new(Mutex::new(Vec::new()));
        let store = StateStore::new(GlobalState::default());
        let factory = Arc::new(ApiFactory::new(store.clone(), Vec::new()));
        let fetcher = Arc::new(FakeFetcher::new("bundle"));
        let loader = ModuleLoader::new(
            LoaderConfig {
                catalog: Arc::new(FakeCatalog { entries: Ok(vec![]) }),
                fetcher: fetcher.clone(),
                linker: Arc::new(FakeLinker { log }),
                dependencies: DependencyMap::new(),
            },
            factory.clone(),
        );
        let host = ModuleHost::new(store, factory, loader);

        host.hot_swap(ModuleMetadata::new(
            "app",
            "1.0.1",
            "https://cdn.test/app.js",
        ))
        .await;

        assert_eq!(fetcher.bypass_fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn installed_modules_are_published_to_state() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let host = host_with_catalog(
            vec![ModuleMetadata::new(
                "app",
                "1.0.0",
                "https://cdn.test/app.js",
            )],
            &log,
        );

        host.boot().await;

        let state = host.store().read();
        assert_eq!(state.modules.len(), 1);
        assert_eq!(state.modules[0].name, "app");
    }
}
