//! Per-module API composition.
//!
//! Every capability (search, state containers, ...) implements [`Capability`]:
//! a one-time `init` that seeds its namespaces in the store, and a per-module
//! `extend` that contributes an extension object to that module's
//! [`ModuleApi`]. The [`ApiFactory`] runs the capabilities as a fixed-order
//! pipeline — `init` exactly once at boot, `extend` once per loaded module.
//!
//! Extension objects are looked up by type through
//! [`ModuleApi::capability`]; each one owns any per-module counters it needs,
//! so ids handed out to one module never collide with another's.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock, Weak};

use crate::metadata::ModuleMetadata;
use crate::state::StateStore;

/// Build a globally unique id from an owner (module name) and a local key.
pub fn scoped_name(owner: &str, key: impl fmt::Display) -> String {
    format!("{owner}#{key}")
}

/// Typemap of capability extension objects attached to a [`ModuleApi`].
#[derive(Default)]
pub struct ApiExtensions {
    map: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl ApiExtensions {
    pub fn insert<T: Send + Sync + 'static>(&mut self, value: T) {
        self.map.insert(TypeId::of::<T>(), Arc::new(value));
    }

    pub fn get<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.map
            .get(&TypeId::of::<T>())
            .cloned()
            .and_then(|ext| ext.downcast::<T>().ok())
    }
}

/// A self-contained feature package that extends every module's API.
///
/// `init` runs exactly once at boot and may only touch the capability's own
/// namespaces. `extend` runs once per loaded module and must be pure with
/// respect to the store except for those namespaces.
pub trait Capability: Send + Sync {
    fn init(&self, store: &Arc<StateStore>);

    fn extend(&self, api: &ModuleApi, out: &mut ApiExtensions);
}

struct ApiInner {
    meta: ModuleMetadata,
    store: Arc<StateStore>,
    extensions: OnceLock<ApiExtensions>,
}

/// The API object handed to a module's `setup`.
///
/// Cheap to clone; all clones refer to the same extension objects, so
/// per-module counters keep counting across clones.
#[derive(Clone)]
pub struct ModuleApi {
    inner: Arc<ApiInner>,
}

impl ModuleApi {
    /// Metadata of the module this API was built for.
    pub fn meta(&self) -> &ModuleMetadata {
        &self.inner.meta
    }

    /// The shared state store.
    pub fn store(&self) -> &Arc<StateStore> {
        &self.inner.store
    }

    /// Look up the extension object a capability contributed for this module.
    pub fn capability<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.inner
            .extensions
            .get()
            .and_then(|extensions| extensions.get::<T>())
    }

    /// Weak handle for extension objects that need the API back without
    /// keeping the module alive.
    pub fn downgrade(&self) -> WeakModuleApi {
        WeakModuleApi {
            inner: Arc::downgrade(&self.inner),
        }
    }
}

/// Weak counterpart of [`ModuleApi`].
#[derive(Clone)]
pub struct WeakModuleApi {
    inner: Weak<ApiInner>,
}

impl WeakModuleApi {
    pub fn upgrade(&self) -> Option<ModuleApi> {
        self.inner.upgrade().map(|inner| ModuleApi { inner })
    }
}

/// Fixed-order pipeline of capabilities over one store.
pub struct ApiFactory {
    store: Arc<StateStore>,
    capabilities: Vec<Arc<dyn Capability>>,
    init: std::sync::Once,
}

impl ApiFactory {
    pub fn new(store: Arc<StateStore>, capabilities: Vec<Arc<dyn Capability>>) -> Self {
        Self {
            store,
            capabilities,
            init: std::sync::Once::new(),
        }
    }

    /// Run every capability's `init`, in registration order, exactly once.
    /// Subsequent calls are no-ops.
    pub fn init_all(&self) {
        self.init.call_once(|| {
            for capability in &self.capabilities {
                capability.init(&self.store);
            }
        });
    }

    /// Build the API object for one module by composing every capability's
    /// extension, in registration order.
    pub fn create_api(&self, meta: ModuleMetadata) -> ModuleApi {
        let api = ModuleApi {
            inner: Arc::new(ApiInner {
                meta,
                store: self.store.clone(),
                extensions: OnceLock::new(),
            }),
        };

        let mut extensions = ApiExtensions::default();
        for capability in &self.capabilities {
            capability.extend(&api, &mut extensions);
        }

        // The inner Arc was created above and never shared, so the cell is
        // still empty here.
        let _ = api.inner.extensions.set(extensions);
        api
    }
}
