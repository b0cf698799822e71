//! Per-instance state containers.
//!
//! A rendered instance of a module can own a private, namespaced slice of
//! [`GlobalState`](crate::state::GlobalState) plus a set of bound actions.
//! Each `create_state` call allocates a fresh `module#N` namespace — the
//! counter is private to the module's API object, so containers from
//! different modules can never collide, and replacing one container's slice
//! never touches another's.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::api::{scoped_name, ApiExtensions, Capability, ModuleApi, WeakModuleApi};
use crate::error::{AtriumError, AtriumResult};
use crate::state::StateStore;

/// An operation bound to a container. Receives the owning module's API as
/// invocation context, a dispatcher wired to the container's namespace, and
/// the caller's arguments.
pub type ContainerAction = Arc<dyn Fn(&ModuleApi, &StateDispatch, &[Value]) + Send + Sync>;

/// What a module supplies when creating a container.
pub struct StateContainerOptions {
    /// Initial value of the container's namespace.
    pub state: Value,

    /// Named operations to bind to the container.
    pub actions: HashMap<String, ContainerAction>,
}

/// A dispatcher pre-wired to replace exactly one container's namespace.
pub struct StateDispatch {
    store: Arc<StateStore>,
    id: String,
}

impl StateDispatch {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Swap this container's slice. `f` maps the current value (Null if the
    /// container was destroyed) to the next one.
    pub fn dispatch<F>(&self, f: F)
    where
        F: FnOnce(&Value) -> Value + Send + 'static,
    {
        let id = self.id.clone();
        self.store.update(move |state| {
            let mut next = state.clone();
            let current = next.containers.get(&id).cloned().unwrap_or(Value::Null);
            next.containers.insert(id, f(&current));
            next
        });
    }
}

/// The containers capability: seeds the `containers` namespace and gives
/// every module a [`ContainersApi`].
#[derive(Default)]
pub struct ContainersCapability;

impl Capability for ContainersCapability {
    fn init(&self, store: &Arc<StateStore>) {
        store.update(|state| {
            let mut next = state.clone();
            next.containers = HashMap::new();
            next
        });
    }

    fn extend(&self, api: &ModuleApi, out: &mut ApiExtensions) {
        out.insert(ContainersApi {
            store: api.store().clone(),
            owner: api.meta().name.clone(),
            api: api.downgrade(),
            count: AtomicUsize::new(0),
        });
    }
}

/// Per-module container operations.
pub struct ContainersApi {
    store: Arc<StateStore>,
    owner: String,
    api: WeakModuleApi,
    /// Numbers containers created by this module; private to its API object.
    count: AtomicUsize,
}

impl ContainersApi {
    /// Allocate a fresh `module#N` namespace, initialize it with the given
    /// state, and bind the given actions to it.
    pub fn create_state(&self, options: StateContainerOptions) -> StateContainer {
        let n = self.count.fetch_add(1, Ordering::Relaxed);
        let id = scoped_name(&self.owner, n);

        let initial = options.state;
        {
            let id = id.clone();
            self.store.update(move |state| {
                let mut next = state.clone();
                next.containers.insert(id, initial);
                next
            });
        }

        StateContainer {
            id,
            store: self.store.clone(),
            api: self.api.clone(),
            actions: Arc::new(options.actions),
        }
    }
}

/// A private state slice plus its bound actions.
///
/// Acts as the binder for the rendering collaborator: [`connect`]
/// wraps a renderable value so it can read the slice and invoke the bound
/// actions as props.
///
/// [`connect`]: StateContainer::connect
#[derive(Clone)]
pub struct StateContainer {
    id: String,
    store: Arc<StateStore>,
    api: WeakModuleApi,
    actions: Arc<HashMap<String, ContainerAction>>,
}

impl StateContainer {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Current value of this container's namespace.
    pub fn state(&self) -> Value {
        self.store
            .read()
            .containers
            .get(&self.id)
            .cloned()
            .unwrap_or(Value::Null)
    }

    /// Invoke a bound action with the owning module's API as context.
    pub fn call(&self, action: &str, args: &[Value]) -> AtriumResult<()> {
        let bound = self
            .actions
            .get(action)
            .ok_or_else(|| AtriumError::UnknownAction {
                container: self.id.clone(),
                action: action.to_string(),
            })?;

        match self.api.upgrade() {
            Some(api) => {
                let dispatch = StateDispatch {
                    store: self.store.clone(),
                    id: self.id.clone(),
                };
                bound(&api, &dispatch, args);
            }
            None => {
                // The owning module was torn down; its actions are inert.
                debug!(container = %self.id, action = %action, "dropping action for retired module");
            }
        }

        Ok(())
    }

    /// Wrap a renderable value so the rendering collaborator can read this
    /// container's state and invoke its actions as props.
    pub fn connect<C>(&self, component: C) -> ConnectedComponent<C> {
        ConnectedComponent {
            component,
            container: self.clone(),
        }
    }

    /// Remove this container's namespace entry. Intended to be driven by an
    /// explicit teardown signal from the rendering collaborator; without it
    /// the entry stays for the lifetime of the process.
    pub fn destroy(self) {
        let id = self.id;
        self.store.update(move |state| {
            let mut next = state.clone();
            next.containers.remove(&id);
            next
        });
    }
}

/// A renderable value bound to one container.
pub struct ConnectedComponent<C> {
    component: C,
    container: StateContainer,
}

impl<C> ConnectedComponent<C> {
    pub fn component(&self) -> &C {
        &self.component
    }

    pub fn id(&self) -> &str {
        self.container.id()
    }

    pub fn state(&self) -> Value {
        self.container.state()
    }

    pub fn call(&self, action: &str, args: &[Value]) -> AtriumResult<()> {
        self.container.call(action, args)
    }
}
