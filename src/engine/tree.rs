//! [`ExecutionTree`]: request-scoped state for one top-level bridge
//! invocation, plus the shadow-tree variant array elements get (§3.2).
//!
//! All scheduling state (`state`, the at-most-once memoization table) is
//! owned by [`RootState`] and reached through an `Arc` shared by every
//! [`ExecutionTree`] produced for one request, root or shadow alike —
//! "shadow trees delegate schedule ... lookups to their root" (§3.2) falls
//! out of simply cloning the same `Arc<RootState>` rather than modelling a
//! parent pointer chain.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::compiler::instruction::{Bridge, Trunk};
use crate::engine::error::EngineError;
use crate::engine::shadow;
use crate::engine::trace::Tracer;
use crate::engine::trunk::{new_slot, Slot};
use crate::engine::value::Value;
use crate::engine::wires::{clean_path, has_deeper_match, matching};
use crate::engine::EngineInner;
use crate::ports::Logger;

/// Where in the dataflow graph an [`ExecutionTree`] is currently anchored.
#[derive(Clone)]
pub(crate) enum Scope {
    /// The root tree (anchored on the bridge's own trunk), or a tree
    /// redirected onto a define's output trunk by lazy define field
    /// resolution (§4.2.3).
    Dataflow { current_trunk: Trunk },
    /// A shadow tree: owns one array element's payload and matches
    /// element-tagged wires declared against `trunk` (§4.2.5).
    Element { trunk: Trunk, payload: Value },
}

/// Shared, request-scoped scheduling state, owned by the root tree and
/// reached by every shadow tree through a clone of the `Arc`.
pub(crate) struct RootState {
    pub(crate) engine: Arc<EngineInner>,
    pub(crate) bridge: Arc<Bridge>,
    pub(crate) state: RwLock<HashMap<Trunk, Slot>>,
    /// Pipe-fork trunk -> the tool trunk bridge wires targeting its base
    /// handle also apply to as defaults (§4.2.2 step 1).
    pub(crate) pipe_bases: HashMap<Trunk, Trunk>,
    pub(crate) tracer: Tracer,
}

pub struct ExecutionTree {
    root: Arc<RootState>,
    scope: Scope,
}

/// What [`Engine::resolve_field`](crate::engine::Engine::resolve_field)
/// hands back to the host (§4.2's field resolution contract).
pub enum FieldValue {
    /// A scalar or assembled mapping, to be passed through as-is.
    Value(Value),
    /// `is_array` was set and the target resolved to a list: one shadow
    /// tree per element, for the host to resolve nested fields against.
    Shadows(Vec<Arc<ExecutionTree>>),
    /// Nothing to resolve at this exact path yet — the host should keep
    /// descending field by field and call back in with a longer path
    /// against the returned tree (which may be redirected onto a lazily
    /// deferred define's output, §4.2.3).
    SelfRef(Arc<ExecutionTree>),
}

impl ExecutionTree {
    pub(crate) fn new_root(root: Arc<RootState>) -> Arc<Self> {
        let current_trunk = root.bridge.own_trunk();
        Arc::new(Self { root, scope: Scope::Dataflow { current_trunk } })
    }

    pub(crate) fn from_parts(root: Arc<RootState>, scope: Scope) -> Self {
        Self { root, scope }
    }

    pub(crate) fn root(&self) -> &Arc<RootState> {
        &self.root
    }

    fn current_trunk(&self) -> Trunk {
        match &self.scope {
            Scope::Dataflow { current_trunk } => current_trunk.clone(),
            Scope::Element { trunk, .. } => trunk.clone(),
        }
    }

    fn is_element_scope(&self) -> bool {
        matches!(self.scope, Scope::Element { .. })
    }

    pub(crate) fn element_payload(&self) -> Option<&Value> {
        match &self.scope {
            Scope::Element { payload, .. } => Some(payload),
            Scope::Dataflow { .. } => None,
        }
    }

    pub(crate) fn logger(&self) -> &Arc<dyn Logger> {
        &self.root.engine.logger
    }

    pub(crate) fn is_settled(&self, trunk: &Trunk) -> bool {
        match self.root.state.try_read() {
            Ok(guard) => guard.get(trunk).map(|slot| slot.get().is_some()).unwrap_or(false),
            Err(_) => false,
        }
    }

    pub(crate) async fn pull_trunk(&self, trunk: &Trunk) -> Result<Value, Arc<EngineError>> {
        self.root.schedule(trunk.clone()).await
    }

    /// The engine's per-field resolution entry point (§4.2).
    pub async fn resolve_field(self: &Arc<Self>, path: &[String], is_array: bool) -> Result<FieldValue, EngineError> {
        let clean = clean_path(path);
        let trunk = self.current_trunk();
        let element = self.is_element_scope();

        let direct = matching(&self.root.bridge.wires, &trunk, &clean, element);
        if !direct.is_empty() {
            if clean.is_empty() {
                if let Some(redirect) = find_define_redirect(&direct) {
                    return Ok(FieldValue::SelfRef(Arc::new(Self::from_parts(
                        self.root.clone(),
                        Scope::Dataflow { current_trunk: redirect },
                    ))));
                }
            }
            let value = crate::engine::pull::resolve_wires(self, &direct).await.map_err(|e| (*e).clone())?;
            return Ok(self.shape_value(value, is_array));
        }

        if self.is_element_scope() {
            // §4.2.5 step 3: fall back to direct property access on the
            // element payload.
            let payload = self.element_payload().cloned().unwrap_or(Value::Null);
            let value = payload.get_path(&clean).cloned().unwrap_or(Value::Null);
            return Ok(self.shape_value(value, is_array));
        }

        if has_deeper_match(&self.root.bridge.wires, &trunk, &clean, element) {
            return Ok(FieldValue::SelfRef(self.clone()));
        }

        Ok(FieldValue::Value(Value::Null))
    }

    fn shape_value(self: &Arc<Self>, value: Value, is_array: bool) -> FieldValue {
        match value {
            Value::List(items) if is_array => {
                FieldValue::Shadows(shadow::wrap(self.root.clone(), self.current_trunk(), items))
            }
            other => FieldValue::Value(other),
        }
    }
}

/// Detects the §4.2.3 "lazy define field resolution" shape: a wire
/// assigning a define's whole output (`from.path` empty, `from.trunk` a
/// define-output trunk) directly onto the path being resolved.
fn find_define_redirect(direct: &[&crate::compiler::instruction::Wire]) -> Option<Trunk> {
    for wire in direct {
        if let crate::compiler::instruction::Wire::Pull { from, .. } = wire {
            if from.path.is_empty()
                && !from.element
                && matches!(
                    from.trunk.origin,
                    crate::compiler::instruction::Origin::DefineOutput { .. }
                )
            {
                return Some(from.trunk.clone());
            }
        }
    }
    None
}

pub(crate) fn new_root_state(
    engine: Arc<EngineInner>,
    bridge: Arc<Bridge>,
    trace: crate::config::TraceLevel,
) -> RootState {
    let pipe_bases = bridge
        .pipe_handles
        .iter()
        .map(|fork| (fork.trunk.clone(), fork.base_trunk.clone()))
        .collect();
    RootState {
        engine,
        bridge,
        state: RwLock::new(HashMap::new()),
        pipe_bases,
        tracer: Tracer::new(trace),
    }
}

/// Pre-settles `trunk`'s slot to `value` without ever scheduling a future
/// for it — used for the bridge/context/const trunks, which are supplied
/// up front rather than produced by a tool (§4.2.2; these are the trunks
/// pull's cost inference treats as free, §4.2.1 step 1).
pub(crate) async fn preset_slot(root: &RootState, trunk: Trunk, value: Value) {
    let slot = new_slot();
    let _ = slot.set(Ok(value));
    root.state.write().await.insert(trunk, slot);
}
