//! Runtime trunk identity and the at-most-once memoization slot (§3.2, §5.1).
//!
//! The compiler already gives every call site a [`Trunk`] whose equality is
//! exactly "these four fields match" (§3.2); the engine reuses it verbatim
//! as the key into `ExecutionTree::state` rather than inventing a second,
//! parallel identity type.

use std::sync::Arc;

use tokio::sync::OnceCell;

pub use crate::compiler::instruction::Trunk as TrunkKey;
use crate::engine::error::EngineError;
use crate::engine::value::Value;

/// A trunk's settled outcome, shared cheaply between every consumer that
/// awaited the same slot: cloning an `Arc<EngineError>` is cheap and
/// preserves error identity across an `AggregateFailure` (§5.1).
pub type TrunkResult = Result<Value, Arc<EngineError>>;

/// `schedule(trunk)`'s at-most-once guarantee realized as a `OnceCell`: the
/// first caller to reach [`Slot::get_or_try_init`] (via
/// [`crate::engine::tree::ExecutionTree::schedule`]) runs the initializing
/// future; every other caller, however many race to request the same
/// trunk, awaits that same future rather than starting a second one (§5.1).
pub type Slot = Arc<OnceCell<TrunkResult>>;

pub fn new_slot() -> Slot {
    Arc::new(OnceCell::new())
}
