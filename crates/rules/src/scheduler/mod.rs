//! Daily notification rule scheduling.
//!
//! Each tick evaluates every (rule, user) pair. A pair whose local trigger
//! time has passed claims today's ledger key, checks its criterion, sends on
//! every enabled channel and finalises the key, so each key resolves at most
//! once per local day. Workers run concurrently, bounded by a semaphore.

mod core;
mod entry;
mod state;
mod trigger;


pub use self::core::RuleScheduler;
pub use self::entry::CompiledRule;
pub use self::state::{EvaluationState, TickReport};
pub use self::trigger::TriggerTime;
