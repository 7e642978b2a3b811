//! Behavior-trigger DSL
//!
//! Materials declare rules as `on` pattern, optional `where` guard and a
//! list of actions. Rules compile once at spawn; the simulation executes
//! them when their pattern matches.

pub mod actions;
pub mod compiler;
pub mod context;
pub mod expression;
pub mod pattern;
pub mod schedule;
pub mod template;

pub use actions::{ActionDecl, RuleDecl, TriggerAction};
pub use compiler::{compile_rule, compile_rules, CompileError, CompiledRule};
pub use context::FiringContext;
pub use expression::{EvalError, Expr, ParseError};
pub use pattern::{EventMatch, MentionTarget, TriggerPattern};
pub use schedule::{CatchUp, PeriodicSchedule, TriggerRuntime};
pub use template::{NoResolver, Resolver, Template};
