//! Compile declared rules into runnable form
//!
//! A rule that fails to compile is dropped with a warning; the rest of the
//! material still loads.

use thiserror::Error;
use tracing::warn;

use crate::triggers::actions::{RuleDecl, TriggerAction};
use crate::triggers::expression::Expr;
use crate::triggers::pattern::TriggerPattern;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompileError {
    #[error("Unsupported trigger pattern: {0}")]
    UnsupportedPattern(String),
    #[error("Invalid expression '{text}': {message}")]
    InvalidExpression { text: String, message: String },
    #[error("Invalid template '{text}': {message}")]
    InvalidTemplate { text: String, message: String },
    #[error("Invalid action: {0}")]
    InvalidAction(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompiledRule {
    /// Pattern text as declared, for logs
    pub source: String,
    pub pattern: TriggerPattern,
    pub guard: Option<Expr>,
    pub actions: Vec<TriggerAction>,
}

pub fn compile_rule(decl: &RuleDecl) -> Result<CompiledRule, CompileError> {
    let pattern = TriggerPattern::parse(&decl.on)
        .ok_or_else(|| CompileError::UnsupportedPattern(decl.on.clone()))?;

    let guard = match decl.guard.as_deref().map(str::trim) {
        Some(text) if !text.is_empty() => {
            Some(Expr::parse(text).map_err(|e| CompileError::InvalidExpression {
                text: text.to_string(),
                message: e.message,
            })?)
        }
        _ => None,
    };

    let actions = decl
        .actions
        .iter()
        .map(|a| a.compile())
        .collect::<Result<Vec<_>, _>>()?;

    Ok(CompiledRule {
        source: decl.on.clone(),
        pattern,
        guard,
        actions,
    })
}

/// Compile every rule, logging and skipping the ones that fail
pub fn compile_rules(owner: &str, decls: &[RuleDecl]) -> Vec<CompiledRule> {
    decls
        .iter()
        .filter_map(|decl| match compile_rule(decl) {
            Ok(rule) => Some(rule),
            Err(e) => {
                warn!(material = owner, rule = %decl.on, error = %e, "Dropping rule");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::triggers::actions::{ActionDecl, SayDecl};

    fn rule(on: &str, guard: Option<&str>) -> RuleDecl {
        RuleDecl {
            on: on.to_string(),
            guard: guard.map(str::to_string),
            actions: vec![ActionDecl::Say(SayDecl::Text("hello".into()))],
        }
    }

    #[test]
    fn test_compile_rule() {
        let compiled = compile_rule(&rule("time.every(1s)", Some("emotion.valence < -0.5"))).unwrap();
        assert_eq!(compiled.pattern, TriggerPattern::Periodic { interval: 1.0 });
        assert!(compiled.guard.is_some());
        assert_eq!(compiled.actions.len(), 1);
    }

    #[test]
    fn test_blank_guard_is_none() {
        let compiled = compile_rule(&rule("mention(any)", Some("  "))).unwrap();
        assert!(compiled.guard.is_none());
    }

    #[test]
    fn test_compile_errors() {
        assert!(matches!(
            compile_rule(&rule("sunrise()", None)),
            Err(CompileError::UnsupportedPattern(_))
        ));
        assert!(matches!(
            compile_rule(&rule("mention(self)", Some("a >"))),
            Err(CompileError::InvalidExpression { .. })
        ));
        let deep = format!("{}1{}", "(".repeat(50_000), ")".repeat(50_000));
        assert!(matches!(
            compile_rule(&rule("mention(self)", Some(&deep))),
            Err(CompileError::InvalidExpression { .. })
        ));
    }

    #[test]
    fn test_compile_rules_skips_failures() {
        let decls = vec![
            rule("sunrise()", None),
            rule("event(storm.*)", None),
            rule("mention(self)", Some("((")),
        ];
        let compiled = compile_rules("cat", &decls);
        assert_eq!(compiled.len(), 1);
        assert_eq!(compiled[0].source, "event(storm.*)");
    }
}
