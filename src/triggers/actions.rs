//! Action declarations (as written in material files) and their compiled form

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::triggers::compiler::CompileError;
use crate::triggers::expression::Expr;
use crate::triggers::template::{Resolver, Template};

/// One behavior rule as declared in a material
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleDecl {
    pub on: String,
    #[serde(default, rename = "where", skip_serializing_if = "Option::is_none")]
    pub guard: Option<String>,
    #[serde(default)]
    pub actions: Vec<ActionDecl>,
}

/// A number or an expression string
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NumberOrExpr {
    Number(f64),
    Expr(String),
}

/// Literal JSON-ish value; strings are templates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ValueDecl {
    Bool(bool),
    Number(f64),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SayDecl {
    Text(String),
    Full(SayOptions),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SayOptions {
    pub template: Option<String>,
    pub fallback: Option<String>,
    /// Listener id (template; a leading `@` is ignored)
    pub to: Option<String>,
    pub mode: Option<String>,
    /// Fall back to the proto-language when nothing else resolves
    pub proto: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmotionDeltaDecl {
    pub valence: Option<NumberOrExpr>,
    pub arousal: Option<NumberOrExpr>,
    pub dominance: Option<NumberOrExpr>,
    /// Set the values instead of adding them
    pub absolute: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelationshipDecl {
    pub target: Option<String>,
    pub value: Option<NumberOrExpr>,
    pub delta: Option<NumberOrExpr>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryWriteDecl {
    #[serde(default = "default_memory_kind")]
    pub kind: String,
    #[serde(default)]
    pub subject: Option<String>,
    pub content: String,
    #[serde(default)]
    pub salience: Option<NumberOrExpr>,
}

fn default_memory_kind() -> String {
    "note".to_string()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryRecallDecl {
    pub kind: Option<String>,
    pub subject: Option<String>,
    pub within: Option<NumberOrExpr>,
    pub limit: Option<usize>,
    /// Variable name under `vars` (defaults to `memory`)
    pub into: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SetContextDecl {
    Full {
        values: BTreeMap<String, ValueDecl>,
        #[serde(default)]
        ttl: Option<f64>,
    },
    Map(BTreeMap<String, ValueDecl>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmitDecl {
    pub event: String,
    #[serde(default)]
    pub payload: BTreeMap<String, ValueDecl>,
    /// Also deliver the event to every inbox
    #[serde(default)]
    pub relay: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranslationDecl {
    pub source: String,
    pub language: String,
    pub translation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionDecl {
    Say(SayDecl),
    ModifyEmotion(EmotionDeltaDecl),
    UpdateRelationship(RelationshipDecl),
    MemoryWrite(MemoryWriteDecl),
    MemoryRecall(MemoryRecallDecl),
    SetContext(SetContextDecl),
    Emit(EmitDecl),
    Log(String),
    LearnTranslation(TranslationDecl),
}

/// A literal or a template resolved at firing time
#[derive(Debug, Clone, PartialEq)]
pub enum ValueTemplate {
    Literal(Value),
    Template(Template),
}

impl ValueTemplate {
    pub fn resolve(&self, ctx: &Value, resolver: &mut dyn Resolver) -> Value {
        match self {
            ValueTemplate::Literal(v) => v.clone(),
            ValueTemplate::Template(t) => t.resolve_value(ctx, resolver),
        }
    }
}

/// Compiled action, ready to execute
#[derive(Debug, Clone, PartialEq)]
pub enum TriggerAction {
    Say {
        template: Option<Template>,
        fallback: Option<Template>,
        to: Option<Template>,
        mode: Option<String>,
        proto: bool,
    },
    ModifyEmotion {
        valence: Option<Expr>,
        arousal: Option<Expr>,
        dominance: Option<Expr>,
        absolute: bool,
    },
    UpdateRelationship {
        target: Option<Template>,
        value: Option<Expr>,
        delta: Option<Expr>,
    },
    MemoryWrite {
        kind: String,
        subject: Option<Template>,
        content: Template,
        salience: Option<Expr>,
    },
    MemoryRecall {
        kind: Option<String>,
        subject: Option<Template>,
        within: Option<Expr>,
        limit: Option<usize>,
        into: String,
    },
    SetContext {
        values: Vec<(String, ValueTemplate)>,
        ttl: Option<f64>,
    },
    Emit {
        event: Template,
        payload: Vec<(String, ValueTemplate)>,
        relay: bool,
    },
    Log {
        message: Template,
    },
    LearnTranslation {
        source: String,
        language: String,
        translation: String,
    },
}

impl TriggerAction {
    pub fn name(&self) -> &'static str {
        match self {
            TriggerAction::Say { .. } => "say",
            TriggerAction::ModifyEmotion { .. } => "modify_emotion",
            TriggerAction::UpdateRelationship { .. } => "update_relationship",
            TriggerAction::MemoryWrite { .. } => "memory_write",
            TriggerAction::MemoryRecall { .. } => "memory_recall",
            TriggerAction::SetContext { .. } => "set_context",
            TriggerAction::Emit { .. } => "emit",
            TriggerAction::Log { .. } => "log",
            TriggerAction::LearnTranslation { .. } => "learn_translation",
        }
    }
}

fn expr(text: &NumberOrExpr) -> Result<Expr, CompileError> {
    match text {
        NumberOrExpr::Number(n) if n.is_finite() => Ok(Expr::Number(*n)),
        NumberOrExpr::Number(n) => Err(CompileError::InvalidAction(format!(
            "non-finite number {}",
            n
        ))),
        NumberOrExpr::Expr(source) => {
            Expr::parse(source).map_err(|e| CompileError::InvalidExpression {
                text: source.clone(),
                message: e.message,
            })
        }
    }
}

fn opt_expr(text: &Option<NumberOrExpr>) -> Result<Option<Expr>, CompileError> {
    text.as_ref().map(expr).transpose()
}

fn template(source: &str) -> Result<Template, CompileError> {
    Template::parse(source).map_err(|e| CompileError::InvalidTemplate {
        text: source.to_string(),
        message: e.message,
    })
}

fn opt_template(source: &Option<String>) -> Result<Option<Template>, CompileError> {
    source.as_deref().map(template).transpose()
}

fn value_template(value: &ValueDecl) -> Result<ValueTemplate, CompileError> {
    Ok(match value {
        ValueDecl::Bool(b) => ValueTemplate::Literal(Value::Bool(*b)),
        ValueDecl::Number(n) => ValueTemplate::Literal(
            serde_json::Number::from_f64(*n)
                .map(Value::Number)
                .ok_or_else(|| CompileError::InvalidAction(format!("non-finite number {}", n)))?,
        ),
        ValueDecl::Text(s) => ValueTemplate::Template(template(s)?),
    })
}

fn value_map(values: &BTreeMap<String, ValueDecl>) -> Result<Vec<(String, ValueTemplate)>, CompileError> {
    values
        .iter()
        .map(|(k, v)| Ok((k.clone(), value_template(v)?)))
        .collect()
}

impl ActionDecl {
    pub fn compile(&self) -> Result<TriggerAction, CompileError> {
        Ok(match self {
            ActionDecl::Say(SayDecl::Text(text)) => TriggerAction::Say {
                template: Some(template(text)?),
                fallback: None,
                to: None,
                mode: None,
                proto: false,
            },
            ActionDecl::Say(SayDecl::Full(options)) => {
                if options.template.is_none() && options.fallback.is_none() && !options.proto {
                    return Err(CompileError::InvalidAction(
                        "say needs a template, a fallback or proto = true".into(),
                    ));
                }
                TriggerAction::Say {
                    template: opt_template(&options.template)?,
                    fallback: opt_template(&options.fallback)?,
                    to: opt_template(&options.to)?,
                    mode: options.mode.clone(),
                    proto: options.proto,
                }
            }
            ActionDecl::ModifyEmotion(decl) => TriggerAction::ModifyEmotion {
                valence: opt_expr(&decl.valence)?,
                arousal: opt_expr(&decl.arousal)?,
                dominance: opt_expr(&decl.dominance)?,
                absolute: decl.absolute,
            },
            ActionDecl::UpdateRelationship(decl) => {
                if decl.value.is_some() && decl.delta.is_some() {
                    return Err(CompileError::InvalidAction(
                        "update_relationship takes either value or delta".into(),
                    ));
                }
                TriggerAction::UpdateRelationship {
                    target: opt_template(&decl.target)?,
                    value: opt_expr(&decl.value)?,
                    delta: opt_expr(&decl.delta)?,
                }
            }
            ActionDecl::MemoryWrite(decl) => TriggerAction::MemoryWrite {
                kind: decl.kind.clone(),
                subject: opt_template(&decl.subject)?,
                content: template(&decl.content)?,
                salience: opt_expr(&decl.salience)?,
            },
            ActionDecl::MemoryRecall(decl) => TriggerAction::MemoryRecall {
                kind: decl.kind.clone(),
                subject: opt_template(&decl.subject)?,
                within: opt_expr(&decl.within)?,
                limit: decl.limit,
                into: decl.into.clone().unwrap_or_else(|| "memory".to_string()),
            },
            ActionDecl::SetContext(SetContextDecl::Full { values, ttl }) => {
                TriggerAction::SetContext {
                    values: value_map(values)?,
                    ttl: *ttl,
                }
            }
            ActionDecl::SetContext(SetContextDecl::Map(values)) => TriggerAction::SetContext {
                values: value_map(values)?,
                ttl: None,
            },
            ActionDecl::Emit(decl) => {
                if decl.event.trim().is_empty() {
                    return Err(CompileError::InvalidAction("emit needs an event name".into()));
                }
                TriggerAction::Emit {
                    event: template(&decl.event)?,
                    payload: value_map(&decl.payload)?,
                    relay: decl.relay,
                }
            }
            ActionDecl::Log(message) => TriggerAction::Log {
                message: template(message)?,
            },
            ActionDecl::LearnTranslation(decl) => TriggerAction::LearnTranslation {
                source: decl.source.clone(),
                language: decl.language.clone(),
                translation: decl.translation.clone(),
            },
        })
    }
}
