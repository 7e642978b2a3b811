//! Trigger firing: per-firing context, guard check and action execution
//!
//! Every action runs in declared order and is isolated from the others: a
//! failing action is logged and the rest of the firing continues.

use std::collections::BTreeMap;
use std::sync::Arc;

use ahash::AHashMap;
use rand::seq::SliceRandom;
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use crate::core::error::{MurmurError, Result};
use crate::core::types::{EntityId, Seconds};
use crate::entity::capabilities::Capability;
use crate::entity::memory::{Memory, MemoryQuery};
use crate::entity::state::Entity;
use crate::linguistics::{generate, Utterance, VocabularyItem};
use crate::simulation::world::World;
use crate::triggers::actions::TriggerAction;
use crate::triggers::context::{emotion_value, position_value, FiringContext};
use crate::triggers::{CompiledRule, Expr, MentionTarget, NoResolver, Resolver, Template, TriggerPattern};

/// What caused a rule to fire
#[derive(Debug, Clone)]
pub(crate) enum TriggerInput {
    Timer { scheduled_at: Seconds },
    Mention { utterance: Utterance },
    Event { name: String, payload: Value },
}

impl TriggerInput {
    /// The other party of a mention or event, if any
    fn counterpart(&self) -> Option<String> {
        match self {
            TriggerInput::Mention { utterance } => Some(utterance.speaker_id.to_string()),
            TriggerInput::Event { payload, .. } => ["source", "entity", "from"]
                .iter()
                .find_map(|key| payload.get(*key).and_then(Value::as_str))
                .map(str::to_string),
            TriggerInput::Timer { .. } => None,
        }
    }
}

/// Resolves `{t:key}` and `{line:category}` for one speaker
struct SpeakerResolver<'a> {
    translations: &'a AHashMap<(String, String), String>,
    language: &'a str,
    lines: &'a BTreeMap<String, Vec<String>>,
    rng: &'a mut ChaCha8Rng,
}

impl<'a> SpeakerResolver<'a> {
    fn new(
        entity: &'a Entity,
        translations: &'a AHashMap<(String, String), String>,
        rng: &'a mut ChaCha8Rng,
    ) -> Self {
        Self {
            translations,
            language: entity.language(),
            lines: &entity.lines,
            rng,
        }
    }
}

impl Resolver for SpeakerResolver<'_> {
    fn translate(&mut self, key: &str) -> Option<String> {
        self.translations
            .get(&(key.to_string(), self.language.to_string()))
            .cloned()
    }

    fn line(&mut self, category: &str) -> Option<String> {
        self.lines.get(category)?.choose(&mut *self.rng).cloned()
    }
}

pub(crate) fn utterance_value(utterance: &Utterance) -> Value {
    json!({
        "id": utterance.id,
        "speaker": utterance.speaker_id.as_str(),
        "text": utterance.text,
        "listener": utterance.listener_id.as_ref().map(EntityId::as_str),
        "mode": utterance.mode,
        "time": utterance.timestamp,
        "emotion": emotion_value(&utterance.emotion),
    })
}

fn memory_value(memory: &Memory) -> Value {
    json!({
        "kind": memory.kind,
        "subject": memory.subject,
        "content": memory.content,
        "salience": memory.salience,
        "time": memory.timestamp,
        "consolidated": memory.consolidated,
    })
}

/// Whether an utterance satisfies a mention target for `entity`
pub(crate) fn mention_matches(target: &MentionTarget, entity: &Entity, utterance: &Utterance) -> bool {
    match target {
        MentionTarget::SelfEntity => {
            utterance.speaker_id != entity.id
                && (utterance.listener_id.as_ref() == Some(&entity.id)
                    || entity.is_named_in(&utterance.text))
        }
        MentionTarget::Others => utterance.speaker_id != entity.id,
        MentionTarget::Any => true,
        MentionTarget::Entity(id) => &utterance.speaker_id == id,
    }
}

/// Evaluate an optional numeric parameter; failures skip the parameter
fn number(expr: Option<&Expr>, ctx: &FiringContext) -> Option<f64> {
    match expr?.evaluate_number(ctx.root()) {
        Ok(v) if v.is_finite() => Some(v),
        Ok(_) => None,
        Err(e) => {
            debug!(error = %e, "Skipping parameter");
            None
        }
    }
}

fn render_plain(template: &Template, ctx: &FiringContext) -> String {
    template.render(ctx.root(), &mut NoResolver).text.trim().to_string()
}

impl World {
    fn firing_context(&self, idx: usize, input: &TriggerInput) -> FiringContext {
        let entity = &self.entities[idx];
        let mut world = self.context.clone();
        world.insert("time".into(), json!(self.time));
        world.insert("tick".into(), json!(self.tick));
        world.insert("population".into(), json!(self.entities.len()));

        let mut root = Map::new();
        root.insert("time".into(), json!(self.time));
        root.insert("tick".into(), json!(self.tick));
        root.insert("world".into(), Value::Object(world));
        root.insert("self".into(), entity.view());
        root.insert("emotion".into(), emotion_value(&entity.emotion));
        root.insert("position".into(), position_value(&entity.position));
        root.insert("context".into(), Value::Object(entity.context.clone()));
        root.insert(
            "climate".into(),
            serde_json::to_value(self.climate).unwrap_or(Value::Null),
        );
        root.insert(
            "last_utterance".into(),
            self.last_utterance.as_ref().map_or(Value::Null, utterance_value),
        );

        match input {
            TriggerInput::Timer { scheduled_at } => {
                root.insert("timer".into(), json!({ "scheduled_at": scheduled_at }));
            }
            TriggerInput::Mention { utterance } => {
                root.insert("mention".into(), utterance_value(utterance));
                root.insert("speaker".into(), json!(utterance.speaker_id.as_str()));
                root.insert("message".into(), json!(utterance.text));
            }
            TriggerInput::Event { name, payload } => {
                root.insert("event".into(), json!({ "name": name, "payload": payload }));
            }
        }
        FiringContext::new(root)
    }

    /// Check the guard and run the actions of one rule for one entity
    pub(crate) fn fire_rule(&mut self, entity: &EntityId, rule: &CompiledRule, input: &TriggerInput, depth: u32) {
        let Some(idx) = self.index_of(entity) else {
            return;
        };
        let mut ctx = self.firing_context(idx, input);
        if let Some(guard) = &rule.guard {
            if !guard.guard(ctx.root()) {
                debug!(entity = %entity, rule = %rule.source, "Guard rejected firing");
                return;
            }
        }

        self.counters.triggers_fired += 1;
        debug!(entity = %entity, rule = %rule.source, depth, "Trigger fired");
        for action in &rule.actions {
            if let Err(e) = self.run_action(entity, action, &mut ctx, input, depth) {
                warn!(
                    entity = %entity,
                    rule = %rule.source,
                    action = action.name(),
                    error = %e,
                    "Trigger action failed"
                );
            }
        }
    }

    /// Fire every mention rule the utterance satisfies, in spawn order
    pub(crate) fn dispatch_mention(&mut self, utterance: &Utterance, depth: u32) {
        let matched: Vec<(EntityId, Arc<CompiledRule>)> = self
            .entities
            .iter()
            .flat_map(|e| {
                e.triggers
                    .iter()
                    .filter(move |t| match &t.rule.pattern {
                        TriggerPattern::Mention { target } => mention_matches(target, e, utterance),
                        _ => false,
                    })
                    .map(move |t| (e.id.clone(), Arc::clone(&t.rule)))
            })
            .collect();
        if matched.is_empty() {
            return;
        }
        let input = TriggerInput::Mention {
            utterance: utterance.clone(),
        };
        for (id, rule) in matched {
            self.fire_rule(&id, &rule, &input, depth);
        }
    }

    /// Fire every event rule matching `name`, in spawn order
    pub(crate) fn dispatch_event(&mut self, name: &str, payload: &Value, depth: u32) {
        let matched: Vec<(EntityId, Arc<CompiledRule>)> = self
            .entities
            .iter()
            .flat_map(|e| {
                e.triggers
                    .iter()
                    .filter(|t| t.rule.pattern.matches_event(name))
                    .map(move |t| (e.id.clone(), Arc::clone(&t.rule)))
            })
            .collect();
        if matched.is_empty() {
            return;
        }
        let input = TriggerInput::Event {
            name: name.to_string(),
            payload: payload.clone(),
        };
        for (id, rule) in matched {
            self.fire_rule(&id, &rule, &input, depth);
        }
    }

    /// Run periodic firings collected by housekeeping
    pub(crate) fn run_due_firings(&mut self) {
        let due = std::mem::take(&mut self.due_firings);
        for firing in due {
            let input = TriggerInput::Timer {
                scheduled_at: firing.scheduled_at,
            };
            self.fire_rule(&firing.entity, &firing.rule, &input, 0);
        }
    }

    /// Vocabulary the entity can draw from; learners favor what they heard
    fn vocabulary_for(&self, idx: usize) -> Vec<VocabularyItem> {
        let entity = &self.entities[idx];
        let mut pool: Vec<VocabularyItem> = self
            .lexicon
            .sorted()
            .into_iter()
            .map(VocabularyItem::from_entry)
            .collect();

        if entity.has(Capability::Learning) {
            for item in &mut pool {
                if let Some(pattern) = entity.learned.get(&item.term) {
                    item.usage = item.usage.saturating_add(pattern.heard);
                    item.recency = 1.0;
                }
            }
            for (phrase, pattern) in entity.learned.sorted() {
                if !self.lexicon.contains(phrase) {
                    pool.push(VocabularyItem {
                        term: phrase.clone(),
                        usage: pattern.heard,
                        recency: 0.5,
                        emotion: entity.emotion,
                    });
                }
            }
        }
        pool
    }

    fn proto_utterance(&mut self, idx: usize) -> String {
        let seed: u64 = self.rng.gen();
        let pool = self.vocabulary_for(idx);
        let entity = &self.entities[idx];
        generate(&pool, &entity.emotion, &entity.proto, seed)
    }

    fn run_action(
        &mut self,
        id: &EntityId,
        action: &TriggerAction,
        ctx: &mut FiringContext,
        input: &TriggerInput,
        depth: u32,
    ) -> Result<()> {
        let idx = self
            .index_of(id)
            .ok_or_else(|| MurmurError::EntityNotFound(id.clone()))?;
        let now = self.time;

        match action {
            TriggerAction::Say {
                template,
                fallback,
                to,
                mode,
                proto,
            } => {
                let resolved = {
                    let entity = &self.entities[idx];
                    let mut resolver = SpeakerResolver::new(entity, &self.translations, &mut self.rng);
                    [template.as_ref(), fallback.as_ref()]
                        .into_iter()
                        .flatten()
                        .map(|t| t.render(ctx.root(), &mut resolver))
                        .find(|r| r.is_complete())
                        .map(|r| r.text)
                };
                let text = match resolved {
                    Some(text) => text,
                    None if *proto || self.entities[idx].has(Capability::Speech) => self.proto_utterance(idx),
                    None => return Err(MurmurError::ActionFailed("say resolved no text".into())),
                };

                let formatted = self.entities[idx].style.format(&text);
                if formatted.is_empty() {
                    return Err(MurmurError::ActionFailed("say produced an empty utterance".into()));
                }
                let listener = to
                    .as_ref()
                    .map(|t| render_plain(t, ctx).trim_start_matches('@').to_string())
                    .filter(|s| !s.is_empty())
                    .map(EntityId::new);

                self.cascade.admit(depth + 1)?;
                self.record_speech_at(id.clone(), &formatted, listener, mode.clone(), depth + 1);
                if let Some(last) = &self.last_utterance {
                    ctx.insert("last_utterance", utterance_value(last));
                }
            }

            TriggerAction::ModifyEmotion {
                valence,
                arousal,
                dominance,
                absolute,
            } => {
                if !self.entities[idx].has(Capability::Emotion) {
                    debug!(entity = %id, "No emotion capability; skipping modify_emotion");
                    return Ok(());
                }
                let dv = number(valence.as_ref(), ctx);
                let da = number(arousal.as_ref(), ctx);
                let dd = number(dominance.as_ref(), ctx);

                let entity = &mut self.entities[idx];
                let e = entity.emotion;
                entity.emotion = if *absolute {
                    e.clamped(
                        dv.unwrap_or(e.valence),
                        da.unwrap_or(e.arousal),
                        dd.unwrap_or(e.dominance),
                    )
                } else {
                    e.clamped(
                        e.valence + dv.unwrap_or(0.0),
                        e.arousal + da.unwrap_or(0.0),
                        e.dominance + dd.unwrap_or(0.0),
                    )
                };
                ctx.refresh_emotion(&entity.emotion);
            }

            TriggerAction::UpdateRelationship { target, value, delta } => {
                if !self.entities[idx].has(Capability::Relationships) {
                    debug!(entity = %id, "No relationships capability; skipping update_relationship");
                    return Ok(());
                }
                let target = match target {
                    Some(t) => Some(render_plain(t, ctx).trim_start_matches('@').to_string()),
                    None => input.counterpart(),
                }
                .filter(|s| !s.is_empty())
                .ok_or_else(|| MurmurError::ActionFailed("update_relationship has no target".into()))?;
                if target == id.as_str() {
                    return Err(MurmurError::ActionFailed("an entity cannot relate to itself".into()));
                }

                let value = number(value.as_ref(), ctx);
                let delta = number(delta.as_ref(), ctx);
                if value.is_none() && delta.is_none() {
                    return Err(MurmurError::ActionFailed(
                        "update_relationship needs a value or a delta".into(),
                    ));
                }
                let relationship = self.entities[idx]
                    .relationships
                    .entry(&EntityId::new(target), now);
                if let Some(v) = value {
                    relationship.set_strength(v);
                }
                if let Some(d) = delta {
                    relationship.adjust_strength(d);
                }
                relationship.touch(now);
            }

            TriggerAction::MemoryWrite {
                kind,
                subject,
                content,
                salience,
            } => {
                if !self.entities[idx].has(Capability::Memory) {
                    debug!(entity = %id, "No memory capability; skipping memory_write");
                    return Ok(());
                }
                let subject = subject.as_ref().map(|t| render_plain(t, ctx)).unwrap_or_default();
                let content = render_plain(content, ctx);
                if content.is_empty() {
                    return Err(MurmurError::ActionFailed("memory_write content is empty".into()));
                }
                let salience = number(salience.as_ref(), ctx).unwrap_or(0.5);
                self.entities[idx]
                    .memory
                    .add(Memory::new(now, kind.as_str(), subject, content, salience));
            }

            TriggerAction::MemoryRecall {
                kind,
                subject,
                within,
                limit,
                into,
            } => {
                let items: Vec<Value> = if self.entities[idx].has(Capability::Memory) {
                    let query = MemoryQuery {
                        kind: kind.clone(),
                        subject: subject.as_ref().map(|t| render_plain(t, ctx)),
                        within: number(within.as_ref(), ctx),
                        limit: *limit,
                    };
                    self.entities[idx]
                        .memory
                        .recall(&query, now)
                        .into_iter()
                        .map(memory_value)
                        .collect()
                } else {
                    Vec::new()
                };
                let latest = items.first().cloned().unwrap_or(Value::Null);
                let count = items.len();
                ctx.set_var(into, json!({ "items": items, "latest": latest, "count": count }));
            }

            TriggerAction::SetContext { values, ttl } => {
                let resolved: Map<String, Value> = {
                    let entity = &self.entities[idx];
                    let mut resolver = SpeakerResolver::new(entity, &self.translations, &mut self.rng);
                    values
                        .iter()
                        .map(|(key, value)| (key.clone(), value.resolve(ctx.root(), &mut resolver)))
                        .collect()
                };
                {
                    let entity = &mut self.entities[idx];
                    for (key, value) in &resolved {
                        entity.context.insert(key.clone(), value.clone());
                        ctx.set_var(key, value.clone());
                    }
                }
                self.broadcast_context_at(resolved, *ttl, depth);

                if let Some(idx) = self.index_of(id) {
                    let entity = &self.entities[idx];
                    ctx.refresh_context(&entity.context);
                    ctx.refresh_emotion(&entity.emotion);
                }
            }

            TriggerAction::Emit { event, payload, relay } => {
                let name = render_plain(event, ctx);
                if name.is_empty() {
                    return Err(MurmurError::ActionFailed("emit has an empty event name".into()));
                }
                let mut body: Map<String, Value> = payload
                    .iter()
                    .map(|(key, value)| (key.clone(), value.resolve(ctx.root(), &mut NoResolver)))
                    .collect();
                body.entry("source")
                    .or_insert_with(|| Value::String(id.to_string()));

                self.cascade.admit(depth + 1)?;
                self.emit_event(&name, Value::Object(body), *relay, depth + 1);
            }

            TriggerAction::Log { message } => {
                let entity = &self.entities[idx];
                let mut resolver = SpeakerResolver::new(entity, &self.translations, &mut self.rng);
                let text = message.render(ctx.root(), &mut resolver).text;
                info!(entity = %id, "{}", text);
            }

            TriggerAction::LearnTranslation {
                source,
                language,
                translation,
            } => {
                debug!(entity = %id, source = %source, language = %language, "Learned translation");
                self.translations
                    .insert((source.clone(), language.clone()), translation.clone());
            }
        }
        Ok(())
    }
}
