//! External stimuli: context broadcasts, world events and recorded speech
//!
//! All three can also be produced by trigger actions. Host calls run at
//! cascade depth 0; action-produced ones carry the depth of their firing.

use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use crate::core::types::{EntityId, UtteranceId};
use crate::entity::capabilities::Capability;
use crate::entity::emotion::Emotion;
use crate::entity::inbox::{Message, MessageKind};
use crate::entity::memory::Memory;
use crate::entity::needs::NeedType;
use crate::linguistics::normalize::normalize;
use crate::linguistics::Utterance;
use crate::simulation::events::{WorldEvent, CONTEXT_CHANGED, ENTITY_DIED, ENTITY_SUFFERING};
use crate::simulation::notifications::Notification;
use crate::simulation::world::{PendingContext, World};
use crate::triggers::context::emotion_value;

/// Salience of the memory a listener keeps of directed speech
const HEARD_SALIENCE: f64 = 0.3;
/// Social need relieved by speaking or being spoken to
const SPEECH_SOCIAL_RELIEF: f64 = 0.05;

fn payload_number(payload: &Value, key: &str, default: f64) -> f64 {
    payload.get(key).and_then(Value::as_f64).unwrap_or(default)
}

impl World {
    // ========================================================================
    // Context
    // ========================================================================

    /// Merge values into the world context and every entity's context
    pub fn broadcast_context(&mut self, values: Map<String, Value>) {
        self.cascade.reset();
        self.broadcast_context_at(values, None, 0);
    }

    /// Like `broadcast_context`, but the keys expire after `ttl` seconds
    pub fn broadcast_context_with_ttl(&mut self, values: Map<String, Value>, ttl: f64) {
        self.cascade.reset();
        self.broadcast_context_at(values, Some(ttl), 0);
    }

    /// Queue a broadcast; drains the queue unless one is already in flight
    pub(crate) fn broadcast_context_at(&mut self, values: Map<String, Value>, ttl: Option<f64>, depth: u32) {
        self.pending_context.push_back(PendingContext { values, ttl, depth });
        if self.broadcasting {
            debug!(queued = self.pending_context.len(), "Context broadcast queued");
            return;
        }

        self.broadcasting = true;
        let mut drained = 0;
        while let Some(next) = self.pending_context.pop_front() {
            if drained >= self.config.triggers.max_context_drain {
                warn!(
                    dropped = self.pending_context.len() + 1,
                    "Context drain limit reached; dropping queued broadcasts"
                );
                self.pending_context.clear();
                break;
            }
            drained += 1;
            self.apply_context(next);
        }
        self.broadcasting = false;
    }

    fn apply_context(&mut self, pending: PendingContext) {
        let PendingContext { values, ttl, depth } = pending;
        if values.is_empty() {
            return;
        }

        let expires = ttl
            .filter(|t| t.is_finite() && *t >= 0.0)
            .map(|t| self.time + t);
        for (key, value) in &values {
            self.context.insert(key.clone(), value.clone());
            match expires {
                Some(at) => {
                    self.context_expiry.insert(key.clone(), at);
                }
                None => {
                    self.context_expiry.remove(key);
                }
            }
        }
        for entity in &mut self.entities {
            for (key, value) in &values {
                entity.context.insert(key.clone(), value.clone());
            }
        }

        self.apply_reactions();
        self.listeners.emit(&Notification::Context(values.clone()));

        let keys: Vec<&String> = values.keys().collect();
        let payload = json!({ "keys": keys, "values": values });
        self.dispatch_event(CONTEXT_CHANGED, &payload, depth);
    }

    /// Re-evaluate every entity's emotion reactions against its context
    fn apply_reactions(&mut self) {
        let time = self.time;
        for entity in self.entities.iter_mut().filter(|e| e.has(Capability::Emotion)) {
            if entity.reactions.is_empty() {
                continue;
            }
            let root = json!({
                "time": time,
                "context": Value::Object(entity.context.clone()),
                "emotion": emotion_value(&entity.emotion),
                "self": entity.view(),
            });
            let (mut dv, mut da, mut dd) = (0.0, 0.0, 0.0);
            for reaction in entity.reactions.iter().filter(|r| r.guard.guard(&root)) {
                dv += reaction.valence;
                da += reaction.arousal;
                dd += reaction.dominance;
            }
            if dv != 0.0 || da != 0.0 || dd != 0.0 {
                debug!(entity = %entity.id, dv, da, dd, "Emotion reaction");
                entity.emotion.shift(dv, da, dd);
            }
        }
    }

    // ========================================================================
    // Events
    // ========================================================================

    /// Publish a world event; `relay` also delivers it to every inbox
    pub fn broadcast_event(&mut self, name: &str, payload: Value, relay: bool) {
        self.cascade.reset();
        self.emit_event(name, payload, relay, 0);
    }

    pub(crate) fn emit_event(&mut self, name: &str, payload: Value, relay: bool, depth: u32) {
        self.counters.events_emitted += 1;
        let event = WorldEvent {
            name: name.to_string(),
            payload,
            time: self.time,
            depth,
        };
        self.events.push(event.clone());

        match name {
            ENTITY_DIED => self
                .climate
                .record_death(payload_number(&event.payload, "intensity", 0.5)),
            ENTITY_SUFFERING => self
                .climate
                .record_suffering(payload_number(&event.payload, "severity", 0.5)),
            _ => {}
        }

        self.listeners.emit(&Notification::Event(event.clone()));

        if relay {
            let sender = event
                .payload
                .get("source")
                .and_then(Value::as_str)
                .unwrap_or("world")
                .to_string();
            self.queue_message(
                EntityId::new(sender),
                None,
                MessageKind::System,
                json!({ "event": event.name, "payload": event.payload }),
            );
        }

        self.dispatch_event(name, &event.payload, depth);
    }

    pub(crate) fn queue_message(
        &mut self,
        sender: EntityId,
        recipient: Option<EntityId>,
        kind: MessageKind,
        body: Value,
    ) {
        let id = self.next_message_id;
        self.next_message_id += 1;
        self.outbox.push(Message {
            id,
            sender,
            recipient,
            kind,
            body,
            sent_at: self.time,
            deliver_at: self.time + self.config.communication.delivery_delay.max(0.0),
        });
    }

    // ========================================================================
    // Speech
    // ========================================================================

    /// Record an utterance and fire matching mention triggers
    pub fn record_speech(
        &mut self,
        speaker: impl Into<EntityId>,
        text: &str,
        listener: Option<EntityId>,
        mode: Option<&str>,
    ) -> UtteranceId {
        self.cascade.reset();
        self.record_speech_at(speaker.into(), text, listener, mode.map(str::to_string), 0)
    }

    pub(crate) fn record_speech_at(
        &mut self,
        speaker: EntityId,
        text: &str,
        listener: Option<EntityId>,
        mode: Option<String>,
        depth: u32,
    ) -> UtteranceId {
        let speaker_idx = self.index_of(&speaker);
        let emotion = speaker_idx.map_or(Emotion::neutral(), |i| self.entities[i].emotion);
        let speaker_position = speaker_idx.map(|i| self.entities[i].position);

        let id = self.next_utterance_id;
        self.next_utterance_id += 1;
        let utterance = Utterance {
            id,
            speaker_id: speaker.clone(),
            text: text.to_string(),
            listener_id: listener.clone(),
            timestamp: self.time,
            emotion,
            mode,
        };
        self.transcript.push(utterance.clone());
        self.last_utterance = Some(utterance.clone());
        self.counters.utterances += 1;
        debug!(speaker = %speaker, utterance = id, depth, "Utterance recorded");

        let now = self.time;
        let phrase = normalize(text);
        let radius = self.config.relational.interaction_radius;
        for entity in &mut self.entities {
            let is_speaker = entity.id == speaker;
            let is_listener = listener.as_ref() == Some(&entity.id);

            if is_listener && entity.has(Capability::Memory) {
                entity.memory.add(Memory::new(
                    now,
                    "heard",
                    speaker.as_str(),
                    text,
                    HEARD_SALIENCE,
                ));
            }
            if !is_speaker && !phrase.is_empty() && entity.has(Capability::Learning) {
                let in_range = speaker_position.map_or(true, |p| p.distance(&entity.position) <= radius);
                if in_range || is_listener {
                    entity.learned.reinforce(&phrase, now);
                }
            }
            if (is_speaker || is_listener) && entity.has(Capability::Needs) {
                entity.needs.satisfy(NeedType::Social, SPEECH_SOCIAL_RELIEF);
            }
        }

        self.listeners.emit(&Notification::Utterance(utterance.clone()));

        if let Some(listener) = listener.filter(|l| self.index.contains_key(l)) {
            self.queue_message(
                speaker,
                Some(listener),
                MessageKind::Direct,
                json!({
                    "utterance": id,
                    "text": utterance.text,
                    "mode": utterance.mode,
                    "speaker": utterance.speaker_id.as_str(),
                }),
            );
        }

        self.dispatch_mention(&utterance, depth);
        id
    }
}
