//! Tick system - orchestrates simulation updates
//!
//! Each tick advances the world clock, then runs the phases in order:
//! physical -> mental -> communication -> relational -> housekeeping ->
//! cognitive -> world mind -> linguistics -> time triggers
//!
//! Every phase can be switched off through `PhaseFlags`. Listeners receive
//! the `Tick` notification after all phases have run.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::climate::{detect_groups, MindSample, WorldStats};
use crate::core::types::{Seconds, Tick};
use crate::entity::capabilities::Capability;
use crate::entity::emotion::Emotion;
use crate::linguistics::EmergenceSample;
use crate::simulation::adaptive_time::effective_dt;
use crate::simulation::cognitive::update_cognition;
use crate::simulation::communication::deliver_messages;
use crate::simulation::housekeeping::{collect_due_firings, run_housekeeping};
use crate::simulation::mental::update_minds;
use crate::simulation::notifications::Notification;
use crate::simulation::physical::update_motion;
use crate::simulation::relational::update_relations;
use crate::simulation::world::{TickCounters, World};

/// Summary of one tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickReport {
    pub tick: Tick,
    /// World time after the tick
    pub time: Seconds,
    /// Requested step
    pub dt: f64,
    /// Step actually applied after adaptive time
    pub effective_dt: f64,
    pub utterances: usize,
    pub triggers_fired: usize,
    pub events_emitted: usize,
    /// Terms added to the lexicon by this tick's crystallizer pass
    pub new_terms: usize,
}

impl World {
    /// Advance the world by `dt` seconds
    pub fn tick(&mut self, dt: f64) -> TickReport {
        let requested = if dt.is_finite() && dt >= 0.0 {
            dt
        } else {
            warn!(dt, "Invalid tick step; using 0");
            0.0
        };
        let step = effective_dt(requested, &self.mind.collective(), &self.config.adaptive_time);

        self.cascade.reset();
        self.counters = TickCounters::default();
        self.time += step;
        self.tick += 1;

        let phases = self.config.phases.clone();
        if phases.physical {
            update_motion(self, step);
        }
        if phases.mental {
            update_minds(self, step);
        }
        if phases.communication {
            deliver_messages(self);
        }
        if phases.relational {
            update_relations(self, step);
        }
        if phases.housekeeping {
            run_housekeeping(self);
        } else if phases.time_triggers {
            collect_due_firings(self);
        }
        if phases.cognitive {
            update_cognition(self, step);
        }
        if phases.world_mind {
            update_world_mind(self);
        }
        let new_terms = if phases.linguistics {
            update_linguistics(self)
        } else {
            0
        };
        if phases.time_triggers {
            self.run_due_firings();
        } else {
            self.due_firings.clear();
        }

        let report = TickReport {
            tick: self.tick,
            time: self.time,
            dt: requested,
            effective_dt: step,
            utterances: self.counters.utterances,
            triggers_fired: self.counters.triggers_fired,
            events_emitted: self.counters.events_emitted,
            new_terms,
        };
        debug!(
            tick = report.tick,
            time = report.time,
            fired = report.triggers_fired,
            "Tick complete"
        );
        self.listeners.emit(&Notification::Tick(report.clone()));
        report
    }
}

/// Recompute aggregate stats and groups when the cadence comes round
fn update_world_mind(world: &mut World) {
    if !world.mind.due(world.config.world_mind.every_ticks) {
        return;
    }

    let samples: Vec<MindSample> = world
        .entities
        .iter()
        .map(|e| MindSample {
            id: &e.id,
            position: e.position,
            emotion: e.emotion,
            relationships: &e.relationships,
            memories: e.memory.len(),
        })
        .collect();

    let feeling: Vec<&Emotion> = world
        .entities
        .iter()
        .filter(|e| e.has(Capability::Emotion))
        .map(|e| &e.emotion)
        .collect();
    let collective = if feeling.is_empty() {
        Emotion::neutral()
    } else {
        Emotion::mean(feeling)
    };

    let bonded: Vec<f64> = world
        .entities
        .iter()
        .filter(|e| !e.relationships.is_empty())
        .map(|e| e.relationships.mean_strength())
        .collect();
    let mean_bond = if bonded.is_empty() {
        0.0
    } else {
        bonded.iter().sum::<f64>() / bonded.len() as f64
    };

    let config = &world.config.world_mind;
    let stats = WorldStats {
        tick: world.tick,
        time: world.time,
        population: world.entities.len(),
        collective,
        mean_bond,
        total_memories: samples.iter().map(|s| s.memories).sum(),
        groups: detect_groups(&samples, config.group_radius, config.group_bond),
        climate: world.climate,
        lexicon_size: world.lexicon.len(),
        utterances: world.transcript.len(),
    };

    debug!(
        population = stats.population,
        groups = stats.groups.len(),
        "World mind updated"
    );
    world.mind.update(stats.clone());
    world.listeners.emit(&Notification::Analytics(stats));
}

/// Run the crystallizer; returns how many terms were added
fn update_linguistics(world: &mut World) -> usize {
    let Some(report) = world.crystallizer.tick(
        &world.transcript,
        &mut world.lexicon,
        world.time,
        &mut world.rng,
    ) else {
        return 0;
    };
    let sample = EmergenceSample::from_pass(&report, &world.lexicon);
    world.telemetry.update(
        sample,
        &report,
        &world.lexicon,
        world.time,
        world.config.telemetry.half_life,
    );
    report.created.len()
}
