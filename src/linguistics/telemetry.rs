//! Emergence telemetry smoothed over world time

use serde::{Deserialize, Serialize};

use crate::core::types::Seconds;
use crate::linguistics::crystallizer::PassReport;
use crate::linguistics::lexicon::Lexicon;

/// Raw measurements from one crystallizer pass
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EmergenceSample {
    /// Share of analyzed utterances that produced new terms
    pub novelty: f64,
    /// Normalized entropy of lexicon usage
    pub diversity: f64,
    /// Share of analyzed utterances that created or reinforced terms
    pub learning: f64,
}

impl EmergenceSample {
    pub fn from_pass(report: &PassReport, lexicon: &Lexicon) -> Self {
        let analyzed = report.analyzed.max(1) as f64;
        let created = (report.created.len() + usize::from(report.coined.is_some())) as f64;
        Self {
            novelty: (created / analyzed).clamp(0.0, 1.0),
            diversity: lexicon.diversity(),
            learning: ((created + report.updated as f64) / analyzed).clamp(0.0, 1.0),
        }
    }
}

/// Snapshot returned by `World::emergence_state`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmergenceState {
    pub novelty: f64,
    pub diversity: f64,
    pub learning: f64,
    pub lexicon_size: usize,
    pub total_usage: u64,
    pub utterances_analyzed: u64,
    pub passes: u32,
}

#[derive(Debug, Clone, Default)]
pub struct EmergenceTelemetry {
    state: EmergenceState,
    last_update: Option<Seconds>,
}

impl EmergenceTelemetry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Blend in a sample; `alpha = 1 - 0.5^(elapsed / half_life)`
    pub fn update(&mut self, sample: EmergenceSample, report: &PassReport, lexicon: &Lexicon, now: Seconds, half_life: f64) {
        let alpha = match self.last_update {
            None => 1.0,
            Some(last) => {
                let elapsed = (now - last).max(0.0);
                let a = 1.0 - 0.5f64.powf(elapsed / half_life.max(f64::EPSILON));
                if a.is_finite() {
                    a.clamp(0.0, 1.0)
                } else {
                    1.0
                }
            }
        };
        let blend = |old: f64, new: f64| old + (new - old) * alpha;
        self.state.novelty = blend(self.state.novelty, sample.novelty);
        self.state.diversity = blend(self.state.diversity, sample.diversity);
        self.state.learning = blend(self.state.learning, sample.learning);

        let stats = lexicon.stats();
        self.state.lexicon_size = stats.size;
        self.state.total_usage = stats.total_usage;
        self.state.utterances_analyzed += report.analyzed as u64;
        self.state.passes = self.state.passes.saturating_add(1);
        self.last_update = Some(now);
    }

    pub fn state(&self) -> &EmergenceState {
        &self.state
    }
}
