//! Emotion vector (valence / arousal / dominance)
//!
//! Every mutation goes through `clamped`, which also rejects non-finite
//! inputs by keeping the previous value. Long runs compound small drifts,
//! so no other path may write the raw fields.

use serde::{Deserialize, Serialize};

/// Replace a non-finite value with a fallback, then clamp into range
pub fn sanitize(value: f64, fallback: f64, min: f64, max: f64) -> f64 {
    if value.is_finite() {
        value.clamp(min, max)
    } else {
        fallback.clamp(min, max)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Emotion {
    /// -1.0 = miserable, 1.0 = elated
    pub valence: f64,
    /// 0.0 = calm, 1.0 = agitated
    pub arousal: f64,
    /// 0.0 = submissive, 1.0 = in control
    pub dominance: f64,
}

impl Default for Emotion {
    fn default() -> Self {
        Self::neutral()
    }
}

impl Emotion {
    pub fn new(valence: f64, arousal: f64, dominance: f64) -> Self {
        Self::neutral().clamped(valence, arousal, dominance)
    }

    pub const fn neutral() -> Self {
        Self {
            valence: 0.0,
            arousal: 0.5,
            dominance: 0.5,
        }
    }

    /// Produce a copy with the given raw values sanitized against `self`
    pub fn clamped(&self, valence: f64, arousal: f64, dominance: f64) -> Self {
        Self {
            valence: sanitize(valence, self.valence, -1.0, 1.0),
            arousal: sanitize(arousal, self.arousal, 0.0, 1.0),
            dominance: sanitize(dominance, self.dominance, 0.0, 1.0),
        }
    }

    /// Add deltas, clamping each axis
    pub fn shift(&mut self, dv: f64, da: f64, dd: f64) {
        *self = self.clamped(self.valence + dv, self.arousal + da, self.dominance + dd);
    }

    /// Move toward `target` by `fraction` of the gap (fraction clamped to [0, 1])
    pub fn blend_toward(&mut self, target: &Emotion, fraction: f64) {
        let f = sanitize(fraction, 0.0, 0.0, 1.0);
        *self = self.clamped(
            self.valence + (target.valence - self.valence) * f,
            self.arousal + (target.arousal - self.arousal) * f,
            self.dominance + (target.dominance - self.dominance) * f,
        );
    }

    /// Drift toward a baseline at `rate` per second
    pub fn drift(&mut self, baseline: &Emotion, rate: f64, dt: f64) {
        self.blend_toward(baseline, (rate * dt).min(1.0));
    }

    /// Similarity in [0, 1]; 1.0 means identical
    pub fn similarity(&self, other: &Emotion) -> f64 {
        // Max distance: valence spans 2, the others span 1
        let max = (4.0f64 + 1.0 + 1.0).sqrt();
        let dv = self.valence - other.valence;
        let da = self.arousal - other.arousal;
        let dd = self.dominance - other.dominance;
        let distance = (dv * dv + da * da + dd * dd).sqrt();
        sanitize(1.0 - distance / max, 0.0, 0.0, 1.0)
    }

    /// Energy used by adaptive time: how far from calm-neutral the mood is
    pub fn energy(&self, arousal_weight: f64, valence_weight: f64) -> f64 {
        arousal_weight * (self.arousal - 0.5).abs() + valence_weight * self.valence.abs()
    }

    pub fn is_valid(&self) -> bool {
        self.valence.is_finite()
            && self.arousal.is_finite()
            && self.dominance.is_finite()
            && (-1.0..=1.0).contains(&self.valence)
            && (0.0..=1.0).contains(&self.arousal)
            && (0.0..=1.0).contains(&self.dominance)
    }

    /// Mean of a set of emotions (neutral when empty)
    pub fn mean<'a>(emotions: impl IntoIterator<Item = &'a Emotion>) -> Emotion {
        let mut count = 0usize;
        let (mut v, mut a, mut d) = (0.0, 0.0, 0.0);
        for e in emotions {
            v += e.valence;
            a += e.arousal;
            d += e.dominance;
            count += 1;
        }
        if count == 0 {
            return Emotion::neutral();
        }
        let n = count as f64;
        Emotion::new(v / n, a / n, d / n)
    }

    /// Short mood label for logs and analytics
    pub fn label(&self) -> &'static str {
        match (self.valence, self.arousal) {
            (v, a) if v > 0.3 && a > 0.6 => "excited",
            (v, _) if v > 0.3 => "content",
            (v, a) if v < -0.3 && a > 0.6 => "distressed",
            (v, _) if v < -0.3 => "sad",
            (_, a) if a > 0.7 => "tense",
            _ => "calm",
        }
    }
}
