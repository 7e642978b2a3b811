//! Adaptive time: emotionally charged worlds run slightly faster

use crate::core::config::AdaptiveTimeConfig;
use crate::entity::emotion::{sanitize, Emotion};

/// Dilated step length
///
/// `dt * (1 + k * (energy - 0.2))` with `k` clamped to [0, 1]. Non-finite or
/// negative input yields 0; the result is always finite and non-negative.
pub fn effective_dt(dt: f64, collective: &Emotion, config: &AdaptiveTimeConfig) -> f64 {
    if !dt.is_finite() || dt <= 0.0 {
        return 0.0;
    }
    if !config.enabled {
        return dt;
    }
    let k = sanitize(config.k, 0.0, 0.0, 1.0);
    let energy = collective.energy(config.arousal_weight, config.valence_weight);
    let scaled = dt * (1.0 + k * (energy - 0.2));
    sanitize(scaled, dt, 0.0, f64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enabled(k: f64) -> AdaptiveTimeConfig {
        AdaptiveTimeConfig {
            enabled: true,
            k,
            ..AdaptiveTimeConfig::default()
        }
    }

    #[test]
    fn test_disabled_is_identity() {
        let config = AdaptiveTimeConfig::default();
        assert_eq!(effective_dt(0.5, &Emotion::new(1.0, 1.0, 1.0), &config), 0.5);
    }

    #[test]
    fn test_calm_world_slows_slightly() {
        // Neutral emotion has zero energy
        let dt = effective_dt(1.0, &Emotion::neutral(), &enabled(0.5));
        assert!((dt - 0.9).abs() < 1e-12);
    }

    #[test]
    fn test_excited_world_speeds_up() {
        let dt = effective_dt(1.0, &Emotion::new(1.0, 1.0, 0.5), &enabled(1.0));
        // energy = 0.6 * 0.5 + 0.4 * 1.0 = 0.7
        assert!((dt - 1.5).abs() < 1e-12);
    }

    #[test]
    fn test_bad_input() {
        let config = enabled(2.0);
        assert_eq!(effective_dt(f64::NAN, &Emotion::neutral(), &config), 0.0);
        assert_eq!(effective_dt(-1.0, &Emotion::neutral(), &config), 0.0);
        assert_eq!(effective_dt(f64::INFINITY, &Emotion::neutral(), &config), 0.0);
        assert!(effective_dt(1.0, &Emotion::neutral(), &config) >= 0.0);
    }
}
