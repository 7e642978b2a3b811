//! Proto-language: procedural utterances sampled from known vocabulary
//!
//! `generate` is a pure function of its inputs and seed. It never touches
//! the lexicon; callers pass in a vocabulary pool built from it.

use rand::distributions::{Distribution, WeightedIndex};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::entity::emotion::{sanitize, Emotion};
use crate::linguistics::lexicon::LexiconEntry;
use crate::linguistics::normalize::tokens;

const SYLLABLES: &[&str] = &[
    "ka", "lu", "mi", "to", "ra", "ne", "so", "vi", "da", "pe", "ri", "mo", "ha", "zu",
];
/// Upper bound on words in one generated utterance
pub const MAX_WORDS: usize = 32;

const BRIGHT_PARTICLES: &[&str] = &["la", "mi", "ya"];
const DARK_PARTICLES: &[&str] = &["nu", "ko", "sha"];
const NEUTRAL_PARTICLES: &[&str] = &["a", "o", "ke"];

/// One term the speaker may draw from
#[derive(Debug, Clone, PartialEq)]
pub struct VocabularyItem {
    pub term: String,
    pub usage: u32,
    /// 1.0 = just used, 0.0 = long idle
    pub recency: f64,
    pub emotion: Emotion,
}

impl VocabularyItem {
    pub fn from_entry(entry: &LexiconEntry) -> Self {
        Self {
            term: entry.term.clone(),
            usage: entry.usage_count,
            recency: sanitize(entry.weight, 0.0, 0.0, 1.0),
            emotion: entry.emotion,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerateOptions {
    pub min_words: usize,
    pub max_words: usize,
    pub allow_particles: bool,
    pub allow_emoji: bool,
    /// 0.0 = stick to emotionally fitting, common terms; 1.0 = sample freely
    pub creativity: f64,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            min_words: 1,
            max_words: 4,
            allow_particles: true,
            allow_emoji: false,
            creativity: 0.3,
        }
    }
}

fn item_weight(item: &VocabularyItem, emotion: &Emotion, creativity: f64) -> f64 {
    let frequency = (1.0 + item.usage as f64).ln() + 0.1;
    let recency = 0.5 + sanitize(item.recency, 0.0, 0.0, 1.0);
    let fit = 0.05 + item.emotion.similarity(emotion);
    let raw = frequency * recency * fit.powf(2.0 * (1.0 - creativity));
    // Creativity flattens the distribution toward uniform
    let flattened = raw.powf(1.0 - 0.8 * creativity);
    if flattened.is_finite() && flattened > 0.0 {
        flattened
    } else {
        1e-6
    }
}

fn particle(emotion: &Emotion, rng: &mut ChaCha8Rng) -> &'static str {
    let set = if emotion.valence > 0.3 {
        BRIGHT_PARTICLES
    } else if emotion.valence < -0.3 {
        DARK_PARTICLES
    } else {
        NEUTRAL_PARTICLES
    };
    set[rng.gen_range(0..set.len())]
}

fn emoji(emotion: &Emotion) -> &'static str {
    match emotion.label() {
        "excited" => "✨",
        "content" => "🙂",
        "distressed" => "😣",
        "sad" => "😢",
        "tense" => "😬",
        _ => "🌙",
    }
}

fn babble(rng: &mut ChaCha8Rng) -> String {
    let syllables = rng.gen_range(1..=2);
    (0..syllables)
        .map(|_| SYLLABLES[rng.gen_range(0..SYLLABLES.len())])
        .collect()
}

pub fn generate(pool: &[VocabularyItem], emotion: &Emotion, options: &GenerateOptions, seed: u64) -> String {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let min_words = options.min_words.clamp(1, MAX_WORDS);
    let max_words = options.max_words.clamp(min_words, MAX_WORDS);
    let creativity = sanitize(options.creativity, 0.3, 0.0, 1.0);
    let target = rng.gen_range(min_words..=max_words);

    let weights: Vec<f64> = pool.iter().map(|i| item_weight(i, emotion, creativity)).collect();
    let sampler = WeightedIndex::new(&weights).ok();

    let mut words: Vec<String> = Vec::new();
    let mut last_pick: Option<usize> = None;
    // Each pick adds at least one word, so this terminates
    while words.len() < target {
        let picked: Vec<String> = match &sampler {
            Some(sampler) => {
                let mut idx = sampler.sample(&mut rng);
                if Some(idx) == last_pick && pool.len() > 1 {
                    idx = sampler.sample(&mut rng);
                }
                last_pick = Some(idx);
                let t: Vec<String> = tokens(&pool[idx].term).collect();
                if t.is_empty() {
                    vec![babble(&mut rng)]
                } else {
                    t
                }
            }
            None => vec![babble(&mut rng)],
        };
        for word in picked {
            if words.len() >= max_words {
                break;
            }
            words.push(word);
        }
    }

    let particle_chance = 0.15 + 0.35 * creativity;
    let mut out: Vec<String> = Vec::with_capacity(words.len() * 2);
    for (i, word) in words.into_iter().enumerate() {
        if i > 0 && options.allow_particles && rng.gen_bool(particle_chance) {
            out.push(particle(emotion, &mut rng).to_string());
        }
        out.push(word);
    }

    let mut text = out.join(" ");
    if options.allow_emoji {
        text.push(' ');
        text.push_str(emoji(emotion));
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool() -> Vec<VocabularyItem> {
        vec![
            VocabularyItem {
                term: "sun warm".into(),
                usage: 10,
                recency: 1.0,
                emotion: Emotion::new(0.8, 0.5, 0.5),
            },
            VocabularyItem {
                term: "cold rain".into(),
                usage: 10,
                recency: 1.0,
                emotion: Emotion::new(-0.8, 0.5, 0.5),
            },
            VocabularyItem {
                term: "river".into(),
                usage: 2,
                recency: 0.2,
                emotion: Emotion::neutral(),
            },
        ]
    }

    #[test]
    fn test_same_seed_same_output() {
        let options = GenerateOptions::default();
        let a = generate(&pool(), &Emotion::neutral(), &options, 99);
        let b = generate(&pool(), &Emotion::neutral(), &options, 99);
        assert_eq!(a, b);
    }

    #[test]
    fn test_word_bounds_without_particles() {
        let options = GenerateOptions {
            min_words: 2,
            max_words: 3,
            allow_particles: false,
            ..GenerateOptions::default()
        };
        for seed in 0..50 {
            let text = generate(&pool(), &Emotion::neutral(), &options, seed);
            let n = text.split_whitespace().count();
            assert!((2..=3).contains(&n), "{:?}", text);
        }
    }

    #[test]
    fn test_oversized_bounds_are_clamped() {
        let options = GenerateOptions {
            min_words: usize::MAX / 2,
            max_words: usize::MAX,
            allow_particles: false,
            ..GenerateOptions::default()
        };
        let text = generate(&pool(), &Emotion::neutral(), &options, 1);
        assert_eq!(text.split_whitespace().count(), MAX_WORDS);
    }

    #[test]
    fn test_empty_pool_babbles() {
        let text = generate(&[], &Emotion::neutral(), &GenerateOptions::default(), 3);
        assert!(!text.is_empty());
    }

    #[test]
    fn test_emotion_biases_sampling() {
        let options = GenerateOptions {
            min_words: 2,
            max_words: 2,
            allow_particles: false,
            creativity: 0.0,
            ..GenerateOptions::default()
        };
        let happy = Emotion::new(0.9, 0.5, 0.5);
        let sunny = (0..200)
            .filter(|seed| generate(&pool(), &happy, &options, *seed).contains("sun"))
            .count();
        assert!(sunny > 120, "sunny picks: {}", sunny);
    }

    #[test]
    fn test_emoji_appended() {
        let options = GenerateOptions {
            allow_emoji: true,
            ..GenerateOptions::default()
        };
        let text = generate(&pool(), &Emotion::new(-0.8, 0.2, 0.5), &options, 5);
        assert!(text.ends_with("😢"));
    }
}
