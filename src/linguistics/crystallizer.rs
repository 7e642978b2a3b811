//! Crystallizer: promotes repeated phrases into the lexicon
//!
//! Each pass reads the utterances recorded since the last pass, tallies
//! them per normalized phrase and crystallizes phrases that cross the
//! usage and speaker-diversity thresholds. The cursor only moves forward,
//! so an utterance never contributes to two passes.

use std::collections::BTreeSet;

use ahash::AHashMap;
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::config::CrystallizerConfig;
use crate::core::types::{EntityId, Seconds, UtteranceId};
use crate::entity::emotion::Emotion;
use crate::linguistics::lexicon::{Category, Lexicon, LexiconEntry};
use crate::linguistics::normalize::{normalize, tokens, word_count};
use crate::linguistics::transcript::Transcript;

/// Running statistics for a phrase that has not crystallized yet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhraseTally {
    gloss: String,
    count: u32,
    speakers: BTreeSet<EntityId>,
    first_speaker: EntityId,
    first_seen: Seconds,
    last_seen: Seconds,
    emotion: Emotion,
}

impl PhraseTally {
    fn new(gloss: &str, speaker: &EntityId, emotion: Emotion, now: Seconds) -> Self {
        Self {
            gloss: gloss.to_string(),
            count: 0,
            speakers: BTreeSet::new(),
            first_speaker: speaker.clone(),
            first_seen: now,
            last_seen: now,
            emotion,
        }
    }

    fn add(&mut self, speaker: &EntityId, emotion: &Emotion, at: Seconds) {
        self.count = self.count.saturating_add(1);
        self.speakers.insert(speaker.clone());
        self.last_seen = self.last_seen.max(at);
        let n = self.count as f64;
        self.emotion = self.emotion.clamped(
            self.emotion.valence + (emotion.valence - self.emotion.valence) / n,
            self.emotion.arousal + (emotion.arousal - self.emotion.arousal) / n,
            self.emotion.dominance + (emotion.dominance - self.emotion.dominance) / n,
        );
    }
}

/// Everything a resumed crystallizer needs besides the lexicon itself
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CrystallizerState {
    /// Id of the last utterance analyzed
    pub cursor: UtteranceId,
    pub passes: u32,
    pub ticks_since: u64,
    /// Phrases still below threshold, sorted by term
    pub candidates: Vec<(String, PhraseTally)>,
}

/// What one analysis pass did
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PassReport {
    pub analyzed: usize,
    pub created: Vec<String>,
    pub updated: usize,
    pub evicted: Vec<String>,
    pub coined: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Crystallizer {
    config: CrystallizerConfig,
    cursor: UtteranceId,
    tallies: AHashMap<String, PhraseTally>,
    passes: u32,
    ticks_since: u64,
}

impl Crystallizer {
    pub fn new(config: CrystallizerConfig) -> Self {
        Self {
            config,
            cursor: 0,
            tallies: AHashMap::new(),
            passes: 0,
            ticks_since: 0,
        }
    }

    /// Id of the last utterance analyzed
    pub fn cursor(&self) -> UtteranceId {
        self.cursor
    }

    pub fn passes(&self) -> u32 {
        self.passes
    }

    pub fn pending_candidates(&self) -> usize {
        self.tallies.len()
    }

    /// Called once per tick; runs a pass when the cadence is reached
    pub fn tick(
        &mut self,
        transcript: &Transcript,
        lexicon: &mut Lexicon,
        now: Seconds,
        rng: &mut ChaCha8Rng,
    ) -> Option<PassReport> {
        self.ticks_since += 1;
        if self.ticks_since < self.config.analyze_every {
            return None;
        }
        self.ticks_since = 0;
        Some(self.analyze(transcript, lexicon, now, rng))
    }

    fn usage_threshold(&self) -> u32 {
        if self.passes < self.config.warmup_passes {
            self.config.warmup_min_usage.max(1)
        } else {
            self.config.min_usage
        }
    }

    /// Run one pass immediately
    pub fn analyze(
        &mut self,
        transcript: &Transcript,
        lexicon: &mut Lexicon,
        now: Seconds,
        rng: &mut ChaCha8Rng,
    ) -> PassReport {
        let mut report = PassReport::default();

        for utterance in transcript.since(self.cursor) {
            self.cursor = self.cursor.max(utterance.id);
            report.analyzed += 1;

            let term = normalize(&utterance.text);
            let words = word_count(&term);
            if words == 0 || words > self.config.max_phrase_words {
                continue;
            }

            if let Some(entry) = lexicon.get_mut(&term) {
                entry.record_use(&utterance.emotion, utterance.timestamp);
                report.updated += 1;
                continue;
            }

            if !self.tallies.contains_key(&term) && self.tallies.len() >= self.config.max_candidates {
                // Full: make room by dropping the stalest candidate
                if let Some(stalest) = self
                    .tallies
                    .iter()
                    .min_by(|a, b| {
                        a.1.last_seen
                            .total_cmp(&b.1.last_seen)
                            .then_with(|| a.0.cmp(b.0))
                    })
                    .map(|(k, _)| k.clone())
                {
                    self.tallies.remove(&stalest);
                }
            }

            self.tallies
                .entry(term)
                .or_insert_with(|| {
                    PhraseTally::new(
                        utterance.text.trim(),
                        &utterance.speaker_id,
                        utterance.emotion,
                        utterance.timestamp,
                    )
                })
                .add(&utterance.speaker_id, &utterance.emotion, utterance.timestamp);
        }

        // Promote candidates that crossed both thresholds
        let threshold = self.usage_threshold();
        let mut ready: Vec<String> = self
            .tallies
            .iter()
            .filter(|(_, t)| t.count >= threshold && t.speakers.len() >= self.config.min_speakers)
            .map(|(term, _)| term.clone())
            .collect();
        ready.sort();
        for term in ready {
            if let Some(tally) = self.tallies.remove(&term) {
                let entry = LexiconEntry {
                    category: Category::classify(&term, &tally.emotion),
                    term: term.clone(),
                    gloss: tally.gloss,
                    origin_speaker: Some(tally.first_speaker),
                    usage_count: tally.count,
                    first_seen: tally.first_seen,
                    last_used: tally.last_seen,
                    weight: 1.0,
                    related_terms: Vec::new(),
                    emotion: tally.emotion,
                    coined: false,
                };
                if lexicon.insert_new(entry) {
                    debug!(term = %term, "Phrase crystallized");
                    report.created.push(term);
                }
            }
        }

        let ttl = self.config.candidate_ttl;
        self.tallies.retain(|_, t| now - t.last_seen <= ttl);

        report.evicted = lexicon.decay_and_evict(now, self.config.decay_rate, self.config.evict_below);
        lexicon.relink();

        if self.config.coin_chance > 0.0 && rng.gen_bool(self.config.coin_chance.clamp(0.0, 1.0)) {
            report.coined = self.coin(lexicon, now, rng);
            if report.coined.is_some() {
                lexicon.relink();
            }
        }

        self.passes = self.passes.saturating_add(1);
        report
    }

    /// Blend two related strong entries into a new term
    fn coin(&self, lexicon: &mut Lexicon, now: Seconds, rng: &mut ChaCha8Rng) -> Option<String> {
        let min_weight = self.config.coin_min_weight;
        let mut pairs: Vec<(String, String)> = Vec::new();
        for entry in lexicon.sorted() {
            if entry.weight < min_weight {
                continue;
            }
            for other in &entry.related_terms {
                if entry.term < *other
                    && lexicon.get(other).map_or(false, |o| o.weight >= min_weight)
                {
                    pairs.push((entry.term.clone(), other.clone()));
                }
            }
        }
        if pairs.is_empty() {
            return None;
        }

        let (a, b) = &pairs[rng.gen_range(0..pairs.len())];
        let first = lexicon.get(a)?;
        let second = lexicon.get(b)?;
        let term = portmanteau(&first.term, &second.term)?;
        if lexicon.contains(&term) || term == first.term || term == second.term {
            return None;
        }

        let emotion = Emotion::mean([&first.emotion, &second.emotion]);
        let entry = LexiconEntry {
            term: term.clone(),
            gloss: format!("{} + {}", first.term, second.term),
            origin_speaker: None,
            category: Category::Coined,
            usage_count: first.usage_count.min(second.usage_count),
            first_seen: now,
            last_used: now,
            weight: 1.0,
            related_terms: Vec::new(),
            emotion,
            coined: true,
        };
        if lexicon.insert_new(entry) {
            debug!(term = %term, parents = %format!("{} + {}", a, b), "Term coined");
            Some(term)
        } else {
            None
        }
    }

    pub fn state(&self) -> CrystallizerState {
        let mut candidates: Vec<(String, PhraseTally)> = self
            .tallies
            .iter()
            .map(|(term, tally)| (term.clone(), tally.clone()))
            .collect();
        candidates.sort_by(|a, b| a.0.cmp(&b.0));
        CrystallizerState {
            cursor: self.cursor,
            passes: self.passes,
            ticks_since: self.ticks_since,
            candidates,
        }
    }

    /// Load entries and pending candidates from a snapshot
    pub fn restore(&mut self, lexicon: &mut Lexicon, entries: Vec<LexiconEntry>, state: CrystallizerState) {
        lexicon.clear();
        for entry in entries {
            lexicon.insert_new(entry);
        }
        lexicon.relink();
        self.cursor = state.cursor;
        self.passes = state.passes;
        self.ticks_since = state.ticks_since;
        self.tallies = state.candidates.into_iter().collect();
    }
}

/// Front half of the first word of `a` joined to the back half of the last word of `b`
fn portmanteau(a: &str, b: &str) -> Option<String> {
    let head: Vec<char> = tokens(a).next()?.chars().filter(|c| c.is_alphanumeric()).collect();
    let tail: Vec<char> = tokens(b).last()?.chars().filter(|c| c.is_alphanumeric()).collect();
    if head.is_empty() || tail.is_empty() {
        return None;
    }
    let front: String = head[..head.len().div_ceil(2)].iter().collect();
    let back: String = tail[tail.len() / 2..].iter().collect();
    let term = format!("{}{}", front, back);
    (!term.is_empty()).then_some(term)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linguistics::transcript::Utterance;
    use rand::SeedableRng;

    fn config(min_usage: u32, min_speakers: usize) -> CrystallizerConfig {
        CrystallizerConfig {
            min_usage,
            min_speakers,
            coin_chance: 0.0,
            ..CrystallizerConfig::default()
        }
    }

    fn say(transcript: &mut Transcript, id: UtteranceId, speaker: &str, text: &str) {
        transcript.push(Utterance {
            id,
            speaker_id: EntityId::new(speaker),
            text: text.to_string(),
            listener_id: None,
            timestamp: id as f64,
            emotion: Emotion::neutral(),
            mode: None,
        });
    }

    #[test]
    fn test_crystallizes_after_threshold_across_passes() {
        let mut transcript = Transcript::new(64);
        let mut lexicon = Lexicon::new();
        let mut crystallizer = Crystallizer::new(config(3, 1));
        let mut rng = ChaCha8Rng::seed_from_u64(1);

        for id in 1..=3 {
            say(&mut transcript, id, "luna", "Hello");
            crystallizer.analyze(&transcript, &mut lexicon, id as f64, &mut rng);
            if id < 3 {
                assert!(lexicon.is_empty());
            }
        }
        assert_eq!(lexicon.len(), 1);
        let entry = lexicon.get("hello").unwrap();
        assert_eq!(entry.usage_count, 3);
        assert_eq!(entry.category, Category::Greeting);
        assert_eq!(entry.gloss, "Hello");
    }

    #[test]
    fn test_reanalysis_is_idempotent() {
        let mut transcript = Transcript::new(64);
        let mut lexicon = Lexicon::new();
        let mut crystallizer = Crystallizer::new(config(2, 1));
        let mut rng = ChaCha8Rng::seed_from_u64(1);

        say(&mut transcript, 1, "luna", "rain again");
        say(&mut transcript, 2, "luna", "rain again");
        crystallizer.analyze(&transcript, &mut lexicon, 2.0, &mut rng);
        crystallizer.analyze(&transcript, &mut lexicon, 2.0, &mut rng);
        crystallizer.analyze(&transcript, &mut lexicon, 2.0, &mut rng);
        assert_eq!(lexicon.get("rain again").unwrap().usage_count, 2);
        assert_eq!(crystallizer.cursor(), 2);
    }

    #[test]
    fn test_speaker_diversity_required() {
        let mut transcript = Transcript::new(64);
        let mut lexicon = Lexicon::new();
        let mut crystallizer = Crystallizer::new(config(2, 2));
        let mut rng = ChaCha8Rng::seed_from_u64(1);

        for id in 1..=4 {
            say(&mut transcript, id, "luna", "stars");
        }
        crystallizer.analyze(&transcript, &mut lexicon, 4.0, &mut rng);
        assert!(lexicon.is_empty());

        say(&mut transcript, 5, "orin", "Stars");
        crystallizer.analyze(&transcript, &mut lexicon, 5.0, &mut rng);
        assert_eq!(lexicon.get("stars").unwrap().usage_count, 5);
    }

    #[test]
    fn test_existing_entries_update() {
        let mut transcript = Transcript::new(64);
        let mut lexicon = Lexicon::new();
        let mut crystallizer = Crystallizer::new(config(1, 1));
        let mut rng = ChaCha8Rng::seed_from_u64(1);

        say(&mut transcript, 1, "luna", "hi");
        crystallizer.analyze(&transcript, &mut lexicon, 1.0, &mut rng);
        say(&mut transcript, 2, "orin", "hi");
        let report = crystallizer.analyze(&transcript, &mut lexicon, 2.0, &mut rng);
        assert_eq!(report.updated, 1);
        assert_eq!(lexicon.get("hi").unwrap().usage_count, 2);
        assert_eq!(lexicon.get("hi").unwrap().last_used, 2.0);
    }

    #[test]
    fn test_long_phrases_skipped() {
        let mut transcript = Transcript::new(64);
        let mut lexicon = Lexicon::new();
        let mut crystallizer = Crystallizer::new(CrystallizerConfig {
            max_phrase_words: 2,
            ..config(1, 1)
        });
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        say(&mut transcript, 1, "luna", "this is far too long");
        crystallizer.analyze(&transcript, &mut lexicon, 1.0, &mut rng);
        assert!(lexicon.is_empty());
        assert_eq!(crystallizer.pending_candidates(), 0);
    }

    #[test]
    fn test_warmup_relaxes_threshold() {
        let mut transcript = Transcript::new(64);
        let mut lexicon = Lexicon::new();
        let mut crystallizer = Crystallizer::new(CrystallizerConfig {
            warmup_passes: 1,
            warmup_min_usage: 1,
            ..config(5, 1)
        });
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        say(&mut transcript, 1, "luna", "glow");
        crystallizer.analyze(&transcript, &mut lexicon, 1.0, &mut rng);
        assert!(lexicon.contains("glow"));
    }

    #[test]
    fn test_cadence() {
        let transcript = Transcript::new(8);
        let mut lexicon = Lexicon::new();
        let mut crystallizer = Crystallizer::new(CrystallizerConfig {
            analyze_every: 3,
            ..config(1, 1)
        });
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let ran: Vec<bool> = (0..6)
            .map(|t| crystallizer.tick(&transcript, &mut lexicon, t as f64, &mut rng).is_some())
            .collect();
        assert_eq!(ran, vec![false, false, true, false, false, true]);
    }

    #[test]
    fn test_coining_blends_related_terms() {
        let mut transcript = Transcript::new(64);
        let mut lexicon = Lexicon::new();
        let mut crystallizer = Crystallizer::new(CrystallizerConfig {
            coin_chance: 1.0,
            ..config(1, 1)
        });
        let mut rng = ChaCha8Rng::seed_from_u64(7);

        say(&mut transcript, 1, "luna", "bright moon");
        say(&mut transcript, 2, "orin", "moon river");
        let report = crystallizer.analyze(&transcript, &mut lexicon, 2.0, &mut rng);

        assert_eq!(report.created.len(), 2);
        let coined = report.coined.expect("related pair should coin");
        let entry = lexicon.get(&coined).unwrap();
        assert!(entry.coined);
        assert_eq!(entry.category, Category::Coined);
        assert_eq!(entry.usage_count, 1);
        // Frequency entries are untouched
        assert_eq!(lexicon.get("bright moon").unwrap().usage_count, 1);
    }

    #[test]
    fn test_portmanteau() {
        assert_eq!(portmanteau("bright moon", "moon river").as_deref(), Some("briver"));
        assert_eq!(portmanteau("", "x"), None);
    }

    #[test]
    fn test_restore_keeps_half_counted_candidates() {
        let mut transcript = Transcript::new(64);
        let mut lexicon = Lexicon::new();
        let mut crystallizer = Crystallizer::new(CrystallizerConfig {
            warmup_passes: 1,
            warmup_min_usage: 5,
            ..config(3, 1)
        });
        let mut rng = ChaCha8Rng::seed_from_u64(1);

        say(&mut transcript, 1, "luna", "hello");
        say(&mut transcript, 2, "luna", "hello");
        crystallizer.analyze(&transcript, &mut lexicon, 2.0, &mut rng);
        assert!(lexicon.is_empty());

        let state = crystallizer.state();
        assert_eq!(state.passes, 1);
        assert_eq!(state.candidates.len(), 1);
        let json = serde_json::to_string(&state).unwrap();

        let mut resumed = Crystallizer::new(crystallizer.config.clone());
        let mut resumed_lexicon = Lexicon::new();
        resumed.restore(&mut resumed_lexicon, Vec::new(), serde_json::from_str(&json).unwrap());
        assert_eq!(resumed.cursor(), 2);
        assert_eq!(resumed.pending_candidates(), 1);

        say(&mut transcript, 3, "luna", "hello");
        resumed.analyze(&transcript, &mut resumed_lexicon, 3.0, &mut rng);
        assert_eq!(resumed_lexicon.get("hello").unwrap().usage_count, 3);
    }
}
