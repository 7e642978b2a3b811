//! Murmur - headless demo runner
//!
//! Loads materials, spawns one entity per material in a ring, plays a short
//! scripted conversation and reports the lexicon that emerges.

use std::fs;
use std::path::PathBuf;

use clap::Parser;
use murmur::core::config::WorldConfig;
use murmur::core::error::Result;
use murmur::core::types::Vec2;
use murmur::entity::material::load_materials_dir;
use murmur::simulation::{Notification, NotificationKind, World};
use serde::Serialize;

/// Lines the user speaks, round robin
const SCRIPT: &[&str] = &[
    "good morning little ones",
    "the river is cold today",
    "good morning everyone",
    "who wants to play by the river",
    "the river is cold but bright",
    "good night little ones",
];

/// Murmur - run a social simulation headless
#[derive(Parser, Debug)]
#[command(name = "murmur")]
#[command(about = "Run a headless murmur simulation and report the emergent lexicon")]
struct Args {
    /// Directory of `.toml` / `.json` materials
    #[arg(long, default_value = "data/materials")]
    materials: PathBuf,

    /// World configuration file (TOML); defaults apply when absent
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of ticks to run
    #[arg(long, default_value_t = 300)]
    ticks: u64,

    /// Seconds per tick
    #[arg(long, default_value_t = 1.0)]
    dt: f64,

    /// The user speaks every this many ticks (0 = never)
    #[arg(long, default_value_t = 5)]
    speak_every: u64,

    /// Random seed, overrides the config file
    #[arg(long)]
    seed: Option<u64>,

    /// Output format: text or json
    #[arg(long, default_value = "text")]
    format: String,

    /// Write a world snapshot here when done
    #[arg(long)]
    snapshot: Option<PathBuf>,

    /// Print every utterance as it happens
    #[arg(long, short = 'v')]
    verbose: bool,
}

#[derive(Serialize)]
struct RunSummary {
    session: String,
    ticks: u64,
    time: f64,
    population: usize,
    utterances: usize,
    lexicon: murmur::linguistics::LexiconStats,
    emergence: murmur::linguistics::EmergenceState,
    popular: Vec<String>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("murmur=info")),
        )
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => WorldConfig::from_toml_str(&fs::read_to_string(path)?)?,
        None => WorldConfig::default(),
    };
    if let Some(seed) = args.seed {
        config.seed = seed;
    }

    let mut world = World::new(config)?;
    let materials = load_materials_dir(&args.materials)?;
    tracing::info!(count = materials.len(), dir = %args.materials.display(), "Materials loaded");

    let radius = 3.0;
    for (i, spec) in materials.iter().enumerate() {
        let angle = i as f64 / materials.len().max(1) as f64 * std::f64::consts::TAU;
        world.spawn(spec, Vec2::new(radius * angle.cos(), radius * angle.sin()))?;
    }

    if args.verbose {
        world.on(NotificationKind::Utterance, |n| {
            if let Notification::Utterance(u) = n {
                println!("[{:>7.1}] {}: {}", u.timestamp, u.speaker_id, u.text);
            }
        });
    }

    let mut line = 0;
    for tick in 0..args.ticks {
        if args.speak_every > 0 && tick % args.speak_every == 0 {
            world.record_speech("user", SCRIPT[line % SCRIPT.len()], None, None);
            line += 1;
        }
        world.tick(args.dt);
    }

    let summary = RunSummary {
        session: world.session_id().to_string(),
        ticks: world.tick_count(),
        time: world.time(),
        population: world.entity_count(),
        utterances: world.transcript().len(),
        lexicon: world.lexicon_stats(),
        emergence: world.emergence_state().clone(),
        popular: world
            .popular_terms(2)
            .into_iter()
            .map(|e| format!("{} ({})", e.term, e.usage_count))
            .collect(),
    };

    match args.format.as_str() {
        "json" => println!("{}", serde_json::to_string_pretty(&summary)?),
        _ => print_text(&world, &summary),
    }

    if let Some(path) = &args.snapshot {
        fs::write(path, world.snapshot().to_json()?)?;
        tracing::info!(path = %path.display(), "Snapshot written");
    }
    Ok(())
}

fn print_text(world: &World, summary: &RunSummary) {
    println!("\n=== MURMUR ===");
    println!(
        "{} ticks, {:.1}s of world time, {} entities, {} utterances",
        summary.ticks, summary.time, summary.population, summary.utterances
    );
    println!(
        "Lexicon: {} terms ({} coined), novelty {:.2}, diversity {:.2}",
        summary.lexicon.size,
        summary.lexicon.coined,
        summary.emergence.novelty,
        summary.emergence.diversity
    );
    for term in &summary.popular {
        println!("  {}", term);
    }

    let climate = world.climate();
    println!(
        "Climate: grief {:.2}  vitality {:.2}  tension {:.2}  harmony {:.2}",
        climate.grief, climate.vitality, climate.tension, climate.harmony
    );
    for entity in world.entities() {
        println!(
            "  {:<16} {:<10} memories {:>3}  bonds {:>2}",
            entity.id.as_str(),
            entity.emotion.label(),
            entity.memory.len(),
            entity.relationships.len()
        );
    }
}
