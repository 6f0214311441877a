//! Headless Bubble space
//!
//! Generates a random space, streams a few remote changes into it and runs
//! the layout until it settles.
//!
//! ```text
//! bubble-sim [--entities N] [--seed S] [--layer-size K] [--max-frames M] [--json]
//! ```

use std::sync::Arc;
use std::time::Duration;

use bubble_layout::{LayerConfig, SimulationConfig};
use bubble_state::{
    Entity, EntityEvent, EntityRecord, LocalMutation, Placement, Relation, RelationEvent,
    RelationKind, RemoteEvent,
};
use bubble_sync::{FeedSender, MemorySink, SessionConfig, SpaceSession};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const FRAME_INTERVAL: Duration = Duration::from_millis(16);

#[derive(Debug)]
struct Args {
    entities: usize,
    seed: u64,
    layer_size: usize,
    max_frames: usize,
    json: bool,
}

impl Args {
    fn parse() -> Result<Self, String> {
        let mut args = Args {
            entities: 60,
            seed: 7,
            layer_size: 20,
            max_frames: 2_000,
            json: false,
        };
        let mut it = std::env::args().skip(1);
        while let Some(flag) = it.next() {
            match flag.as_str() {
                "--json" => args.json = true,
                "--entities" => args.entities = value(&flag, it.next())?,
                "--seed" => args.seed = value(&flag, it.next())?,
                "--layer-size" => args.layer_size = value(&flag, it.next())?,
                "--max-frames" => args.max_frames = value(&flag, it.next())?,
                other => return Err(format!("unknown argument {other}")),
            }
        }
        Ok(args)
    }
}

fn value<T: std::str::FromStr>(flag: &str, raw: Option<String>) -> Result<T, String> {
    raw.as_deref()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| format!("{flag} needs a numeric value"))
}

fn generate(rng: &mut StdRng, count: usize) -> (Vec<EntityRecord>, Vec<Relation>) {
    let kinds = [
        RelationKind::Follow,
        RelationKind::Collaboration,
        RelationKind::Inspiration,
    ];

    let records = (0..count)
        .map(|i| {
            let entity = Entity::new(format!("bubble-{i}"), rng.gen_range(1..40) as f64)
                .with_label(format!("user{i}"));
            // Roughly one in ten already has a spot in the space view
            let placement = rng.gen_bool(0.1).then(|| {
                Placement::new(
                    entity.id.clone(),
                    rng.gen_range(-200.0..200.0),
                    0.0,
                    rng.gen_range(-200.0..200.0),
                )
                .at(1)
            });
            EntityRecord { entity, placement }
        })
        .collect();

    let relations = if count < 2 {
        Vec::new()
    } else {
        (0..count)
            .map(|_| {
                let a = rng.gen_range(0..count);
                let b = (a + rng.gen_range(1..count)) % count;
                Relation::new(
                    format!("bubble-{a}"),
                    format!("bubble-{b}"),
                    kinds[rng.gen_range(0..kinds.len())],
                )
            })
            .collect()
    };

    (records, relations)
}

/// Plays the part of the pub/sub subscription.
async fn publish(feed: FeedSender, count: usize, seed: u64) {
    let mut rng = StdRng::seed_from_u64(seed ^ 0x5eed);
    for i in 0..5 {
        tokio::time::sleep(Duration::from_millis(rng.gen_range(20..120))).await;

        let id = format!("remote-{i}");
        let events = [
            RemoteEvent::Entity(EntityEvent::Insert(
                Entity::new(id.clone(), rng.gen_range(1..40) as f64).into(),
            )),
            RemoteEvent::Relation(RelationEvent::Insert(Relation::new(
                id,
                format!("bubble-{}", rng.gen_range(0..count.max(1))),
                RelationKind::Follow,
            ))),
        ];
        for event in events {
            let value = match event.to_value() {
                Ok(value) => value,
                Err(e) => {
                    tracing::warn!(error = %e, "could not encode event");
                    continue;
                }
            };
            // Duplicate delivery is normal on this channel
            let copies = if rng.gen_bool(0.3) { 2 } else { 1 };
            for _ in 0..copies {
                if feed.send(value.clone()).await.is_err() {
                    return;
                }
            }
        }
    }
    tracing::info!("publisher done");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bubble_sim=info,bubble=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse()?;
    tracing::info!(?args, "starting bubble-sim");

    let config = SessionConfig::default()
        .with_simulation(SimulationConfig::seeded(args.seed))
        .with_layers(LayerConfig::with_layer_size(args.layer_size));
    let sink = MemorySink::new();
    let (mut session, feed) = SpaceSession::new(config, Arc::new(sink.clone()), "local-user")?;

    let mut rng = StdRng::seed_from_u64(args.seed);
    let (records, relations) = generate(&mut rng, args.entities);
    session.load(records, Vec::new(), relations);

    let publisher = tokio::spawn(publish(feed, args.entities, args.seed));

    session.apply_local(LocalMutation::CreateEntity {
        entity: Entity::new("local-bubble", 25.0).with_label("local-user"),
        placement: None,
    })?;
    if args.entities > 0 {
        session.apply_local(LocalMutation::AddRelation {
            relation: Relation::new("local-bubble", "bubble-0", RelationKind::Collaboration),
        })?;
    }

    let mut interval = tokio::time::interval(FRAME_INTERVAL);
    let mut last = None;
    for n in 0..args.max_frames {
        interval.tick().await;
        // Checked before draining so nothing the publisher sent is left behind
        let published = publisher.is_finished();
        let frame = session.frame();

        if n % 60 == 0 {
            tracing::info!(
                tick = frame.tick,
                active = frame.positions.len(),
                idle = frame.idle.len(),
                alpha = session.simulation().alpha(),
                "frame"
            );
        }
        if let Some(err) = &frame.dispatch_error {
            tracing::warn!(error = %err, "persistence failing");
        }

        let done = frame.settled && published && session.pending_dispatches() == 0;
        last = Some(frame);
        if done {
            break;
        }
    }

    let snapshot = session.snapshot();
    tracing::info!(
        entities = snapshot.len(),
        placed = snapshot.placement_count(),
        relations = snapshot.relation_count(),
        layers = session.layers().len(),
        persisted = sink.len().await,
        "space settled"
    );

    if args.json {
        if let Some(frame) = &last {
            println!("{}", serde_json::to_string_pretty(frame)?);
        }
    }

    session.leave();
    Ok(())
}
