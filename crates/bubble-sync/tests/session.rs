use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use bubble_layout::{LayerConfig, SimulationConfig};
use bubble_state::{Entity, EntityRecord, LocalMutation, Placement, Relation, RelationKind};
use bubble_sync::{FeedSender, Frame, MemorySink, SessionConfig, SpaceSession};
use serde_json::json;

fn config() -> SessionConfig {
    SessionConfig::default().with_simulation(SimulationConfig::seeded(11))
}

fn open(config: SessionConfig) -> (SpaceSession, FeedSender, MemorySink) {
    let sink = MemorySink::new();
    let (session, feed) = SpaceSession::new(config, Arc::new(sink.clone()), "me").unwrap();
    (session, feed, sink)
}

fn until_settled(session: &mut SpaceSession) -> Frame {
    for _ in 0..5_000 {
        let frame = session.frame();
        if frame.settled {
            return frame;
        }
    }
    panic!("layout did not settle");
}

async fn wait_for_dispatches(session: &SpaceSession) {
    for _ in 0..500 {
        if session.pending_dispatches() == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
}

fn ids(frame: &Frame) -> BTreeSet<&str> {
    frame.positions.keys().map(String::as_str).collect()
}

#[tokio::test]
async fn placed_entities_stay_out_of_layout() {
    let (mut session, _feed, _sink) = open(config());
    session.load(
        vec![
            Entity::new("a", 3.0).into(),
            Entity::new("b", 2.0).into(),
            Entity::new("c", 1.0).into(),
            EntityRecord {
                entity: Entity::new("p", 9.0),
                placement: Some(Placement::new("p", 5.0, 0.0, 5.0)),
            },
        ],
        Vec::new(),
        vec![Relation::new("a", "b", RelationKind::Follow)],
    );

    let frame = until_settled(&mut session);
    assert_eq!(ids(&frame), BTreeSet::from(["a", "b", "c"]));
    assert!(frame.idle.is_empty());
    assert!(frame.dispatch_error.is_none());
    assert!(!frame.needs_resync);

    // Settled frames keep reporting the final layout
    let again = session.frame();
    assert!(again.settled);
    assert_eq!(again.positions, frame.positions);
}

#[tokio::test]
async fn remote_insert_warm_restarts_layout() {
    let (mut session, feed, _sink) = open(config());
    session.load(
        vec![Entity::new("a", 1.0).into(), Entity::new("b", 1.0).into()],
        Vec::new(),
        Vec::new(),
    );
    until_settled(&mut session);

    let insert = json!({ "kind": "insert", "target": "entity", "payload": { "id": "c", "weight": 1 } });
    feed.send(insert.clone()).await.unwrap();
    // At-least-once delivery
    feed.send(insert).await.unwrap();

    let frame = session.frame();
    assert!(!frame.settled);
    assert_eq!(session.snapshot().len(), 3);
    assert_eq!(ids(&frame), BTreeSet::from(["a", "b", "c"]));

    // Warm restart, not a cold one from alpha_start
    let alpha = session.simulation().alpha();
    assert!(alpha > 0.0 && alpha <= 0.3, "alpha {alpha}");

    let settled = until_settled(&mut session);
    assert_eq!(settled.positions.len(), 3);
}

#[tokio::test]
async fn malformed_payloads_are_dropped() {
    let (mut session, feed, _sink) = open(config());
    session.load(vec![Entity::new("a", 1.0).into()], Vec::new(), Vec::new());

    feed.send(json!({ "kind": "insert", "target": "galaxy", "payload": {} }))
        .await
        .unwrap();
    feed.send(json!("not an event")).await.unwrap();

    session.frame();
    assert_eq!(session.snapshot().len(), 1);
}

#[tokio::test]
async fn local_edits_are_persisted() {
    let (mut session, _feed, sink) = open(config());
    session.load(
        vec![Entity::new("a", 1.0).into(), Entity::new("b", 1.0).into()],
        Vec::new(),
        Vec::new(),
    );

    session
        .apply_local(LocalMutation::UpdatePlacement {
            placement: Placement::new("a", 10.0, 0.0, -4.0),
        })
        .unwrap();
    session
        .apply_local(LocalMutation::AddRelation {
            relation: Relation::new("a", "b", RelationKind::Inspiration),
        })
        .unwrap();

    wait_for_dispatches(&session).await;
    let frame = session.frame();

    assert!(frame.dispatch_error.is_none());
    assert_eq!(sink.len().await, 2);
    assert_eq!(session.reconciler().in_flight(), 0);
    // "a" now has a spot in the space view
    assert_eq!(ids(&frame), BTreeSet::from(["b"]));
}

#[tokio::test]
async fn failed_dispatch_is_flagged_and_retried() {
    let (mut session, _feed, sink) = open(config());
    session.load(vec![Entity::new("a", 1.0).into()], Vec::new(), Vec::new());

    sink.fail_next(1);
    session
        .apply_local(LocalMutation::UpdatePlacement {
            placement: Placement::new("a", 1.0, 0.0, 1.0),
        })
        .unwrap();
    wait_for_dispatches(&session).await;

    let frame = session.frame();
    assert!(frame.dispatch_error.is_some());
    // Optimistic state survives the failure
    assert_eq!(session.snapshot().placement("a").unwrap().position(), [1.0, 0.0, 1.0]);
    assert_eq!(sink.len().await, 0);

    assert_eq!(session.retry_failed(), 1);
    wait_for_dispatches(&session).await;
    let frame = session.frame();
    assert!(frame.dispatch_error.is_none());
    assert_eq!(sink.len().await, 1);
}

#[tokio::test]
async fn only_active_layer_is_simulated() {
    let (mut session, _feed, _sink) = open(config().with_layers(LayerConfig::with_layer_size(3)));
    session.load(
        (0..7).map(|i| EntityRecord::from(Entity::new(format!("n{i}"), (7 - i) as f64))),
        Vec::new(),
        Vec::new(),
    );

    let frame = session.frame();
    assert_eq!(session.layers().len(), 3);
    assert_eq!(ids(&frame), BTreeSet::from(["n0", "n1", "n2"]));
    assert_eq!(frame.idle.len(), 4);

    session.set_active_layer(1).unwrap();
    let frame = session.frame();
    assert_eq!(ids(&frame), BTreeSet::from(["n3", "n4", "n5"]));
    assert!(frame.idle.contains_key("n0"));
    assert!(session.set_active_layer(3).is_err());

    let depth = session.layers().depth_of(2);
    assert_eq!(session.layer_at_depth(depth), 2);
    assert!(session.focus_depth(depth).unwrap());
    assert!(!session.focus_depth(depth).unwrap());
    let frame = session.frame();
    assert_eq!(ids(&frame), BTreeSet::from(["n6"]));

    let style = session.layer_style(0);
    assert!(style.scale < 1.0 && style.opacity < 1.0);
}

#[tokio::test]
async fn leave_discards_everything() {
    let (mut session, feed, _sink) = open(config());
    session.load(vec![Entity::new("a", 1.0).into()], Vec::new(), Vec::new());
    session.frame();

    session.leave();
    assert!(feed
        .send(json!({ "kind": "insert", "target": "entity", "payload": { "id": "late" } }))
        .await
        .is_err());

    let frame = session.frame();
    assert!(frame.positions.is_empty());
    assert!(session.snapshot().is_empty());
    assert!(!session.reconciler().is_loaded());

    let feed = session.rejoin();
    session.load(vec![Entity::new("b", 1.0).into()], Vec::new(), Vec::new());
    feed.send(json!({ "kind": "insert", "target": "entity", "payload": { "id": "c" } }))
        .await
        .unwrap();
    let frame = until_settled(&mut session);
    assert_eq!(ids(&frame), BTreeSet::from(["b", "c"]));
}

#[tokio::test]
async fn pinned_entity_holds_position() {
    let (mut session, _feed, _sink) = open(config());
    session.load(
        vec![Entity::new("a", 1.0).into(), Entity::new("b", 1.0).into()],
        Vec::new(),
        vec![Relation::new("a", "b", RelationKind::Follow)],
    );
    session.frame();

    assert!(session.pin("a", glam::DVec3::new(40.0, -20.0, 0.0)));
    assert!(!session.pin("ghost", glam::DVec3::ZERO));

    let frame = until_settled(&mut session);
    let a = frame.positions["a"];
    assert_eq!((a.x, a.y), (40.0, -20.0));

    assert!(session.unpin("a"));
    assert!(!session.unpin("a"));
}

#[tokio::test]
async fn deleted_entity_loses_its_pin() {
    let (mut session, feed, _sink) = open(config());
    session.load(
        vec![Entity::new("a", 1.0).into(), Entity::new("b", 1.0).into()],
        Vec::new(),
        Vec::new(),
    );
    session.frame();
    assert!(session.pin("a", glam::DVec3::new(40.0, -20.0, 0.0)));

    feed.send(json!({ "kind": "delete", "target": "entity", "payload": { "id": "a" } }))
        .await
        .unwrap();
    let frame = session.frame();
    assert_eq!(ids(&frame), BTreeSet::from(["b"]));

    // Same id comes back as a new entity
    feed.send(json!({ "kind": "insert", "target": "entity", "payload": { "id": "a", "weight": 1 } }))
        .await
        .unwrap();
    let frame = until_settled(&mut session);
    let a = frame.positions["a"];
    assert_ne!((a.x, a.y), (40.0, -20.0));
    assert!(!session.unpin("a"));
}
