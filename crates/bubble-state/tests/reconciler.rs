use bubble_state::{
    Entity, EntityEvent, EntityRecord, LocalMutation, MergeOutcome, Placement, PlacementEvent,
    PlacementRef, Reconciler, Relation, RelationEvent, RelationKind, RemoteEvent,
};
use proptest::prelude::*;
use serde_json::json;

fn load(ids: &[&str]) -> Reconciler {
    let mut r = Reconciler::default();
    r.bulk_load(
        ids.iter().map(|id| EntityRecord::from(Entity::new(*id, 1.0))),
        Vec::new(),
        Vec::new(),
    );
    r
}

#[test]
fn echoed_older_placement_does_not_undo_local_move() {
    let mut r = load(&["E1"]);
    assert!(r.snapshot().placement("E1").is_none());

    r.apply_local(LocalMutation::UpdatePlacement {
        placement: Placement::new("E1", 1.0, 2.0, 0.0),
    })
    .unwrap();

    let token = r.session();
    let older = json!({
        "kind": "update",
        "target": "placement",
        "payload": { "node_id": "E1", "position_x": 8, "position_y": 8, "position_z": 8, "updated_at": 1 }
    });
    r.enqueue_raw(token, older.clone()).unwrap();
    r.enqueue_raw(token, older).unwrap();
    let report = r.drain_remote();

    assert_eq!(report.applied, 0);
    assert_eq!(r.snapshot().placement("E1").unwrap().position(), [1.0, 2.0, 0.0]);
}

#[test]
fn deleting_entity_removes_placement_and_relations() {
    let mut r = Reconciler::default();
    r.bulk_load(
        vec![
            EntityRecord {
                entity: Entity::new("a", 3.0),
                placement: Some(Placement::new("a", 1.0, 0.0, 1.0)),
            },
            Entity::new("b", 1.0).into(),
            Entity::new("c", 1.0).into(),
        ],
        Vec::new(),
        vec![
            Relation::new("a", "b", RelationKind::Follow),
            Relation::new("c", "a", RelationKind::Collaboration),
            Relation::new("b", "c", RelationKind::Inspiration),
        ],
    );

    r.apply_local(LocalMutation::DeleteEntity { id: "a".into() }).unwrap();

    let s = r.snapshot();
    assert!(!s.contains("a"));
    assert!(s.placement("a").is_none());
    assert_eq!(s.relations_of("a").count(), 0);
    assert_eq!(s.relation_count(), 1);
    assert!(s.check_invariants().is_ok());
}

#[test]
fn own_echo_round_trip() {
    // A local create echoes back through the channel as an insert.
    let mut r = load(&[]);
    r.apply_local(LocalMutation::CreateEntity {
        entity: Entity::new("n1", 1.0),
        placement: Some(Placement::new("n1", 2.0, 0.0, 2.0)),
    })
    .unwrap();
    let sent = r.take_dispatches();
    let LocalMutation::CreateEntity { placement: Some(stamped), .. } = &sent[0].mutation else {
        panic!("unexpected dispatch {:?}", sent[0]);
    };

    let echo = RemoteEvent::Placement(PlacementEvent::Insert {
        placement: stamped.clone().with_id("row-1"),
        entity: Some(Entity::new("n1", 1.0)),
    });
    r.dispatch_succeeded(sent[0].id);
    r.apply_remote(echo);

    let s = r.snapshot();
    assert_eq!(s.len(), 1);
    assert_eq!(r.pending_edit("n1"), None);
    assert_eq!(s.placement("n1").unwrap().position(), [2.0, 0.0, 2.0]);
}

/// Events over ids `e0..e7`; the base state holds `e0..e3`.
fn event_for(id: usize) -> impl Strategy<Value = RemoteEvent> {
    let eid = format!("e{id}");
    let other = format!("e{}", (id + 1) % 8);
    prop_oneof![
        (0.0f64..10.0, prop::option::of(0u64..5)).prop_map({
            let eid = eid.clone();
            move |(w, ts)| {
                let placement = ts.map(|t| Placement::new(eid.clone(), w, w, 0.0).at(t));
                RemoteEvent::Entity(EntityEvent::Insert(EntityRecord {
                    entity: Entity::new(eid.clone(), w),
                    placement,
                }))
            }
        }),
        (0.0f64..10.0).prop_map({
            let eid = eid.clone();
            move |w| RemoteEvent::Entity(EntityEvent::Update(Entity::new(eid.clone(), w)))
        }),
        Just(RemoteEvent::Entity(EntityEvent::Delete { id: eid.clone() })),
        (-50.0f64..50.0, prop::option::of(0u64..5), any::<bool>()).prop_map({
            let eid = eid.clone();
            move |(x, ts, embed)| {
                let mut placement = Placement::new(eid.clone(), x, 0.0, -x);
                placement.updated_at = ts;
                RemoteEvent::Placement(PlacementEvent::Update {
                    placement,
                    entity: embed.then(|| Entity::new(eid.clone(), 1.0)),
                })
            }
        }),
        Just(RemoteEvent::Placement(PlacementEvent::Delete(PlacementRef {
            id: None,
            entity_id: Some(eid.clone()),
        }))),
        Just(RemoteEvent::Relation(RelationEvent::Insert(Relation::new(
            eid.clone(),
            other.clone(),
            RelationKind::Follow,
        )))),
        Just(RemoteEvent::Relation(RelationEvent::Delete(Relation::new(
            eid,
            other,
            RelationKind::Follow,
        )))),
    ]
}

fn any_event() -> impl Strategy<Value = RemoteEvent> {
    (0usize..8).prop_flat_map(event_for)
}

/// One event per id `e0..e7`, so no two events touch the same entity.
fn disjoint_events() -> impl Strategy<Value = Vec<RemoteEvent>> {
    (0..8usize)
        .map(|i| {
            let eid = format!("e{i}");
            prop_oneof![
                (0.0f64..10.0).prop_map({
                    let eid = eid.clone();
                    move |w| RemoteEvent::Entity(EntityEvent::Insert(Entity::new(eid.clone(), w).into()))
                }),
                (0.0f64..10.0).prop_map({
                    let eid = eid.clone();
                    move |w| RemoteEvent::Entity(EntityEvent::Update(Entity::new(eid.clone(), w)))
                }),
                Just(RemoteEvent::Entity(EntityEvent::Delete { id: eid.clone() })),
                (-50.0f64..50.0, prop::option::of(0u64..5)).prop_map(move |(x, ts)| {
                    let mut placement = Placement::new(eid.clone(), x, 1.0, x);
                    placement.updated_at = ts;
                    RemoteEvent::Placement(PlacementEvent::Insert {
                        placement,
                        entity: Some(Entity::new(eid.clone(), 2.0)),
                    })
                }),
            ]
        })
        .collect::<Vec<_>>()
}

proptest! {
    #[test]
    fn duplicate_delivery_is_idempotent(
        events in prop::collection::vec(any_event(), 1..30),
    ) {
        let mut once = load(&["e0", "e1", "e2", "e3"]);
        let mut twice = load(&["e0", "e1", "e2", "e3"]);

        for event in events {
            once.apply_remote(event.clone());
            twice.apply_remote(event.clone());
            let second = twice.apply_remote(event);
            prop_assert_eq!(second, MergeOutcome::Ignored);
        }

        prop_assert_eq!(&*once.snapshot(), &*twice.snapshot());
        prop_assert!(once.snapshot().check_invariants().is_ok());
    }

    #[test]
    fn disjoint_events_commute(
        events in disjoint_events(),
        order in Just((0..8usize).collect::<Vec<_>>()).prop_shuffle(),
    ) {
        let mut forward = load(&["e0", "e1", "e2", "e3"]);
        let mut shuffled = load(&["e0", "e1", "e2", "e3"]);

        for event in &events {
            forward.apply_remote(event.clone());
        }
        for &i in &order {
            shuffled.apply_remote(events[i].clone());
        }

        prop_assert_eq!(&*forward.snapshot(), &*shuffled.snapshot());
    }
}
