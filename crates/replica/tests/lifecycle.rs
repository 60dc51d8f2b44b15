mod common;

use std::sync::{Arc, Mutex};

use replica::{
    EngineEvent, FieldValue, InstanceId, LifecycleEvent, Message, ParticipantId, ReplicationError,
    Spawn,
};

use common::{CUBE, PLAYER, RawPeer, SERVER, Session, registry};

fn track(events: &Arc<Mutex<Vec<LifecycleEvent>>>) -> impl FnMut(&LifecycleEvent) + Send + 'static {
    let sink = Arc::clone(events);
    move |event| sink.lock().unwrap().push(*event)
}

#[test]
fn delayed_destroy_runs_once_at_deadline() {
    let mut session = Session::new(1);
    let cube = session
        .server
        .create(Spawn::new(CUBE).with("colorId", 1i32))
        .unwrap();
    session.settle();

    let on_server = Arc::new(Mutex::new(Vec::new()));
    let on_client = Arc::new(Mutex::new(Vec::new()));
    session.server.on_destroy(track(&on_server));
    session.client(0).on_destroy(track(&on_client));

    session.server.destroy(cube, 1000).unwrap();
    session.clock.advance(500);
    session.round();
    assert!(session.server.object(cube).is_some());
    assert!(session.server.is_destroy_pending(cube));

    // A second request does not move the deadline forward.
    session.server.destroy(cube, 0).unwrap();
    session.round();
    assert!(session.server.object(cube).is_some());

    session.clock.set(1000);
    session.round();
    assert!(session.server.object(cube).is_none());
    assert!(session.client(0).object(cube).is_none());

    session.settle();
    assert_eq!(on_server.lock().unwrap().len(), 1);
    assert_eq!(on_client.lock().unwrap().len(), 1);
    assert!(!on_server.lock().unwrap()[0].remote);
    assert!(on_client.lock().unwrap()[0].remote);
    assert!(session.server.is_retired(cube));
    assert!(!session.server.is_destroy_pending(cube));
}

#[test]
fn destroying_unknown_instances_is_a_no_op() {
    let mut session = Session::new(0);
    assert!(session.server.destroy(InstanceId(999), 0).is_ok());

    let cube = session.server.create(Spawn::new(CUBE)).unwrap();
    session.server.destroy(cube, 0).unwrap();
    session.round();
    assert!(session.server.destroy(cube, 0).is_ok());
}

#[test]
fn retired_ids_stay_dead() {
    let mut session = Session::new(1);
    let cube = session
        .server
        .create(Spawn::new(CUBE).with("colorId", 1i32))
        .unwrap();
    session.settle();
    session.server.destroy(cube, 0).unwrap();
    session.settle();
    session.client(0).drain_events().for_each(drop);

    let mut server = RawPeer::connect(&session.hub, ParticipantId(9));
    let schema = registry().get(CUBE).unwrap().clone();
    server.send(
        ParticipantId(2),
        Message::Create {
            instance_id: cube.0,
            schema_id: CUBE.0,
            creator: SERVER.0,
            snapshot: replica::write_full(&schema, &schema.default_values()),
        },
    );
    server.send(
        ParticipantId(2),
        Message::Update {
            instance_id: cube.0,
            delta: vec![0b0000_1000, 1, 0, 0, 0],
        },
    );
    session.round();

    let client = session.client(0);
    assert!(client.object(cube).is_none());
    let unknown = client
        .drain_events()
        .filter(|e| matches!(e, EngineEvent::UnknownInstance { instance, .. } if *instance == cube))
        .count();
    assert_eq!(unknown, 2);
}

#[test]
fn disconnect_destroys_owned_objects() {
    let mut session = Session::new(2);
    let player = session
        .client(0)
        .create(Spawn::new(PLAYER).with("player_id", 2u32))
        .unwrap();
    let cube = session
        .server
        .create(Spawn::new(CUBE).with("colorId", 1i32))
        .unwrap();
    session.settle();
    assert!(session.client(1).object(player).is_some());

    session.server.participant_disconnected(ParticipantId(2));
    session.round();

    assert!(session.server.object(player).is_none());
    assert!(session.client(1).object(player).is_none());
    assert!(session.client(1).object(cube).is_some());
    assert!(session.client(1)
        .drain_events()
        .any(|e| e == EngineEvent::Destroyed { instance: player }));
}

#[test]
fn clients_cannot_destroy_what_they_do_not_own() {
    let mut session = Session::new(1);
    let cube = session
        .server
        .create(Spawn::new(CUBE).with("colorId", 1i32))
        .unwrap();
    session.settle();

    assert!(matches!(
        session.client(0).destroy(cube, 0),
        Err(ReplicationError::NotAuthority { .. })
    ));
    assert!(!session.client(0).is_destroy_pending(cube));
}

#[test]
fn server_may_destroy_client_objects() {
    let mut session = Session::new(1);
    let player = session
        .client(0)
        .create(Spawn::new(PLAYER).with("player_id", 2u32))
        .unwrap();
    session.settle();

    session.server.destroy(player, 0).unwrap();
    session.round();
    assert!(session.server.object(player).is_none());
    assert!(session.client(0).object(player).is_none());
}

#[test]
fn owner_destroy_propagates_to_everyone() {
    let mut session = Session::new(2);
    let player = session
        .client(0)
        .create(Spawn::new(PLAYER).with("player_id", 2u32))
        .unwrap();
    session.settle();

    session.client(0).destroy(player, 0).unwrap();
    session.settle();
    assert_eq!(session.server.object_count(), 0);
    assert_eq!(session.client(0).object_count(), 0);
    assert_eq!(session.client(1).object_count(), 0);
}

#[test]
fn create_then_destroy_before_flush_sends_nothing() {
    let mut session = Session::new(0);
    let mut raw = RawPeer::connect(&session.hub, ParticipantId(9));
    session.server.participant_connected(raw.id);

    let created = Arc::new(Mutex::new(Vec::new()));
    let destroyed = Arc::new(Mutex::new(Vec::new()));
    session.server.on_create(track(&created));
    session.server.on_destroy(track(&destroyed));

    let cube = session.server.create(Spawn::new(CUBE)).unwrap();
    session.server.destroy(cube, 0).unwrap();
    let stats = session.server.tick();

    assert_eq!(stats.packets_sent, 0);
    assert!(raw.received().is_empty());
    assert_eq!(created.lock().unwrap().len(), 1);
    assert_eq!(destroyed.lock().unwrap().len(), 1);
}

#[test]
fn remote_creates_are_flagged() {
    let mut session = Session::new(1);
    let seen = Arc::new(Mutex::new(Vec::new()));
    session.client(0).on_create(track(&seen));

    let cube = session
        .server
        .create(Spawn::new(CUBE).with("colorId", 1i32))
        .unwrap();
    session.round();

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].instance, cube);
    assert_eq!(seen[0].creator, SERVER);
    assert!(seen[0].remote);
    assert_eq!(cube.creator(), SERVER);
    assert_eq!(cube.serial(), 1);
}

#[test]
fn server_rejects_creates_for_ids_the_sender_did_not_mint() {
    let mut session = Session::new(1);
    let mut raw = RawPeer::connect(&session.hub, ParticipantId(9));
    session.server.participant_connected(raw.id);

    let schema = registry().get(CUBE).unwrap().clone();
    let mut values = schema.default_values();
    values[3] = FieldValue::I32(2);
    let forged = InstanceId::new(SERVER, 1);
    raw.send(
        SERVER,
        Message::Create {
            instance_id: forged.0,
            schema_id: CUBE.0,
            creator: raw.id.0,
            snapshot: replica::write_full(&schema, &values),
        },
    );
    raw.send(
        SERVER,
        Message::Create {
            instance_id: InstanceId::new(raw.id, 1).0,
            schema_id: CUBE.0,
            creator: SERVER.0,
            snapshot: replica::write_full(&schema, &values),
        },
    );
    session.round();

    let rejected = session
        .server
        .drain_events()
        .filter(|e| matches!(e, EngineEvent::UnauthorizedWrite { from, .. } if *from == raw.id))
        .count();
    assert_eq!(rejected, 2);
    assert_eq!(session.server.object_count(), 0);

    let cube = session
        .server
        .create(Spawn::new(CUBE).with("colorId", 1i32))
        .unwrap();
    assert_eq!(cube, forged);
    session.settle();
    for node in [&session.server, &session.clients[0]] {
        assert_eq!(
            node.object(cube).unwrap().get("colorId").unwrap(),
            &FieldValue::I32(1)
        );
    }
}
