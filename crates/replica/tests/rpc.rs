mod common;

use glam::Vec3;
use replica::{
    EngineEvent, FieldValue, InstanceId, Message, ParticipantId, ReceiverSet, ReplicationError,
    RpcCall, Spawn,
};

use common::{CUBE, RawPeer, SERVER, Session, count, record};

fn cube_session(clients: u32, owner: Option<ParticipantId>) -> (Session, InstanceId) {
    let mut session = Session::new(clients);
    let mut spawn = Spawn::new(CUBE).with("colorId", 1i32);
    if let Some(owner) = owner {
        spawn = spawn.owned_by(owner);
    }
    let cube = session.server.create(spawn).unwrap();
    session.settle();
    (session, cube)
}

#[test]
fn server_calls_stay_on_server() {
    let (mut session, cube) = cube_session(2, None);
    let server = record(&mut session.server, "ping");
    let a = record(session.client(0), "ping");
    let b = record(session.client(1), "ping");

    session
        .client(0)
        .send_rpc(cube, "ping", ReceiverSet::Server, vec![])
        .unwrap();
    session.settle();

    assert_eq!(count(&server), 1);
    assert_eq!(count(&a), 0);
    assert_eq!(count(&b), 0);
    assert_eq!(server.lock().unwrap()[0].sender, ParticipantId(2));
}

#[test]
fn all_runs_everywhere_including_sender() {
    let (mut session, cube) = cube_session(2, None);
    let server = record(&mut session.server, "hit");
    let a = record(session.client(0), "hit");
    let b = record(session.client(1), "hit");

    session
        .client(0)
        .send_rpc(cube, "hit", ReceiverSet::All, vec![Vec3::Y.into()])
        .unwrap();
    // The sender runs its own call on the next tick, not inside send_rpc.
    assert_eq!(count(&a), 0);
    session.settle();

    assert_eq!((count(&server), count(&a), count(&b)), (1, 1, 1));
    let call = b.lock().unwrap()[0].clone();
    assert_eq!(call.sender, ParticipantId(2));
    assert_eq!(call.name, "hit");
    assert_eq!(call.args, vec![FieldValue::Vec3(Vec3::Y)]);
}

#[test]
fn server_broadcast_runs_locally_on_tick() {
    let (mut session, cube) = cube_session(1, None);
    let server = record(&mut session.server, "ping");
    let client = record(session.client(0), "ping");

    session
        .server
        .send_rpc(cube, "ping", ReceiverSet::All, vec![])
        .unwrap();
    assert_eq!(count(&server), 0);
    session.round();
    assert_eq!((count(&server), count(&client)), (1, 1));
    session.settle();
    assert_eq!((count(&server), count(&client)), (1, 1));
}

#[test]
fn others_skips_sender() {
    let (mut session, cube) = cube_session(2, None);
    let server = record(&mut session.server, "ping");
    let a = record(session.client(0), "ping");
    let b = record(session.client(1), "ping");

    session
        .client(0)
        .send_rpc(cube, "ping", ReceiverSet::Others, vec![])
        .unwrap();
    session.settle();

    assert_eq!((count(&server), count(&a), count(&b)), (1, 0, 1));
}

#[test]
fn owner_calls_reach_only_the_owner() {
    let (mut session, cube) = cube_session(2, Some(ParticipantId(3)));
    let server = record(&mut session.server, "status");
    let a = record(session.client(0), "status");
    let b = record(session.client(1), "status");

    session
        .client(0)
        .send_rpc(cube, "status", ReceiverSet::Owner, vec!["hello".into()])
        .unwrap();
    session.settle();

    assert_eq!((count(&server), count(&a), count(&b)), (0, 0, 1));
    assert_eq!(
        b.lock().unwrap()[0].args,
        vec![FieldValue::Text("hello".to_owned())]
    );
}

#[test]
fn owner_calling_itself_stays_local() {
    let (mut session, cube) = cube_session(1, Some(ParticipantId(2)));
    let server = record(&mut session.server, "ping");
    let client = record(session.client(0), "ping");

    session
        .client(0)
        .send_rpc(cube, "ping", ReceiverSet::Owner, vec![])
        .unwrap();
    let stats = session.client(0).tick();
    assert_eq!(stats.packets_sent, 0);
    session.settle();

    assert_eq!((count(&server), count(&client)), (0, 1));
}

#[test]
fn buffered_calls_replay_to_late_joiners() {
    let (mut session, cube) = cube_session(1, None);
    session
        .server
        .send_rpc(cube, "status", ReceiverSet::AllBuffered, vec!["running".into()])
        .unwrap();
    session.round();
    session
        .client(0)
        .send_rpc(cube, "hit", ReceiverSet::OthersBuffered, vec![Vec3::X.into()])
        .unwrap();
    session
        .client(0)
        .send_rpc(cube, "ping", ReceiverSet::All, vec![])
        .unwrap();
    session.settle();

    let late = session.join();
    let status = record(session.client(late), "status");
    let hit = record(session.client(late), "hit");
    let ping = record(session.client(late), "ping");
    session.round();

    assert_eq!((count(&status), count(&hit), count(&ping)), (1, 1, 0));
    assert_eq!(status.lock().unwrap()[0].sender, SERVER);
    assert_eq!(hit.lock().unwrap()[0].sender, ParticipantId(2));
}

#[test]
fn buffered_calls_die_with_their_object() {
    let (mut session, cube) = cube_session(0, None);
    session
        .server
        .send_rpc(cube, "status", ReceiverSet::AllBuffered, vec!["running".into()])
        .unwrap();
    session.round();
    session.server.destroy(cube, 0).unwrap();
    session.round();

    let mut raw = RawPeer::connect(&session.hub, ParticipantId(9));
    session.server.participant_connected(raw.id);
    assert!(raw.received().is_empty());
}

#[test]
fn bad_arguments_are_rejected_before_sending() {
    let (mut session, cube) = cube_session(1, None);
    let client = session.client(0);
    assert!(matches!(
        client.send_rpc(cube, "hit", ReceiverSet::All, vec!["nope".into()]),
        Err(ReplicationError::InvalidRpcArguments { .. })
    ));
    assert!(matches!(
        client.send_rpc(cube, "hit", ReceiverSet::All, vec![]),
        Err(ReplicationError::InvalidRpcArguments { .. })
    ));
    assert!(matches!(
        client.send_rpc(cube, "explode", ReceiverSet::All, vec![]),
        Err(ReplicationError::UnknownMethod { .. })
    ));
    assert!(matches!(
        client.send_rpc(InstanceId(77), "ping", ReceiverSet::All, vec![]),
        Err(ReplicationError::UnknownInstance(_))
    ));
    assert_eq!(client.tick().packets_sent, 0);
}

#[test]
fn malformed_arguments_on_the_wire_are_not_invoked_or_relayed() {
    let (mut session, cube) = cube_session(1, None);
    let server = record(&mut session.server, "hit");
    let client = record(session.client(0), "hit");
    let mut raw = RawPeer::connect(&session.hub, ParticipantId(9));
    session.server.participant_connected(raw.id);
    raw.received();

    let body = RpcCall {
        instance: cube,
        method: 0,
        args: vec![FieldValue::I32(1)],
    }
    .encode();
    raw.send(
        SERVER,
        Message::Rpc {
            receivers: ReceiverSet::All.into(),
            call: body,
        },
    );
    raw.send(
        SERVER,
        Message::Rpc {
            receivers: 42,
            call: vec![],
        },
    );
    session.settle();

    assert_eq!((count(&server), count(&client)), (0, 0));
    let events: Vec<_> = session.server.drain_events().collect();
    assert!(events.iter().any(|e| matches!(
        e,
        EngineEvent::InvalidRpcArguments { from, instance, .. } if *from == raw.id && *instance == cube
    )));
    assert!(events
        .iter()
        .any(|e| matches!(e, EngineEvent::UndecodablePacket { from, .. } if *from == raw.id)));
}
