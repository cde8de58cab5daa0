//! End-to-end checks of the link loop over an in-process transport pair.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};

use botlink_core::protocol::{
    packet::tags, Capabilities, Envelope, EnvironmentProfile, Event, Message, MessageMeta, Packet,
    PacketRegistry, Query, QueryResult, UserInfo,
};
use botlink_core::BotlinkError;
use botlink_link::{
    channel_pair, run_link, Connection, Dispatcher, Frame, FrameSink, FrameStream, LinkConfig,
    PacketHandler, QueryCorrelator,
};

fn profile() -> EnvironmentProfile {
    EnvironmentProfile {
        network: "qq".into(),
        bot_id: "qq.user1".into(),
        name: "QQ".into(),
        user_prefix: "qq.user".into(),
        group_prefix: "qq.group".into(),
        capabilities: Capabilities::default(),
    }
}

fn friend_message(n: u64) -> Packet {
    Packet::Event(Event::FriendMessage {
        user: UserInfo {
            id: "qq.user42".into(),
            name: "alice".into(),
            is_stranger: false,
        },
        message: Message::text(format!("msg-{n}")),
        meta: MessageMeta {
            id: None,
            sender: "qq.user42".into(),
            time: n,
        },
    })
}

/// Handshake handler: installs the environment on the connection.
struct HandshakeHandler;

#[async_trait]
impl PacketHandler for HandshakeHandler {
    async fn handle(&self, conn: &Connection, packet: Packet) -> botlink_core::Result<()> {
        if let Packet::Handshake(profile) = packet {
            conn.establish(profile);
        }
        Ok(())
    }
}

/// Event handler: forwards every event to the test channel.
struct RecordingHandler {
    out: mpsc::UnboundedSender<Packet>,
}

#[async_trait]
impl PacketHandler for RecordingHandler {
    async fn handle(&self, _conn: &Connection, packet: Packet) -> botlink_core::Result<()> {
        let _ = self.out.send(packet);
        Ok(())
    }
}

/// Hook that publishes the connection handle once opened.
struct ConnCapture {
    slot: watch::Sender<Option<Connection>>,
}

#[async_trait]
impl botlink_link::LinkHook for ConnCapture {
    async fn opened(&self, conn: &Connection) {
        let _ = self.slot.send(Some(conn.clone()));
    }
}

fn receiving_dispatcher(
    events: mpsc::UnboundedSender<Packet>,
    conn_slot: watch::Sender<Option<Connection>>,
) -> Arc<Dispatcher> {
    let mut dispatcher = Dispatcher::new(Arc::new(QueryCorrelator::new()));
    dispatcher.register(tags::HANDSHAKE, Arc::new(HandshakeHandler));
    for tag in [tags::FRIEND_MESSAGE, tags::GROUP_MESSAGE] {
        dispatcher.register(
            tag,
            Arc::new(RecordingHandler { out: events.clone() }),
        );
    }
    dispatcher.add_hook(Arc::new(ConnCapture { slot: conn_slot }));
    Arc::new(dispatcher)
}

async fn raw_send(sink: &mut impl FrameSink, packet: &Packet, table: &botlink_core::protocol::VariantTable) {
    sink.send(Frame::Text(packet.encode(Some(table)).unwrap()))
        .await
        .unwrap();
}

#[tokio::test]
async fn packets_dispatch_in_wire_order() {
    let ((mut peer_sink, _peer_stream), (sink, stream)) = channel_pair(16);
    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let (conn_tx, _conn_rx) = watch::channel(None);

    let dispatcher = receiving_dispatcher(events_tx, conn_tx);
    let link = tokio::spawn(run_link(
        sink,
        stream,
        Arc::new(PacketRegistry::standard()),
        dispatcher,
        LinkConfig::default(),
    ));

    let table = botlink_core::protocol::VariantTable::for_network("qq");
    raw_send(&mut peer_sink, &Packet::Handshake(profile()), &table).await;
    for n in 1..=3 {
        raw_send(&mut peer_sink, &friend_message(n), &table).await;
    }
    peer_sink.send(Frame::Close).await.unwrap();

    for n in 1..=3u64 {
        let packet = events_rx.recv().await.expect("event delivered");
        match packet {
            Packet::Event(Event::FriendMessage { message, .. }) => {
                assert_eq!(message.plain_text(), format!("msg-{n}"));
            }
            other => panic!("unexpected packet: {other:?}"),
        }
    }
    link.await.unwrap().unwrap();
}

#[tokio::test]
async fn undecodable_frames_are_dropped_not_fatal() {
    let ((mut peer_sink, _peer_stream), (sink, stream)) = channel_pair(16);
    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let (conn_tx, _conn_rx) = watch::channel(None);

    let dispatcher = receiving_dispatcher(events_tx, conn_tx);
    let link = tokio::spawn(run_link(
        sink,
        stream,
        Arc::new(PacketRegistry::standard()),
        dispatcher,
        LinkConfig::default(),
    ));

    let table = botlink_core::protocol::VariantTable::for_network("qq");
    raw_send(&mut peer_sink, &Packet::Handshake(profile()), &table).await;
    // not json / unknown tag / event before any of those broke the link
    peer_sink.send(Frame::Text("not json".into())).await.unwrap();
    peer_sink
        .send(Frame::Text(r#"{"v":1,"tag":"event.mystery","data":{}}"#.into()))
        .await
        .unwrap();
    raw_send(&mut peer_sink, &friend_message(7), &table).await;
    peer_sink.send(Frame::Close).await.unwrap();

    let packet = events_rx.recv().await.expect("survivor delivered");
    match packet {
        Packet::Event(Event::FriendMessage { message, .. }) => {
            assert_eq!(message.plain_text(), "msg-7");
        }
        other => panic!("unexpected packet: {other:?}"),
    }
    link.await.unwrap().unwrap();
}

#[tokio::test]
async fn ask_matches_its_own_correlation_id() {
    let ((mut peer_sink, mut peer_stream), (sink, stream)) = channel_pair(16);
    let (conn_tx, mut conn_rx) = watch::channel(None);

    let correlator = Arc::new(QueryCorrelator::new());
    let mut dispatcher = Dispatcher::new(Arc::clone(&correlator));
    dispatcher.add_hook(Arc::new(ConnCapture { slot: conn_tx }));
    let link = tokio::spawn(run_link(
        sink,
        stream,
        Arc::new(PacketRegistry::standard()),
        Arc::new(dispatcher),
        LinkConfig::default(),
    ));

    conn_rx.changed().await.unwrap();
    let conn = conn_rx.borrow().clone().expect("connection opened");
    conn.establish(profile());

    let asker = {
        let correlator = Arc::clone(&correlator);
        let conn = conn.clone();
        tokio::spawn(async move {
            correlator
                .ask(&conn, |query_id| Query::GroupInfo {
                    query_id,
                    id: "qq.group7".into(),
                })
                .await
        })
    };

    // Read the query off the wire to learn its id.
    let frame = peer_stream.next().await.unwrap().unwrap();
    let Frame::Text(text) = frame else {
        panic!("expected text frame")
    };
    let envelope = Envelope::decode(&text).unwrap();
    let value: serde_json::Value = serde_json::from_str(envelope.payload()).unwrap();
    let query_id = value["query_id"].as_u64().unwrap();

    let table = botlink_core::protocol::VariantTable::for_network("qq");
    // An unrelated result first; it must not satisfy the waiter.
    raw_send(
        &mut peer_sink,
        &Packet::QueryResult(QueryResult {
            query_id: query_id + 1000,
            payload: b"wrong".to_vec(),
        }),
        &table,
    )
    .await;
    raw_send(
        &mut peer_sink,
        &Packet::QueryResult(QueryResult {
            query_id,
            payload: b"right".to_vec(),
        }),
        &table,
    )
    .await;

    let payload = asker.await.unwrap().unwrap();
    assert_eq!(payload, b"right");
    assert_eq!(correlator.pending_count(), 0);

    peer_sink.send(Frame::Close).await.unwrap();
    link.await.unwrap().unwrap();
}

#[tokio::test]
async fn teardown_fails_pending_queries() {
    let ((peer_sink, mut peer_stream), (sink, stream)) = channel_pair(16);
    let (conn_tx, mut conn_rx) = watch::channel(None);

    let correlator = Arc::new(QueryCorrelator::new());
    let mut dispatcher = Dispatcher::new(Arc::clone(&correlator));
    dispatcher.add_hook(Arc::new(ConnCapture { slot: conn_tx }));
    let link = tokio::spawn(run_link(
        sink,
        stream,
        Arc::new(PacketRegistry::standard()),
        Arc::new(dispatcher),
        LinkConfig::default(),
    ));

    conn_rx.changed().await.unwrap();
    let conn = conn_rx.borrow().clone().expect("connection opened");
    conn.establish(profile());

    let asker = {
        let correlator = Arc::clone(&correlator);
        let conn = conn.clone();
        tokio::spawn(async move {
            correlator
                .ask(&conn, |query_id| Query::UserInfo {
                    query_id,
                    id: "qq.user42".into(),
                    is_stranger: false,
                })
                .await
        })
    };

    // Wait for the query to hit the wire, then hang up without answering.
    let _ = peer_stream.next().await.unwrap().unwrap();
    drop(peer_sink);
    drop(peer_stream);

    let outcome = asker.await.unwrap();
    assert!(matches!(outcome, Err(BotlinkError::ConnectionClosed)));
    assert_eq!(correlator.pending_count(), 0);
    link.await.unwrap().unwrap();
}
