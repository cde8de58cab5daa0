//! Round-trip checks for every packet type the standard registry covers.

use botlink_core::protocol::{
    packet::tags, Action, Capabilities, Envelope, EnvironmentProfile, Event, GroupInfo,
    LinkContext, Message, MessageMeta, Packet, PacketRegistry, Query, QueryResult, Target,
    UserInfo,
};
use botlink_core::BotlinkError;

fn profile() -> EnvironmentProfile {
    EnvironmentProfile {
        network: "qq".into(),
        bot_id: "qq.user1000".into(),
        name: "QQ".into(),
        user_prefix: "qq.user".into(),
        group_prefix: "qq.group".into(),
        capabilities: Capabilities {
            forward: true,
            audio: true,
            quote: true,
            anti_filter: true,
            audio_silk: true,
            nudge: true,
            ..Default::default()
        },
    }
}

fn ctx() -> LinkContext {
    LinkContext::established(profile())
}

fn user() -> UserInfo {
    UserInfo {
        id: "qq.user42".into(),
        name: "alice".into(),
        is_stranger: false,
    }
}

fn group() -> GroupInfo {
    GroupInfo {
        id: "qq.group7".into(),
        name: "testers".into(),
    }
}

fn roundtrip(packet: Packet) -> Packet {
    let ctx = ctx();
    let text = packet.encode(ctx.variants.as_deref()).unwrap();
    let env = Envelope::decode(&text).unwrap();
    PacketRegistry::standard()
        .reconstruct(&env.tag, &ctx, env.payload())
        .unwrap()
}

#[test]
fn handshake_roundtrip() {
    let packet = Packet::Handshake(profile());
    assert_eq!(roundtrip(packet.clone()), packet);
}

#[test]
fn event_roundtrips() {
    let meta = MessageMeta {
        id: Some("m1".into()),
        sender: "qq.user42".into(),
        time: 1_700_000_000_000,
    };
    let message = Message::chain(vec![
        Message::text("hello"),
        Message::At {
            target: "qq.user1000".into(),
            display: "@bot".into(),
        },
    ]);
    let events = [
        Event::GroupMessage {
            group: group(),
            user: user(),
            message: message.clone(),
            meta: meta.clone(),
        },
        Event::FriendMessage {
            user: user(),
            message: message.clone(),
            meta: meta.clone(),
        },
        Event::StrangerMessage {
            user: UserInfo {
                is_stranger: true,
                ..user()
            },
            message,
            meta,
        },
        Event::GroupRecall {
            group: group(),
            user: user(),
            time: 123,
        },
        Event::FriendRecall {
            user: user(),
            time: 456,
        },
        Event::MemberAdd {
            group: group(),
            user: user(),
        },
    ];
    for event in events {
        let packet = Packet::Event(event);
        assert_eq!(roundtrip(packet.clone()), packet);
    }
}

#[test]
fn query_roundtrips() {
    let queries = [
        Query::GroupInfo {
            query_id: 1,
            id: "qq.group7".into(),
        },
        Query::UserInfo {
            query_id: 2,
            id: "qq.user42".into(),
            is_stranger: true,
        },
        Query::NameInGroup {
            query_id: 3,
            user: user(),
            group: group(),
        },
        Query::SendMessage {
            query_id: 4,
            target: Target::Group(group()),
            message: Message::text("out"),
        },
    ];
    for query in queries {
        let packet = Packet::Query(query);
        assert_eq!(roundtrip(packet.clone()), packet);
    }
}

#[test]
fn query_result_payload_is_opaque() {
    let packet = Packet::QueryResult(QueryResult {
        query_id: 9,
        payload: vec![0, 1, 2, 255, 254],
    });
    assert_eq!(roundtrip(packet.clone()), packet);
}

#[test]
fn action_roundtrips() {
    let actions = [
        Action::SendMessage {
            target: Target::User(user()),
            message: Message::text("hi"),
        },
        Action::Recall {
            message_id: "m9".into(),
        },
        Action::Nudge {
            user: user(),
            target: Target::Group(group()),
        },
        Action::Stop,
    ];
    for action in actions {
        let packet = Packet::Action(action);
        assert_eq!(roundtrip(packet.clone()), packet);
    }
}

#[test]
fn stop_factory_ignores_payload() {
    let packet = PacketRegistry::standard()
        .reconstruct(tags::ACTION_STOP, &LinkContext::default(), "garbage")
        .unwrap();
    assert_eq!(packet, Packet::Action(Action::Stop));
}

#[test]
fn unregistered_tag_is_an_error() {
    let err = PacketRegistry::standard()
        .reconstruct("event.unheard_of", &ctx(), "{}")
        .unwrap_err();
    assert!(matches!(err, BotlinkError::UnknownTag(_)));
}

#[test]
fn env_bound_packet_before_handshake_is_rejected() {
    let err = PacketRegistry::standard()
        .reconstruct(
            tags::FRIEND_RECALL,
            &LinkContext::default(),
            r#"{"user":{"id":"qq.user1","name":"a"},"time":1}"#,
        )
        .unwrap_err();
    assert!(matches!(err, BotlinkError::Protocol(_)));
}

#[test]
fn foreign_prefix_is_rejected() {
    let err = PacketRegistry::standard()
        .reconstruct(
            tags::FRIEND_RECALL,
            &ctx(),
            r#"{"user":{"id":"kook.user1","name":"a"},"time":1}"#,
        )
        .unwrap_err();
    assert!(matches!(err, BotlinkError::Protocol(_)));
}
