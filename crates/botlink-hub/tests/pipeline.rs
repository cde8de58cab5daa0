//! Pipeline behavior: filtering, stamping cadence, throttling, recall
//! bookkeeping, and error replies, all against a recording transmitter.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::time::Instant;

use botlink_core::protocol::{GroupInfo, Message, MessageMeta, Target, UserInfo};
use botlink_core::{BotlinkError, Result};
use botlink_hub::filter::{WordFilter, FILTER_NOTICE};
use botlink_hub::journal::ErrorJournal;
use botlink_hub::sender::{
    MessageContext, MessageSender, StatusIllustrator, Transmitter, ANTI_AUTO_MARKERS, APOLOGIES,
};

#[derive(Clone, Debug)]
struct SendCall {
    target: Target,
    message: Message,
    recallable: bool,
    at: Instant,
}

#[derive(Default)]
struct RecordingTransmitter {
    sends: Mutex<Vec<SendCall>>,
    recalls: Mutex<Vec<String>>,
    next_id: AtomicU64,
}

impl RecordingTransmitter {
    fn sends(&self) -> Vec<SendCall> {
        self.sends.lock().unwrap().clone()
    }

    fn recalls(&self) -> Vec<String> {
        self.recalls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transmitter for RecordingTransmitter {
    async fn transmit(
        &self,
        target: &Target,
        message: &Message,
        recallable: bool,
    ) -> Result<Option<String>> {
        self.sends.lock().unwrap().push(SendCall {
            target: target.clone(),
            message: message.clone(),
            recallable,
            at: Instant::now(),
        });
        if recallable {
            let n = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
            Ok(Some(format!("mid-{n}")))
        } else {
            Ok(None)
        }
    }

    async fn recall(&self, message_id: &str) -> Result<()> {
        self.recalls.lock().unwrap().push(message_id.to_string());
        Ok(())
    }
}

struct NoIllustration;

#[async_trait]
impl StatusIllustrator for NoIllustration {
    async fn fetch(&self, _code: u16) -> Option<String> {
        None
    }
}

struct FixedIllustration;

#[async_trait]
impl StatusIllustrator for FixedIllustration {
    async fn fetch(&self, code: u16) -> Option<String> {
        Some(format!("https://http.cat/{code}"))
    }
}

fn context(group: Option<&str>, user: &str, time: u64) -> MessageContext {
    let group = group.map(|id| GroupInfo {
        id: id.to_string(),
        name: "g".into(),
    });
    let user = UserInfo {
        id: user.to_string(),
        name: "u".into(),
        is_stranger: false,
    };
    MessageContext {
        dest: match &group {
            Some(g) => Target::Group(g.clone()),
            None => Target::User(user.clone()),
        },
        group,
        user: user.clone(),
        message: MessageMeta {
            id: None,
            sender: user.id,
            time,
        },
    }
}

fn sender_with(
    transmitter: Arc<RecordingTransmitter>,
    words: Vec<String>,
    mirrors: HashMap<String, String>,
    anti_filter: bool,
    illustrator: Arc<dyn StatusIllustrator>,
) -> MessageSender {
    MessageSender::new(
        transmitter,
        Arc::new(WordFilter::new(words)),
        Arc::new(ErrorJournal::new()),
        illustrator,
        mirrors,
        anti_filter,
    )
}

#[tokio::test(start_paused = true)]
async fn consecutive_sends_are_at_least_250ms_apart() {
    let transmitter = Arc::new(RecordingTransmitter::default());
    let sender = sender_with(
        Arc::clone(&transmitter),
        vec![],
        HashMap::new(),
        false,
        Arc::new(NoIllustration),
    );
    let ctx = context(Some("qq.group1"), "qq.user1", 1);

    for n in 0..5 {
        sender
            .send(&ctx, &Message::text(format!("m-{n}")), false)
            .await
            .unwrap();
    }

    let sends = transmitter.sends();
    assert_eq!(sends.len(), 5);
    for pair in sends.windows(2) {
        let gap = pair[1].at.duration_since(pair[0].at);
        assert!(
            gap >= std::time::Duration::from_millis(250),
            "gap was {gap:?}"
        );
    }
}

#[tokio::test(start_paused = true)]
async fn marker_lands_on_every_tenth_eligible_send() {
    let transmitter = Arc::new(RecordingTransmitter::default());
    let sender = sender_with(
        Arc::clone(&transmitter),
        vec![],
        HashMap::new(),
        true,
        Arc::new(NoIllustration),
    );
    let ctx = context(Some("qq.group1"), "qq.user1", 1);

    for n in 1..=30 {
        sender
            .send(&ctx, &Message::text(format!("m-{n}")), false)
            .await
            .unwrap();
    }

    let sends = transmitter.sends();
    assert_eq!(sends.len(), 30);
    for (i, call) in sends.iter().enumerate() {
        let nth = i + 1;
        let plain = call.message.plain_text();
        let base = format!("m-{nth}");
        if nth % 10 == 0 {
            let marker = plain
                .strip_prefix(&format!("{base}\n"))
                .unwrap_or_else(|| panic!("send #{nth} missing marker: {plain:?}"));
            assert!(ANTI_AUTO_MARKERS.contains(&marker), "bad marker {marker:?}");
        } else {
            assert_eq!(plain, base, "send #{nth} unexpectedly stamped");
        }
    }
}

#[tokio::test(start_paused = true)]
async fn image_sends_do_not_advance_the_marker_counter() {
    let transmitter = Arc::new(RecordingTransmitter::default());
    let sender = sender_with(
        Arc::clone(&transmitter),
        vec![],
        HashMap::new(),
        true,
        Arc::new(NoIllustration),
    );
    let ctx = context(None, "qq.user1", 1);

    for n in 1..=9 {
        sender
            .send(&ctx, &Message::text(format!("t-{n}")), false)
            .await
            .unwrap();
    }
    sender
        .send(&ctx, &Message::Image { url: "x".into() }, false)
        .await
        .unwrap();
    sender.send(&ctx, &Message::text("t-10"), false).await.unwrap();

    let sends = transmitter.sends();
    // Send 10 is the image: exempt and uncounted. Send 11 is the 10th
    // eligible call and gets the marker.
    assert_eq!(sends[9].message.plain_text(), "");
    let last = sends[10].message.plain_text();
    assert!(last.starts_with("t-10\n"), "expected marker on {last:?}");
}

#[tokio::test(start_paused = true)]
async fn altered_text_gets_the_filter_notice() {
    let transmitter = Arc::new(RecordingTransmitter::default());
    let sender = sender_with(
        Arc::clone(&transmitter),
        vec!["secret".into()],
        HashMap::new(),
        false,
        Arc::new(NoIllustration),
    );
    let ctx = context(None, "qq.user1", 1);

    let original = Message::text("a secret plan");
    sender.send(&ctx, &original, false).await.unwrap();

    let sent = &transmitter.sends()[0].message;
    let plain = sent.plain_text();
    assert!(plain.contains("a ****** plan"));
    assert!(plain.ends_with(FILTER_NOTICE));
    // The caller's message is untouched.
    assert_eq!(original.plain_text(), "a secret plan");
}

#[tokio::test(start_paused = true)]
async fn recall_store_keeps_only_the_newest_hundred() {
    let transmitter = Arc::new(RecordingTransmitter::default());
    let sender = sender_with(
        Arc::clone(&transmitter),
        vec![],
        HashMap::new(),
        false,
        Arc::new(NoIllustration),
    );

    for n in 1..=150u64 {
        let ctx = context(Some("qq.group1"), "qq.user1", n);
        sender
            .send(&ctx, &Message::text(format!("m-{n}")), true)
            .await
            .unwrap();
    }

    let records = sender.sent_records().await;
    assert_eq!(records.len(), 100);
    assert_eq!(records[0].message.plain_text(), "m-51");
    assert_eq!(records[99].message.plain_text(), "m-150");

    // The evicted half is unreachable by recall.
    let user = UserInfo {
        id: "qq.user1".into(),
        name: "u".into(),
        is_stranger: false,
    };
    let group = GroupInfo {
        id: "qq.group1".into(),
        name: "g".into(),
    };
    sender.on_recall(Some(&group), &user, 50).await;
    assert!(transmitter.recalls().is_empty());
    sender.on_recall(Some(&group), &user, 51).await;
    assert_eq!(transmitter.recalls(), vec!["mid-51".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn recall_matching_is_conjunctive() {
    let transmitter = Arc::new(RecordingTransmitter::default());
    let sender = sender_with(
        Arc::clone(&transmitter),
        vec![],
        HashMap::new(),
        false,
        Arc::new(NoIllustration),
    );

    sender
        .send(&context(Some("qq.group1"), "qq.user1", 11), &Message::text("a"), true)
        .await
        .unwrap();
    sender
        .send(&context(None, "qq.user1", 22), &Message::text("b"), true)
        .await
        .unwrap();

    let user = UserInfo {
        id: "qq.user1".into(),
        name: "u".into(),
        is_stranger: false,
    };
    let group = GroupInfo {
        id: "qq.group1".into(),
        name: "g".into(),
    };
    let other_group = GroupInfo {
        id: "qq.group2".into(),
        name: "g2".into(),
    };

    // Wrong group, wrong time, wrong user: nothing recalled.
    sender.on_recall(Some(&other_group), &user, 11).await;
    sender.on_recall(Some(&group), &user, 12).await;
    sender
        .on_recall(
            Some(&group),
            &UserInfo {
                id: "qq.user2".into(),
                name: "v".into(),
                is_stranger: false,
            },
            11,
        )
        .await;
    // A groupless recall event must not match a grouped record.
    sender.on_friend_recall(&user, 11).await;
    assert!(transmitter.recalls().is_empty());

    sender.on_recall(Some(&group), &user, 11).await;
    sender.on_friend_recall(&user, 22).await;
    assert_eq!(
        transmitter.recalls(),
        vec!["mid-1".to_string(), "mid-2".to_string()]
    );
}

#[tokio::test(start_paused = true)]
async fn error_reply_quotes_and_truncates_long_details() {
    let transmitter = Arc::new(RecordingTransmitter::default());
    let sender = sender_with(
        Arc::clone(&transmitter),
        vec![],
        HashMap::new(),
        false,
        Arc::new(NoIllustration),
    );
    let ctx = context(Some("qq.group1"), "qq.user1", 1);

    let error = BotlinkError::Platform("x".repeat(200));
    sender.on_error(&error, "test", &ctx, false).await;

    let sends = transmitter.sends();
    assert_eq!(sends.len(), 1);
    let Message::Chain { items } = &sends[0].message else {
        panic!("error reply must be a chain");
    };
    assert!(matches!(items[0], Message::Quote { .. }));
    let plain = sends[0].message.plain_text();
    assert!(
        plain.contains("Platform"),
        "long detail should truncate to the kind name: {plain:?}"
    );
    assert!(!plain.contains(&"x".repeat(101)));
    assert!(APOLOGIES.iter().any(|a| plain.contains(a)));
}

#[tokio::test(start_paused = true)]
async fn error_reply_substitutes_mirror_urls() {
    let transmitter = Arc::new(RecordingTransmitter::default());
    let mut mirrors = HashMap::new();
    mirrors.insert(
        "https://mirror.example".to_string(),
        "http://internal.local".to_string(),
    );
    let sender = sender_with(
        Arc::clone(&transmitter),
        vec![],
        mirrors,
        false,
        Arc::new(NoIllustration),
    );
    let ctx = context(None, "qq.user1", 1);

    let error = BotlinkError::Platform("fetch http://internal.local/page failed".into());
    sender.on_error(&error, "test", &ctx, false).await;

    let plain = transmitter.sends()[0].message.plain_text();
    assert!(plain.contains("https://mirror.example/page"));
    assert!(!plain.contains("http://internal.local"));
}

#[tokio::test(start_paused = true)]
async fn status_errors_attach_an_illustration_when_available() {
    let transmitter = Arc::new(RecordingTransmitter::default());
    let sender = sender_with(
        Arc::clone(&transmitter),
        vec![],
        HashMap::new(),
        false,
        Arc::new(FixedIllustration),
    );
    let ctx = context(None, "qq.user1", 1);

    sender
        .on_error(&BotlinkError::Status(404), "test", &ctx, false)
        .await;

    let Message::Chain { items } = &transmitter.sends()[0].message else {
        panic!("error reply must be a chain");
    };
    assert!(items
        .iter()
        .any(|m| matches!(m, Message::Image { url } if url == "https://http.cat/404")));
    assert!(transmitter.sends()[0].message.plain_text().contains("404"));
}

#[tokio::test(start_paused = true)]
async fn status_errors_fall_back_to_text_only() {
    let transmitter = Arc::new(RecordingTransmitter::default());
    let sender = sender_with(
        Arc::clone(&transmitter),
        vec![],
        HashMap::new(),
        false,
        Arc::new(NoIllustration),
    );
    let ctx = context(None, "qq.user1", 1);

    sender
        .on_error(&BotlinkError::Status(500), "test", &ctx, false)
        .await;

    let Message::Chain { items } = &transmitter.sends()[0].message else {
        panic!("error reply must be a chain");
    };
    assert!(!items.iter().any(|m| matches!(m, Message::Image { .. })));
}

#[tokio::test(start_paused = true)]
async fn send_await_hands_the_next_reply_to_the_waiter() {
    let transmitter = Arc::new(RecordingTransmitter::default());
    let sender = sender_with(
        Arc::clone(&transmitter),
        vec![],
        HashMap::new(),
        false,
        Arc::new(NoIllustration),
    );
    let ctx = context(Some("qq.group1"), "qq.user1", 1);

    let rx = sender
        .send_await(&ctx, &Message::text("pick a number"))
        .await
        .unwrap();

    // A different user's message must not complete the waiter.
    let other = UserInfo {
        id: "qq.user9".into(),
        name: "other".into(),
        is_stranger: false,
    };
    assert!(!sender
        .awaits()
        .deliver(ctx.group.as_ref(), &other, Message::text("7")));

    assert!(sender
        .awaits()
        .deliver(ctx.group.as_ref(), &ctx.user, Message::text("42")));
    assert_eq!(rx.await.unwrap().plain_text(), "42");
}
