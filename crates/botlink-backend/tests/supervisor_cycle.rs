//! Reconnect supervisor state machine, driven by a scripted connector.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use botlink_core::protocol::{Action, Packet};
use botlink_core::{BotlinkError, Result};
use botlink_backend::client::Connector;
use botlink_backend::session::{DemoSession, NetworkSession};
use botlink_backend::supervisor::Supervisor;
use botlink_link::{channel_pair, Frame, FrameSink, FrameStream};

#[derive(Clone, Copy)]
enum Step {
    /// Immediate connect failure.
    Fail,
    /// Connect succeeds; the hub reads the handshake, then hangs up.
    CloseAfterHandshake,
    /// Connect succeeds; the hub reads the handshake, then sends Stop.
    SendStop,
}

struct ScriptedConnector {
    steps: Mutex<VecDeque<Step>>,
    attempts: AtomicU32,
}

impl ScriptedConnector {
    fn new(steps: Vec<Step>) -> Arc<Self> {
        Arc::new(Self {
            steps: Mutex::new(steps.into()),
            attempts: AtomicU32::new(0),
        })
    }

    fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::Acquire)
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(&self) -> Result<(Box<dyn FrameSink>, Box<dyn FrameStream>)> {
        self.attempts.fetch_add(1, Ordering::AcqRel);
        let step = self.steps.lock().unwrap().pop_front().unwrap_or(Step::Fail);
        match step {
            Step::Fail => Err(BotlinkError::Transport("connection refused".into())),
            Step::CloseAfterHandshake => {
                let ((hub_sink, mut hub_stream), (sink, stream)) = channel_pair(16);
                tokio::spawn(async move {
                    let _handshake = hub_stream.next().await;
                    drop(hub_sink);
                    drop(hub_stream);
                });
                Ok((Box::new(sink), Box::new(stream)))
            }
            Step::SendStop => {
                let ((mut hub_sink, mut hub_stream), (sink, stream)) = channel_pair(16);
                tokio::spawn(async move {
                    let _handshake = hub_stream.next().await;
                    let stop = Packet::Action(Action::Stop).encode(None).unwrap();
                    let _ = hub_sink.send(Frame::Text(stop)).await;
                    while hub_stream.next().await.is_some() {}
                });
                Ok((Box::new(sink), Box::new(stream)))
            }
        }
    }
}

fn supervisor_with(
    connector: Arc<ScriptedConnector>,
    max_retries: u32,
) -> (Supervisor, Arc<DemoSession>) {
    let (session, events) = DemoSession::new("0");
    let supervisor = Supervisor::new(
        connector,
        Arc::clone(&session) as Arc<dyn NetworkSession>,
        events,
        Duration::from_secs(60),
        max_retries,
    );
    (supervisor, session)
}

#[tokio::test(start_paused = true)]
async fn ceiling_stops_after_exactly_max_attempts() {
    let connector = ScriptedConnector::new(vec![]);
    let (supervisor, session) = supervisor_with(Arc::clone(&connector), 20);

    supervisor.run().await;

    assert_eq!(connector.attempts(), 20, "no 21st attempt");
    assert!(!session.is_online(), "session released at shutdown");
}

#[tokio::test(start_paused = true)]
async fn successful_session_resets_the_retry_counter() {
    // Two failures, one real session, then permanent failure. The good
    // session resets the counter; its own disconnect counts as retry 1, so
    // two further attempts fit under a ceiling of 3. Without the reset the
    // supervisor would have given up after the third attempt.
    let connector = ScriptedConnector::new(vec![
        Step::Fail,
        Step::Fail,
        Step::CloseAfterHandshake,
    ]);
    let (supervisor, _session) = supervisor_with(Arc::clone(&connector), 3);

    supervisor.run().await;

    // attempts: fail, fail, session(reset), fail, fail -> ceiling.
    assert_eq!(connector.attempts(), 5);
}

#[tokio::test(start_paused = true)]
async fn stop_action_terminates_without_reconnecting() {
    let connector = ScriptedConnector::new(vec![Step::SendStop]);
    let (supervisor, session) = supervisor_with(Arc::clone(&connector), 20);

    supervisor.run().await;

    assert_eq!(connector.attempts(), 1);
    assert!(!session.is_online());
}
