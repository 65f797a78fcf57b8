//! End-to-end tests against an in-process mock console.
//!
//! The mock accepts WebSocket connections on a loopback port, answers the
//! control-plane handshake, serves configurable macro/executor lists, and
//! records every state-change request it receives. Change events can be
//! pushed to all connected channels at any time.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio::time::sleep;
use tokio_tungstenite::{accept_async, tungstenite::Message};

use dmxc_umbra::protocol::{
    ClaimList, Event, Frame, LoginAck, MacroButtonDescriptor, MacroChangedEvent, MacroDescriptor,
    MacroFaderDescriptor, MacroList, ChangeKind, ExecutorDescriptor, ExecutorList, Request,
    RequestBody, Response, ResponseBody, SessionId,
};
use dmxc_umbra::{
    ActionDefinition, ButtonStateRequest, CompanionHost, FaderChange, FaderStateRequest,
    FeedbackDefinition, FeedbackId, InstanceStatus, PresetDefinition, SessionManager,
    SessionState, StateListener, VariableDefinition, EntityKind,
};

#[derive(Debug, Clone)]
struct RecordedSet {
    method: &'static str,
    request_id: Option<u64>,
}

struct ConsoleState {
    macros: Mutex<Vec<MacroDescriptor>>,
    executors: Mutex<Vec<ExecutorDescriptor>>,
    set_requests: Mutex<Vec<RecordedSet>>,
    logoffs: AtomicUsize,
    nak_set_ops: AtomicBool,
    event_tx: broadcast::Sender<Event>,
    shutdown_tx: broadcast::Sender<()>,
}

struct MockConsole {
    endpoint: String,
    state: Arc<ConsoleState>,
}

impl MockConsole {
    async fn spawn(macros: Vec<MacroDescriptor>, executors: Vec<ExecutorDescriptor>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = format!("127.0.0.1:{}", listener.local_addr().unwrap().port());

        let (event_tx, _) = broadcast::channel(64);
        let (shutdown_tx, _) = broadcast::channel(1);
        let state = Arc::new(ConsoleState {
            macros: Mutex::new(macros),
            executors: Mutex::new(executors),
            set_requests: Mutex::new(Vec::new()),
            logoffs: AtomicUsize::new(0),
            nak_set_ops: AtomicBool::new(false),
            event_tx,
            shutdown_tx,
        });

        let accept_state = state.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(handle_connection(stream, accept_state.clone()));
            }
        });

        Self { endpoint, state }
    }

    fn push_event(&self, event: Event) {
        let _ = self.state.event_tx.send(event);
    }

    fn recorded_sets(&self) -> Vec<RecordedSet> {
        self.state.set_requests.lock().unwrap().clone()
    }

    fn clear_sets(&self) {
        self.state.set_requests.lock().unwrap().clear();
    }

    fn logoffs(&self) -> usize {
        self.state.logoffs.load(Ordering::SeqCst)
    }

    fn reject_set_ops(&self) {
        self.state.nak_set_ops.store(true, Ordering::SeqCst);
    }

    /// Drop every open channel, simulating the console going away
    fn shutdown(&self) {
        let _ = self.state.shutdown_tx.send(());
    }
}

async fn handle_connection(stream: TcpStream, state: Arc<ConsoleState>) {
    let ws = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(_) => return,
    };
    let (mut write, mut read) = ws.split();
    let mut event_rx = state.event_tx.subscribe();
    let mut shutdown_rx = state.shutdown_tx.subscribe();

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            event = event_rx.recv() => {
                if let Ok(event) = event {
                    let json = serde_json::to_string(&Frame::Event(event)).unwrap();
                    if write.send(Message::Text(json)).await.is_err() {
                        break;
                    }
                }
            }
            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let request: Request = serde_json::from_str(&text).unwrap();
                        if let Some(frame) = respond(&state, &request) {
                            let json = serde_json::to_string(&frame).unwrap();
                            if write.send(Message::Text(json)).await.is_err() {
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(_)) => break,
                }
            }
        }
    }
}

fn ok_frame(request: &Request, body: Option<ResponseBody>) -> Option<Frame> {
    Some(Frame::Response(Response {
        id: request.id,
        ok: true,
        error: None,
        body,
    }))
}

fn respond(state: &ConsoleState, request: &Request) -> Option<Frame> {
    match &request.body {
        RequestBody::Login(_) => ok_frame(
            request,
            Some(ResponseBody::LoginAck(LoginAck {
                session_id: SessionId("session-1".into()),
            })),
        ),
        RequestBody::ReportReadyToWork { .. } => ok_frame(request, None),
        RequestBody::BindUser { .. } => ok_frame(request, None),
        RequestBody::Ping => None,
        RequestBody::Logoff(_) => {
            state.logoffs.fetch_add(1, Ordering::SeqCst);
            ok_frame(request, None)
        }
        RequestBody::InformClientExists(_) => ok_frame(
            request,
            Some(ResponseBody::ClaimList(ClaimList {
                requests: Vec::new(),
            })),
        ),
        RequestBody::GetMacros => ok_frame(
            request,
            Some(ResponseBody::MacroList(MacroList {
                macros: state.macros.lock().unwrap().clone(),
            })),
        ),
        RequestBody::GetExecutors => ok_frame(
            request,
            Some(ResponseBody::ExecutorList(ExecutorList {
                executors: state.executors.lock().unwrap().clone(),
            })),
        ),
        RequestBody::ReceiveMacroChanges | RequestBody::ReceiveExecutorChanges => None,
        RequestBody::SetMacroButtonState(_) => record_set(state, request, "set_macro_button"),
        RequestBody::SetMacroFaderState(_) => record_set(state, request, "set_macro_fader"),
        RequestBody::SetExecutorValues(_) => record_set(state, request, "set_executor_values"),
    }
}

fn record_set(state: &ConsoleState, request: &Request, method: &'static str) -> Option<Frame> {
    state.set_requests.lock().unwrap().push(RecordedSet {
        method,
        request_id: request.request_id,
    });
    let rejected = state.nak_set_ops.load(Ordering::SeqCst);
    Some(Frame::Response(Response {
        id: request.id,
        ok: !rejected,
        error: rejected.then(|| "denied".to_string()),
        body: None,
    }))
}

// ── test doubles for the host boundary ──

#[derive(Default)]
struct RecordingHost {
    statuses: Mutex<Vec<InstanceStatus>>,
}

impl CompanionHost for RecordingHost {
    fn update_status(&self, status: InstanceStatus) {
        self.statuses.lock().unwrap().push(status);
    }
    fn set_action_definitions(&self, _actions: Vec<ActionDefinition>) {}
    fn set_feedback_definitions(&self, _feedbacks: Vec<FeedbackDefinition>) {}
    fn set_preset_definitions(&self, _presets: Vec<PresetDefinition>) {}
    fn set_variable_definitions(&self, _variables: Vec<VariableDefinition>) {}
    fn check_feedbacks(&self, _feedbacks: &[FeedbackId]) {}
}

#[derive(Default)]
struct CountingListener {
    macro_topology: AtomicUsize,
    macro_values: AtomicUsize,
    executor_topology: AtomicUsize,
}

impl StateListener for CountingListener {
    fn topology_changed(&self, kind: EntityKind) {
        match kind {
            EntityKind::Macro => self.macro_topology.fetch_add(1, Ordering::SeqCst),
            EntityKind::Executor => self.executor_topology.fetch_add(1, Ordering::SeqCst),
        };
    }
    fn values_changed(&self, kind: EntityKind) {
        if kind == EntityKind::Macro {
            self.macro_values.fetch_add(1, Ordering::SeqCst);
        }
    }
}

fn sample_macro(position: f64) -> MacroDescriptor {
    MacroDescriptor {
        id: "m1".into(),
        name: "Blinder".into(),
        buttons: vec![MacroButtonDescriptor {
            number: 1,
            label: "Flash".into(),
            active: false,
        }],
        faders: vec![MacroFaderDescriptor {
            number: 1,
            label: "Master".into(),
            fader_position: position,
        }],
        bitmap: None,
    }
}

fn sample_executor() -> ExecutorDescriptor {
    ExecutorDescriptor {
        id: "e1".into(),
        name: "Exec1".into(),
        button1_key: "GO".into(),
        fader_key: "F1".into(),
        ..Default::default()
    }
}

async fn connect_and_login(
    mock: &MockConsole,
) -> (Arc<SessionManager>, Arc<RecordingHost>, Arc<CountingListener>) {
    let host = Arc::new(RecordingHost::default());
    let listener = Arc::new(CountingListener::default());
    let session = SessionManager::connect(
        mock.endpoint.clone(),
        "Companion",
        host.clone(),
        listener.clone(),
    )
    .await
    .expect("connect failed");
    session
        .login("ABC", "DMXCDefault", "DMXC3")
        .await
        .expect("login failed");
    (session, host, listener)
}

async fn wait_until(mut condition: impl FnMut() -> bool, what: &str) {
    for _ in 0..300 {
        if condition() {
            return;
        }
        sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for: {}", what);
}

async fn wait_for_sync(session: &SessionManager) {
    let macros = session.macro_repository().unwrap();
    let executors = session.executor_repository().unwrap();
    wait_until(
        || !macros.lock().unwrap().is_empty() && !executors.lock().unwrap().is_empty(),
        "initial repository sync",
    )
    .await;
}

#[tokio::test]
async fn login_reaches_active_and_mirrors_state() {
    let mock = MockConsole::spawn(vec![sample_macro(0.25)], vec![sample_executor()]).await;
    let (session, host, listener) = connect_and_login(&mock).await;

    assert_eq!(session.state(), SessionState::Active);
    assert!(host
        .statuses
        .lock()
        .unwrap()
        .contains(&InstanceStatus::Ok));

    wait_for_sync(&session).await;

    let macros = session.macro_repository().unwrap();
    {
        let repo = macros.lock().unwrap();
        let by_name = repo.get_single("Blinder").cloned().unwrap();
        let by_id = repo.get_single("m1").cloned().unwrap();
        assert_eq!(by_name, by_id);
        assert_eq!(by_name.faders[0].position, 0.25);
    }
    wait_until(
        || {
            listener.macro_topology.load(Ordering::SeqCst) >= 1
                && listener.executor_topology.load(Ordering::SeqCst) >= 1
        },
        "topology signals from the initial sync",
    )
    .await;

    session.destroy().await;
}

#[tokio::test]
async fn change_stream_replaces_snapshots_in_causal_order() {
    let mock = MockConsole::spawn(vec![sample_macro(0.1)], vec![sample_executor()]).await;
    let (session, _host, _listener) = connect_and_login(&mock).await;
    wait_for_sync(&session).await;

    // Two full-snapshot updates in causal order; the second must win
    // regardless of how they interleave with feedback re-evaluation.
    mock.push_event(Event::MacroChanged(MacroChangedEvent {
        change_type: ChangeKind::Changed,
        macro_data: Some(sample_macro(0.5)),
    }));
    mock.push_event(Event::MacroChanged(MacroChangedEvent {
        change_type: ChangeKind::Changed,
        macro_data: Some(sample_macro(0.8)),
    }));

    let macros = session.macro_repository().unwrap();
    wait_until(
        || {
            macros
                .lock()
                .unwrap()
                .get_single("m1")
                .map(|m| m.faders[0].position)
                == Some(0.8)
        },
        "second update to win",
    )
    .await;

    session.destroy().await;
}

#[tokio::test]
async fn changed_event_for_unknown_id_is_an_implicit_add() {
    let mock = MockConsole::spawn(Vec::new(), vec![sample_executor()]).await;
    let (session, _host, listener) = connect_and_login(&mock).await;

    let executors = session.executor_repository().unwrap();
    wait_until(
        || !executors.lock().unwrap().is_empty(),
        "executor sync",
    )
    .await;

    let mut unseen = sample_macro(0.3);
    unseen.id = "m9".into();
    unseen.name = "Strobe".into();
    mock.push_event(Event::MacroChanged(MacroChangedEvent {
        change_type: ChangeKind::Changed,
        macro_data: Some(unseen),
    }));

    let macros = session.macro_repository().unwrap();
    wait_until(
        || macros.lock().unwrap().get_single("Strobe").is_some(),
        "implicit add of an unknown macro",
    )
    .await;
    // implicit adds refresh values, they do not rebuild presets
    wait_until(
        || listener.macro_values.load(Ordering::SeqCst) >= 1,
        "value signal for the implicit add",
    )
    .await;

    session.destroy().await;
}

#[tokio::test]
async fn removed_signals_topology_exactly_once() {
    let mock = MockConsole::spawn(vec![sample_macro(0.1)], vec![sample_executor()]).await;
    let (session, _host, listener) = connect_and_login(&mock).await;
    wait_for_sync(&session).await;

    let macros = session.macro_repository().unwrap();
    wait_until(
        || listener.macro_topology.load(Ordering::SeqCst) >= 1,
        "initial topology signal",
    )
    .await;
    let before = listener.macro_topology.load(Ordering::SeqCst);

    mock.push_event(Event::MacroChanged(MacroChangedEvent {
        change_type: ChangeKind::Removed,
        macro_data: Some(sample_macro(0.1)),
    }));
    wait_until(
        || macros.lock().unwrap().is_empty(),
        "macro removal",
    )
    .await;
    wait_until(
        || listener.macro_topology.load(Ordering::SeqCst) == before + 1,
        "exactly one topology signal for the removal",
    )
    .await;

    // Removing an id that is already gone must not signal again
    mock.push_event(Event::MacroChanged(MacroChangedEvent {
        change_type: ChangeKind::Removed,
        macro_data: Some(sample_macro(0.1)),
    }));
    sleep(Duration::from_millis(200)).await;
    assert_eq!(listener.macro_topology.load(Ordering::SeqCst), before + 1);

    session.destroy().await;
}

#[tokio::test]
async fn request_ids_increase_and_reset_with_a_new_session() {
    let mock = MockConsole::spawn(vec![sample_macro(0.1)], vec![sample_executor()]).await;
    let (session, _host, _listener) = connect_and_login(&mock).await;
    wait_for_sync(&session).await;
    // let the change-stream openers claim their request ids as well
    sleep(Duration::from_millis(50)).await;

    session
        .send_button_state(ButtonStateRequest::Macro {
            key: "Blinder".into(),
            number: 1,
            active: true,
        })
        .await;
    session
        .send_fader_state(FaderStateRequest::Macro {
            key: "Blinder".into(),
            number: 1,
            change: FaderChange::Increment(0.05),
        })
        .await;
    session
        .send_button_state(ButtonStateRequest::Executor {
            key: "Exec1".into(),
            number: 1,
            active: true,
        })
        .await;

    wait_until(|| mock.recorded_sets().len() == 3, "three set requests").await;
    let recorded = mock.recorded_sets();
    assert_eq!(
        recorded.iter().map(|r| r.method).collect::<Vec<_>>(),
        vec!["set_macro_button", "set_macro_fader", "set_executor_values"]
    );
    let ids: Vec<u64> = recorded
        .iter()
        .map(|r| r.request_id.expect("set request without request id"))
        .collect();
    assert!(ids.windows(2).all(|w| w[0] < w[1]), "ids not increasing: {:?}", ids);
    let last_of_first_session = *ids.last().unwrap();
    session.destroy().await;

    // A fresh session manager starts the counter over
    mock.clear_sets();
    let (second, _host, _listener) = connect_and_login(&mock).await;
    wait_for_sync(&second).await;
    second
        .send_button_state(ButtonStateRequest::Macro {
            key: "Blinder".into(),
            number: 1,
            active: false,
        })
        .await;
    wait_until(|| !mock.recorded_sets().is_empty(), "set request on new session").await;
    let first_of_second_session = mock.recorded_sets()[0].request_id.unwrap();
    assert!(
        first_of_second_session < last_of_first_session,
        "counter did not reset: {} >= {}",
        first_of_second_session,
        last_of_first_session
    );

    second.destroy().await;
}

#[tokio::test]
async fn unknown_key_produces_no_rpc_call() {
    let mock = MockConsole::spawn(vec![sample_macro(0.1)], vec![sample_executor()]).await;
    let (session, _host, _listener) = connect_and_login(&mock).await;
    wait_for_sync(&session).await;

    session
        .send_button_state(ButtonStateRequest::Macro {
            key: "Lamp1".into(),
            number: 1,
            active: true,
        })
        .await;
    session
        .send_fader_state(FaderStateRequest::Executor {
            key: "Lamp1".into(),
            change: FaderChange::Absolute(0.5),
        })
        .await;

    sleep(Duration::from_millis(200)).await;
    assert!(mock.recorded_sets().is_empty());
    assert_eq!(session.state(), SessionState::Active);

    session.destroy().await;
}

#[tokio::test]
async fn console_rejection_is_logged_not_fatal() {
    let mock = MockConsole::spawn(vec![sample_macro(0.1)], vec![sample_executor()]).await;
    let (session, _host, _listener) = connect_and_login(&mock).await;
    wait_for_sync(&session).await;

    mock.reject_set_ops();
    session
        .send_button_state(ButtonStateRequest::Macro {
            key: "Blinder".into(),
            number: 1,
            active: true,
        })
        .await;

    wait_until(|| !mock.recorded_sets().is_empty(), "rejected set request").await;
    assert_eq!(session.state(), SessionState::Active);

    session.destroy().await;
}

#[tokio::test]
async fn destroy_logs_off_exactly_once() {
    let mock = MockConsole::spawn(vec![sample_macro(0.1)], vec![sample_executor()]).await;
    let (session, _host, _listener) = connect_and_login(&mock).await;
    wait_for_sync(&session).await;

    session.destroy().await;
    assert_eq!(mock.logoffs(), 1);
    assert_eq!(session.state(), SessionState::Disconnected);
}

#[tokio::test]
async fn losing_the_console_fires_the_lost_notification() {
    let mock = MockConsole::spawn(vec![sample_macro(0.1)], vec![sample_executor()]).await;
    let (session, _host, _listener) = connect_and_login(&mock).await;
    wait_for_sync(&session).await;

    let mut lost_rx = session.subscribe_lost();
    mock.shutdown();

    tokio::time::timeout(Duration::from_secs(5), lost_rx.recv())
        .await
        .expect("no lost notification within timeout")
        .expect("lost channel closed without a notification");
}
