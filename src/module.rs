use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::actions::{self, action_definitions, ActionInvocation};
use crate::config::ModuleConfig;
use crate::discovery::{Discovery, SharedConfig};
use crate::feedbacks::{self, feedback_definitions, FeedbackId, FeedbackQuery, FeedbackValue};
use crate::host::{CompanionHost, InstanceStatus, StateListener};
use crate::presets::generate_presets;
use crate::session::SessionManager;
use crate::types::EntityKind;

/// Module entry point wiring the host to the console
///
/// Owns the connect cycle: discovery (or static connect) produces a
/// logged-in session; losing it tears everything down and starts the
/// cycle over with a fresh `SessionManager`.
pub struct UmbraModule {
    inner: Arc<ModuleInner>,
}

struct ModuleInner {
    config: SharedConfig,
    host: Arc<dyn CompanionHost>,
    session: Mutex<Option<Arc<SessionManager>>>,
    stop_tx: Mutex<Option<broadcast::Sender<()>>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ModuleInner {
    /// Rebuild the preset set from the union of both repositories
    fn regenerate_presets(&self) {
        let session = self.session.lock().unwrap().clone();
        let Some(session) = session else {
            return;
        };
        let macros = session
            .macro_repository()
            .map(|repo| repo.lock().unwrap().get_all())
            .unwrap_or_default();
        let executors = session
            .executor_repository()
            .map(|repo| repo.lock().unwrap().get_all())
            .unwrap_or_default();
        self.host
            .set_preset_definitions(generate_presets(&macros, &executors));
    }
}

/// Narrow state-change capability handed to the entity clients
struct ModuleListener {
    inner: Weak<ModuleInner>,
}

impl StateListener for ModuleListener {
    fn topology_changed(&self, kind: EntityKind) {
        if let Some(inner) = self.inner.upgrade() {
            inner.regenerate_presets();
            inner.host.check_feedbacks(FeedbackId::for_kind(kind));
        }
    }

    fn values_changed(&self, kind: EntityKind) {
        if let Some(inner) = self.inner.upgrade() {
            inner.host.check_feedbacks(FeedbackId::for_kind(kind));
        }
    }
}

impl UmbraModule {
    pub fn new(host: Arc<dyn CompanionHost>) -> Self {
        Self {
            inner: Arc::new(ModuleInner {
                config: Arc::new(Mutex::new(ModuleConfig::default())),
                host,
                session: Mutex::new(None),
                stop_tx: Mutex::new(None),
                task: Mutex::new(None),
            }),
        }
    }

    /// Host lifecycle: module instantiated with its configuration
    pub async fn init(&self, config: ModuleConfig) {
        *self.inner.config.lock().unwrap() = config;

        self.inner.host.update_status(InstanceStatus::Connecting);
        self.inner.host.set_action_definitions(action_definitions());
        self.inner
            .host
            .set_feedback_definitions(feedback_definitions());
        self.inner.host.set_variable_definitions(Vec::new());

        self.start_cycle().await;
    }

    /// Host lifecycle: configuration edited; takes effect on the next
    /// connect cycle
    pub async fn config_updated(&self, config: ModuleConfig) {
        *self.inner.config.lock().unwrap() = config;
    }

    async fn start_cycle(&self) {
        self.stop_cycle().await;

        let (stop_tx, _) = broadcast::channel(1);
        *self.inner.stop_tx.lock().unwrap() = Some(stop_tx.clone());

        let inner = self.inner.clone();
        let listener: Arc<dyn StateListener> = Arc::new(ModuleListener {
            inner: Arc::downgrade(&self.inner),
        });

        let handle = tokio::spawn(async move {
            let mut stop_rx = stop_tx.subscribe();
            loop {
                inner.host.update_status(InstanceStatus::Connecting);

                let mut discovery =
                    Discovery::new(inner.config.clone(), inner.host.clone(), listener.clone());
                let mut session_rx = discovery.start().await;

                let session = tokio::select! {
                    _ = stop_rx.recv() => {
                        discovery.stop().await;
                        return;
                    }
                    session = session_rx.recv() => match session {
                        Some(session) => session,
                        None => return,
                    },
                };
                discovery.stop().await;

                *inner.session.lock().unwrap() = Some(session.clone());
                // Entity clients may have signaled before the session was
                // stored; render whatever state already arrived.
                inner.regenerate_presets();
                inner.host.check_feedbacks(FeedbackId::for_kind(EntityKind::Macro));
                inner.host.check_feedbacks(FeedbackId::for_kind(EntityKind::Executor));

                let mut lost_rx = session.subscribe_lost();
                if session.is_lost() {
                    tracing::error!("Console connection died during startup");
                } else {
                    tokio::select! {
                        _ = stop_rx.recv() => {
                            session.destroy().await;
                            *inner.session.lock().unwrap() = None;
                            return;
                        }
                        _ = lost_rx.recv() => {
                            tracing::error!("Connection to console lost, reconnecting");
                        }
                    }
                }

                inner.host.update_status(InstanceStatus::Disconnected);
                session.destroy().await;
                *inner.session.lock().unwrap() = None;
                // Next iteration restarts discovery with a fresh session
                // manager and a fresh request-id counter.
            }
        });

        *self.inner.task.lock().unwrap() = Some(handle);
    }

    async fn stop_cycle(&self) {
        let stop_tx = self.inner.stop_tx.lock().unwrap().take();
        if let Some(tx) = stop_tx {
            let _ = tx.send(());
        }
        let task = self.inner.task.lock().unwrap().take();
        if let Some(handle) = task {
            let _ = tokio::time::timeout(Duration::from_secs(2), handle).await;
        }
    }

    /// Host lifecycle: module being torn down; completes after logoff
    pub async fn destroy(&self) {
        tracing::debug!("destroy");
        self.stop_cycle().await;

        let session = self.inner.session.lock().unwrap().take();
        if let Some(session) = session {
            session.destroy().await;
        }
        self.inner.host.update_status(InstanceStatus::Disconnected);
    }

    /// Host callback: a configured action was invoked on the surface
    pub async fn handle_action(&self, invocation: ActionInvocation) {
        let session = self.inner.session.lock().unwrap().clone();
        match session {
            Some(session) => actions::dispatch(&session, invocation).await,
            None => tracing::debug!("Action invoked before a console session is active"),
        }
    }

    /// Host callback: re-evaluate one feedback against repository state
    pub fn evaluate_feedback(&self, query: &FeedbackQuery) -> FeedbackValue {
        let session = self.inner.session.lock().unwrap().clone();
        let Some(session) = session else {
            return FeedbackValue::None;
        };
        let (Some(macros), Some(executors)) =
            (session.macro_repository(), session.executor_repository())
        else {
            return FeedbackValue::None;
        };
        let macros = macros.lock().unwrap();
        let executors = executors.lock().unwrap();
        feedbacks::evaluate(&macros, &executors, query)
    }

    /// The live session, when the module is connected
    pub fn session(&self) -> Option<Arc<SessionManager>> {
        self.inner.session.lock().unwrap().clone()
    }
}
