use std::sync::atomic::AtomicU64;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::auth::hash_password;
use crate::connection::Connection;
use crate::error::{Result, UmbraError};
use crate::executor_client::ExecutorClient;
use crate::host::{CompanionHost, InstanceStatus, StateListener};
use crate::macro_client::MacroClient;
use crate::protocol::{
    ClientInfo, ClientProgramInfo, ClientType, ProgramInfo, Request, RequestBody, ResponseBody,
    SessionId,
};
use crate::repository::Repository;
use crate::types::{Executor, Macro};

/// Keepalive ping cadence on the control channel
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(10);

const PROGRAM_VERSION: &str = "1.0.0";
const VENDOR: &str = "DMXControl Projects e.V.";

/// Connection lifecycle states
///
/// `ConnectionFailure` is absorbing: recovery is a full teardown and a
/// fresh session, never an in-place resume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    LoggingIn,
    AwaitingReadyAck,
    BindingUser,
    Active,
    ConnectionFailure,
}

/// A fader mutation, already normalized to [0, 1] / [-1, 1]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FaderChange {
    Increment(f64),
    Absolute(f64),
}

/// Button state change, tagged by the entity kind it targets
#[derive(Debug, Clone, PartialEq)]
pub enum ButtonStateRequest {
    Macro {
        key: String,
        number: u32,
        active: bool,
    },
    Executor {
        key: String,
        number: u32,
        active: bool,
    },
}

/// Fader state change, tagged by the entity kind it targets
#[derive(Debug, Clone, PartialEq)]
pub enum FaderStateRequest {
    Macro {
        key: String,
        number: u32,
        change: FaderChange,
    },
    Executor {
        key: String,
        change: FaderChange,
    },
}

/// Random id identifying this process to consoles, fixed for its lifetime
pub fn runtime_id() -> Uuid {
    static RUNTIME_ID: OnceLock<Uuid> = OnceLock::new();
    *RUNTIME_ID.get_or_init(Uuid::new_v4)
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Build the self-descriptor sent at login and during the claim handshake
pub(crate) fn client_program_info(devicename: &str) -> ClientProgramInfo {
    let host = hostname::get()
        .map(|h| h.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "unknown".to_string());

    let ips = local_ip_address::list_afinet_netifas()
        .map(|interfaces| {
            interfaces
                .into_iter()
                .filter(|(_, ip)| !ip.is_loopback())
                .map(|(_, ip)| ip.to_string())
                .collect()
        })
        .unwrap_or_default();

    ClientProgramInfo {
        program_info: ProgramInfo {
            program_name: devicename.to_string(),
            program_version: PROGRAM_VERSION.to_string(),
            vendor: VENDOR.to_string(),
            build_date: now_millis(),
        },
        client_info: ClientInfo {
            hostname: host,
            client_name: devicename.to_string(),
            network_id: String::new(),
            ips,
            client_type: ClientType::ExternalTool,
            client_capabilities: 0,
            runtime_id: runtime_id(),
            umbra_port: None,
        },
    }
}

/// One console session: login through logoff
///
/// Owns the control channel, the keepalive, the session credential, the
/// request-id counter, and both entity clients. A new `SessionManager` is
/// constructed per connection attempt; the counter starts over with it.
pub struct SessionManager {
    endpoint: String,
    control: Arc<Connection>,
    program_info: Mutex<ClientProgramInfo>,
    session_id: OnceLock<SessionId>,
    state: Mutex<SessionState>,
    request_ids: Arc<AtomicU64>,
    macros: OnceLock<MacroClient>,
    executors: OnceLock<ExecutorClient>,
    keepalive: Mutex<Option<JoinHandle<()>>>,
    lost_tx: broadcast::Sender<()>,
    host: Arc<dyn CompanionHost>,
    listener: Arc<dyn StateListener>,
}

impl SessionManager {
    /// Open the control channel to a console endpoint (`host:port`)
    pub async fn connect(
        endpoint: impl Into<String>,
        devicename: &str,
        host: Arc<dyn CompanionHost>,
        listener: Arc<dyn StateListener>,
    ) -> Result<Arc<Self>> {
        let endpoint = endpoint.into();
        let control = Arc::new(Connection::connect(&endpoint).await?);
        let (lost_tx, _) = broadcast::channel(4);

        Ok(Arc::new(Self {
            endpoint,
            control,
            program_info: Mutex::new(client_program_info(devicename)),
            session_id: OnceLock::new(),
            state: Mutex::new(SessionState::Disconnected),
            request_ids: Arc::new(AtomicU64::new(0)),
            macros: OnceLock::new(),
            executors: OnceLock::new(),
            keepalive: Mutex::new(None),
            lost_tx,
            host,
            listener,
        }))
    }

    /// Log in, perform the readiness handshake, bind the user and start
    /// both entity clients.
    ///
    /// Any failure along the way is fatal to the attempt and leaves the
    /// session in `ConnectionFailure`.
    pub async fn login(&self, netid: &str, username: &str, password: &str) -> Result<()> {
        {
            let state = *self.state.lock().unwrap();
            if state != SessionState::Disconnected {
                return Err(UmbraError::SessionState(format!(
                    "login attempted in {:?}",
                    state
                )));
            }
        }
        self.set_state(SessionState::LoggingIn);

        let info = {
            let mut info = self.program_info.lock().unwrap();
            info.client_info.network_id = netid.to_string();
            info.program_info.build_date = now_millis();
            info.clone()
        };

        let response = match self
            .control
            .send_request(Request::new(RequestBody::Login(info)))
            .await
        {
            Ok(response) => response,
            Err(e) => {
                tracing::error!("Login failed: {}", e);
                self.fail();
                return Err(e);
            }
        };

        let session_id = match response.body {
            Some(ResponseBody::LoginAck(ack)) => ack.session_id,
            _ => {
                self.fail();
                return Err(UmbraError::InvalidResponse(
                    "login response carried no session id".to_string(),
                ));
            }
        };
        tracing::info!("Logged in, session {}", session_id);
        let _ = self.session_id.set(session_id.clone());
        self.set_state(SessionState::AwaitingReadyAck);

        self.start_keepalive(session_id.clone());

        if let Err(e) = self
            .control
            .send_request(
                Request::new(RequestBody::ReportReadyToWork { ready: true })
                    .with_session(&session_id),
            )
            .await
        {
            tracing::error!("Ready handshake failed: {}", e);
            self.fail();
            return Err(e);
        }
        self.set_state(SessionState::BindingUser);

        if let Err(e) = self
            .control
            .send_request(
                Request::new(RequestBody::BindUser {
                    username: username.to_string(),
                    password_hash: hash_password(password),
                })
                .with_session(&session_id),
            )
            .await
        {
            tracing::error!("User bind failed: {}", e);
            self.fail();
            return Err(e);
        }

        let macros = match MacroClient::start(
            &self.endpoint,
            session_id.clone(),
            self.request_ids.clone(),
            self.listener.clone(),
            self.lost_tx.clone(),
        )
        .await
        {
            Ok(client) => client,
            Err(e) => {
                tracing::error!("Failed to start macro client: {}", e);
                self.fail();
                return Err(e);
            }
        };

        let executors = match ExecutorClient::start(
            &self.endpoint,
            session_id,
            self.request_ids.clone(),
            self.listener.clone(),
            self.lost_tx.clone(),
        )
        .await
        {
            Ok(client) => client,
            Err(e) => {
                tracing::error!("Failed to start executor client: {}", e);
                macros.close().await;
                self.fail();
                return Err(e);
            }
        };

        let _ = self.macros.set(macros);
        let _ = self.executors.set(executors);

        self.set_state(SessionState::Active);
        self.host.update_status(InstanceStatus::Ok);
        Ok(())
    }

    /// Ping the console every [`KEEPALIVE_INTERVAL`]; a failed write or a
    /// closed control stream is promoted to connection loss.
    fn start_keepalive(&self, session_id: SessionId) {
        let control = self.control.clone();
        let lost_tx = self.lost_tx.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(KEEPALIVE_INTERVAL);
            // the first tick fires immediately; skip it
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let ping = Request::new(RequestBody::Ping).with_session(&session_id);
                        if let Err(e) = control.send_only(ping).await {
                            tracing::error!("Keepalive write failed: {}", e);
                            break;
                        }
                    }
                    _ = control.closed() => {
                        tracing::error!("Control stream closed");
                        break;
                    }
                }
            }
            let _ = lost_tx.send(());
        });

        *self.keepalive.lock().unwrap() = Some(handle);
    }

    /// Subscribe to connection-loss notifications
    ///
    /// Fired by keepalive failure, control stream end, or an entity change
    /// stream dying. The handler is expected to tear this session down and
    /// start discovery over with a fresh `SessionManager`.
    pub fn subscribe_lost(&self) -> broadcast::Receiver<()> {
        self.lost_tx.subscribe()
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock().unwrap()
    }

    /// Whether the control channel has already died
    pub fn is_lost(&self) -> bool {
        self.control.is_closed()
    }

    fn set_state(&self, state: SessionState) {
        *self.state.lock().unwrap() = state;
    }

    fn fail(&self) {
        self.set_state(SessionState::ConnectionFailure);
        self.host.update_status(InstanceStatus::ConnectionFailure);
    }

    /// Route a button change to the entity client its tag names
    pub async fn send_button_state(&self, request: ButtonStateRequest) {
        match request {
            ButtonStateRequest::Macro {
                key,
                number,
                active,
            } => {
                if let Some(client) = self.macros.get() {
                    client.send_button_state(&key, number, active).await;
                } else {
                    tracing::debug!("Macro client not ready, dropping button change");
                }
            }
            ButtonStateRequest::Executor {
                key,
                number,
                active,
            } => {
                if let Some(client) = self.executors.get() {
                    client.send_button_state(&key, number, active).await;
                } else {
                    tracing::debug!("Executor client not ready, dropping button change");
                }
            }
        }
    }

    /// Route a fader change to the entity client its tag names
    pub async fn send_fader_state(&self, request: FaderStateRequest) {
        match request {
            FaderStateRequest::Macro {
                key,
                number,
                change,
            } => {
                if let Some(client) = self.macros.get() {
                    client.send_fader_state(&key, number, change).await;
                } else {
                    tracing::debug!("Macro client not ready, dropping fader change");
                }
            }
            FaderStateRequest::Executor { key, change } => {
                if let Some(client) = self.executors.get() {
                    client.send_fader_state(&key, change).await;
                } else {
                    tracing::debug!("Executor client not ready, dropping fader change");
                }
            }
        }
    }

    pub fn macro_repository(&self) -> Option<Arc<Mutex<Repository<Macro>>>> {
        self.macros.get().map(|c| c.repository())
    }

    pub fn executor_repository(&self) -> Option<Arc<Mutex<Repository<Executor>>>> {
        self.executors.get().map(|c| c.repository())
    }

    /// Tear the session down in order: entity channels, keepalive, logoff,
    /// control channel. Completes only after the logoff exchange finished,
    /// so callers can sequence work after it.
    pub async fn destroy(&self) {
        if let Some(client) = self.macros.get() {
            client.close().await;
        }
        if let Some(client) = self.executors.get() {
            client.close().await;
        }

        if let Some(handle) = self.keepalive.lock().unwrap().take() {
            handle.abort();
        }

        let info = self.program_info.lock().unwrap().clone();
        let mut request = Request::new(RequestBody::Logoff(info));
        if let Some(session_id) = self.session_id.get() {
            request = request.with_session(session_id);
        }
        match self.control.send_request(request).await {
            Ok(_) => tracing::debug!("Logged off"),
            Err(e) => tracing::debug!("Logoff failed: {}", e),
        }

        self.control.close().await;
        self.set_state(SessionState::Disconnected);
    }
}
