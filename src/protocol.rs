use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Session credential issued by the console at login
///
/// Attached to every call made on the session after login succeeds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Client → console request envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<SessionId>,
    #[serde(rename = "requestId", skip_serializing_if = "Option::is_none")]
    pub request_id: Option<u64>,
    #[serde(flatten)]
    pub body: RequestBody,
}

/// Request payloads, discriminated by the `method` field on the wire
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "method", content = "params", rename_all = "camelCase")]
pub enum RequestBody {
    Login(ClientProgramInfo),
    ReportReadyToWork { ready: bool },
    Ping,
    Logoff(ClientProgramInfo),
    InformClientExists(ClientProgramInfo),
    BindUser { username: String, password_hash: String },
    GetMacros,
    ReceiveMacroChanges,
    SetMacroButtonState(MacroButtonStateRequest),
    SetMacroFaderState(MacroFaderStateRequest),
    GetExecutors,
    ReceiveExecutorChanges,
    SetExecutorValues(ExecutorValuesRequest),
}

/// Console → client frame: either a correlated response or a pushed event
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum Frame {
    Response(Response),
    Event(Event),
}

/// Console → client response envelope, correlated by `id`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub id: Uuid,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<ResponseBody>,
}

impl Response {
    /// Error detail, empty when the console gave none
    pub fn detail(&self) -> String {
        self.error.clone().unwrap_or_default()
    }
}

/// Typed response payloads
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "camelCase")]
pub enum ResponseBody {
    LoginAck(LoginAck),
    MacroList(MacroList),
    ExecutorList(ExecutorList),
    ClaimList(ClaimList),
}

/// Uncorrelated push events from the console
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum Event {
    MacroChanged(MacroChangedEvent),
    ExecutorChanged(ExecutorChangedEvent),
    Pong,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginAck {
    pub session_id: SessionId,
}

/// Self-descriptor sent at login, logoff and during the claim handshake
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientProgramInfo {
    pub program_info: ProgramInfo,
    pub client_info: ClientInfo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgramInfo {
    pub program_name: String,
    pub program_version: String,
    pub vendor: String,
    /// Milliseconds since the Unix epoch, refreshed per login attempt
    pub build_date: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientInfo {
    pub hostname: String,
    pub client_name: String,
    #[serde(default)]
    pub network_id: String,
    /// Non-loopback addresses of this machine
    #[serde(default)]
    pub ips: Vec<String>,
    pub client_type: ClientType,
    pub client_capabilities: u32,
    /// Random id fixed for the process lifetime
    pub runtime_id: Uuid,
    /// RPC port, present on console announcements
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub umbra_port: Option<u16>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ClientType {
    ExternalTool,
    Server,
}

/// Datagram a console broadcasts on the discovery multicast group
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsoleAnnouncement {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub umbra_server: Option<AnnouncedServer>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnouncedServer {
    pub client_info: ClientInfo,
}

/// Rename/claim instruction a console may answer to `InformClientExists`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimRequest {
    #[serde(default)]
    pub target_network_id: Option<String>,
    #[serde(default)]
    pub target_client_name: Option<String>,
    /// Runtime id of the client the claim is aimed at
    #[serde(default)]
    pub runtime_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimList {
    #[serde(default)]
    pub requests: Vec<ClaimRequest>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MacroList {
    #[serde(default)]
    pub macros: Vec<MacroDescriptor>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorList {
    #[serde(default)]
    pub executors: Vec<ExecutorDescriptor>,
}

/// Full macro snapshot as the console sends it
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MacroDescriptor {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub buttons: Vec<MacroButtonDescriptor>,
    #[serde(default)]
    pub faders: Vec<MacroFaderDescriptor>,
    /// Thumbnail PNG, base64-encoded on the wire
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bitmap: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MacroButtonDescriptor {
    pub number: u32,
    pub label: String,
    pub active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MacroFaderDescriptor {
    pub number: u32,
    pub label: String,
    pub fader_position: f64,
}

/// Full executor snapshot; executors always carry four buttons and one fader
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExecutorDescriptor {
    pub id: String,
    pub name: String,
    pub executor_member_id: String,
    pub number: u32,
    pub button1_key: String,
    pub button1_display_name: String,
    pub button1_active: bool,
    pub button2_key: String,
    pub button2_display_name: String,
    pub button2_active: bool,
    pub button3_key: String,
    pub button3_display_name: String,
    pub button3_active: bool,
    pub button4_key: String,
    pub button4_display_name: String,
    pub button4_active: bool,
    pub fader_key: String,
    pub fader_display_name: String,
    pub fader_position: f64,
}

/// Change-stream event kinds; unknown kinds are tolerated and skipped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ChangeKind {
    Added,
    Changed,
    Removed,
    Unknown,
}

impl<'de> Deserialize<'de> for ChangeKind {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        // Kinds this client does not know yet map to Unknown instead of
        // failing the whole frame.
        let tag = String::deserialize(deserializer)?;
        Ok(match tag.as_str() {
            "added" => ChangeKind::Added,
            "changed" => ChangeKind::Changed,
            "removed" => ChangeKind::Removed,
            _ => ChangeKind::Unknown,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MacroChangedEvent {
    pub change_type: ChangeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub macro_data: Option<MacroDescriptor>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutorChangedEvent {
    pub change_type: ChangeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executor_data: Option<ExecutorDescriptor>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MacroButtonStateRequest {
    pub macro_id: String,
    pub button_number: u32,
    pub active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MacroFaderStateRequest {
    pub macro_id: String,
    pub fader_number: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub increment: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub absolute: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutorValuesRequest {
    pub executor_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub button1: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub button2: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub button3: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub button4: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fader_increment: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fader_absolute: Option<f64>,
}

impl Request {
    /// Create a new request with a fresh correlation id
    pub fn new(body: RequestBody) -> Self {
        Self {
            id: Uuid::new_v4(),
            session: None,
            request_id: None,
            body,
        }
    }

    /// Attach the session credential
    pub fn with_session(mut self, session: &SessionId) -> Self {
        self.session = Some(session.clone());
        self
    }

    /// Stamp the session-scoped request id
    pub fn with_request_id(mut self, request_id: u64) -> Self {
        self.request_id = Some(request_id);
        self
    }

    /// Get the correlation id
    pub fn id(&self) -> Uuid {
        self.id
    }
}
