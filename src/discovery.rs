use std::net::{Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::sleep;

use crate::config::{ModuleConfig, DEFAULT_UMBRA_PORT};
use crate::connection::Connection;
use crate::error::Result;
use crate::host::{CompanionHost, StateListener};
use crate::protocol::{ClaimRequest, ConsoleAnnouncement, Request, RequestBody, ResponseBody};
use crate::session::{client_program_info, runtime_id, SessionManager};

/// Multicast group consoles announce themselves on
pub const MULTICAST_GROUP: Ipv4Addr = Ipv4Addr::new(225, 68, 67, 3);
/// Well-known announcement port; the RPC port is carried in the packet
pub const DISCOVERY_PORT: u16 = 17474;

const MAX_BACKOFF: Duration = Duration::from_secs(60);
const MAX_DATAGRAM: usize = 8192;

/// Configuration shared with discovery so console-initiated claims can
/// rewrite the net id and device name in place
pub type SharedConfig = Arc<Mutex<ModuleConfig>>;

/// Locates a console and produces one logged-in session
///
/// Listens for announcement datagrams and matches them against the
/// configured network id. Discovery is one-shot: once a match logs in,
/// the socket is closed and the session is handed to the caller. A
/// mismatching console is asked whether it wants to claim this client.
/// With discovery disabled, the statically configured endpoint is used
/// instead. Socket and connect errors retry with exponential backoff.
pub struct Discovery {
    config: SharedConfig,
    host: Arc<dyn CompanionHost>,
    listener: Arc<dyn StateListener>,
    stop_tx: Option<broadcast::Sender<()>>,
    task_handle: Option<JoinHandle<()>>,
}

impl Discovery {
    pub fn new(
        config: SharedConfig,
        host: Arc<dyn CompanionHost>,
        listener: Arc<dyn StateListener>,
    ) -> Self {
        Self {
            config,
            host,
            listener,
            stop_tx: None,
            task_handle: None,
        }
    }

    /// Start searching; the returned channel yields the session once a
    /// console accepted the login. Restarts a running search.
    pub async fn start(&mut self) -> mpsc::UnboundedReceiver<Arc<SessionManager>> {
        self.stop().await;

        let (stop_tx, _) = broadcast::channel(1);
        self.stop_tx = Some(stop_tx.clone());

        let (session_tx, session_rx) = mpsc::unbounded_channel();
        let config = self.config.clone();
        let host = self.host.clone();
        let listener = self.listener.clone();

        let handle = tokio::spawn(async move {
            let mut backoff = Duration::ZERO;
            let mut stop_rx = stop_tx.subscribe();

            loop {
                tokio::select! {
                    _ = stop_rx.recv() => {
                        tracing::info!("Discovery stopped by user");
                        break;
                    }
                    outcome = async {
                        if backoff > Duration::ZERO {
                            tracing::info!("Retrying console search in {:?}", backoff);
                            sleep(backoff).await;
                        }
                        let mut stop_rx_inner = stop_tx.subscribe();
                        run_discovery_once(&config, &host, &listener, &mut stop_rx_inner).await
                    } => match outcome {
                        Ok(Some(session)) => {
                            let _ = session_tx.send(session);
                            break;
                        }
                        Ok(None) => break,
                        Err(e) => {
                            tracing::error!("Discovery error: {}", e);
                            backoff = if backoff == Duration::ZERO {
                                Duration::from_secs(1)
                            } else {
                                (backoff * 2).min(MAX_BACKOFF)
                            };
                        }
                    }
                }
            }
        });

        self.task_handle = Some(handle);
        session_rx
    }

    /// Stop the search; pending listen/connect work is abandoned
    pub async fn stop(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.task_handle.take() {
            // Give it a moment to stop gracefully
            let _ = tokio::time::timeout(Duration::from_millis(500), handle).await;
        }
    }
}

async fn run_discovery_once(
    config: &SharedConfig,
    host: &Arc<dyn CompanionHost>,
    listener: &Arc<dyn StateListener>,
    stop_rx: &mut broadcast::Receiver<()>,
) -> Result<Option<Arc<SessionManager>>> {
    let snapshot = config.lock().unwrap().clone();

    if snapshot.disable_discovery {
        let endpoint = snapshot.endpoint();
        tracing::info!("Discovery disabled, connecting to {}", endpoint);
        let session = login_at(&endpoint, &snapshot, host, listener).await?;
        return Ok(Some(session));
    }

    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, DISCOVERY_PORT)).await?;
    socket.join_multicast_v4(MULTICAST_GROUP, Ipv4Addr::UNSPECIFIED)?;
    tracing::info!(
        "Listening for console announcements on {}:{}",
        MULTICAST_GROUP,
        DISCOVERY_PORT
    );

    let mut buf = vec![0u8; MAX_DATAGRAM];
    loop {
        let (len, sender) = tokio::select! {
            _ = stop_rx.recv() => {
                tracing::info!("Discovery cancelled, closing socket");
                return Ok(None);
            }
            received = socket.recv_from(&mut buf) => received?,
        };

        let announcement: ConsoleAnnouncement = match serde_json::from_slice(&buf[..len]) {
            Ok(announcement) => announcement,
            Err(e) => {
                tracing::warn!("Undecodable announcement from {}: {}", sender, e);
                continue;
            }
        };

        // Claims may have rewritten the config since the last packet
        let current = config.lock().unwrap().clone();
        match evaluate_announcement(&announcement, &current, sender) {
            AnnouncementAction::Connect { endpoint } => {
                tracing::info!("Console for net id '{}' found at {}", current.netid, endpoint);
                // One-shot: stop listening before the login attempt
                drop(socket);
                let session = login_at(&endpoint, &current, host, listener).await?;
                return Ok(Some(session));
            }
            AnnouncementAction::Negotiate { endpoint } => {
                if let Err(e) = negotiate_claim(config, &endpoint).await {
                    tracing::warn!("Claim handshake with {} failed: {}", endpoint, e);
                }
            }
            AnnouncementAction::Ignore => {}
        }
    }
}

async fn login_at(
    endpoint: &str,
    config: &ModuleConfig,
    host: &Arc<dyn CompanionHost>,
    listener: &Arc<dyn StateListener>,
) -> Result<Arc<SessionManager>> {
    let session = SessionManager::connect(
        endpoint,
        &config.devicename,
        host.clone(),
        listener.clone(),
    )
    .await?;
    session
        .login(&config.netid, &config.username, &config.password)
        .await?;
    Ok(session)
}

/// What to do with one received announcement
#[derive(Debug, Clone, PartialEq, Eq)]
enum AnnouncementAction {
    /// Net id matches: connect to the announced RPC endpoint
    Connect { endpoint: String },
    /// Foreign console: ask whether it wants to claim this client
    Negotiate { endpoint: String },
    Ignore,
}

fn evaluate_announcement(
    announcement: &ConsoleAnnouncement,
    config: &ModuleConfig,
    sender: SocketAddr,
) -> AnnouncementAction {
    let Some(server) = &announcement.umbra_server else {
        return AnnouncementAction::Ignore;
    };
    let info = &server.client_info;
    tracing::debug!(
        "Announcement from {}: {}:{}:{}",
        sender,
        info.hostname,
        info.client_name,
        info.network_id
    );

    if info.network_id == config.netid {
        let port = info.umbra_port.unwrap_or(config.port);
        AnnouncementAction::Connect {
            endpoint: format!("{}:{}", sender.ip(), port),
        }
    } else {
        let port = info.umbra_port.unwrap_or(DEFAULT_UMBRA_PORT);
        AnnouncementAction::Negotiate {
            endpoint: format!("{}:{}", sender.ip(), port),
        }
    }
}

/// Ask a foreign console whether a client like this one should exist
/// there; adopt any rename/claim instructions aimed at this process.
async fn negotiate_claim(config: &SharedConfig, endpoint: &str) -> Result<()> {
    let devicename = config.lock().unwrap().devicename.clone();
    let connection = Connection::connect(endpoint).await?;
    let response = connection
        .send_request(Request::new(RequestBody::InformClientExists(
            client_program_info(&devicename),
        )))
        .await?;
    connection.close().await;

    if let Some(ResponseBody::ClaimList(list)) = response.body {
        let mut current = config.lock().unwrap();
        apply_claims(&mut current, &list.requests);
    }
    Ok(())
}

fn apply_claims(config: &mut ModuleConfig, claims: &[ClaimRequest]) {
    for claim in claims {
        if claim.runtime_id.is_some_and(|id| id != runtime_id()) {
            continue;
        }
        if let Some(netid) = claim
            .target_network_id
            .as_ref()
            .filter(|n| !n.is_empty())
        {
            tracing::info!("Console claimed this client for net id '{}'", netid);
            config.netid = netid.clone();
        }
        if let Some(name) = claim
            .target_client_name
            .as_ref()
            .filter(|n| !n.is_empty())
        {
            config.devicename = name.clone();
        }
    }
}
