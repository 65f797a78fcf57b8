use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::connection::Connection;
use crate::error::{Result, UmbraError};
use crate::host::StateListener;
use crate::protocol::{
    ChangeKind, Event, MacroButtonStateRequest, MacroFaderStateRequest, Request, RequestBody,
    ResponseBody, SessionId,
};
use crate::repository::Repository;
use crate::session::FaderChange;
use crate::types::{EntityKind, Macro};

/// Client for the console's macro service
///
/// Owns the macro repository and one channel scoped to macros. The bulk
/// fetch and the change stream start concurrently; both paths upsert full
/// snapshots, so either completion order converges.
pub struct MacroClient {
    connection: Arc<Connection>,
    repository: Arc<Mutex<Repository<Macro>>>,
    session: SessionId,
    request_ids: Arc<AtomicU64>,
    tasks: Vec<JoinHandle<()>>,
}

impl MacroClient {
    /// Connect the macro channel and start the sync tasks
    pub async fn start(
        endpoint: &str,
        session: SessionId,
        request_ids: Arc<AtomicU64>,
        listener: Arc<dyn StateListener>,
        lost_tx: broadcast::Sender<()>,
    ) -> Result<Self> {
        let connection = Arc::new(Connection::connect(endpoint).await?);
        let repository = Arc::new(Mutex::new(Repository::new()));
        let mut tasks = Vec::new();

        // Bulk fetch
        {
            let connection = connection.clone();
            let repository = repository.clone();
            let listener = listener.clone();
            let session = session.clone();
            let request_ids = request_ids.clone();
            tasks.push(tokio::spawn(async move {
                let request = Request::new(RequestBody::GetMacros)
                    .with_session(&session)
                    .with_request_id(request_ids.fetch_add(1, Ordering::Relaxed));
                match connection.send_request(request).await {
                    Ok(response) => {
                        let macros = match response.body {
                            Some(ResponseBody::MacroList(list)) => list.macros,
                            _ => {
                                tracing::error!("Macro list response carried no macros");
                                return;
                            }
                        };
                        {
                            let mut repo = repository.lock().unwrap();
                            for descriptor in macros {
                                repo.add(descriptor.into());
                            }
                        }
                        listener.topology_changed(EntityKind::Macro);
                        listener.values_changed(EntityKind::Macro);
                    }
                    Err(e) => {
                        tracing::error!("Failed to fetch macros: {}", e);
                    }
                }
            }));
        }

        // Change stream; the event subscription is taken before the task
        // runs so no change published after startup can be missed
        {
            let connection = connection.clone();
            let repository = repository.clone();
            let session = session.clone();
            let request_ids = request_ids.clone();
            let mut events = connection.subscribe();
            tasks.push(tokio::spawn(async move {
                let request = Request::new(RequestBody::ReceiveMacroChanges)
                    .with_session(&session)
                    .with_request_id(request_ids.fetch_add(1, Ordering::Relaxed));
                if let Err(e) = connection.send_only(request).await {
                    tracing::error!("Failed to open macro change stream: {}", e);
                    let _ = lost_tx.send(());
                    return;
                }

                loop {
                    tokio::select! {
                        event = events.recv() => match event {
                            Ok(Event::MacroChanged(change)) => {
                                Self::apply_change(&repository, &listener, change.change_type, change.macro_data);
                            }
                            Ok(_) => {}
                            Err(broadcast::error::RecvError::Lagged(n)) => {
                                tracing::warn!("Macro change stream lagged by {} events", n);
                            }
                            Err(broadcast::error::RecvError::Closed) => break,
                        },
                        _ = connection.closed() => break,
                    }
                }

                tracing::error!("Macro change stream ended");
                let _ = lost_tx.send(());
            }));
        }

        Ok(Self {
            connection,
            repository,
            session,
            request_ids,
            tasks,
        })
    }

    /// Apply one change event to the repository and raise the matching signal.
    ///
    /// A `Changed` event for an unknown id is treated as an implicit add:
    /// the snapshot is complete, so upserting it is always safe.
    fn apply_change(
        repository: &Arc<Mutex<Repository<Macro>>>,
        listener: &Arc<dyn StateListener>,
        kind: ChangeKind,
        data: Option<crate::protocol::MacroDescriptor>,
    ) {
        tracing::debug!("Macro change {:?}: {:?}", kind, data.as_ref().map(|d| &d.id));
        match kind {
            ChangeKind::Added => {
                if let Some(descriptor) = data {
                    repository.lock().unwrap().add(descriptor.into());
                    listener.topology_changed(EntityKind::Macro);
                    listener.values_changed(EntityKind::Macro);
                }
            }
            ChangeKind::Changed => {
                if let Some(descriptor) = data {
                    repository.lock().unwrap().add(descriptor.into());
                    listener.values_changed(EntityKind::Macro);
                }
            }
            ChangeKind::Removed => {
                if let Some(descriptor) = data {
                    let removed = repository.lock().unwrap().remove(&descriptor.id);
                    if removed {
                        listener.topology_changed(EntityKind::Macro);
                    }
                }
            }
            ChangeKind::Unknown => {}
        }
    }

    pub fn repository(&self) -> Arc<Mutex<Repository<Macro>>> {
        self.repository.clone()
    }

    /// Press or release a macro button.
    ///
    /// The key may be an id or a display name; an unknown key is a debug-
    /// logged no-op since the entity may simply not be synced yet.
    pub async fn send_button_state(&self, key: &str, button_number: u32, active: bool) {
        let Some(macro_id) = self.resolve(key) else {
            tracing::debug!("No macro known for '{}', ignoring button action", key);
            return;
        };

        let request = Request::new(RequestBody::SetMacroButtonState(MacroButtonStateRequest {
            macro_id,
            button_number,
            active,
        }))
        .with_session(&self.session)
        .with_request_id(self.request_ids.fetch_add(1, Ordering::Relaxed));

        if let Err(e) = self.connection.send_request(request).await {
            Self::log_send_failure("button", key, e);
        }
    }

    /// Move a macro fader, either relatively or to an absolute position
    pub async fn send_fader_state(&self, key: &str, fader_number: u32, change: FaderChange) {
        let Some(macro_id) = self.resolve(key) else {
            tracing::debug!("No macro known for '{}', ignoring fader action", key);
            return;
        };

        let mut payload = MacroFaderStateRequest {
            macro_id,
            fader_number,
            increment: None,
            absolute: None,
        };
        match change {
            FaderChange::Increment(delta) => payload.increment = Some(delta),
            FaderChange::Absolute(position) => payload.absolute = Some(position),
        }

        let request = Request::new(RequestBody::SetMacroFaderState(payload))
            .with_session(&self.session)
            .with_request_id(self.request_ids.fetch_add(1, Ordering::Relaxed));

        if let Err(e) = self.connection.send_request(request).await {
            Self::log_send_failure("fader", key, e);
        }
    }

    fn resolve(&self, key: &str) -> Option<String> {
        let repo = self.repository.lock().unwrap();
        repo.get_single(key).map(|m| m.id.clone())
    }

    fn log_send_failure(what: &str, key: &str, error: UmbraError) {
        match error {
            UmbraError::Console { detail } => {
                tracing::error!("Console rejected macro {} change for '{}': {}", what, key, detail);
            }
            other => {
                tracing::error!("Failed to send macro {} change for '{}': {}", what, key, other);
            }
        }
    }

    /// Stop the sync tasks and close the macro channel
    pub async fn close(&self) {
        for task in &self.tasks {
            task.abort();
        }
        self.connection.close().await;
    }
}
