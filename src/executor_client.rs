use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::connection::Connection;
use crate::error::{Result, UmbraError};
use crate::host::StateListener;
use crate::protocol::{
    ChangeKind, Event, ExecutorValuesRequest, Request, RequestBody, ResponseBody, SessionId,
};
use crate::repository::Repository;
use crate::session::FaderChange;
use crate::types::{EntityKind, Executor};

/// Client for the console's executor service
///
/// Structurally the macro client's twin; executors have a fixed shape
/// (four buttons, one fader) and all outbound mutations go through a
/// single values request.
pub struct ExecutorClient {
    connection: Arc<Connection>,
    repository: Arc<Mutex<Repository<Executor>>>,
    session: SessionId,
    request_ids: Arc<AtomicU64>,
    tasks: Vec<JoinHandle<()>>,
}

impl ExecutorClient {
    /// Connect the executor channel and start the sync tasks
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

        {
            let connection = connection.clone();
            let repository = repository.clone();
            let listener = listener.clone();
            let session = session.clone();
            let request_ids = request_ids.clone();
            tasks.push(tokio::spawn(async move {
                let request = Request::new(RequestBody::GetExecutors)
                    .with_session(&session)
                    .with_request_id(request_ids.fetch_add(1, Ordering::Relaxed));
                match connection.send_request(request).await {
                    Ok(response) => {
                        let executors = match response.body {
                            Some(ResponseBody::ExecutorList(list)) => list.executors,
                            _ => {
                                tracing::error!("Executor list response carried no executors");
                                return;
                            }
                        };
                        {
                            let mut repo = repository.lock().unwrap();
                            for descriptor in executors {
                                repo.add(descriptor.into());
                            }
                        }
                        listener.topology_changed(EntityKind::Executor);
                        listener.values_changed(EntityKind::Executor);
                    }
                    Err(e) => {
                        tracing::error!("Failed to fetch executors: {}", e);
                    }
                }
            }));
        }

        {
            let connection = connection.clone();
            let repository = repository.clone();
            let session = session.clone();
            let request_ids = request_ids.clone();
            let mut events = connection.subscribe();
            tasks.push(tokio::spawn(async move {
                let request = Request::new(RequestBody::ReceiveExecutorChanges)
                    .with_session(&session)
                    .with_request_id(request_ids.fetch_add(1, Ordering::Relaxed));
                if let Err(e) = connection.send_only(request).await {
                    tracing::error!("Failed to open executor change stream: {}", e);
                    let _ = lost_tx.send(());
                    return;
                }

                loop {
                    tokio::select! {
                        event = events.recv() => match event {
                            Ok(Event::ExecutorChanged(change)) => {
                                Self::apply_change(&repository, &listener, change.change_type, change.executor_data);
                            }
                            Ok(_) => {}
                            Err(broadcast::error::RecvError::Lagged(n)) => {
                                tracing::warn!("Executor change stream lagged by {} events", n);
                            }
                            Err(broadcast::error::RecvError::Closed) => break,
                        },
                        _ = connection.closed() => break,
                    }
                }

                tracing::error!("Executor change stream ended");
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

    /// Apply one change event; `Changed` for an unknown id is an implicit add
    fn apply_change(
        repository: &Arc<Mutex<Repository<Executor>>>,
        listener: &Arc<dyn StateListener>,
        kind: ChangeKind,
        data: Option<crate::protocol::ExecutorDescriptor>,
    ) {
        tracing::debug!(
            "Executor change {:?}: {:?}",
            kind,
            data.as_ref().map(|d| &d.id)
        );
        match kind {
            ChangeKind::Added => {
                if let Some(descriptor) = data {
                    repository.lock().unwrap().add(descriptor.into());
                    listener.topology_changed(EntityKind::Executor);
                    listener.values_changed(EntityKind::Executor);
                }
            }
            ChangeKind::Changed => {
                if let Some(descriptor) = data {
                    repository.lock().unwrap().add(descriptor.into());
                    listener.values_changed(EntityKind::Executor);
                }
            }
            ChangeKind::Removed => {
                if let Some(descriptor) = data {
                    let removed = repository.lock().unwrap().remove(&descriptor.id);
                    if removed {
                        listener.topology_changed(EntityKind::Executor);
                    }
                }
            }
            ChangeKind::Unknown => {}
        }
    }

    pub fn repository(&self) -> Arc<Mutex<Repository<Executor>>> {
        self.repository.clone()
    }

    /// Press or release one of the four executor buttons (1-based)
    pub async fn send_button_state(&self, key: &str, button_number: u32, active: bool) {
        let Some(executor_id) = self.resolve(key) else {
            tracing::debug!("No executor known for '{}', ignoring button action", key);
            return;
        };

        let mut payload = ExecutorValuesRequest {
            executor_id,
            ..Default::default()
        };
        match button_number {
            1 => payload.button1 = Some(active),
            2 => payload.button2 = Some(active),
            3 => payload.button3 = Some(active),
            4 => payload.button4 = Some(active),
            other => {
                tracing::debug!("Executor has no button {}, ignoring", other);
                return;
            }
        }

        self.send_values(key, payload).await;
    }

    /// Move the executor fader, either relatively or to an absolute position
    pub async fn send_fader_state(&self, key: &str, change: FaderChange) {
        let Some(executor_id) = self.resolve(key) else {
            tracing::debug!("No executor known for '{}', ignoring fader action", key);
            return;
        };

        let mut payload = ExecutorValuesRequest {
            executor_id,
            ..Default::default()
        };
        match change {
            FaderChange::Increment(delta) => payload.fader_increment = Some(delta),
            FaderChange::Absolute(position) => payload.fader_absolute = Some(position),
        }

        self.send_values(key, payload).await;
    }

    async fn send_values(&self, key: &str, payload: ExecutorValuesRequest) {
        let request = Request::new(RequestBody::SetExecutorValues(payload))
            .with_session(&self.session)
            .with_request_id(self.request_ids.fetch_add(1, Ordering::Relaxed));

        if let Err(e) = self.connection.send_request(request).await {
            match e {
                UmbraError::Console { detail } => {
                    tracing::error!("Console rejected executor change for '{}': {}", key, detail);
                }
                other => {
                    tracing::error!("Failed to send executor change for '{}': {}", key, other);
                }
            }
        }
    }

    fn resolve(&self, key: &str) -> Option<String> {
        let repo = self.repository.lock().unwrap();
        repo.get_single(key).map(|e| e.id.clone())
    }

    /// Stop the sync tasks and close the executor channel
    pub async fn close(&self) {
        for task in &self.tasks {
            task.abort();
        }
        self.connection.close().await;
    }
}
