//! The engine task: owns the stream, the match state and the reconnect
//! schedule, and serializes inbound notices with outbound commands.

use chrono::Utc;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use super::client::{FieldControlClient, Generation};
use super::commands::Operation;
use super::connection::{ConnectionState, FieldControlError, Frame, Transport};
use super::protocol::AudienceDisplay;
use super::state::{MatchSnapshot, MatchState, StateChange};
use super::supervisor::{Alert, ReconnectPolicy, Supervisor};
use crate::config::ConnectionConfig;

/// Event pushed to the host, in the order it happened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum EngineEvent {
    Connected { generation: Generation },
    Disconnected { reason: String },
    Alert(Alert),
    Snapshot(MatchSnapshot),
    DisplaySelected { display: AudienceDisplay },
}

enum Request {
    Operate(Operation),
    Reconfigure(ConnectionConfig),
}

/// Handle to a running engine. Dropping it stops the engine.
pub struct FieldControlEngine {
    requests: mpsc::UnboundedSender<Request>,
    snapshot: watch::Receiver<MatchSnapshot>,
    generation: Generation,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl FieldControlEngine {
    /// Spawn the engine task. It connects right away.
    pub fn spawn<C>(
        client: C,
        config: ConnectionConfig,
        policy: ReconnectPolicy,
    ) -> (Self, mpsc::UnboundedReceiver<EngineEvent>)
    where
        C: FieldControlClient + 'static,
    {
        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(MatchSnapshot::default());
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let generation = client.generation();

        if config.generation != generation {
            tracing::warn!(
                "Config asks for the {} protocol but the client speaks {}",
                config.generation,
                generation
            );
        }

        let driver = Driver {
            client,
            config,
            transport: None,
            state: MatchState::new(),
            conn_state: ConnectionState::Disconnected,
            supervisor: Supervisor::new(policy),
            events: event_tx,
            snapshot: snapshot_tx,
        };
        let task = tokio::spawn(driver.run(request_rx, shutdown_rx));

        let engine = Self {
            requests: request_tx,
            snapshot: snapshot_rx,
            generation,
            shutdown: Some(shutdown_tx),
            task: Some(task),
        };
        (engine, event_rx)
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Latest published snapshot.
    pub fn snapshot(&self) -> MatchSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Queue an operation. Fails only if this protocol generation cannot
    /// express it or the engine has stopped.
    pub fn submit(&self, op: Operation) -> Result<(), FieldControlError> {
        if !self.generation.supports(&op) {
            return Err(FieldControlError::Unsupported {
                operation: op.name(),
                generation: self.generation,
            });
        }
        self.requests
            .send(Request::Operate(op))
            .map_err(|_| FieldControlError::EngineStopped)
    }

    pub fn start(&self) -> Result<(), FieldControlError> {
        self.submit(Operation::Start)
    }

    pub fn end_early(&self) -> Result<(), FieldControlError> {
        self.submit(Operation::EndEarly)
    }

    pub fn start_or_end(&self) -> Result<(), FieldControlError> {
        self.submit(Operation::StartOrEnd)
    }

    pub fn abort(&self) -> Result<(), FieldControlError> {
        self.submit(Operation::Abort)
    }

    pub fn reset_timer(&self) -> Result<(), FieldControlError> {
        self.submit(Operation::ResetTimer)
    }

    pub fn queue_next_match(&self) -> Result<(), FieldControlError> {
        self.submit(Operation::QueueNextMatch)
    }

    /// Not available on the binary protocol.
    pub fn queue_prev_match(&self) -> Result<(), FieldControlError> {
        self.submit(Operation::QueuePrevMatch)
    }

    pub fn queue_driving_skills(&self, field_id: u32) -> Result<(), FieldControlError> {
        self.submit(Operation::QueueDrivingSkills { field_id })
    }

    pub fn queue_programming_skills(&self, field_id: u32) -> Result<(), FieldControlError> {
        self.submit(Operation::QueueProgrammingSkills { field_id })
    }

    /// Not available on the binary protocol.
    pub fn select_display(&self, display: AudienceDisplay) -> Result<(), FieldControlError> {
        self.submit(Operation::SelectDisplay(display))
    }

    pub fn move_match_to_field(&self, field_id: u32) -> Result<(), FieldControlError> {
        self.submit(Operation::MoveMatchToField { field_id })
    }

    /// Swap credentials: drops the session and reconnects.
    pub fn reconfigure(&self, config: ConnectionConfig) -> Result<(), FieldControlError> {
        if config.generation != self.generation {
            return Err(FieldControlError::Unsupported {
                operation: "switch-generation",
                generation: self.generation,
            });
        }
        self.requests
            .send(Request::Reconfigure(config))
            .map_err(|_| FieldControlError::EngineStopped)
    }

    /// Stop the engine, cancelling any pending reconnect, and wait for it.
    pub async fn close(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::error!("Engine task failed: {}", e);
            }
        }
    }
}

struct Driver<C: FieldControlClient> {
    client: C,
    config: ConnectionConfig,
    transport: Option<C::Transport>,
    state: MatchState,
    conn_state: ConnectionState,
    supervisor: Supervisor,
    events: mpsc::UnboundedSender<EngineEvent>,
    snapshot: watch::Sender<MatchSnapshot>,
}

async fn recv_frame<T: Transport>(
    transport: &mut Option<T>,
) -> Option<Result<Frame, FieldControlError>> {
    match transport {
        Some(t) => t.recv().await,
        None => std::future::pending().await,
    }
}

impl<C: FieldControlClient> Driver<C> {
    async fn run(
        mut self,
        mut requests: mpsc::UnboundedReceiver<Request>,
        mut shutdown: oneshot::Receiver<()>,
    ) {
        loop {
            tokio::select! {
                _ = &mut shutdown => break,

                req = requests.recv() => {
                    let Some(req) = req else { break };
                    tokio::select! {
                        _ = self.handle_request(req) => {}
                        _ = &mut shutdown => break,
                    }
                }

                frame = recv_frame(&mut self.transport) => {
                    self.handle_frame(frame).await;
                }

                _ = self.supervisor.wait(), if self.transport.is_none() => {
                    tokio::select! {
                        _ = self.reconnect() => {}
                        _ = &mut shutdown => break,
                    }
                }
            }
        }

        if let Some(mut transport) = self.transport.take() {
            transport.close().await;
        }
        tracing::info!("Field control engine stopped");
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.conn_state != state {
            tracing::debug!("Connection {:?} → {:?}", self.conn_state, state);
            self.conn_state = state;
        }
    }

    fn emit(&self, event: EngineEvent) {
        let _ = self.events.send(event);
    }

    fn publish(&self, change: StateChange) {
        match change {
            StateChange::Snapshot(snapshot) => {
                self.snapshot.send_replace(snapshot.clone());
                self.emit(EngineEvent::Snapshot(snapshot));
            }
            StateChange::Display(display) => {
                self.emit(EngineEvent::DisplaySelected { display });
            }
        }
    }

    /// Open a fresh stream, replacing any existing one.
    async fn connect(&mut self) -> Result<(), FieldControlError> {
        if let Some(mut old) = self.transport.take() {
            old.close().await;
        }

        self.set_state(if self.client.session_expired(Utc::now()) {
            ConnectionState::Authenticating
        } else {
            ConnectionState::Connecting
        });

        let limit = self.supervisor.connect_timeout();
        let opened = tokio::time::timeout(limit, self.client.open(&self.config))
            .await
            .unwrap_or_else(|_| {
                Err(FieldControlError::Connect(format!(
                    "no answer from {} within {:?}",
                    self.config.address, limit
                )))
            });

        match opened {
            Ok(transport) => {
                self.transport = Some(transport);
                self.set_state(ConnectionState::Open);
                self.supervisor.on_connected();
                tracing::info!(
                    "Connected to field set {} at {}",
                    self.config.field_set,
                    self.config.address
                );
                self.emit(EngineEvent::Connected {
                    generation: self.client.generation(),
                });
                Ok(())
            }
            Err(e) => {
                self.set_state(ConnectionState::Disconnected);
                Err(e)
            }
        }
    }

    async fn reconnect(&mut self) {
        if let Err(e) = self.connect().await {
            let alert = self.supervisor.on_failure(&e);
            self.emit(EngineEvent::Alert(alert));
        }
    }

    async fn lose_transport(&mut self, reason: String) {
        if let Some(mut transport) = self.transport.take() {
            transport.close().await;
        }
        self.set_state(ConnectionState::Disconnected);
        self.supervisor.on_disconnected();
        tracing::warn!("Disconnected: {}", reason);
        self.emit(EngineEvent::Disconnected { reason });
    }

    async fn handle_frame(&mut self, frame: Option<Result<Frame, FieldControlError>>) {
        match frame {
            None => self.lose_transport("server closed the stream".to_string()).await,
            Some(Err(e)) => self.lose_transport(e.to_string()).await,
            Some(Ok(frame)) => match self.client.decode(frame) {
                Ok(notice) => {
                    if let Some(change) = self.state.handle(&notice) {
                        self.publish(change);
                    }
                }
                Err(e) => tracing::warn!("Dropping undecodable frame: {}", e),
            },
        }
    }

    async fn handle_request(&mut self, req: Request) {
        match req {
            Request::Operate(op) => self.handle_operation(op).await,
            Request::Reconfigure(config) => {
                tracing::info!(
                    "Reconfigured: field set {} at {}",
                    config.field_set,
                    config.address
                );
                self.config = config;
                self.client.invalidate();
                if self.transport.is_some() {
                    self.lose_transport("reconfigured".to_string()).await;
                }
                self.supervisor.schedule_now();
            }
        }
    }

    async fn handle_operation(&mut self, op: Operation) {
        let plan = op.plan(&self.state);
        if plan.commands.is_empty() {
            tracing::debug!("{} has nothing to do", op.name());
            return;
        }

        if self.transport.is_some() && self.client.session_expired(Utc::now()) {
            tracing::info!("Session expired, reconnecting before {}", op.name());
            self.lose_transport("session expired".to_string()).await;
        }

        if self.transport.is_none() {
            if let Err(e) = self.connect().await {
                let alert = self.supervisor.on_failure(&e);
                self.emit(EngineEvent::Alert(alert));
                return;
            }
        }

        for command in &plan.commands {
            let frame = match self.client.encode(command) {
                Ok(frame) => frame,
                Err(e) => {
                    tracing::warn!("Cannot send {:?}: {}", command, e);
                    continue;
                }
            };
            let Some(transport) = self.transport.as_mut() else {
                return;
            };
            if let Err(e) = transport.send(frame).await {
                tracing::error!("Failed to send {:?}: {}", command, e);
                self.lose_transport(e.to_string()).await;
                return;
            }
        }

        if let Some(field_id) = plan.assume_field {
            let change = self.state.assume_field(field_id);
            self.publish(change);
        }
    }
}
