use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};

use crate::error::SessionError;
use crate::models::{ActionType, WorkSession, WorkStatus};
use crate::verification::{FlowEvent, FlowView};

use super::manager::{SessionManager, SessionSnapshot, Transition};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info};

type Reply<T> = oneshot::Sender<T>;

enum SessionCommand {
    Request(ActionType, Reply<Result<FlowView, SessionError>>),
    Dispatch(FlowEvent, Reply<Result<Option<Transition>, SessionError>>),
    FlowView(Reply<Option<FlowView>>),
    History(Reply<Vec<WorkSession>>),
    Current(Reply<Option<WorkSession>>),
    Shutdown,
}

enum Step {
    Command(Option<SessionCommand>),
    Location(crate::geo::GeoEvent),
    Tick,
}

/// Async handle to a [`SessionManager`] running on its own task.
///
/// The task owns the manager outright, so sensor callbacks, user input and
/// the once-a-second elapsed tick are handled one at a time.
#[derive(Clone)]
pub struct SessionController {
    commands: mpsc::UnboundedSender<SessionCommand>,
    snapshots: watch::Receiver<SessionSnapshot>,
    worker: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl SessionController {
    pub fn spawn(manager: SessionManager, tick_interval: Duration) -> Self {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshots) = watch::channel(manager.snapshot());

        let handle = tokio::spawn(session_loop(manager, command_rx, snapshot_tx, tick_interval));

        Self {
            commands,
            snapshots,
            worker: Arc::new(Mutex::new(Some(handle))),
        }
    }

    pub async fn request(&self, action: ActionType) -> Result<FlowView, SessionError> {
        self.call(|reply| SessionCommand::Request(action, reply))
            .await?
    }

    pub async fn dispatch(&self, event: FlowEvent) -> Result<Option<Transition>, SessionError> {
        self.call(|reply| SessionCommand::Dispatch(event, reply))
            .await?
    }

    pub async fn flow_view(&self) -> Result<Option<FlowView>, SessionError> {
        self.call(SessionCommand::FlowView).await
    }

    pub async fn history(&self) -> Result<Vec<WorkSession>, SessionError> {
        self.call(SessionCommand::History).await
    }

    pub async fn current(&self) -> Result<Option<WorkSession>, SessionError> {
        self.call(SessionCommand::Current).await
    }

    /// Latest published snapshot. Refreshed on every change and every tick
    /// while working.
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshots.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshots.clone()
    }

    /// Stops the task. Any open flow is dropped, which releases its sensors.
    pub async fn shutdown(&self) {
        let _ = self.commands.send(SessionCommand::Shutdown);
        if let Some(handle) = self.worker.lock().await.take() {
            let _ = handle.await;
        }
    }

    async fn call<T>(
        &self,
        make: impl FnOnce(Reply<T>) -> SessionCommand,
    ) -> Result<T, SessionError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(make(reply_tx))
            .map_err(|_| SessionError::ControllerClosed)?;
        reply_rx.await.map_err(|_| SessionError::ControllerClosed)
    }
}

async fn session_loop(
    mut manager: SessionManager,
    mut commands: mpsc::UnboundedReceiver<SessionCommand>,
    snapshots: watch::Sender<SessionSnapshot>,
    tick_interval: Duration,
) {
    let mut ticker = time::interval(tick_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let has_flow = manager.has_pending_flow();
        let working = manager.status() == WorkStatus::Working;

        let step = tokio::select! {
            command = commands.recv() => Step::Command(command),
            event = manager.next_location_event(), if has_flow => Step::Location(event),
            _ = ticker.tick(), if working => Step::Tick,
        };

        match step {
            Step::Command(None) | Step::Command(Some(SessionCommand::Shutdown)) => {
                log_info!("session loop shutting down");
                break;
            }
            Step::Command(Some(command)) => handle_command(&mut manager, &snapshots, command).await,
            Step::Location(event) => {
                if let Err(err) = manager.dispatch(FlowEvent::Location(event)).await {
                    log_debug!("location event dropped: {err}");
                }
            }
            Step::Tick => {}
        }

        snapshots.send_replace(manager.snapshot());
    }
}

/// State-changing commands publish their snapshot before replying, so a
/// caller that awaited the reply always sees the new state.
async fn handle_command(
    manager: &mut SessionManager,
    snapshots: &watch::Sender<SessionSnapshot>,
    command: SessionCommand,
) {
    match command {
        SessionCommand::Request(action, reply) => {
            let result = manager.request(action).map(|flow| flow.view());
            snapshots.send_replace(manager.snapshot());
            let _ = reply.send(result);
        }
        SessionCommand::Dispatch(event, reply) => {
            let result = manager.dispatch(event).await;
            snapshots.send_replace(manager.snapshot());
            let _ = reply.send(result);
        }
        SessionCommand::FlowView(reply) => {
            let _ = reply.send(manager.flow_view());
        }
        SessionCommand::History(reply) => {
            let _ = reply.send(manager.history().as_slice().to_vec());
        }
        SessionCommand::Current(reply) => {
            let _ = reply.send(manager.current().cloned());
        }
        SessionCommand::Shutdown => {}
    }
}
