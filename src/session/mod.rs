//! Session Runner
//!
//! Draws one program end to end: load it, open the link, reset the
//! origin, then push every command through transform, status gate and
//! dispatcher in file order. Per-command failures are recorded and the
//! session carries on; link loss, the session deadline, cancellation and
//! (if configured) a gate timeout stop it early. The link is closed on
//! every path once it has been opened.
//!
//! Loading the program and opening the port are fallible before any
//! device I/O, and their errors are returned directly. Everything after
//! that ends in a [`SessionReport`].

pub mod events;
pub mod manager;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::Instrument;
use uuid::Uuid;

use crate::config::loader::validate_config;
use crate::config::{Config, GateTimeoutPolicy};
use crate::dispatch::Dispatcher;
use crate::error::{Error, Result};
use crate::gate::StatusGate;
use crate::link::{LineTransport, LinkConnector, SerialConnector};
use crate::models::{
    AbandonReason, Command, CommandOutcome, CommandRecord, DispatchOutcome, Program,
    SessionReport, SessionStatus, Symbol,
};
use crate::program::{move_program_name, ProgramLoader};
use crate::transform::Transformer;

pub use events::SessionEvent;
pub use manager::{SessionInfo, SessionManager};

use events::EventSink;

/// Runs programs against one device port
pub struct Session {
    config: Config,
    connector: Arc<dyn LinkConnector>,
    loader: ProgramLoader,
    transformer: Transformer,
    gate: StatusGate,
    dispatcher: Dispatcher,
}

impl Session {
    /// Session over a real serial port
    ///
    /// # Errors
    /// `ConfigValidationFailed` if `config` is inconsistent
    pub fn new(config: Config) -> Result<Self> {
        Self::with_connector(config, Arc::new(SerialConnector))
    }

    /// Session whose links come from `connector`
    pub fn with_connector(config: Config, connector: Arc<dyn LinkConnector>) -> Result<Self> {
        validate_config(&config)?;
        Ok(Self {
            loader: ProgramLoader::new(&config.program),
            transformer: Transformer::new(&config.pen),
            gate: StatusGate::new(&config),
            dispatcher: Dispatcher::new(&config),
            connector,
            config,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn loader(&self) -> &ProgramLoader {
        &self.loader
    }

    /// Draw the program called `program` and wait for the report
    ///
    /// # Errors
    /// `ProgramNotFound` and `ConnectionFailed`, both before any device
    /// I/O. Failures after the link opened are reported as an aborted
    /// [`SessionReport`].
    pub async fn run(&self, program: &str) -> Result<SessionReport> {
        // Held for the whole run so cancellation can never fire
        let (_cancel, cancelled) = watch::channel(false);
        self.run_controlled(Uuid::new_v4(), program, EventSink::none(), cancelled)
            .await
    }

    /// Draw `symbol` in the cell at `row`, `col` (0-based)
    pub async fn play_move(&self, symbol: Symbol, row: usize, col: usize) -> Result<SessionReport> {
        let program = move_program_name(symbol, row, col)?;
        self.run(&program).await
    }

    /// Run `program` on a background task
    pub fn spawn(self, program: impl Into<String>) -> SessionHandle {
        let id = Uuid::new_v4();
        let program = program.into();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (cancel_tx, cancel_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            self.run_controlled(id, &program, EventSink::new(events_tx), cancel_rx)
                .await
        });
        SessionHandle::new(id, events_rx, Arc::new(cancel_tx), task)
    }

    pub(crate) async fn run_controlled(
        &self,
        id: Uuid,
        program_name: &str,
        events: EventSink,
        mut cancelled: watch::Receiver<bool>,
    ) -> Result<SessionReport> {
        let program = self.loader.load(program_name)?;
        let span = info_span!(
            "session",
            id = %id,
            program = %program.name,
            port = %self.config.link.port
        );

        async move {
            info!("Starting session ({} commands)", program.len());
            let mut link = self.connector.connect(&self.config.link).await?;

            let mut report =
                SessionReport::new(id, program.name.clone(), link.port_name(), program.len());
            events.emit(SessionEvent::Started {
                id,
                program: program.name.clone(),
                port: report.port.clone(),
                commands: program.len(),
            });

            let outcome = {
                let work = self.drive(link.as_mut(), &program, &mut report, &events);
                tokio::select! {
                    result = with_deadline(work, self.config.session.deadline()) => result,
                    () = wait_cancelled(&mut cancelled) => Err(Error::Cancelled),
                }
            };

            if let Err(e) = link.close().await {
                warn!("Failed to close link {}: {}", report.port, e);
            }

            report.finish(outcome.as_ref().err());
            match &report.status {
                SessionStatus::Complete => info!("{}", report.summary()),
                SessionStatus::Degraded => warn!("{}", report.summary()),
                SessionStatus::Aborted { .. } => error!("{}", report.summary()),
            }
            events.emit(SessionEvent::Finished {
                id,
                status: report.status.clone(),
            });
            Ok(report)
        }
        .instrument(span)
        .await
    }

    /// Origin reset followed by every command, in order
    async fn drive(
        &self,
        link: &mut dyn LineTransport,
        program: &Program,
        report: &mut SessionReport,
        events: &EventSink,
    ) -> Result<()> {
        // Sent once and never acknowledged; its stale reply is flushed
        let origin = Command::synthetic(self.config.session.origin_command.as_str());
        debug!("Setting origin: {}", origin);
        link.write_line(origin.as_str()).await?;
        report.origin_set = true;
        tokio::time::sleep(self.config.session.origin_settle()).await;
        link.flush_input().await?;
        events.emit(SessionEvent::OriginSet);

        for (index, command) in program.iter().enumerate() {
            events.emit(SessionEvent::CommandStarted {
                index,
                command: command.clone(),
            });
            let record = self.execute(link, command, report).await?;
            events.emit(SessionEvent::CommandFinished {
                index,
                record: record.clone(),
            });
            report.record(record);
        }
        Ok(())
    }

    /// Transform, gate and dispatch a single command
    async fn execute(
        &self,
        link: &mut dyn LineTransport,
        command: &Command,
        report: &mut SessionReport,
    ) -> Result<CommandRecord> {
        let transformed = match self.transformer.transform(command) {
            Ok(transformed) => transformed,
            Err(source) => {
                let err = Error::TransformFailed {
                    command: command.text.clone(),
                    source,
                };
                warn!("Line {}: {}, skipping", command.line, err);
                return Ok(abandoned(
                    command,
                    None,
                    AbandonReason::Transform {
                        message: err.to_string(),
                    },
                ));
            }
        };
        if transformed.text != command.text {
            debug!("Line {}: '{}' -> '{}'", command.line, command, transformed);
        }

        match self.gate.await_ready(link).await {
            Ok(gate) => {
                if gate.position.is_some() {
                    report.last_position = gate.position;
                }
            }
            Err(err @ Error::DeviceNotReady { .. })
                if self.config.gate.on_timeout == GateTimeoutPolicy::Abandon =>
            {
                warn!("Line {}: {}, skipping '{}'", command.line, err, transformed);
                return Ok(abandoned(
                    command,
                    Some(&transformed),
                    AbandonReason::NotReady {
                        message: err.to_string(),
                    },
                ));
            }
            Err(err) => return Err(err),
        }

        let outcome = self.dispatcher.send(link, &transformed).await?;
        if let DispatchOutcome::Abandoned { attempts, .. } = &outcome {
            let err = Error::AckTimeout {
                command: transformed.text.clone(),
                attempts: *attempts,
            };
            warn!("Line {}: {}", command.line, err);
        }

        Ok(CommandRecord {
            line: command.line,
            original: command.text.clone(),
            transformed: Some(transformed.text),
            outcome: outcome.into(),
        })
    }
}

fn abandoned(command: &Command, transformed: Option<&Command>, reason: AbandonReason) -> CommandRecord {
    CommandRecord {
        line: command.line,
        original: command.text.clone(),
        transformed: transformed.map(|c| c.text.clone()),
        outcome: CommandOutcome::Abandoned(reason),
    }
}

async fn with_deadline<F>(work: F, deadline: Option<Duration>) -> Result<()>
where
    F: Future<Output = Result<()>>,
{
    match deadline {
        Some(limit) => tokio::time::timeout(limit, work)
            .await
            .unwrap_or_else(|_| Err(Error::SessionDeadlineExceeded { deadline: limit })),
        None => work.await,
    }
}

/// Resolves once cancellation is requested; never if the sender is gone
async fn wait_cancelled(cancelled: &mut watch::Receiver<bool>) {
    loop {
        if *cancelled.borrow_and_update() {
            return;
        }
        if cancelled.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Owner's handle to a session running on a background task
pub struct SessionHandle {
    id: Uuid,
    events: mpsc::UnboundedReceiver<SessionEvent>,
    cancel: Arc<watch::Sender<bool>>,
    task: JoinHandle<Result<SessionReport>>,
}

impl SessionHandle {
    pub(crate) fn new(
        id: Uuid,
        events: mpsc::UnboundedReceiver<SessionEvent>,
        cancel: Arc<watch::Sender<bool>>,
        task: JoinHandle<Result<SessionReport>>,
    ) -> Self {
        Self {
            id,
            events,
            cancel,
            task,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Ask the session to stop; it still closes the link and reports
    pub fn cancel(&self) {
        // Fails only when the session has already finished
        let _ = self.cancel.send(true);
    }

    /// Next progress event, `None` once the session is over
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        self.events.recv().await
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the session report
    pub async fn join(self) -> Result<SessionReport> {
        self.task
            .await
            .map_err(|e| Error::Other(format!("session task failed: {}", e)))?
    }
}
