//! Delayed and guaranteed-release commands.

use std::fmt;
use std::time::Duration;

use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::domain::{Command, Request};
use crate::error::{ErrorCode, OperationError};

use super::workflow::{WorkflowEngine, WorkflowError};

/// A command that fires after a delay unless cancelled.
///
/// Dropping the handle leaves the command armed; use [`cancel`](Self::cancel)
/// to disarm it.
pub struct ScheduledCommand {
    command: Command,
    delay: Duration,
    task: JoinHandle<Result<Value, OperationError>>,
}

impl ScheduledCommand {
    /// Arm `request` to be invoked after `delay`.
    ///
    /// A failed invocation is logged and reported through [`join`](Self::join)
    /// under `failure_code`.
    pub fn arm(
        engine: WorkflowEngine,
        delay: Duration,
        request: Request,
        failure_code: ErrorCode,
    ) -> Self {
        let command = request.command;
        debug!(%command, delay_ms = delay.as_millis() as u64, "Command scheduled");

        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            engine.invoke_raw(&request).await.map_err(|e| {
                let err = OperationError::normalize(failure_code, e);
                error!(%command, code = %err.code(), "{}", err);
                err
            })
        });

        Self {
            command,
            delay,
            task,
        }
    }

    pub fn command(&self) -> Command {
        self.command
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Disarm the command if it has not fired yet
    pub fn cancel(&self) {
        if !self.task.is_finished() {
            debug!(command = %self.command, "Scheduled command cancelled");
        }
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the command to fire and return its response.
    ///
    /// A cancelled command reports [`WorkflowError::Cancelled`].
    pub async fn join(self) -> Result<Value, OperationError> {
        let command = self.command;
        match self.task.await {
            Ok(result) => result,
            Err(_) => Err(OperationError::normalize(
                ErrorCode::UnknownError,
                WorkflowError::Cancelled { command },
            )),
        }
    }
}

impl fmt::Debug for ScheduledCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduledCommand")
            .field("command", &self.command)
            .field("delay", &self.delay)
            .field("finished", &self.task.is_finished())
            .finish()
    }
}

/// Release action that runs exactly once.
///
/// [`run`](Self::run) invokes it in place; if the guard is dropped first (the
/// owning future was cancelled), the command is spawned onto the runtime.
pub(crate) struct Release {
    pending: Option<(WorkflowEngine, Request)>,
}

impl Release {
    pub(crate) fn new(engine: WorkflowEngine, request: Request) -> Self {
        Self {
            pending: Some((engine, request)),
        }
    }

    pub(crate) async fn run(mut self) -> Result<Value, WorkflowError> {
        match self.pending.take() {
            Some((engine, request)) => engine.invoke_raw(&request).await,
            None => Ok(Value::Null),
        }
    }
}

impl Drop for Release {
    fn drop(&mut self) {
        let Some((engine, request)) = self.pending.take() else {
            return;
        };

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                warn!(command = %request.command, "Running release after cancellation");
                runtime.spawn(async move {
                    if let Err(e) = engine.invoke_raw(&request).await {
                        error!(command = %request.command, error = %e, "Release command failed");
                    }
                });
            }
            Err(_) => {
                error!(command = %request.command, "No runtime to run release command");
            }
        }
    }
}
