use std::borrow::Cow;

use async_trait::async_trait;
use log::{debug, error};
use thiserror::Error;

#[cfg(test)]
use mockall::automock;

use crate::helpers::LogTarget;

use self::layer::Layer;

pub mod bootstrap;
pub mod layer;
pub mod routes;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ExecOutput {
    pub fn success() -> Self {
        Self::default()
    }

    pub fn failure(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            exit_code,
            stderr: stderr.into(),
            ..Default::default()
        }
    }

    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }
}

#[derive(Debug, Error)]
pub enum WorkloadError {
    #[error("Container '{}' is not ready!", .0)]
    ContainerUnreachable(String),
    #[error("'{command}' exited with code {exit_code}!")]
    CommandFailed {
        command: String,
        exit_code: i32,
        stderr: String,
    },
    #[error("Couldn't execute the command in the workload! Reason: {}", .0)]
    Exec(Cow<'static, str>),
    #[error("Couldn't render the service layer! Reason: {}", .0)]
    Layer(serde_yaml::Error),
}

/// The workload container as seen from the charm: a process runner and a
/// service supervisor.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Container: Send + Sync {
    /// Whether the container accepts exec and supervisor calls right now.
    async fn can_connect(&self) -> bool;

    /// Runs a single command. A non-zero exit is reported through
    /// [`ExecOutput::exit_code`], only transport failures are errors.
    async fn exec(&self, command: &[String]) -> Result<ExecOutput, WorkloadError>;

    async fn add_layer(&self, label: &str, layer: &Layer, combine: bool)
        -> Result<(), WorkloadError>;

    async fn replan(&self) -> Result<(), WorkloadError>;
}

pub fn argv(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|part| part.to_string()).collect()
}

/// Wraps a [`Container`] with the precondition checks and failure logging
/// every charm-issued command goes through.
pub struct Workload<W> {
    name: String,
    container: W,
    log: LogTarget,
}

impl<W: Container> Workload<W> {
    pub fn new(name: impl Into<String>, container: W, log: LogTarget) -> Self {
        Self {
            name: name.into(),
            container,
            log,
        }
    }

    pub fn log(&self) -> LogTarget {
        self.log
    }

    pub async fn can_connect(&self) -> bool {
        self.container.can_connect().await
    }

    /// Runs the command and treats a non-zero exit as a failure. The captured
    /// stderr is logged line by line before the error is returned.
    pub async fn run(&self, command: &[String]) -> Result<ExecOutput, WorkloadError> {
        let output = self.execute(command).await?;

        if output.is_success() {
            return Ok(output);
        }

        error!(target: self.log.as_str(), "Exited with code {}. Stderr:", output.exit_code);
        for line in output.stderr.lines() {
            error!(target: self.log.as_str(), "    {line}");
        }

        Err(WorkloadError::CommandFailed {
            command: command.join(" "),
            exit_code: output.exit_code,
            stderr: output.stderr,
        })
    }

    /// Runs a check command and reports whether it exited cleanly.
    pub async fn probe(&self, command: &[String]) -> Result<bool, WorkloadError> {
        let output = self.execute(command).await?;

        debug!(target: self.log.as_str(), "'{}' exited with code {}", command.join(" "), output.exit_code);

        Ok(output.is_success())
    }

    pub async fn apply_layer(&self, label: &str, layer: &Layer) -> Result<(), WorkloadError> {
        self.ensure_connectable().await?;
        self.container.add_layer(label, layer, true).await?;
        self.container.replan().await
    }

    async fn execute(&self, command: &[String]) -> Result<ExecOutput, WorkloadError> {
        self.ensure_connectable().await?;

        debug!(target: self.log.as_str(), "Running '{}' in '{}'", command.join(" "), self.name);

        self.container.exec(command).await
    }

    async fn ensure_connectable(&self) -> Result<(), WorkloadError> {
        match self.container.can_connect().await {
            true => Ok(()),
            false => Err(WorkloadError::ContainerUnreachable(self.name.to_owned())),
        }
    }
}
