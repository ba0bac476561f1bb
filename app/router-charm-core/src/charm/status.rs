use std::fmt::Display;

use async_trait::async_trait;
use thiserror::Error;

#[cfg(test)]
use mockall::automock;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitStatus {
    Active,
    Maintenance(String),
    Waiting(String),
    Blocked(String),
}

impl UnitStatus {
    pub fn waiting(message: impl Into<String>) -> Self {
        UnitStatus::Waiting(message.into())
    }

    pub fn maintenance(message: impl Into<String>) -> Self {
        UnitStatus::Maintenance(message.into())
    }

    pub fn blocked(message: impl Into<String>) -> Self {
        UnitStatus::Blocked(message.into())
    }

    pub fn name(&self) -> &'static str {
        match self {
            UnitStatus::Active => "active",
            UnitStatus::Maintenance(_) => "maintenance",
            UnitStatus::Waiting(_) => "waiting",
            UnitStatus::Blocked(_) => "blocked",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            UnitStatus::Active => "",
            UnitStatus::Maintenance(message)
            | UnitStatus::Waiting(message)
            | UnitStatus::Blocked(message) => message,
        }
    }
}

impl Display for UnitStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.message() {
            "" => write!(f, "{}", self.name()),
            message => write!(f, "{} ({message})", self.name()),
        }
    }
}

#[derive(Debug, Error)]
#[error("Couldn't set the unit status! Reason: {}", .0)]
pub struct StatusError(pub String);

/// Where the unit status ends up.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait StatusReporter: Send + Sync {
    async fn set_status(&self, status: &UnitStatus) -> Result<(), StatusError>;
}
