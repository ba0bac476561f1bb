use async_trait::async_trait;
use log::debug;
use router_charm_core::{
    charm::status::{StatusError, StatusReporter, UnitStatus},
    relation::RelationData,
};
use thiserror::Error;
use tokio::process::Command;

pub const RELATION_GET: &str = "relation-get";
pub const STATUS_SET: &str = "status-set";

#[derive(Debug, Error)]
pub enum HookToolError {
    #[error("Couldn't run '{tool}'! Reason: {source}")]
    Spawn {
        tool: &'static str,
        source: std::io::Error,
    },
    #[error("'{tool}' exited with {code:?}: {stderr}")]
    Failed {
        tool: &'static str,
        code: Option<i32>,
        stderr: String,
    },
    #[error("'{tool}' output couldn't be parsed! Reason: {source}")]
    Output {
        tool: &'static str,
        source: serde_json::Error,
    },
}

async fn run_tool(tool: &'static str, args: &[&str]) -> Result<Vec<u8>, HookToolError> {
    debug!("Running hook tool '{tool} {}'", args.join(" "));

    let output = Command::new(tool)
        .args(args)
        .output()
        .await
        .map_err(|source| HookToolError::Spawn { tool, source })?;

    if !output.status.success() {
        return Err(HookToolError::Failed {
            tool,
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
        });
    }

    Ok(output.stdout)
}

/// All relation data the remote unit published on the current relation.
pub async fn relation_get(remote_unit: &str) -> Result<RelationData, HookToolError> {
    let stdout = run_tool(RELATION_GET, &["--format=json", "-", remote_unit]).await?;

    parse_relation_data(&stdout)
}

/// The tool prints `null` when the remote unit hasn't published anything yet.
pub fn parse_relation_data(raw: &[u8]) -> Result<RelationData, HookToolError> {
    serde_json::from_slice::<Option<RelationData>>(raw)
        .map(Option::unwrap_or_default)
        .map_err(|source| HookToolError::Output {
            tool: RELATION_GET,
            source,
        })
}

/// Reports the unit status through `status-set`.
pub struct JujuStatus;

#[async_trait]
impl StatusReporter for JujuStatus {
    async fn set_status(&self, status: &UnitStatus) -> Result<(), StatusError> {
        run_tool(STATUS_SET, &[status.name(), status.message()])
            .await
            .map(|_| ())
            .map_err(|err| StatusError(err.to_string()))
    }
}
