use async_trait::async_trait;
use k8s_openapi::{api::core::v1::Pod, apimachinery::pkg::apis::meta::v1::Status};
use kube::{api::AttachParams, Api, Client};
use log::warn;
use router_charm_core::{
    helpers::AndIf,
    workload::{layer::Layer, Container, ExecOutput, WorkloadError},
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

pub const PEBBLE_BINARY: &str = "/charm/bin/pebble";
pub const PEBBLE_DIRECTORY: &str = "/charm/container";
pub const UNKNOWN_EXIT_CODE: i32 = -1;

/// A container of the unit's own pod, driven through the `exec` subresource.
pub struct KubeContainer {
    pods: Api<Pod>,
    pod_name: String,
    container_name: String,
}

impl KubeContainer {
    pub fn new(
        client: Client,
        namespace: &str,
        pod_name: impl Into<String>,
        container_name: impl Into<String>,
    ) -> Self {
        Self {
            pods: Api::namespaced(client, namespace),
            pod_name: pod_name.into(),
            container_name: container_name.into(),
        }
    }

    async fn attach(
        &self,
        command: &[String],
        input: Option<&[u8]>,
    ) -> Result<ExecOutput, WorkloadError> {
        let attach_params = AttachParams {
            container: Some(self.container_name.to_owned()),
            stdin: input.is_some(),
            stdout: true,
            stderr: true,
            ..Default::default()
        };

        let mut process = self
            .pods
            .exec(&self.pod_name, command.to_vec(), &attach_params)
            .await
            .map_err(|err| WorkloadError::Exec(err.to_string().into()))?;

        if let Some(input) = input {
            let mut stdin = process.stdin().ok_or(WorkloadError::Exec(
                "Couldn't retrieve the remote process standard input!".into(),
            ))?;
            stdin.write_all(input).await.map_err(io_error)?;
            stdin.shutdown().await.map_err(io_error)?;
        }

        let status = process.take_status().ok_or(WorkloadError::Exec(
            "Couldn't retrieve the remote process status!".into(),
        ))?;
        let mut stdout_stream = process.stdout().ok_or(WorkloadError::Exec(
            "Couldn't retrieve the remote process standard output!".into(),
        ))?;
        let mut stderr_stream = process.stderr().ok_or(WorkloadError::Exec(
            "Couldn't retrieve the remote process standard error!".into(),
        ))?;

        let mut stdout = String::new();
        let mut stderr = String::new();
        let (stdout_read, stderr_read) = futures::join!(
            stdout_stream.read_to_string(&mut stdout),
            stderr_stream.read_to_string(&mut stderr)
        );
        stdout_read.map_err(io_error)?;
        stderr_read.map_err(io_error)?;

        let status = status.await;
        process
            .join()
            .await
            .map_err(|err| WorkloadError::Exec(err.to_string().into()))?;

        Ok(ExecOutput {
            exit_code: exit_code(status.as_ref()),
            stdout,
            stderr,
        })
    }

    async fn run_checked(
        &self,
        command: Vec<String>,
        input: Option<&[u8]>,
    ) -> Result<(), WorkloadError> {
        let output = self.attach(&command, input).await?;

        match output.is_success() {
            true => Ok(()),
            false => Err(WorkloadError::CommandFailed {
                command: command.join(" "),
                exit_code: output.exit_code,
                stderr: output.stderr,
            }),
        }
    }
}

#[async_trait]
impl Container for KubeContainer {
    async fn can_connect(&self) -> bool {
        let pod = match self.pods.get(&self.pod_name).await {
            Ok(pod) => pod,
            Err(err) => {
                warn!("Couldn't get pod '{}'! {err}", self.pod_name);
                return false;
            }
        };

        pod.status
            .and_then(|status| status.container_statuses)
            .unwrap_or_default()
            .iter()
            .any(|status| status.name == self.container_name && status.ready)
    }

    async fn exec(&self, command: &[String]) -> Result<ExecOutput, WorkloadError> {
        self.attach(command, None).await
    }

    async fn add_layer(
        &self,
        label: &str,
        layer: &Layer,
        combine: bool,
    ) -> Result<(), WorkloadError> {
        let rendered = layer.to_yaml().map_err(WorkloadError::Layer)?;
        let path = layer_path(label);

        self.run_checked(
            vec!["/bin/sh".to_owned(), "-c".to_owned(), format!("cat > {path}")],
            Some(rendered.as_bytes()),
        )
        .await?;

        let mut args = vec!["add"].and_if(combine, |mut args| {
            args.push("--combine");
            args
        });
        args.extend([label, path.as_str()]);

        self.run_checked(pebble_command(&args), None).await
    }

    async fn replan(&self) -> Result<(), WorkloadError> {
        self.run_checked(pebble_command(&["replan"]), None).await
    }
}

fn io_error(err: std::io::Error) -> WorkloadError {
    WorkloadError::Exec(err.to_string().into())
}

pub fn layer_path(label: &str) -> String {
    format!("/tmp/{label}-layer.yaml")
}

/// Pebble invocation against the workload's own supervisor.
pub fn pebble_command(args: &[&str]) -> Vec<String> {
    let mut command = vec![
        "env".to_owned(),
        format!("PEBBLE={PEBBLE_DIRECTORY}"),
        PEBBLE_BINARY.to_owned(),
    ];
    command.extend(args.iter().map(|arg| arg.to_string()));

    command
}

/// The API server closes an exec session with a Status object. A clean exit
/// is `Success`, a non-zero one is `Failure` with an `ExitCode` cause.
pub fn exit_code(status: Option<&Status>) -> i32 {
    let status = match status {
        Some(status) => status,
        None => return UNKNOWN_EXIT_CODE,
    };

    if status.status.as_deref() == Some("Success") {
        return 0;
    }

    status
        .details
        .as_ref()
        .and_then(|details| details.causes.as_ref())
        .and_then(|causes| {
            causes
                .iter()
                .find(|cause| cause.reason.as_deref() == Some("ExitCode"))
        })
        .and_then(|cause| cause.message.as_ref())
        .and_then(|message| message.parse().ok())
        .unwrap_or(UNKNOWN_EXIT_CODE)
}
