use std::process::Stdio;

use async_trait::async_trait;
use relay_common::{BackendError, Deployment};
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::{parse_output, ContainerRun, ContainerRuntime};

const STDERR_LIMIT: usize = 512;

/// Runs each invocation as a one-shot `docker run --rm -i` with the payload on
/// stdin and the result read from stdout.
#[derive(Debug, Clone)]
pub struct DockerCliRuntime {
    docker_bin: String,
}

impl DockerCliRuntime {
    pub fn new(docker_bin: impl Into<String>) -> Self {
        Self {
            docker_bin: docker_bin.into(),
        }
    }
}

impl Default for DockerCliRuntime {
    fn default() -> Self {
        Self::new("docker")
    }
}

/// Container name for one execution.
pub fn container_name(execution_id: &str) -> String {
    let safe: String = execution_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '-' })
        .collect();
    format!("relay-{safe}")
}

/// `docker run` arguments for a deployment, excluding the binary itself.
pub fn run_args(name: &str, deployment: &Deployment) -> Vec<String> {
    let mut args = vec![
        "run".to_string(),
        "--rm".to_string(),
        "-i".to_string(),
        "--name".to_string(),
        name.to_string(),
    ];
    if let Some(mb) = deployment.memory_mb {
        args.push("--memory".to_string());
        args.push(format!("{mb}m"));
    }
    if let Some(cpus) = deployment.cpu_cores.filter(|c| *c > 0.0) {
        args.push("--cpus".to_string());
        args.push(format!("{cpus}"));
    }
    let mut env: Vec<_> = deployment.env.iter().collect();
    env.sort();
    for (k, v) in env {
        args.push("-e".to_string());
        args.push(format!("{k}={v}"));
    }
    args.push(deployment.image.clone());
    if let Some(cmd) = &deployment.command {
        args.extend(cmd.iter().cloned());
    }
    args
}

/// Removes the named container when dropped while still armed, so a
/// cancelled invocation does not leave the container running.
struct ContainerGuard {
    docker_bin: String,
    name: String,
    armed: bool,
}

impl ContainerGuard {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for ContainerGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let docker_bin = self.docker_bin.clone();
        let name = self.name.clone();
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                tracing::info!(%name, "removing cancelled container");
                match Command::new(&docker_bin).args(["rm", "-f", &name]).output().await {
                    Ok(out) if !out.status.success() => {
                        let stderr = String::from_utf8_lossy(&out.stderr);
                        tracing::warn!(%name, status = %out.status, stderr = %stderr.trim(), "container removal failed");
                    }
                    Ok(_) => {}
                    Err(e) => tracing::warn!(%name, error = %e, "container removal failed"),
                }
            });
        }
    }
}

#[async_trait]
impl ContainerRuntime for DockerCliRuntime {
    async fn run(
        &self,
        execution_id: &str,
        deployment: &Deployment,
        payload: &Value,
    ) -> Result<ContainerRun, BackendError> {
        if deployment.image.trim().is_empty() {
            return Err(BackendError::Misconfigured("deployment has no image".into()));
        }

        let name = container_name(execution_id);
        let mut child = Command::new(&self.docker_bin)
            .args(run_args(&name, deployment))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| BackendError::Runtime(format!("failed to spawn {}: {e}", self.docker_bin)))?;

        let mut guard = ContainerGuard {
            docker_bin: self.docker_bin.clone(),
            name: name.clone(),
            armed: true,
        };

        let body = serde_json::to_vec(payload)
            .map_err(|e| BackendError::Runtime(format!("payload encoding failed: {e}")))?;
        // stdin is fed while stdout and stderr drain, otherwise a container
        // that writes before it finishes reading blocks on a full pipe.
        let stdin = child.stdin.take();
        let feed = async move {
            if let Some(mut stdin) = stdin {
                stdin.write_all(&body).await?;
                // Closing stdin signals end of input to the container.
                stdin.shutdown().await?;
            }
            Ok::<(), std::io::Error>(())
        };
        let (fed, output) = tokio::join!(feed, child.wait_with_output());
        let output =
            output.map_err(|e| BackendError::Runtime(format!("waiting for container: {e}")))?;
        guard.disarm();

        match fed {
            // The container may exit without consuming all of its input.
            Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {
                tracing::debug!(%name, "container closed stdin early");
            }
            Err(e) => return Err(BackendError::Runtime(format!("writing payload: {e}"))),
            Ok(()) => {}
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stderr: String = stderr.trim().chars().take(STDERR_LIMIT).collect();
            tracing::warn!(%name, status = %output.status, "container exited with failure");
            return Err(BackendError::Runtime(format!(
                "container exited with {}: {stderr}",
                output.status
            )));
        }

        // The CLI runtime reports the limits it enforced on the container.
        Ok(ContainerRun {
            output: parse_output(&String::from_utf8_lossy(&output.stdout)),
            memory_mb: deployment.memory_mb,
            cpu_cores: deployment.cpu_cores,
        })
    }
}
