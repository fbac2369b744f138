//! Container runtime wrapper
//!
//! Shells out to the `docker` and `docker compose` CLIs. Inspect
//! output crosses the process boundary as untyped JSON and is narrowed
//! explicitly; runtime failures surface verbatim in the error string.

use std::path::Path;
use std::process::Output;

use tokio::process::Command;
use tracing::debug;

use crate::errors::Error;

/// The shared network every managed container joins
pub const SHARED_NETWORK: &str = "dockhand-net";

/// Narrowed view of `docker inspect` state
#[derive(Debug, Clone, Copy)]
pub struct ContainerState {
    pub running: bool,
}

async fn docker_output(args: &[&str], cwd: Option<&Path>) -> Result<Output, Error> {
    debug!("docker {}", args.join(" "));
    let mut cmd = Command::new("docker");
    cmd.args(args);
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }
    cmd.output()
        .await
        .map_err(|e| Error::RuntimeError(format!("failed to run docker: {}", e)))
}

fn check(output: &Output, what: &str) -> Result<(), Error> {
    if output.status.success() {
        Ok(())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(Error::RuntimeError(format!(
            "{} failed: {}",
            what,
            stderr.trim()
        )))
    }
}

/// Combined stdout+stderr text of a finished command
pub fn combined_output(output: &Output) -> String {
    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr);
    if !stderr.trim().is_empty() {
        if !text.is_empty() && !text.ends_with('\n') {
            text.push('\n');
        }
        text.push_str(&stderr);
    }
    text
}

/// Pull an image
pub async fn pull(image: &str) -> Result<String, Error> {
    let output = docker_output(&["pull", image], None).await?;
    check(&output, &format!("docker pull {}", image))?;
    Ok(combined_output(&output))
}

/// Build an image from a context directory
pub async fn build(context_dir: &Path, dockerfile: &str, tag: &str) -> Result<String, Error> {
    let output = docker_output(
        &["build", "-f", dockerfile, "-t", tag, "."],
        Some(context_dir),
    )
    .await?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::BuildError(format!(
            "docker build failed: {}",
            stderr.trim()
        )));
    }
    Ok(combined_output(&output))
}

/// Create and start a container, returning its id
pub async fn create_and_start(
    name: &str,
    image: &str,
    env: &[String],
    labels: &[(String, String)],
) -> Result<String, Error> {
    let mut args: Vec<String> = vec![
        "run".into(),
        "-d".into(),
        "--name".into(),
        name.into(),
        "--restart".into(),
        "unless-stopped".into(),
        "--network".into(),
        SHARED_NETWORK.into(),
    ];
    for var in env {
        args.push("-e".into());
        args.push(var.clone());
    }
    for (key, value) in labels {
        args.push("-l".into());
        args.push(format!("{}={}", key, value));
    }
    args.push(image.into());

    let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
    let output = docker_output(&arg_refs, None).await?;
    check(&output, "docker run")?;
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Like `create_and_start` but with an explicit command, for
/// containers that are not service workloads
pub async fn create_and_start_with_cmd(
    name: &str,
    image: &str,
    cmd: &[&str],
) -> Result<String, Error> {
    let mut args = vec![
        "run",
        "-d",
        "--name",
        name,
        "--restart",
        "unless-stopped",
        "--network",
        SHARED_NETWORK,
        image,
    ];
    args.extend_from_slice(cmd);
    let output = docker_output(&args, None).await?;
    check(&output, "docker run")?;
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

pub async fn start(container: &str) -> Result<(), Error> {
    let output = docker_output(&["start", container], None).await?;
    check(&output, "docker start")
}

pub async fn stop(container: &str) -> Result<(), Error> {
    let output = docker_output(&["stop", container], None).await?;
    check(&output, "docker stop")
}

pub async fn restart(container: &str) -> Result<(), Error> {
    let output = docker_output(&["restart", container], None).await?;
    check(&output, "docker restart")
}

pub async fn remove(container: &str) -> Result<(), Error> {
    let output = docker_output(&["rm", "-f", container], None).await?;
    check(&output, "docker rm")
}

/// Inspect a container; `None` when the runtime no longer knows it
pub async fn inspect(container: &str) -> Result<Option<ContainerState>, Error> {
    let output = docker_output(&["inspect", container], None).await?;
    if !output.status.success() {
        // Inspect fails for a vanished container; that is an answer,
        // not an error.
        return Ok(None);
    }
    let doc: serde_json::Value = serde_json::from_slice(&output.stdout)
        .map_err(|e| Error::RuntimeError(format!("unreadable inspect output: {}", e)))?;
    let running = doc
        .get(0)
        .and_then(|c| c.get("State"))
        .and_then(|s| s.get("Running"))
        .and_then(|r| r.as_bool())
        .unwrap_or(false);
    Ok(Some(ContainerState { running }))
}

/// Make sure the shared network exists
pub async fn ensure_shared_network() -> Result<(), Error> {
    let output = docker_output(&["network", "inspect", SHARED_NETWORK], None).await?;
    if output.status.success() {
        return Ok(());
    }
    let output = docker_output(&["network", "create", SHARED_NETWORK], None).await?;
    check(&output, "docker network create")
}

// ── Compose ──────────────────────────────────────────────────────────

/// Compose project name for a dockhand project
pub fn compose_project_name(project_id: &str) -> String {
    format!("dockhand-{}", project_id).to_lowercase()
}

async fn compose_output(
    project_name: &str,
    extra: &[&str],
    cwd: &Path,
) -> Result<Output, Error> {
    let mut args = vec!["compose", "-p", project_name];
    args.extend_from_slice(extra);
    docker_output(&args, Some(cwd)).await
}

/// `docker compose up -d --build --remove-orphans`
pub async fn compose_up(project_name: &str, cwd: &Path) -> Result<String, Error> {
    let output = compose_output(
        project_name,
        &["up", "-d", "--build", "--remove-orphans"],
        cwd,
    )
    .await?;
    let text = combined_output(&output);
    if !output.status.success() {
        return Err(Error::BuildError(format!(
            "docker compose up exited with code {}",
            output.status.code().unwrap_or(-1)
        )));
    }
    Ok(text)
}

/// One of the compose lifecycle verbs: start, stop, restart, down
pub async fn compose_lifecycle(project_name: &str, verb: &str, cwd: &Path) -> Result<(), Error> {
    let output = compose_output(project_name, &[verb], cwd).await?;
    check(&output, &format!("docker compose {}", verb))
}

/// Container id of a compose sub-service, if it exists
pub async fn compose_container_id(
    project_name: &str,
    service: &str,
    cwd: &Path,
) -> Option<String> {
    let output = compose_output(project_name, &["ps", "-q", service], cwd)
        .await
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let id = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if id.is_empty() {
        None
    } else {
        Some(id)
    }
}
