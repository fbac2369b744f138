//! Source acquisition
//!
//! Shallow, destructive checkouts: any existing workspace is removed
//! before cloning so every build starts from a clean tree. Credentials
//! are injected into the transport url at call time and never written
//! anywhere.

use std::path::{Path, PathBuf};

use tokio::process::Command;
use tracing::{debug, info};

use crate::errors::Error;

/// Result of acquiring a source tree
#[derive(Debug)]
pub struct Checkout {
    pub path: PathBuf,
    /// Manifest text found at the configured relative path, if any
    pub compose_content: Option<String>,
    /// `.env` found next to the manifest, if any
    pub env_content: Option<String>,
}

/// Inject a token into an https github url. Other hosts pass through.
fn with_credentials(repo_url: &str, token: Option<&str>) -> String {
    match token {
        Some(token) if repo_url.contains("github.com") && repo_url.starts_with("https://") => {
            repo_url.replacen("https://", &format!("https://{}@", token), 1)
        }
        _ => repo_url.to_string(),
    }
}

/// Strip an injected credential before an error message escapes
fn scrub(text: &str, token: Option<&str>) -> String {
    match token {
        Some(token) if !token.is_empty() => text.replace(token, "***"),
        _ => text.to_string(),
    }
}

/// Acquire a shallow checkout of `branch` into `dest`.
///
/// `compose_path` is the manifest location relative to the repository
/// root; its contents and any sibling `.env` are surfaced for the
/// caller to persist.
pub async fn acquire(
    repo_url: &str,
    branch: &str,
    dest: &Path,
    compose_path: &str,
    token: Option<&str>,
) -> Result<Checkout, Error> {
    info!("Cloning {} (branch: {}) into {}", repo_url, branch, dest.display());

    // Fresh clone every time; no incremental pull.
    if dest.exists() {
        tokio::fs::remove_dir_all(dest).await?;
    }
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let auth_url = with_credentials(repo_url, token);
    let dest_str = dest.to_string_lossy();

    let output = Command::new("git")
        .args(["clone", "--branch", branch, "--depth", "1", &auth_url, &dest_str])
        .output()
        .await
        .map_err(|e| Error::SourceError(format!("failed to run git clone: {}", e)))?;

    if !output.status.success() {
        // Leave no partial checkout behind.
        let _ = tokio::fs::remove_dir_all(dest).await;
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::SourceError(format!(
            "git clone failed: {}",
            scrub(stderr.trim(), token)
        )));
    }

    debug!("Clone finished, looking for {}", compose_path);

    let manifest_path = dest.join(compose_path);
    let compose_content = tokio::fs::read_to_string(&manifest_path).await.ok();

    let env_path = manifest_path
        .parent()
        .map(|dir| dir.join(".env"))
        .unwrap_or_else(|| dest.join(".env"));
    let env_content = tokio::fs::read_to_string(&env_path).await.ok();

    Ok(Checkout {
        path: dest.to_path_buf(),
        compose_content,
        env_content,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_credentials_github_https() {
        let url = with_credentials("https://github.com/acme/app.git", Some("tok123"));
        assert_eq!(url, "https://tok123@github.com/acme/app.git");
    }

    #[test]
    fn test_with_credentials_other_host_untouched() {
        let url = with_credentials("https://gitlab.com/acme/app.git", Some("tok123"));
        assert_eq!(url, "https://gitlab.com/acme/app.git");
    }

    #[test]
    fn test_with_credentials_no_token() {
        let url = with_credentials("https://github.com/acme/app.git", None);
        assert_eq!(url, "https://github.com/acme/app.git");
    }

    #[test]
    fn test_scrub_hides_token() {
        let msg = scrub("fatal: https://tok123@github.com rejected", Some("tok123"));
        assert!(!msg.contains("tok123"));
    }
}
