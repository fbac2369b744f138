//! Tunnel bootstrap
//!
//! Ensures the named tunnel exists at the provider and that a local
//! connector container is running on the shared network.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use tracing::info;

use crate::docker;
use crate::errors::Error;

use super::manager::IngressManager;
use super::{CLOUDFLARED_CONTAINER, TUNNEL_NAME};

const CONNECTOR_IMAGE: &str = "cloudflare/cloudflared:latest";

fn tunnel_secret() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    BASE64.encode(bytes)
}

impl IngressManager {
    /// Create the tunnel if missing and (re)start the connector.
    ///
    /// Idempotent: a running connector is left alone.
    pub async fn setup_tunnel(&self) -> Result<String, Error> {
        let provider = self.provider.connect().await?;

        let tunnel = match provider.find_tunnel(TUNNEL_NAME).await? {
            Some(tunnel) => tunnel,
            None => {
                info!("creating new tunnel...");
                provider.create_tunnel(TUNNEL_NAME, &tunnel_secret()).await?
            }
        };
        info!("tunnel id: {}", tunnel.id);

        let token = provider.tunnel_token(&tunnel.id).await?;

        match docker::inspect(CLOUDFLARED_CONTAINER).await? {
            Some(state) if state.running => {
                return Ok("tunnel already running".to_string());
            }
            Some(_) => {
                docker::remove(CLOUDFLARED_CONTAINER).await?;
            }
            None => {}
        }

        docker::ensure_shared_network().await?;
        info!("pulling {}...", CONNECTOR_IMAGE);
        docker::pull(CONNECTOR_IMAGE).await?;

        docker::create_and_start_with_cmd(
            CLOUDFLARED_CONTAINER,
            CONNECTOR_IMAGE,
            &["tunnel", "run", "--token", &token],
        )
        .await?;

        Ok("tunnel configured and started".to_string())
    }
}
