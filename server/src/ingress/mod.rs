//! Ingress synchronization: tunnel config, DNS records, reconciliation

pub mod cloudflare;
pub mod import;
pub mod manager;
pub mod provider;
pub mod tunnel;
pub mod validate;

pub use manager::IngressManager;

/// Name of the managed tunnel at the provider
pub const TUNNEL_NAME: &str = "dockhand-tunnel";

/// Name of the local connector container
pub const CLOUDFLARED_CONTAINER: &str = "dockhand-cloudflared";

/// CNAME target host for a tunnel
pub fn tunnel_cname_target(tunnel_id: &str) -> String {
    format!("{}.cfargotunnel.com", tunnel_id)
}
