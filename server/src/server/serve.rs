//! HTTP server setup

use std::future::Future;
use std::sync::Arc;

use axum::{
    routing::{delete, get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::app::options::ServerOptions;
use crate::errors::Error;
use crate::server::handlers::{
    add_custom_domain_handler, compose_deploy_handler, compose_lifecycle_handler,
    compose_rebuild_handler, create_project_handler, delete_project_handler,
    delete_service_handler, deploy_git_handler, deploy_image_handler, deploy_template_handler,
    expose_handler,
    get_setting_handler, health_handler, list_projects_handler, project_logs_handler,
    rebuild_service_handler, service_action_handler, service_logs_handler,
    set_setting_handler, trigger_validation_handler, tunnel_setup_handler,
    unexpose_handler, validation_schedule_handler, version_handler,
};
use crate::server::state::ServerState;

/// Start the HTTP server
pub async fn serve(
    options: &ServerOptions,
    state: Arc<ServerState>,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<JoinHandle<Result<(), Error>>, Error> {
    let app = Router::new()
        // Health and version
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        // Projects
        .route("/projects", get(list_projects_handler).post(create_project_handler))
        .route("/projects/{id}", delete(delete_project_handler))
        .route("/projects/{id}/logs", get(project_logs_handler))
        // Single-service deploys
        .route("/projects/{id}/services/image", post(deploy_image_handler))
        .route("/projects/{id}/services/git", post(deploy_git_handler))
        .route("/services/{id}/rebuild", post(rebuild_service_handler))
        .route("/services/{id}/action", post(service_action_handler))
        .route("/services/{id}", delete(delete_service_handler))
        .route("/services/{id}/logs", get(service_logs_handler))
        // Compose stacks
        .route("/projects/{id}/compose/deploy", post(compose_deploy_handler))
        .route("/projects/{id}/compose/rebuild", post(compose_rebuild_handler))
        .route("/projects/{id}/compose/{verb}", post(compose_lifecycle_handler))
        // Template deploys
        .route("/templates/deploy", post(deploy_template_handler))
        // Ingress
        .route("/expose", post(expose_handler))
        .route("/expose/{id}", delete(unexpose_handler))
        .route("/domains/custom", post(add_custom_domain_handler))
        .route("/validation/run", post(trigger_validation_handler))
        .route("/validation/schedule", post(validation_schedule_handler))
        .route("/tunnel/setup", post(tunnel_setup_handler))
        // Settings
        .route("/settings/{key}", get(get_setting_handler).put(set_setting_handler))
        // State and middleware
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    let addr = format!("{}:{}", options.host, options.port);
    info!("Starting HTTP server on {}", addr);

    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| Error::ServerError(e.to_string()))?;

    let handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal)
            .await
            .map_err(|e| Error::ServerError(e.to_string()))
    });

    Ok(handle)
}
