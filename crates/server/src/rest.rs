//! REST front end
//!
//! `GET /` returns the listing. `POST /reset|/hard|/disable|/on|/off` takes
//! a location as the plain text body, runs the command and returns the
//! refreshed listing. Failures answer 400 with the one-line error message.

use anyhow::Result;
use axum::{
    Router,
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use crate::indi::xml::decode_latin1;
use common::{CommandResult, PortCommand, UsbBridge};
use tracing::{info, warn};

pub fn router(bridge: UsbBridge) -> Router {
    Router::new()
        .route("/", get(list).post(list))
        .route("/{command}", get(not_found).post(run_command))
        .fallback(not_found)
        .with_state(bridge)
}

/// Serve until `shutdown` resolves
pub async fn serve(
    bridge: UsbBridge,
    addr: &str,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("REST server listening on {}", listener.local_addr()?);
    crate::service::notify_ready()?;

    axum::serve(listener, router(bridge))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

async fn list(State(bridge): State<UsbBridge>) -> Response {
    listing_response(bridge.list().await)
}

async fn run_command(
    State(bridge): State<UsbBridge>,
    Path(command): Path<String>,
    body: Bytes,
) -> Response {
    let Ok(command) = command.parse::<PortCommand>() else {
        return not_found().await;
    };
    let body = decode_latin1(&body);
    info!("REST {} {}", command, body.trim());
    listing_response(bridge.execute(command, body).await)
}

async fn not_found() -> Response {
    text_response(StatusCode::NOT_FOUND, "Not Found".to_string())
}

fn listing_response(result: CommandResult) -> Response {
    match result {
        Ok(lines) => text_response(StatusCode::OK, lines.join("\n")),
        Err(e) => {
            warn!("REST request failed: {}", e);
            text_response(StatusCode::BAD_REQUEST, e.to_string())
        }
    }
}

fn text_response(status: StatusCode, mut text: String) -> Response {
    if !text.is_empty() {
        text.push('\n');
    }
    (status, text).into_response()
}
