//! Local HTTP server that asks the user for permission to install the service.

use crate::consent::{DecisionSender, UserDecision};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Html,
    routing::get,
    Router,
};
use log::{info, warn};
use std::{io, net::SocketAddr, sync::Arc};
use thiserror::Error;
use tokio::{net::TcpListener, task::JoinHandle};

pub const PROMPT_PATH: &str = "/install-prompt";
pub const RESPONSE_PATH: &str = "/user-response";

const INSTALL_PROMPT_HTML: &str = r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <title>Install Byze</title>
</head>
<body style="padding:20px;font-family:Arial">
    <h2>Installation required</h2>
    <p>The Byze component must be installed to continue. Do you allow it?</p>
    <button id="agree" onclick="respond(true)">Agree and install</button>
    <button id="cancel" onclick="respond(false)">Cancel</button>
    <script>
        function respond(choice) {
            fetch('/user-response?choice=' + choice)
                .then(() => window.close());
        }
    </script>
</body>
</html>
"#;

#[derive(Debug, Error)]
pub enum PromptError {
    #[error("failed to bind confirmation server on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
}

/// Routes for the consent page and the decision callback.
pub fn prompt_router(decisions: Arc<DecisionSender>) -> Router {
    Router::new()
        .route(PROMPT_PATH, get(install_prompt))
        .route(RESPONSE_PATH, get(user_response))
        .with_state(decisions)
}

async fn install_prompt() -> Html<&'static str> {
    Html(INSTALL_PROMPT_HTML)
}

async fn user_response(
    State(decisions): State<Arc<DecisionSender>>,
    Query(params): Query<Vec<(String, String)>>,
) -> StatusCode {
    // A repeated key keeps its first value.
    let choice = params
        .iter()
        .find(|(key, _)| key == "choice")
        .map(|(_, value)| value.as_str());
    let decision = UserDecision::from_choice(choice);
    if decisions.record(decision) {
        info!("user answered the install prompt: {:?}", decision);
    } else {
        warn!("ignoring repeated install prompt answer {:?}", decision);
    }
    StatusCode::OK
}

/// A bound, not yet serving, confirmation server.
#[derive(Debug)]
pub struct ConfirmationServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    decisions: Arc<DecisionSender>,
}

impl ConfirmationServer {
    pub async fn bind(addr: SocketAddr, decisions: DecisionSender) -> Result<Self, PromptError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| PromptError::Bind { addr, source })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| PromptError::Bind { addr, source })?;
        Ok(Self {
            listener,
            local_addr,
            decisions: Arc::new(decisions),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn prompt_url(&self, host: &str) -> String {
        format!("http://{host}:{}{PROMPT_PATH}", self.local_addr.port())
    }

    /// Serves in the background. There is no shutdown; the task lives until
    /// the runtime is dropped.
    pub fn spawn(self) -> JoinHandle<()> {
        let app = prompt_router(self.decisions);
        let addr = self.local_addr;
        info!("confirmation server listening on {addr}");
        tokio::spawn(async move {
            if let Err(err) = axum::serve(self.listener, app).await {
                warn!("confirmation server on {addr} stopped: {err}");
            }
        })
    }
}
