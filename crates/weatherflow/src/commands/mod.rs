//! Command handlers and the shared streaming lifecycle.

pub mod config_cmd;
pub mod listen;
pub mod strikes;

use std::time::Duration;

use weatherflow_api::{ConnectionState, WebsocketClient};

use crate::error::CliError;

/// Why a streaming command stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopReason {
    Interrupted,
    DurationElapsed,
    StreamEnded,
}

/// Connect, run `subscribe`, then stream until Ctrl-C, `duration`, or the
/// server drops the connection. The client is always closed before return.
async fn stream_until_stopped<F, Fut>(
    client: &WebsocketClient,
    duration: Option<u64>,
    subscribe: F,
) -> Result<(), CliError>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<(), CliError>>,
{
    let endpoint = client.config().redacted_endpoint();
    client
        .connect()
        .await
        .map_err(|source| CliError::ConnectionFailed { endpoint, source })?;

    if let Err(e) = subscribe().await {
        client.close().await;
        return Err(e);
    }

    let reason = wait_for_stop(client, duration).await;
    tracing::info!(reason = ?reason, "stopping stream");
    client.close().await;

    match reason {
        StopReason::StreamEnded => Err(CliError::StreamEnded),
        StopReason::Interrupted | StopReason::DurationElapsed => Ok(()),
    }
}

async fn wait_for_stop(client: &WebsocketClient, duration: Option<u64>) -> StopReason {
    let mut state = client.connection_state();
    let deadline = async {
        match duration {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => StopReason::Interrupted,
        () = deadline => StopReason::DurationElapsed,
        _ = state.wait_for(|s| *s == ConnectionState::Disconnected) => StopReason::StreamEnded,
    }
}
