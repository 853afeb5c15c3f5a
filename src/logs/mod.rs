//! Log retrieval from the streaming service.
//!
//! Recent logs arrive as a multipart-framed batch; live logs arrive over a
//! WebSocket subscription (feature `websocket`). Dropping either stream stops
//! the retrieval without cancelling anything server-side.

use futures::stream::Stream;
use futures::StreamExt;
use serde::Deserialize;

use crate::context::ServiceKind;
use crate::errors::{ClientError, Result};
use crate::operator::{Operator, RequestSpec};

/// One log event reported by the streaming service.
///
/// Only the commonly consumed fields are mapped; unknown fields are ignored
/// for forward compatibility.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct LogEnvelope {
    /// Event timestamp, nanoseconds since the epoch.
    pub timestamp: Option<i64>,
    /// The log line.
    pub message: Option<String>,
    /// `OUT` or `ERR`.
    pub message_type: Option<String>,
    /// Emitting component, e.g. `APP` or `RTR`.
    pub source_type: Option<String>,
    /// Instance index of the emitting component.
    pub source_instance: Option<String>,
    /// Application the event belongs to.
    pub app_id: Option<String>,
}

fn parse_envelope(bytes: &[u8]) -> Result<LogEnvelope> {
    serde_json::from_slice(bytes)
        .map_err(|e| ClientError::protocol(format!("undecodable log envelope: {}", e)))
}

/// Fetches the recent-log batch for an application.
///
/// The batch is multipart-framed by the streaming service; each part decodes
/// to one envelope, emitted in response order.
pub async fn recent_logs(
    operator: &Operator,
    app_id: &str,
) -> Result<impl Stream<Item = Result<LogEnvelope>>> {
    let parts = operator
        .execute_stream(
            ServiceKind::Doppler,
            RequestSpec::get(["apps", app_id, "recentlogs"]),
        )
        .await?;

    Ok(parts.map(|part| part.and_then(|bytes| parse_envelope(&bytes))))
}

#[cfg(feature = "websocket")]
pub use websocket::stream_logs;

#[cfg(feature = "websocket")]
mod websocket {
    use super::{parse_envelope, LogEnvelope};
    use crate::context::{ConnectionContext, ServiceKind};
    use crate::errors::{ClientError, Result};
    use crate::token::TokenProvider;

    use futures::stream::Stream;
    use futures_util::StreamExt;
    use tokio_tungstenite::connect_async;
    use tokio_tungstenite::tungstenite::client::IntoClientRequest;
    use tokio_tungstenite::tungstenite::Message;

    /// Subscribes to an application's live log stream over WebSocket.
    ///
    /// The streaming root's scheme is mapped to `wss`/`ws` and the bearer
    /// token is attached to the handshake. The stream ends when the server
    /// closes the connection; dropping it stops the subscription.
    pub async fn stream_logs(
        context: &ConnectionContext,
        token_provider: &TokenProvider,
        app_id: &str,
    ) -> Result<impl Stream<Item = Result<LogEnvelope>>> {
        let mut url = context.root(ServiceKind::Doppler).await?;
        let scheme = url.scheme().to_string();
        let mapped = match scheme.as_str() {
            "https" => url.set_scheme("wss"),
            "http" => url.set_scheme("ws"),
            _ => Ok(()),
        };
        if mapped.is_err() {
            return Err(ClientError::protocol("streaming root scheme cannot be mapped"));
        }

        url.path_segments_mut()
            .map_err(|_| ClientError::protocol("streaming root cannot carry a path"))?
            .pop_if_empty()
            .extend(["apps", app_id, "stream"]);

        let token = token_provider.token(context).await?;

        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| ClientError::protocol(format!("invalid websocket request: {}", e)))?;
        request.headers_mut().insert(
            http::header::AUTHORIZATION,
            token
                .authorization_header()
                .parse()
                .map_err(|_| ClientError::protocol("unencodable authorization header"))?,
        );

        tracing::debug!(url = %url, "opening log subscription");

        let (socket, _response) = connect_async(request).await.map_err(|e| {
            ClientError::Transport {
                message: format!("websocket handshake failed: {}", e),
                timed_out: false,
            }
        })?;

        Ok(socket.filter_map(|message| async move {
            match message {
                Ok(Message::Binary(data)) => Some(parse_envelope(&data)),
                Ok(Message::Text(text)) => Some(parse_envelope(text.as_bytes())),
                Ok(_) => None,
                Err(error) => Some(Err(ClientError::Transport {
                    message: format!("websocket error: {}", error),
                    timed_out: false,
                })),
            }
        }))
    }
}
