use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};
use url::Url;

use super::{Connector, Link, TransportError};

/// Builds the push-channel URI with the bearer token appended as a `token`
/// query parameter, after any query the base URL already carries.
pub fn build_push_uri(base: &str, token: &str) -> Result<String, TransportError> {
    let mut url = Url::parse(base)?;
    match url.scheme() {
        "ws" | "wss" => {}
        "http" => url
            .set_scheme("ws")
            .map_err(|_| TransportError::UnsupportedScheme(base.to_string()))?,
        "https" => url
            .set_scheme("wss")
            .map_err(|_| TransportError::UnsupportedScheme(base.to_string()))?,
        other => return Err(TransportError::UnsupportedScheme(other.to_string())),
    }
    url.query_pairs_mut().append_pair("token", token);
    Ok(url.to_string())
}

/// Dials the push channel over tokio-tungstenite.
#[derive(Debug, Default, Clone)]
pub struct WebSocketConnector;

impl WebSocketConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self, uri: &str) -> Result<Link, TransportError> {
        let (ws_stream, _) = connect_async(uri)
            .await
            .map_err(|err| TransportError::Connect(err.to_string()))?;

        let (tx_out, rx_out) = mpsc::unbounded_channel::<String>();
        let (tx_in, rx_in) = mpsc::unbounded_channel::<String>();
        let task = tokio::spawn(async move {
            handle_websocket(ws_stream, rx_out, tx_in).await;
        });

        Ok(Link {
            outbound: tx_out,
            inbound: rx_in,
            task: Some(task),
        })
    }
}

/// Pumps frames between the socket and the link channels until either side
/// goes away. Dropping `tx_in` is how the connection manager learns of a close.
async fn handle_websocket(
    ws_stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    mut rx_out: mpsc::UnboundedReceiver<String>,
    tx_in: mpsc::UnboundedSender<String>,
) {
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    let send_task = tokio::spawn(async move {
        while let Some(text) = rx_out.recv().await {
            if let Err(err) = ws_sender.send(Message::Text(text)).await {
                debug!(target = "courtside::transport", error = %err, "push channel send failed");
                break;
            }
        }
        let _ = ws_sender.close().await;
    });

    while let Some(msg) = ws_receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                if tx_in.send(text).is_err() {
                    break;
                }
            }
            Ok(Message::Binary(data)) => match String::from_utf8(data) {
                Ok(text) => {
                    if tx_in.send(text).is_err() {
                        break;
                    }
                }
                Err(_) => debug!(target = "courtside::transport", "ignoring non-utf8 binary frame"),
            },
            Ok(Message::Close(frame)) => {
                debug!(target = "courtside::transport", frame = ?frame, "push channel closed by server");
                break;
            }
            Err(err) => {
                warn!(target = "courtside::transport", error = %err, "push channel read error");
                break;
            }
            _ => {}
        }
    }

    send_task.abort();
    let _ = send_task.await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_appended_with_question_mark() {
        let uri = build_push_uri("wss://api.courtside.test/ws", "abc").expect("valid");
        assert_eq!(uri, "wss://api.courtside.test/ws?token=abc");
    }

    #[test]
    fn token_appended_after_existing_query() {
        let uri = build_push_uri("ws://127.0.0.1:4000/ws?client=web", "abc").expect("valid");
        assert_eq!(uri, "ws://127.0.0.1:4000/ws?client=web&token=abc");
    }

    #[test]
    fn token_is_percent_encoded() {
        let uri = build_push_uri("ws://127.0.0.1:4000/ws", "a b&c").expect("valid");
        assert_eq!(uri, "ws://127.0.0.1:4000/ws?token=a+b%26c");
    }

    #[test]
    fn http_base_is_upgraded_to_ws() {
        let uri = build_push_uri("https://api.courtside.test/ws", "t").expect("valid");
        assert!(uri.starts_with("wss://"));
    }

    #[test]
    fn unsupported_scheme_is_rejected() {
        let err = build_push_uri("ftp://api.courtside.test/ws", "t").expect_err("rejected");
        assert!(matches!(err, TransportError::UnsupportedScheme(_)));
    }
}
