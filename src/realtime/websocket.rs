//! WebSocket connection helper
//!
//! `wss://` URLs go through native-tls with TLS 1.2 as the floor; plain
//! `ws://` URLs connect without TLS.

use std::time::Duration;

use tokio_tungstenite::{connect_async_tls_with_config, Connector, MaybeTlsStream, WebSocketStream};

use crate::error::{ClientError, ClientResult};

/// Stream type for every channel connection
pub type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Open a WebSocket, failing with `Timeout` if the handshake takes longer
/// than `timeout`
pub async fn connect(url: &str, timeout: Duration) -> ClientResult<WsStream> {
    let tls = native_tls::TlsConnector::builder()
        .min_protocol_version(Some(native_tls::Protocol::Tlsv12))
        .build()
        .map_err(|e| ClientError::Network(format!("TLS error: {}", e)))?;

    let handshake = connect_async_tls_with_config(url, None, false, Some(Connector::NativeTls(tls)));

    let (ws_stream, _response) = tokio::time::timeout(timeout, handshake)
        .await
        .map_err(|_| ClientError::Timeout(timeout.as_millis() as u64))?
        .map_err(ClientError::from)?;

    Ok(ws_stream)
}
