use crate::error::AppError;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::{connect_async_with_config, MaybeTlsStream, WebSocketStream};

const MAX_MESSAGE_SIZE: usize = 16 << 20;
const MAX_FRAME_SIZE: usize = 4 << 20;

pub type FeedWsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

fn feed_ws_config() -> WebSocketConfig {
    WebSocketConfig {
        max_message_size: Some(MAX_MESSAGE_SIZE),
        max_frame_size: Some(MAX_FRAME_SIZE),
        ..Default::default()
    }
}

pub async fn connect_feed_stream(feed_url: &str) -> Result<FeedWsStream, AppError> {
    let (stream, response) =
        connect_async_with_config(feed_url, Some(feed_ws_config()), true).await?;
    tracing::debug!(
        feed_url,
        status = response.status().as_u16(),
        "websocket handshake completed"
    );
    Ok(stream)
}
