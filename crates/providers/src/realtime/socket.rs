//! Socket transport: upgrade, handshake, and the frame listener task.

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use ironloop_core::ChatError;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderMap;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use super::protocol::{Frame, handshake_frame, split_frames};

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
pub type FrameSink = SplitSink<WsStream, Message>;
pub type FrameReceiver = mpsc::Receiver<Result<Frame, ChatError>>;

const FRAME_BUFFER: usize = 64;

/// An open, handshaken connection to the chat hub.
pub struct Socket {
    pub sink: FrameSink,
    pub frames: FrameReceiver,
    pub listener: JoinHandle<()>,
}

/// Open the socket, perform the protocol handshake, and start the listener.
///
/// The listener stops when `cancel` fires or the server closes the socket.
pub async fn connect(
    url: &str,
    headers: HeaderMap,
    cancel: &CancellationToken,
) -> Result<Socket, ChatError> {
    let mut request = url
        .into_client_request()
        .map_err(|e| ChatError::Protocol(format!("invalid socket url {url}: {e}")))?;
    request.headers_mut().extend(headers);

    let (mut ws, _response) = tokio::select! {
        _ = cancel.cancelled() => return Err(ChatError::Cancelled),
        r = tokio_tungstenite::connect_async(request) => {
            r.map_err(|e| ChatError::Network(format!("couldn't dial socket: {e}")))?
        }
    };
    debug!(url, "Socket connected");

    ws.send(Message::Text(handshake_frame().into()))
        .await
        .map_err(|e| ChatError::Network(format!("couldn't send handshake: {e}")))?;

    loop {
        let msg = tokio::select! {
            _ = cancel.cancelled() => return Err(ChatError::Cancelled),
            m = ws.next() => m,
        };
        match msg {
            Some(Ok(Message::Text(_))) | Some(Ok(Message::Binary(_))) => break,
            Some(Ok(Message::Close(_))) | None => {
                return Err(ChatError::Protocol(
                    "socket closed during handshake".into(),
                ));
            }
            Some(Err(e)) => {
                return Err(ChatError::Network(format!(
                    "couldn't read handshake acknowledgement: {e}"
                )));
            }
            Some(Ok(_)) => {}
        }
    }
    debug!("Handshake acknowledged");

    let (sink, stream) = ws.split();
    let (tx, frames) = mpsc::channel(FRAME_BUFFER);
    let listener = tokio::spawn(listen(stream, tx, cancel.clone()));

    Ok(Socket {
        sink,
        frames,
        listener,
    })
}

async fn listen(
    mut stream: SplitStream<WsStream>,
    tx: mpsc::Sender<Result<Frame, ChatError>>,
    cancel: CancellationToken,
) {
    loop {
        let msg = tokio::select! {
            _ = cancel.cancelled() => break,
            m = stream.next() => m,
        };
        let text = match msg {
            Some(Ok(Message::Text(text))) => text.to_string(),
            Some(Ok(Message::Binary(bytes))) => String::from_utf8_lossy(&bytes).into_owned(),
            Some(Ok(Message::Close(_))) | None => {
                let _ = tx.send(Err(ChatError::Closed)).await;
                break;
            }
            Some(Err(e)) => {
                warn!(error = %e, "Socket receive error");
                let _ = tx.send(Err(ChatError::Network(e.to_string()))).await;
                break;
            }
            // Ping/pong are answered by tungstenite
            Some(Ok(_)) => continue,
        };

        for raw in split_frames(&text) {
            trace!(frame = raw, "Frame received");
            if tx.send(Frame::decode(raw)).await.is_err() {
                return;
            }
        }
    }
    debug!("Socket listener stopped");
}
