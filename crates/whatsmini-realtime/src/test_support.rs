//! Local WebSocket server for channel tests.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::{
    net::TcpListener,
    sync::{mpsc, oneshot},
};
use tokio_tungstenite::tungstenite::{
    Message,
    handshake::server::{ErrorResponse, Request, Response},
};
use whatsmini_core::WidgetEvent;

/// Instruction for the connection currently being served.
pub enum ServerCommand {
    Text(String),
    Binary(Vec<u8>),
    Close,
}

/// Handle to a server that serves one connection at a time, in accept order.
pub struct TestServer {
    pub ws_base: String,
    /// Request URI (path + query) of every accepted handshake.
    pub uris: mpsc::UnboundedReceiver<String>,
    /// Text frames received from clients.
    pub received: mpsc::UnboundedReceiver<String>,
    pub commands: mpsc::UnboundedSender<ServerCommand>,
}

impl TestServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (uri_tx, uris) = mpsc::unbounded_channel();
        let (received_tx, received) = mpsc::unbounded_channel();
        let (commands, mut command_rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let uri_tx = uri_tx.clone();
                let callback = move |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
                    let _ = uri_tx.send(request.uri().to_string());
                    Ok(response)
                };
                let Ok(ws) = tokio_tungstenite::accept_hdr_async(stream, callback).await else {
                    continue;
                };
                let (mut write, mut read) = ws.split();

                loop {
                    tokio::select! {
                        command = command_rx.recv() => match command {
                            Some(ServerCommand::Text(text)) => {
                                let _ = write.send(Message::Text(text.into())).await;
                            }
                            Some(ServerCommand::Binary(data)) => {
                                let _ = write.send(Message::Binary(data.into())).await;
                            }
                            Some(ServerCommand::Close) | None => {
                                let _ = write.close().await;
                                break;
                            }
                        },
                        frame = read.next() => match frame {
                            Some(Ok(Message::Text(text))) => {
                                let _ = received_tx.send(text.as_str().to_string());
                            }
                            Some(Ok(Message::Close(_)) | Err(_)) | None => break,
                            Some(Ok(_)) => {}
                        },
                    }
                }
            }
        });

        Self {
            ws_base: format!("ws://127.0.0.1:{port}"),
            uris,
            received,
            commands,
        }
    }

    pub async fn next_uri(&mut self) -> String {
        within(self.uris.recv()).await.expect("server stopped")
    }

    pub async fn next_frame(&mut self) -> String {
        within(self.received.recv()).await.expect("server stopped")
    }

    pub fn send_text(&self, text: &str) {
        let _ = self.commands.send(ServerCommand::Text(text.to_string()));
    }

    pub fn send_binary(&self, data: &[u8]) {
        let _ = self.commands.send(ServerCommand::Binary(data.to_vec()));
    }

    pub fn close_current(&self) {
        let _ = self.commands.send(ServerCommand::Close);
    }
}

/// A listener that accepts TCP connections but never answers the handshake.
pub async fn silent_listener() -> (String, oneshot::Sender<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    tokio::spawn(async move {
        let mut held = Vec::new();
        tokio::select! {
            _ = stop_rx => {}
            () = async {
                while let Ok((stream, _)) = listener.accept().await {
                    held.push(stream);
                }
            } => {}
        }
    });
    (format!("ws://127.0.0.1:{port}"), stop_tx)
}

/// A `ws://` origin nothing is listening on.
pub async fn refused_base() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    format!("ws://127.0.0.1:{port}")
}

/// Wait for the next sink event, failing the test after a few seconds.
pub async fn next_event(events: &mut tokio::sync::broadcast::Receiver<WidgetEvent>) -> WidgetEvent {
    within(events.recv()).await.expect("event stream closed")
}

pub async fn within<F: std::future::Future>(future: F) -> F::Output {
    tokio::time::timeout(Duration::from_secs(5), future)
        .await
        .expect("timed out waiting in test")
}
