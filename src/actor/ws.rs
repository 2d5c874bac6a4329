//! WebSocket actor.
//!
//! Owns every connected browser. Reload and error messages are broadcast to
//! all clients; a client connecting while an error is showing receives it
//! right after the handshake.

use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tungstenite::WebSocket;
use tungstenite::protocol::Message;

use super::messages::WsMsg;
use crate::reload::message::HotReloadMessage;
use crate::{debug, log};

type Clients = Arc<Mutex<Vec<WebSocket<TcpStream>>>>;

pub struct WsActor {
    rx: mpsc::Receiver<WsMsg>,
    clients: Clients,
    /// Last error, replayed to clients that connect while it is showing.
    pending_error: Option<HotReloadMessage>,
}

impl WsActor {
    pub fn new(rx: mpsc::Receiver<WsMsg>) -> Self {
        Self {
            rx,
            clients: Arc::new(Mutex::new(Vec::new())),
            pending_error: None,
        }
    }

    pub async fn run(mut self) {
        let clients = Arc::clone(&self.clients);
        std::thread::spawn(move || reap_closed_clients(&clients));

        while let Some(msg) = self.rx.recv().await {
            match msg {
                WsMsg::Reload { reason } => {
                    debug!("ws"; "reload: {}", reason);
                    self.broadcast(&HotReloadMessage::reload_with_reason(reason));
                }
                WsMsg::Error { stage, error } => {
                    let message = HotReloadMessage::error(stage, error);
                    self.broadcast(&message);
                    self.pending_error = Some(message);
                }
                WsMsg::ClearError => {
                    self.pending_error = None;
                    self.broadcast(&HotReloadMessage::clear_error());
                }
                WsMsg::AddClient(stream) => self.add_client(stream),
                WsMsg::Shutdown => {
                    debug!("ws"; "shutting down");
                    for mut client in self.clients.lock().drain(..) {
                        let _ = client.close(None);
                    }
                    break;
                }
            }
        }
    }

    fn add_client(&self, stream: TcpStream) {
        // handshake blocks; reads are polled afterwards
        let mut ws = match tungstenite::accept(stream) {
            Ok(ws) => ws,
            Err(e) => {
                log!("ws"; "handshake failed: {}", e);
                return;
            }
        };
        let _ = ws.get_ref().set_nonblocking(true);

        if let Err(e) = ws.send(text(&HotReloadMessage::connected())) {
            log!("ws"; "failed to send connected message: {}", e);
            return;
        }
        if let Some(error) = &self.pending_error
            && let Err(e) = ws.send(text(error))
        {
            log!("ws"; "failed to send pending error: {}", e);
        }

        let mut clients = self.clients.lock();
        clients.push(ws);
        debug!("ws"; "client connected (total: {})", clients.len());
    }

    fn broadcast(&self, message: &HotReloadMessage) {
        let msg = text(message);
        let mut clients = self.clients.lock();
        if clients.is_empty() {
            debug!("ws"; "no clients connected");
            return;
        }

        clients.retain_mut(|client| match client.send(msg.clone()) {
            Ok(()) => true,
            Err(e) => {
                debug!("ws"; "client disconnected: {}", e);
                false
            }
        });
        debug!("ws"; "broadcast to {} clients", clients.len());
    }
}

fn text(message: &HotReloadMessage) -> Message {
    Message::Text(message.to_json().into())
}

/// Drain client input so close frames and dead sockets are noticed.
fn reap_closed_clients(clients: &Clients) {
    loop {
        std::thread::sleep(Duration::from_millis(100));
        if crate::core::is_shutdown() {
            break;
        }

        clients.lock().retain_mut(|client| match client.read() {
            Ok(Message::Close(_)) => false,
            Ok(_) => true,
            Err(tungstenite::Error::Io(ref e)) if e.kind() == std::io::ErrorKind::WouldBlock => {
                true
            }
            Err(_) => false,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    fn connect(ws_tx: &mpsc::Sender<WsMsg>) -> WebSocket<tungstenite::stream::MaybeTlsStream<TcpStream>> {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let tx = ws_tx.clone();
        let acceptor = std::thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            tx.blocking_send(WsMsg::AddClient(stream)).unwrap();
        });
        let (socket, _) = tungstenite::connect(format!("ws://{addr}")).unwrap();
        acceptor.join().unwrap();
        socket
    }

    fn next_message(
        socket: &mut WebSocket<tungstenite::stream::MaybeTlsStream<TcpStream>>,
    ) -> HotReloadMessage {
        loop {
            if let Message::Text(text) = socket.read().unwrap() {
                return HotReloadMessage::from_json(&text).unwrap();
            }
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_broadcast_and_pending_error() {
        let (ws_tx, ws_rx) = mpsc::channel(8);
        tokio::spawn(WsActor::new(ws_rx).run());

        let tx = ws_tx.clone();
        let mut first = tokio::task::spawn_blocking(move || connect(&tx)).await.unwrap();
        let first = tokio::task::spawn_blocking(move || {
            assert!(matches!(next_message(&mut first), HotReloadMessage::Connected { .. }));
            first
        })
        .await
        .unwrap();

        ws_tx
            .send(WsMsg::Error {
                stage: "sass".into(),
                error: "undefined variable".into(),
            })
            .await
            .unwrap();
        ws_tx
            .send(WsMsg::Reload {
                reason: "sass".into(),
            })
            .await
            .unwrap();

        let tx = ws_tx.clone();
        let (first, second) = tokio::task::spawn_blocking(move || {
            let mut first = first;
            assert_eq!(
                next_message(&mut first),
                HotReloadMessage::error("sass", "undefined variable")
            );
            assert_eq!(next_message(&mut first), HotReloadMessage::reload_with_reason("sass"));

            let mut second = connect(&tx);
            assert!(matches!(next_message(&mut second), HotReloadMessage::Connected { .. }));
            assert_eq!(
                next_message(&mut second),
                HotReloadMessage::error("sass", "undefined variable")
            );
            (first, second)
        })
        .await
        .unwrap();

        drop((first, second));
        ws_tx.send(WsMsg::Shutdown).await.unwrap();
    }
}
