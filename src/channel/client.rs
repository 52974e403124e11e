use std::time::Duration;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use log::{debug, error, warn};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::sleep;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;

use crate::event;
use crate::event::model::{ChannelEvent, Command};
use crate::integration::Config;

use super::CommandSender;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const EVENT_BUFFER: usize = 256;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct Channel {
    frames: mpsc::UnboundedSender<WsMessage>,
    events: broadcast::Sender<ChannelEvent>,
    connected: watch::Receiver<bool>,
    cancel: CancellationToken,
}

impl Channel {
    pub async fn open(config: &Config) -> super::Result<Self> {
        let url = config.ws_url();
        debug!("connecting event channel to {url}");

        let (socket, _) = tokio::select! {
            result = connect_async(url.as_str()) => result?,
            _ = sleep(CONNECT_TIMEOUT) => return Err(super::Error::ConnectTimeout),
        };

        let (sink, stream) = socket.split();
        let (frames, frame_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        let (connected_tx, connected) = watch::channel(true);
        let cancel = CancellationToken::new();

        if let Some(token) = config.auth_token() {
            let auth = command_frame(&Command::Auth {
                token: token.to_owned(),
            })?;
            let _ = frames.send(auth);
        }

        tokio::spawn(write(sink, frame_rx, cancel.clone()));
        tokio::spawn(read(
            stream,
            frames.clone(),
            events.clone(),
            connected_tx,
            cancel.clone(),
        ));

        debug!("event channel connected");
        Ok(Self {
            frames,
            events,
            connected,
            cancel,
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChannelEvent> {
        self.events.subscribe()
    }

    pub fn connected(&self) -> watch::Receiver<bool> {
        self.connected.clone()
    }

    pub fn close(&self) {
        self.cancel.cancel();
    }
}

impl CommandSender for Channel {
    fn is_connected(&self) -> bool {
        *self.connected.borrow()
    }

    fn send(&self, command: Command) -> super::Result<()> {
        let frame = command_frame(&command)?;
        self.frames.send(frame).map_err(|_| super::Error::Closed)
    }
}

fn command_frame(command: &Command) -> super::Result<WsMessage> {
    let payload = serde_json::to_string(command)?;
    Ok(WsMessage::text(payload))
}

async fn write(
    mut sink: SplitSink<Socket, WsMessage>,
    frames: mpsc::UnboundedReceiver<WsMessage>,
    cancel: CancellationToken,
) {
    let mut frames = UnboundedReceiverStream::new(frames);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                let _ = sink.send(WsMessage::Close(None)).await;
                break;
            }

            frame = frames.next() => match frame {
                None => break,
                Some(frame) => {
                    if let Err(e) = sink.send(frame).await {
                        error!("failed to send ws frame: {e}");
                        cancel.cancel();
                        break;
                    }
                }
            }
        }
    }

    debug!("event channel writer stopped");
}

async fn read(
    mut stream: SplitStream<Socket>,
    frames: mpsc::UnboundedSender<WsMessage>,
    events: broadcast::Sender<ChannelEvent>,
    connected: watch::Sender<bool>,
    cancel: CancellationToken,
) {
    let _ = events.send(ChannelEvent::Connected);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,

            frame = stream.next() => match frame {
                None => {
                    debug!("event channel closed by server");
                    break;
                }
                Some(Err(e)) => {
                    error!("failed to read ws frame: {e}");
                    break;
                }
                Some(Ok(WsMessage::Text(content))) => handle_text_frame(content.as_str(), &events),
                Some(Ok(WsMessage::Ping(payload))) => {
                    let _ = frames.send(WsMessage::Pong(payload));
                }
                Some(Ok(WsMessage::Close(_))) => {
                    debug!("event channel received close frame");
                    break;
                }
                Some(Ok(frame)) => warn!("received non-text ws frame: {frame:?}"),
            }
        }
    }

    connected.send_replace(false);
    let _ = events.send(ChannelEvent::Disconnected);
    cancel.cancel();
    debug!("event channel reader stopped");
}

fn handle_text_frame(content: &str, events: &broadcast::Sender<ChannelEvent>) {
    match event::model::decode(content) {
        Ok(Some(message)) => {
            let _ = events.send(ChannelEvent::Message(message));
        }
        Ok(None) => {}
        Err(e) => warn!("skipping malformed frame: {e}"),
    }
}
