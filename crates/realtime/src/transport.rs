//! WebSocket transport to the realtime voice service.
//!
//! `Transport::open` grabs the microphone, negotiates the socket with the
//! ephemeral credential and spawns one I/O task that owns both directions:
//! captured audio goes out as `input_audio_buffer.append`, assistant audio
//! deltas are decoded straight into the playback ring (they never reach
//! the event stream), and every other recognized event is forwarded to the
//! session's event loop.

use crate::audio::{self, AudioIo, BlockResampler, REALTIME_PCM16_SAMPLE_RATE};
use crate::credential::Credential;
use crate::error::RealtimeError;
use crate::events::{ClientEvent, ServerErrorDetail, ServerEvent, SessionConfig, TurnDetection};
use futures_util::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use ringbuf::{HeapProd, traits::Producer};
use secrecy::ExposeSecret;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{client::IntoClientRequest, http::HeaderValue, protocol::Message},
};
use tracing::{debug, info, warn};

/// Default realtime endpoint, used unless the credential carries one.
pub const DEFAULT_REALTIME_URL: &str =
    "wss://api.openai.com/v1/realtime?model=gpt-4o-mini-realtime-preview";

/// How long WebSocket negotiation may take before the attempt fails.
const NEGOTIATION_TIMEOUT: Duration = Duration::from_secs(15);

/// Queued server events between the I/O task and the event loop.
const EVENT_QUEUE: usize = 64;

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsSource = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// Connection parameters for a session.
#[derive(Debug, Clone)]
pub struct TransportOptions {
    pub url: String,
    pub voice: String,
    pub instructions: Option<String>,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            url: DEFAULT_REALTIME_URL.to_string(),
            voice: "verse".to_string(),
            instructions: None,
        }
    }
}

/// Inbound side of an open transport, handed to the session's event loop.
pub struct ServerEvents {
    pub events: mpsc::Receiver<ServerEvent>,
    pub levels: watch::Receiver<f32>,
}

/// An open connection to the realtime service.
///
/// Owns the microphone, the playback sink and the I/O task; all three are
/// released by [`Transport::close`] or on drop.
pub struct Transport {
    audio: AudioIo,
    io_task: JoinHandle<()>,
    closed: bool,
}

impl Transport {
    /// Opens the microphone, negotiates the WebSocket and configures the
    /// session. The credential is only read here; it is not retained.
    pub async fn open(
        credential: &Credential,
        options: &TransportOptions,
    ) -> Result<(Transport, ServerEvents), RealtimeError> {
        // Microphone first: a denied microphone means there is nothing to
        // stream, so the socket is never dialed.
        let (audio_io, audio_streams) = tokio::task::spawn_blocking(AudioIo::open)
            .await
            .map_err(|e| RealtimeError::MediaAccess(format!("audio setup task failed: {e}")))??;

        let url = credential
            .base_url
            .as_deref()
            .unwrap_or(&options.url)
            .to_string();
        let mut request = url.as_str().into_client_request().map_err(|e| {
            RealtimeError::Transport(format!("invalid realtime url {url}: {e}"))
        })?;
        let bearer = format!("Bearer {}", credential.client_secret.expose_secret());
        request.headers_mut().insert(
            "Authorization",
            bearer.parse().map_err(|e| {
                RealtimeError::Transport(format!("credential is not a valid header value: {e}"))
            })?,
        );
        request
            .headers_mut()
            .insert("OpenAI-Beta", HeaderValue::from_static("realtime=v1"));

        let (ws, _) = tokio::time::timeout(NEGOTIATION_TIMEOUT, connect_async(request))
            .await
            .map_err(|_| RealtimeError::Transport("negotiation timed out".to_string()))?
            .map_err(|e| RealtimeError::Transport(e.to_string()))?;
        info!("realtime websocket connected");

        let (mut ws_tx, ws_rx) = ws.split();
        let update = ClientEvent::SessionUpdate {
            session: SessionConfig {
                instructions: options.instructions.clone(),
                voice: options.voice.clone(),
                modalities: vec!["audio".to_string()],
                input_audio_format: "pcm16".to_string(),
                output_audio_format: "pcm16".to_string(),
                turn_detection: TurnDetection::ServerVad {
                    threshold: 0.3,
                    prefix_padding_ms: 200,
                    silence_duration_ms: 500,
                    create_response: true,
                },
            },
        };
        let json = serde_json::to_string(&update).map_err(|e| {
            RealtimeError::Transport(format!("failed to encode session.update: {e}"))
        })?;
        ws_tx.send(Message::Text(json)).await.map_err(|e| {
            RealtimeError::Transport(format!("failed to send session.update: {e}"))
        })?;

        let mic_resampler =
            BlockResampler::new(audio_streams.capture_rate as f64, REALTIME_PCM16_SAMPLE_RATE)?;
        let out_resampler =
            BlockResampler::new(REALTIME_PCM16_SAMPLE_RATE, audio_streams.playback_rate as f64)?;

        let (event_tx, event_rx) = mpsc::channel(EVENT_QUEUE);
        let (level_tx, level_rx) = watch::channel(0.0f32);
        let io_task = tokio::spawn(run_io(IoTask {
            ws_tx,
            ws_rx,
            capture: audio_streams.capture,
            playback: audio_streams.playback,
            mic_resampler,
            out_resampler,
            events: event_tx,
            levels: level_tx,
        }));

        Ok((
            Transport {
                audio: audio_io,
                io_task,
                closed: false,
            },
            ServerEvents {
                events: event_rx,
                levels: level_rx,
            },
        ))
    }

    /// Stops the I/O task and releases the audio devices. Callable
    /// multiple times; repeat calls are no-ops.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.io_task.abort();
        self.audio.close();
        debug!("transport closed");
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.close();
    }
}

struct IoTask {
    ws_tx: WsSink,
    ws_rx: WsSource,
    capture: mpsc::Receiver<Vec<f32>>,
    playback: HeapProd<f32>,
    mic_resampler: BlockResampler,
    out_resampler: BlockResampler,
    events: mpsc::Sender<ServerEvent>,
    levels: watch::Sender<f32>,
}

async fn run_io(io: IoTask) {
    let IoTask {
        mut ws_tx,
        mut ws_rx,
        mut capture,
        mut playback,
        mut mic_resampler,
        mut out_resampler,
        events,
        levels,
    } = io;
    loop {
        tokio::select! {
            biased;
            block = capture.recv() => {
                let Some(block) = block else { break };
                let _ = levels.send(audio::level(&block));
                let resampled = match mic_resampler.process(&block) {
                    Ok(samples) => samples,
                    Err(error) => {
                        warn!("dropping capture block: {error}");
                        continue;
                    }
                };
                if resampled.is_empty() {
                    continue;
                }
                let append = ClientEvent::InputAudioBufferAppend {
                    audio: audio::encode_base64_pcm16(&resampled),
                };
                let Ok(json) = serde_json::to_string(&append) else { continue };
                if ws_tx.send(Message::Text(json)).await.is_err() {
                    warn!("websocket send failed; stopping session i/o");
                    break;
                }
            }
            frame = ws_rx.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ServerEvent>(&text) {
                            Ok(ServerEvent::ResponseAudioDelta { delta }) => {
                                let samples = audio::decode_base64_pcm16(&delta);
                                match out_resampler.process(&samples) {
                                    Ok(resampled) => {
                                        // Overflow drops samples; the device
                                        // callback drains the ring at its
                                        // own pace.
                                        playback.push_slice(&resampled);
                                    }
                                    Err(error) => {
                                        warn!("dropping assistant audio block: {error}");
                                    }
                                }
                            }
                            Ok(ServerEvent::Ignored) => {}
                            Ok(event) => {
                                if events.send(event).await.is_err() {
                                    break;
                                }
                            }
                            Err(error) => debug!("undecodable server frame: {error}"),
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        debug!("realtime websocket closed");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(error)) => {
                        // A local transport failure surfaces like a server
                        // error event: the UI resets its speaking state and
                        // is told what happened.
                        let _ = events.send(ServerEvent::Error {
                            error: ServerErrorDetail {
                                message: format!("websocket error: {error}"),
                                code: None,
                            },
                        }).await;
                        break;
                    }
                }
            }
        }
    }
}
