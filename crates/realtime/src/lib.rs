//! Realtime voice session client.
//!
//! Bridges a UI to a hosted realtime voice service: fetches an ephemeral
//! credential from a backend endpoint, opens one WebSocket transport with
//! microphone capture and speaker playback attached, and maps the server's
//! tagged event stream onto a small set of UI callbacks (user and
//! assistant speaking state, audio playback, microphone level, errors).
//!
//! One [`Session`] is one call. Everything it owns (the microphone, the
//! socket, the event loop) is released on [`Session::disconnect`] or drop.

pub mod audio;
pub mod credential;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod session;
pub mod transport;

pub use credential::{Credential, CredentialFetcher};
pub use dispatch::{EventDispatcher, SessionCallbacks};
pub use error::RealtimeError;
pub use events::{ClientEvent, ServerEvent};
pub use session::Session;
pub use transport::{DEFAULT_REALTIME_URL, Transport, TransportOptions};
