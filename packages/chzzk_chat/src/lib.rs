//! Chzzk Chat - live chat ingestion for always-on overlays
//!
//! This crate owns the chat socket lifecycle (handshake, keepalive, reconnect),
//! classifies inbound frames, normalizes chat records into [`Chat`] values and
//! paces them into a bounded visible list. It has no HTTP client and installs
//! no tracing subscriber; resolving credentials and drawing chats are left to
//! the caller.
//!
//! # Example
//!
//! ```no_run
//! use chzzk_chat::{ChannelCredentials, ChatPipeline, PipelineConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let credentials = ChannelCredentials {
//!         chat_channel_id: "N1abcd".to_string(),
//!         access_token: "token".to_string(),
//!     };
//!     let pipeline = ChatPipeline::spawn(PipelineConfig::default(), credentials);
//!
//!     let mut visible = pipeline.visible();
//!     while visible.changed().await.is_ok() {
//!         let chats = visible.borrow_and_update().clone();
//!         for chat in chats.iter() {
//!             println!("{}: {}", chat.nickname, chat.message);
//!         }
//!     }
//! }
//! ```

pub mod chat;
pub mod config;
pub mod connection;
pub mod display;
pub mod emoji;
pub mod error;
pub mod metrics;
pub mod normalize;
pub mod pipeline;
pub mod protocol;

pub use chat::{Badge, Chat, NICKNAME_PALETTE, NicknameColor};
pub use config::{ChannelCredentials, PipelineConfig};
pub use connection::{ConnectionManager, ConnectionState, GenerationCounter, SessionEvent};
pub use display::{DisplayBuffer, TickOutcome};
pub use emoji::{Segment, split_message};
pub use error::{FrameError, NormalizeError, TransportError};
pub use metrics::{MetricsSnapshot, PipelineMetrics};
pub use normalize::normalize;
pub use pipeline::{ChatPipeline, PipelineHandle};
pub use protocol::{ChatCmd, Command, dispatch};
