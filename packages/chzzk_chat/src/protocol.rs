//! Chat socket wire protocol: command codes, outbound envelopes and the
//! inbound dispatcher.
//!
//! Every frame is a JSON envelope `{ ver, cmd, tid?, sid?, cid, svcid, bdy }`.
//! Inbound frames are classified by `cmd`; chat-bearing commands have their
//! records decoded one by one and passed through the text-only / not-hidden
//! filter before anything downstream sees them.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::FrameError;

pub const PROTOCOL_VERSION: &str = "2";
pub const DEFAULT_SERVICE_ID: &str = "game";
pub const DEVICE_TYPE: u32 = 2001;
pub const TEXT_MESSAGE_TYPE: i64 = 1;
pub const HIDDEN_STATUS: &str = "HIDDEN";

const CONNECT_TID: u32 = 1;
const RECENT_CHAT_TID: u32 = 2;

/// The closed set of commands this client understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChatCmd {
    Ping,
    Pong,
    Connect,
    Connected,
    RequestRecentChat,
    RecentChat,
    Chat,
}

impl ChatCmd {
    pub const fn code(self) -> i64 {
        match self {
            Self::Ping => 0,
            Self::Pong => 10000,
            Self::Connect => 100,
            Self::Connected => 10100,
            Self::RequestRecentChat => 5101,
            Self::RecentChat => 15101,
            Self::Chat => 93101,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::Ping),
            10000 => Some(Self::Pong),
            100 => Some(Self::Connect),
            10100 => Some(Self::Connected),
            5101 => Some(Self::RequestRecentChat),
            15101 => Some(Self::RecentChat),
            93101 => Some(Self::Chat),
            _ => None,
        }
    }
}

// =============================================================================
// Outbound
// =============================================================================

/// A frame sent from this client to the chat server.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutboundFrame {
    pub ver: &'static str,
    pub cmd: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tid: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub svcid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bdy: Option<OutboundBody>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum OutboundBody {
    Connect(ConnectBody),
    RecentChat(RecentChatRequest),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectBody {
    pub acc_tkn: String,
    pub auth: &'static str,
    pub dev_type: u32,
    /// Always null: the overlay connects read-only and anonymous.
    pub uid: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentChatRequest {
    pub recent_message_count: usize,
}

impl OutboundFrame {
    fn bare(cmd: ChatCmd) -> Self {
        Self {
            ver: PROTOCOL_VERSION,
            cmd: cmd.code(),
            tid: None,
            sid: None,
            cid: None,
            svcid: None,
            bdy: None,
        }
    }

    pub fn ping() -> Self {
        Self::bare(ChatCmd::Ping)
    }

    pub fn pong() -> Self {
        Self::bare(ChatCmd::Pong)
    }

    /// Handshake sent as soon as the transport opens.
    pub fn connect(channel_id: &str, service_id: &str, access_token: &str) -> Self {
        Self {
            tid: Some(CONNECT_TID),
            cid: Some(channel_id.to_string()),
            svcid: Some(service_id.to_string()),
            bdy: Some(OutboundBody::Connect(ConnectBody {
                acc_tkn: access_token.to_string(),
                auth: "READ",
                dev_type: DEVICE_TYPE,
                uid: None,
            })),
            ..Self::bare(ChatCmd::Connect)
        }
    }

    /// Backlog request, tagged with the session id from `CONNECTED`.
    pub fn request_recent_chat(
        channel_id: &str,
        service_id: &str,
        sid: &str,
        count: usize,
    ) -> Self {
        Self {
            tid: Some(RECENT_CHAT_TID),
            sid: Some(sid.to_string()),
            cid: Some(channel_id.to_string()),
            svcid: Some(service_id.to_string()),
            bdy: Some(OutboundBody::RecentChat(RecentChatRequest {
                recent_message_count: count,
            })),
            ..Self::bare(ChatCmd::RequestRecentChat)
        }
    }

    pub fn command(&self) -> Option<ChatCmd> {
        ChatCmd::from_code(self.cmd)
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

// =============================================================================
// Inbound records
// =============================================================================

/// A raw chat record as it appears on the wire.
///
/// Live `CHAT` pushes and the `RECENT_CHAT` backlog name their fields
/// differently, and a single record may mix both schemes. Every field is
/// resolved on its own, preferring the live name when it is present and
/// non-empty.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WireChatRecord {
    pub msg_type_code: Option<i64>,
    pub message_type_code: Option<i64>,
    pub msg_status_type: Option<String>,
    pub message_status_type: Option<String>,
    pub msg: Option<String>,
    pub content: Option<String>,
    pub msg_time: Option<i64>,
    pub message_time: Option<i64>,
    pub cid: Option<String>,
    pub channel_id: Option<String>,
    pub profile: Option<String>,
    pub extras: Option<String>,
}

impl WireChatRecord {
    /// Fold into a [`ChatRecord`]. `None` when neither type-code field is present.
    pub fn into_record(self) -> Option<ChatRecord> {
        let type_code = self.msg_type_code.or(self.message_type_code)?;
        Some(ChatRecord {
            type_code,
            status: non_empty(self.msg_status_type).or(self.message_status_type),
            text: non_empty(self.msg).or(self.content).unwrap_or_default(),
            time_ms: self.msg_time.or(self.message_time),
            channel_id: non_empty(self.cid).or(self.channel_id),
            profile: self.profile,
            extras: self.extras,
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.is_empty())
}

/// Canonical raw record, independent of the wire naming scheme.
///
/// `profile` and `extras` are still JSON-encoded strings at this stage.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChatRecord {
    pub type_code: i64,
    pub status: Option<String>,
    pub text: String,
    pub time_ms: Option<i64>,
    pub channel_id: Option<String>,
    pub profile: Option<String>,
    pub extras: Option<String>,
}

impl ChatRecord {
    pub fn is_text_message(&self) -> bool {
        self.type_code == TEXT_MESSAGE_TYPE
    }

    pub fn is_hidden(&self) -> bool {
        self.status.as_deref() == Some(HIDDEN_STATUS)
    }
}

/// Records that survived the filter, plus what was dropped on the way.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatBatch {
    pub records: Vec<ChatRecord>,
    pub dropped: DropCounts,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DropCounts {
    pub not_text: usize,
    pub hidden: usize,
    pub malformed: usize,
}

impl ChatBatch {
    fn from_values(items: Vec<Value>) -> Self {
        let mut batch = Self::default();
        for item in items {
            let record = match serde_json::from_value::<WireChatRecord>(item) {
                Ok(wire) => match wire.into_record() {
                    Some(record) => record,
                    None => {
                        debug!("skipping chat record without a type code");
                        batch.dropped.malformed += 1;
                        continue;
                    }
                },
                Err(e) => {
                    debug!(error = %e, "skipping undecodable chat record");
                    batch.dropped.malformed += 1;
                    continue;
                }
            };
            if !record.is_text_message() {
                batch.dropped.not_text += 1;
                continue;
            }
            if record.is_hidden() {
                batch.dropped.hidden += 1;
                continue;
            }
            batch.records.push(record);
        }
        batch
    }
}

// =============================================================================
// Dispatcher
// =============================================================================

/// A classified inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Ping,
    Pong,
    Connected { sid: String },
    /// Full backlog snapshot; replaces the visible list.
    RecentChat(ChatBatch),
    /// Incremental delta; appended through the display buffer.
    Chat(ChatBatch),
    /// A client-side command code reflected back by the server.
    Echo(ChatCmd),
    /// Unrecognized command code; ignored by callers.
    Unknown(i64),
}

#[derive(Debug, Deserialize)]
struct InboundEnvelope {
    cmd: i64,
    #[serde(default)]
    bdy: Value,
}

/// Decode one text frame and route it by command code.
pub fn dispatch(text: &str) -> Result<Command, FrameError> {
    let envelope: InboundEnvelope = serde_json::from_str(text)?;
    let cmd = envelope.cmd;

    let Some(command) = ChatCmd::from_code(cmd) else {
        return Ok(Command::Unknown(cmd));
    };

    match command {
        ChatCmd::Ping => Ok(Command::Ping),
        ChatCmd::Pong => Ok(Command::Pong),
        ChatCmd::Connected => {
            let sid = envelope
                .bdy
                .get("sid")
                .and_then(Value::as_str)
                .ok_or(FrameError::MissingField {
                    cmd,
                    field: "bdy.sid",
                })?;
            Ok(Command::Connected {
                sid: sid.to_string(),
            })
        }
        ChatCmd::RecentChat => {
            let mut bdy = envelope.bdy;
            match bdy.get_mut("messageList").map(Value::take) {
                Some(Value::Array(items)) => Ok(Command::RecentChat(ChatBatch::from_values(items))),
                Some(_) => Err(FrameError::UnexpectedBody { cmd }),
                None => Err(FrameError::MissingField {
                    cmd,
                    field: "bdy.messageList",
                }),
            }
        }
        ChatCmd::Chat => match envelope.bdy {
            Value::Array(items) => Ok(Command::Chat(ChatBatch::from_values(items))),
            _ => Err(FrameError::UnexpectedBody { cmd }),
        },
        ChatCmd::Connect | ChatCmd::RequestRecentChat => Ok(Command::Echo(command)),
    }
}
