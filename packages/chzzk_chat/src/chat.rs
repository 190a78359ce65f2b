//! Normalized chat values and the nickname palette.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::emoji::{Segment, split_message};

/// Fixed nickname palette, indexed by [`NicknameColor::Palette`].
pub const NICKNAME_PALETTE: [&str; 50] = [
    "#ECA843", "#EEA05D", "#EA723D", "#EAA35F", "#E98158", "#E97F58", "#E76D53", "#E66D5F",
    "#E56B79", "#E16490", "#E481AE", "#E68199", "#DC5E9A", "#E16CB5", "#D25FAC", "#D263AE",
    "#D66CB4", "#D071B6", "#BA82BE", "#AF71B5", "#A96BB2", "#905FAA", "#B38BC2", "#9D78B8",
    "#8D7AB8", "#7F68AE", "#9F99C8", "#717DC6", "#5E7DCC", "#5A90C0", "#628DCC", "#7994D0",
    "#81A1CA", "#ADD2DE", "#80BDD3", "#83C5D6", "#8BC8CB", "#91CBC6", "#83C3BB", "#7DBFB2",
    "#AAD6C2", "#84C194", "#B3DBB4", "#92C896", "#94C994", "#9FCE8E", "#A6D293", "#ABD373",
    "#BFDE73", "#CCE57D",
];

/// A normalized chat message, ready for display. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chat {
    /// Locally generated; live records carry no stable id.
    pub id: Uuid,
    pub nickname: String,
    /// Channel badge, donation-ranking badge, then activated activity badges.
    pub badges: Vec<Badge>,
    pub color: NicknameColor,
    /// Emoji token name → image URL, scoped to this message.
    pub emojis: BTreeMap<String, String>,
    /// Raw text; may contain `{:name:}` emoji tokens.
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub received_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Badge {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub image_url: String,
}

/// Either a color assigned by the platform or a slot in [`NICKNAME_PALETTE`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NicknameColor {
    Explicit(String),
    Palette(usize),
}

impl NicknameColor {
    /// Resolve to a CSS color string.
    pub fn css(&self) -> &str {
        match self {
            Self::Explicit(color) => color,
            Self::Palette(index) => NICKNAME_PALETTE[index % NICKNAME_PALETTE.len()],
        }
    }
}

impl Chat {
    /// Message text split into literal and emoji segments.
    pub fn segments(&self) -> Vec<Segment<'_>> {
        split_message(&self.message, &self.emojis)
    }
}
