//! Terminal projection of the visible chat list.

use chzzk_chat::{Chat, Segment};
use uuid::Uuid;

use crate::config::OutputFormat;

/// Turns successive visible-list snapshots into output lines.
///
/// Only chats that became visible since the previous snapshot are emitted.
/// When the list was replaced rather than extended (backlog, restart), the
/// whole list is emitted again.
pub struct Renderer {
    format: OutputFormat,
    ansi: bool,
    last_shown: Option<Uuid>,
}

impl Renderer {
    pub fn new(format: OutputFormat, ansi: bool) -> Self {
        Self {
            format,
            ansi,
            last_shown: None,
        }
    }

    pub fn update(&mut self, visible: &[Chat]) -> Result<Vec<String>, serde_json::Error> {
        let start = self
            .last_shown
            .and_then(|id| visible.iter().position(|c| c.id == id))
            .map(|i| i + 1)
            .unwrap_or(0);
        self.last_shown = visible.last().map(|c| c.id);

        visible[start..]
            .iter()
            .map(|chat| self.line(chat))
            .collect()
    }

    fn line(&self, chat: &Chat) -> Result<String, serde_json::Error> {
        match self.format {
            OutputFormat::Json => serde_json::to_string(chat),
            OutputFormat::Text => Ok(self.text_line(chat)),
        }
    }

    fn text_line(&self, chat: &Chat) -> String {
        let mut out = String::new();
        for name in chat.badges.iter().filter_map(|b| b.name.as_deref()) {
            out.push('[');
            out.push_str(name);
            out.push_str("] ");
        }

        match hex_rgb(chat.color.css()).filter(|_| self.ansi) {
            Some((r, g, b)) => {
                out.push_str(&format!("\x1b[38;2;{r};{g};{b}m{}\x1b[0m", chat.nickname));
            }
            None => out.push_str(&chat.nickname),
        }
        out.push_str(": ");

        for segment in chat.segments() {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Emoji { name, .. } => {
                    out.push(':');
                    out.push_str(name);
                    out.push(':');
                }
            }
        }
        out
    }
}

/// `#RRGGBB` → components. Anything else is left uncolored.
fn hex_rgb(color: &str) -> Option<(u8, u8, u8)> {
    let hex = color.strip_prefix('#')?;
    if hex.len() != 6 || !hex.is_ascii() {
        return None;
    }
    let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
    Some((channel(0)?, channel(2)?, channel(4)?))
}
