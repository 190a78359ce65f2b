//! Splitting message text around `{:name:}` emoji tokens.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;

static EMOJI_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{:([a-zA-Z0-9_]+):\}").expect("emoji token pattern is valid"));

/// One piece of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment<'a> {
    Text(&'a str),
    Emoji { name: &'a str, url: &'a str },
}

/// Split `message` into literal text and resolved emoji.
///
/// A token whose name is not in `emojis` is kept as literal text (`{:name:}`),
/// so nothing ever points at a missing image. Empty literal runs between
/// adjacent tokens are omitted.
pub fn split_message<'a>(message: &'a str, emojis: &'a BTreeMap<String, String>) -> Vec<Segment<'a>> {
    let mut segments = Vec::new();
    let mut cursor = 0;

    for caps in EMOJI_TOKEN.captures_iter(message) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        if whole.start() > cursor {
            segments.push(Segment::Text(&message[cursor..whole.start()]));
        }
        match emojis.get(name.as_str()) {
            Some(url) => segments.push(Segment::Emoji {
                name: name.as_str(),
                url,
            }),
            None => segments.push(Segment::Text(whole.as_str())),
        }
        cursor = whole.end();
    }

    if cursor < message.len() || segments.is_empty() {
        segments.push(Segment::Text(&message[cursor..]));
    }
    segments
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn text_emoji_text() {
        let emojis = map(&[("wave", "url")]);
        assert_eq!(
            split_message("hi {:wave:} there", &emojis),
            vec![
                Segment::Text("hi "),
                Segment::Emoji {
                    name: "wave",
                    url: "url"
                },
                Segment::Text(" there"),
            ]
        );
    }

    #[test]
    fn no_token_is_single_literal() {
        let emojis = map(&[("wave", "url")]);
        assert_eq!(
            split_message("plain text", &emojis),
            vec![Segment::Text("plain text")]
        );
        assert_eq!(split_message("", &emojis), vec![Segment::Text("")]);
    }

    #[test]
    fn unresolved_token_stays_literal() {
        let emojis = BTreeMap::new();
        assert_eq!(
            split_message("a {:ghost:} b", &emojis),
            vec![
                Segment::Text("a "),
                Segment::Text("{:ghost:}"),
                Segment::Text(" b"),
            ]
        );
    }

    #[test]
    fn adjacent_tokens_have_no_empty_runs() {
        let emojis = map(&[("a", "u1"), ("b", "u2")]);
        assert_eq!(
            split_message("{:a:}{:b:}", &emojis),
            vec![
                Segment::Emoji { name: "a", url: "u1" },
                Segment::Emoji { name: "b", url: "u2" },
            ]
        );
    }

    #[test]
    fn malformed_tokens_are_plain_text() {
        let emojis = map(&[("x", "u")]);
        assert_eq!(
            split_message("{:x y:} {x} {::}", &emojis),
            vec![Segment::Text("{:x y:} {x} {::}")]
        );
    }
}
