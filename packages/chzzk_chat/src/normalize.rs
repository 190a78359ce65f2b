//! Raw record → [`Chat`].
//!
//! `profile` and `extras` arrive as JSON-encoded strings inside the record and
//! are decoded here. A failure fails only the one record.

use std::collections::BTreeMap;

use chrono::DateTime;
use serde::Deserialize;
use uuid::Uuid;

use crate::chat::{Badge, Chat, NICKNAME_PALETTE, NicknameColor};
use crate::error::NormalizeError;
use crate::protocol::ChatRecord;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Profile {
    #[serde(default)]
    nickname: Option<String>,
    #[serde(default)]
    user_id_hash: Option<String>,
    #[serde(default)]
    badge: Option<ImageRef>,
    #[serde(default)]
    title: Option<Title>,
    #[serde(default)]
    streaming_property: Option<StreamingProperty>,
    #[serde(default)]
    activity_badges: Option<Vec<ActivityBadge>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImageRef {
    #[serde(default)]
    image_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Title {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    color: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StreamingProperty {
    #[serde(default)]
    real_time_donation_ranking: Option<DonationRanking>,
}

#[derive(Debug, Deserialize)]
struct DonationRanking {
    #[serde(default)]
    badge: Option<ImageRef>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ActivityBadge {
    #[serde(default)]
    activated: bool,
    #[serde(default)]
    image_url: Option<String>,
    #[serde(default)]
    title: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Extras {
    #[serde(default)]
    emojis: Option<BTreeMap<String, String>>,
}

/// Normalize one filtered record.
///
/// `channel_id` is the session's chat channel; it is used for the palette
/// color when the record itself does not name its channel.
pub fn normalize(record: &ChatRecord, channel_id: &str) -> Result<Chat, NormalizeError> {
    let profile_json = record
        .profile
        .as_deref()
        .ok_or(NormalizeError::MissingProfile)?;
    let profile: Option<Profile> = decode_embedded("profile", profile_json)?;
    let profile = profile.ok_or(NormalizeError::MissingProfile)?;

    let extras: Extras = match record.extras.as_deref() {
        Some(raw) => decode_embedded::<Option<Extras>>("extras", raw)?.unwrap_or_default(),
        None => Extras::default(),
    };

    let nickname = profile
        .nickname
        .clone()
        .filter(|n| !n.is_empty())
        .ok_or(NormalizeError::MissingNickname)?;

    let color = match profile.title.as_ref().and_then(|t| t.color.clone()) {
        Some(explicit) => NicknameColor::Explicit(explicit),
        None => NicknameColor::Palette(palette_index(
            profile.user_id_hash.as_deref().unwrap_or_default(),
            record.channel_id.as_deref().unwrap_or(channel_id),
        )),
    };

    Ok(Chat {
        id: Uuid::new_v4(),
        nickname,
        badges: collect_badges(&profile),
        color,
        emojis: extras.emojis.unwrap_or_default(),
        message: record.text.clone(),
        received_at: record.time_ms.and_then(DateTime::from_timestamp_millis),
    })
}

fn decode_embedded<T: serde::de::DeserializeOwned>(
    field: &'static str,
    raw: &str,
) -> Result<T, NormalizeError> {
    serde_json::from_str(raw).map_err(|source| NormalizeError::EmbeddedJson { field, source })
}

fn collect_badges(profile: &Profile) -> Vec<Badge> {
    let channel = profile
        .badge
        .as_ref()
        .and_then(|b| b.image_url.clone())
        .map(|image_url| Badge {
            name: profile.title.as_ref().and_then(|t| t.name.clone()),
            image_url,
        });

    let donation = profile
        .streaming_property
        .as_ref()
        .and_then(|p| p.real_time_donation_ranking.as_ref())
        .and_then(|r| r.badge.as_ref())
        .and_then(|b| b.image_url.clone())
        .map(|image_url| Badge {
            name: None,
            image_url,
        });

    let activity = profile
        .activity_badges
        .iter()
        .flatten()
        .filter(|b| b.activated)
        .filter_map(|b| {
            b.image_url.clone().map(|image_url| Badge {
                name: b.title.clone(),
                image_url,
            })
        });

    channel.into_iter().chain(donation).chain(activity).collect()
}

/// Deterministic palette slot for a (user, channel) pair.
///
/// Sums the UTF-16 code units of `user_id_hash + channel_id` modulo the
/// palette size, so a viewer keeps one color per channel across sessions.
pub fn palette_index(user_id_hash: &str, channel_id: &str) -> usize {
    let sum: usize = user_id_hash
        .encode_utf16()
        .chain(channel_id.encode_utf16())
        .map(usize::from)
        .sum();
    sum % NICKNAME_PALETTE.len()
}
