//! Display helpers for renderers.

use chrono::DateTime;

use crate::{Channel, User};

/// Members named in a channel title before the rest are counted.
const NAMED_MEMBERS: usize = 2;

/// Channel title built from its members: the first two nicknames, then
/// `+ N` for the others. Falls back to the channel name for empty channels.
pub fn channel_display_name(channel: &Channel) -> String {
    if channel.members.is_empty() {
        return channel.name.clone();
    }
    let names: Vec<&str> =
        channel.members.iter().take(NAMED_MEMBERS).map(|m| m.nickname.as_str()).collect();
    let mut title = names.join(", ");
    let rest = channel.members.len().saturating_sub(NAMED_MEMBERS);
    if rest > 0 {
        title.push_str(&format!(" + {rest}"));
    }
    title
}

/// `HH:MM` (UTC) for a timestamp in milliseconds since the Unix epoch.
///
/// Out-of-range timestamps render as `--:--`.
pub fn format_timestamp(millis: i64) -> String {
    match DateTime::from_timestamp_millis(millis) {
        Some(time) => time.format("%H:%M").to_string(),
        None => "--:--".to_owned(),
    }
}

/// Placeholder for a missing profile image: the uppercased first character
/// of the nickname, or of the user ID when the nickname is blank.
pub fn profile_initial(user: &User) -> char {
    let source = if user.nickname.trim().is_empty() { &user.user_id } else { &user.nickname };
    source
        .trim()
        .chars()
        .next()
        .map_or('?', |c| c.to_uppercase().next().unwrap_or(c))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel(members: &[&str]) -> Channel {
        Channel {
            url: "c1".into(),
            name: "general".into(),
            members: members.iter().map(|n| User::new(n.to_lowercase(), *n)).collect(),
            operator_ids: vec![],
            last_message: None,
            created_at: 0,
        }
    }

    #[test]
    fn display_name_counts_extra_members() {
        assert_eq!(channel_display_name(&channel(&["Alice"])), "Alice");
        assert_eq!(channel_display_name(&channel(&["Alice", "Bob"])), "Alice, Bob");
        assert_eq!(channel_display_name(&channel(&["Alice", "Bob", "Carol", "Dan"])), "Alice, Bob + 2");
        assert_eq!(channel_display_name(&channel(&[])), "general");
    }

    #[test]
    fn timestamp_is_hours_and_minutes() {
        // 2023-11-14 22:13:20 UTC
        assert_eq!(format_timestamp(1_700_000_000_000), "22:13");
        assert_eq!(format_timestamp(0), "00:00");
        assert_eq!(format_timestamp(i64::MAX), "--:--");
    }

    #[test]
    fn initial_falls_back_to_user_id() {
        assert_eq!(profile_initial(&User::new("alice", "alice")), 'A');
        assert_eq!(profile_initial(&User::new("bob", " ")), 'B');
        assert_eq!(profile_initial(&User::new("", "")), '?');
    }
}
