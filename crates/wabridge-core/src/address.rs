//! Phone-number normalization and network address helpers.

use crate::errors::RelayError;

/// Suffix of one-to-one chat addresses.
pub const USER_SUFFIX: &str = "@s.whatsapp.net";
/// Suffix of group chat addresses.
pub const GROUP_SUFFIX: &str = "@g.us";
/// Suffix of broadcast lists and status updates.
pub const BROADCAST_SUFFIX: &str = "@broadcast";

/// Minimum accepted digit count for a phone number.
pub const MIN_PHONE_DIGITS: usize = 10;
/// Maximum accepted digit count for a phone number.
pub const MAX_PHONE_DIGITS: usize = 15;

/// Strip everything but ASCII digits and check the length bounds.
///
/// `"+55 11 99999-8888"` normalizes to `"5511999998888"`.
pub fn normalize_phone(raw: &str) -> Result<String, RelayError> {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    if (MIN_PHONE_DIGITS..=MAX_PHONE_DIGITS).contains(&digits.len()) {
        Ok(digits)
    } else {
        Err(RelayError::InvalidAddress {
            digits: digits.len(),
        })
    }
}

/// Address of the one-to-one chat for a normalized phone number.
pub fn jid_for_phone(digits: &str) -> String {
    format!("{digits}{USER_SUFFIX}")
}

/// Whether the address names a group.
pub fn is_group_jid(jid: &str) -> bool {
    jid.ends_with(GROUP_SUFFIX)
}

/// Whether the address is a broadcast list or status feed.
pub fn is_broadcast_jid(jid: &str) -> bool {
    jid.ends_with(BROADCAST_SUFFIX)
}

/// Fallback display name: the address without its server suffix.
pub fn display_name_from_jid(jid: &str) -> String {
    jid.strip_suffix(USER_SUFFIX)
        .or_else(|| jid.strip_suffix(GROUP_SUFFIX))
        .unwrap_or(jid)
        .to_owned()
}
