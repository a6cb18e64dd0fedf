//! Recipient address normalization.

use crate::domain::ChatAddress;

const COUNTRY_PREFIX: &str = "55";
const CHAT_SUFFIX: &str = "@c.us";

/// Normalize a raw phone-number string into a chat address.
///
/// Strips every non-digit, swaps a leading `0` for the country prefix and
/// appends the chat domain suffix. Idempotent. No digit-count validation is
/// performed here; malformed numbers are rejected downstream by the client.
pub fn normalize(raw: &str) -> ChatAddress {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();

    let number = match digits.strip_prefix('0') {
        Some(rest) => format!("{COUNTRY_PREFIX}{rest}"),
        None => digits,
    };

    ChatAddress(format!("{number}{CHAT_SUFFIX}"))
}
