//! Display helpers for addresses and hashes.

pub const DEFAULT_ADDRESS_DISPLAY_LEN: usize = 12;

/// Truncate an address or hash for display, e.g. `0x1234...5678`.
///
/// Returns an empty string for `None` and the input unchanged when it already
/// fits in `max_len` characters.
pub fn format_address(address: Option<&str>, max_len: usize) -> String {
    let Some(address) = address else {
        return String::new();
    };
    let chars: Vec<char> = address.chars().collect();
    if chars.len() <= max_len {
        return address.to_string();
    }

    let visible = max_len.saturating_sub(3);
    let prefix_len = visible / 2;
    let suffix_len = visible - prefix_len;

    let prefix: String = chars[..prefix_len].iter().collect();
    let suffix: String = chars[chars.len() - suffix_len..].iter().collect();
    format!("{prefix}...{suffix}")
}

/// Case-insensitive address comparison.
pub fn same_address(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b)
}
