//! Memo normalization.
//!
//! Senders are inconsistent about memo encoding: most wallets hex-encode
//! `MemoData`, some put plain text there. Decoding therefore never fails.

use rand::Rng;

pub const CORRELATION_TOKEN_PREFIX: &str = "offer";

/// Decode a wire memo into text.
///
/// Valid hex is decoded to bytes and read as UTF-8 with replacement
/// characters for invalid sequences; anything else is returned unchanged.
/// Whitespace may separate byte pairs (`"54 45 4D 50"`) but not split one.
pub fn decode_memo(raw: &str) -> String {
    let groups: Vec<&str> = raw.split_ascii_whitespace().collect();
    if groups.is_empty() {
        return String::new();
    }
    if groups.iter().any(|g| g.len() % 2 != 0) {
        return raw.to_string();
    }
    match hex::decode(groups.concat()) {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(_) => raw.to_string(),
    }
}

/// Hex-encode a plain memo the way wallets put it on the wire.
pub fn encode_memo(text: &str) -> String {
    hex::encode_upper(text.as_bytes())
}

/// Fresh correlation token in the `offerNNNNNN` form handed to donors.
pub fn generate_correlation_token<R: Rng + ?Sized>(rng: &mut R) -> String {
    format!(
        "{CORRELATION_TOKEN_PREFIX}{}",
        rng.gen_range(100_000u32..=999_999)
    )
}
