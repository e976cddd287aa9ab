//! Human-copyable payment reference codes.
//!
//! Codes are typed by hand into a banking app's transfer note, so the alphabet
//! leaves out glyphs that are easy to confuse (`0/O`, `1/I`).

use rand::Rng;

/// Symbols a reference code may contain.
pub const REFERENCE_ALPHABET: &[u8; 32] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Length of a reference code.
pub const REFERENCE_LENGTH: usize = 8;

/// Generate a fresh reference code.
#[must_use]
pub fn generate_reference() -> String {
    let mut rng = rand::thread_rng();
    (0..REFERENCE_LENGTH)
        .map(|_| char::from(REFERENCE_ALPHABET[rng.gen_range(0..REFERENCE_ALPHABET.len())]))
        .collect()
}

/// Returns true if `code` could have been produced by [`generate_reference`].
#[must_use]
pub fn is_valid_reference(code: &str) -> bool {
    code.len() == REFERENCE_LENGTH && code.bytes().all(|b| REFERENCE_ALPHABET.contains(&b))
}
