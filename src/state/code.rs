//! Lobby code generation.
//!
//! Codes are four characters drawn from an alphabet without look-alike
//! symbols, so they can be read aloud or typed from a screen share.

use std::collections::HashSet;

use rand::Rng;

/// Symbols used in lobby codes (no 0/O, 1/I/L, 2/Z, 5/S, B, U/V).
pub const CODE_ALPHABET: &[u8; 24] = b"ACDEFGHJKMNPQRTWXY346789";

/// Characters per code.
pub const CODE_LENGTH: usize = 4;

/// Number of distinct codes (24^4).
pub const CODE_SPACE: usize = 331_776;

/// Generate a code absent from `existing`.
///
/// Retries until a free code is drawn. Returns `None` only when every code
/// is taken; at expected lobby counts a collision is negligible, so there
/// is no retry cap beyond that capacity check.
pub fn generate<R: Rng + ?Sized>(existing: &HashSet<String>, rng: &mut R) -> Option<String> {
    generate_with(existing.len(), |code| existing.contains(code), rng)
}

/// Predicate form of [`generate`], used by the directory to avoid copying
/// its key set. `live` is the number of codes currently taken.
pub fn generate_with<R, F>(live: usize, is_taken: F, rng: &mut R) -> Option<String>
where
    R: Rng + ?Sized,
    F: Fn(&str) -> bool,
{
    if live >= CODE_SPACE {
        return None;
    }

    loop {
        let code = draw(rng);
        if !is_taken(&code) {
            return Some(code);
        }
    }
}

/// Normalize client input for lookup.
pub fn normalize(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

fn draw<R: Rng + ?Sized>(rng: &mut R) -> String {
    (0..CODE_LENGTH)
        .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}
