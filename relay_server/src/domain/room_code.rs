use rand::Rng;

/// Code alphabet omits glyphs that read ambiguously over voice chat or a
/// screenshot (no 0/O, no 1/I).
pub const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
pub const CODE_LEN: usize = 6;

/// Samples one candidate code. Uniqueness against live rooms is the
/// registry's job; it retries until the candidate is unused.
pub fn generate_room_code() -> String {
    let mut rng = rand::thread_rng();
    (0..CODE_LEN)
        .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

/// Codes are case-insensitive on lookup.
pub fn normalize_code(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}
