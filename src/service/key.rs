//! # Blob Key Generation

use rand::Rng;

const KEY_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Length of generated keys
pub const KEY_LENGTH: usize = 28;

/// Generate a random key that is safe to use verbatim on every backend
pub fn generate_unique_key() -> String {
    let mut rng = rand::thread_rng();
    (0..KEY_LENGTH)
        .map(|_| KEY_ALPHABET[rng.gen_range(0..KEY_ALPHABET.len())] as char)
        .collect()
}
