use rand::Rng;

/// Generate a short random lowercase hex identifier of `len` characters.
///
/// Used for backup snapshot file names, where uniqueness only has to hold
/// within a single directory.
#[must_use]
pub fn random_hex(len: usize) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| HEX[rng.gen_range(0..16)] as char)
        .collect()
}
