use rand::RngCore;

/// Mints an identifier as `len` bytes of randomness, hex-encoded.
///
/// Shared by the controller (pool ids) and the host daemon (vm ids) so both
/// sides mint in the same way without depending on each other.
pub fn random_hex(len: usize) -> String {
    let mut buf = vec![0u8; len];
    rand::thread_rng().fill_bytes(&mut buf);
    hex::encode(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_hex_has_expected_length() {
        assert_eq!(random_hex(8).len(), 16);
        assert_eq!(random_hex(4).len(), 8);
    }

    #[test]
    fn random_hex_is_actually_random() {
        let a = random_hex(8);
        let b = random_hex(8);
        assert_ne!(a, b);
    }
}
