use std::hash::Hasher;

/// A deterministic FNV-1a 64-bit hasher.
///
/// Used instead of `DefaultHasher` (which is randomized per process) for
/// every hash that must agree between two engine checkouts: seed derivation
/// from string identifiers, terrain content hashes, and integrity hashes.
#[derive(Debug)]
pub struct FnvHasher {
    state: u64,
}

impl FnvHasher {
    const OFFSET_BASIS: u64 = 0xcbf29ce484222325;
    const PRIME: u64 = 0x100000001b3;

    pub fn new() -> Self {
        Self {
            state: Self::OFFSET_BASIS,
        }
    }
}

impl Default for FnvHasher {
    fn default() -> Self {
        Self::new()
    }
}

impl Hasher for FnvHasher {
    fn finish(&self) -> u64 {
        self.state
    }

    fn write(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.state ^= byte as u64;
            self.state = self.state.wrapping_mul(Self::PRIME);
        }
    }
}

/// Hash a byte slice with FNV-1a 64.
pub fn fnv1a_64(bytes: &[u8]) -> u64 {
    let mut hasher = FnvHasher::new();
    hasher.write(bytes);
    hasher.finish()
}

/// Hash a string slice. Used to derive stream seeds from stable ids.
pub fn hash_str(value: &str) -> u64 {
    fnv1a_64(value.as_bytes())
}

/// Order-sensitive hash composition over heterogeneous fields.
///
/// Integers are folded as little-endian bytes so the result is identical
/// across platforms.
#[derive(Debug, Default)]
pub struct HashChain {
    hasher: FnvHasher,
}

impl HashChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_u64(&mut self, value: u64) -> &mut Self {
        self.hasher.write(&value.to_le_bytes());
        self
    }

    pub fn push_u32(&mut self, value: u32) -> &mut Self {
        self.hasher.write(&value.to_le_bytes());
        self
    }

    pub fn push_str(&mut self, value: &str) -> &mut Self {
        // Length prefix keeps "ab"+"c" distinct from "a"+"bc".
        self.push_u64(value.len() as u64);
        self.hasher.write(value.as_bytes());
        self
    }

    pub fn finish(&self) -> u64 {
        self.hasher.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fnv_matches_known_vector() {
        // FNV-1a 64 of "a" per the reference constants.
        assert_eq!(fnv1a_64(b"a"), 0xaf63dc4c8601ec8c);
        assert_eq!(fnv1a_64(b""), 0xcbf29ce484222325);
    }

    #[test]
    fn hash_str_is_stable_across_calls() {
        assert_eq!(hash_str("game-42"), hash_str("game-42"));
        assert_ne!(hash_str("game-42"), hash_str("game-43"));
    }

    #[test]
    fn chain_is_order_sensitive() {
        let mut forward = HashChain::new();
        forward.push_u64(1).push_u64(2);
        let mut reversed = HashChain::new();
        reversed.push_u64(2).push_u64(1);
        assert_ne!(forward.finish(), reversed.finish());
    }

    #[test]
    fn chain_length_prefix_disambiguates_strings() {
        let mut left = HashChain::new();
        left.push_str("ab").push_str("c");
        let mut right = HashChain::new();
        right.push_str("a").push_str("bc");
        assert_ne!(left.finish(), right.finish());
    }
}
