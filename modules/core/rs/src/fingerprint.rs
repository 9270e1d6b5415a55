//! Stable 64-bit FNV-1a hashing. Values are fed as explicit little-endian bytes, so hashes are
//! identical across platforms, runs and thread counts.

const OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const PRIME: u64 = 0x0000_0100_0000_01b3;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Fnv1a(u64);

impl Fnv1a {
    pub fn new() -> Self {
        Self(OFFSET_BASIS)
    }

    pub fn write(&mut self, bytes: &[u8]) -> &mut Self {
        for byte in bytes {
            self.0 ^= *byte as u64;
            self.0 = self.0.wrapping_mul(PRIME);
        }
        self
    }

    /// Strings are length-prefixed so that ("ab", "c") and ("a", "bc") hash differently.
    pub fn write_str(&mut self, value: &str) -> &mut Self {
        self.write_u64(value.len() as u64);
        self.write(value.as_bytes())
    }

    pub fn write_u64(&mut self, value: u64) -> &mut Self {
        self.write(&value.to_le_bytes())
    }

    pub fn finish(&self) -> u64 {
        self.0
    }
}

impl Default for Fnv1a {
    fn default() -> Self {
        Self::new()
    }
}

/// Hash of a single byte string.
pub fn fnv1a(bytes: &[u8]) -> u64 {
    Fnv1a::new().write(bytes).finish()
}

/// Map a hash to [0, 1). The hash goes through the murmur3 finalizer first, so every input bit
/// affects the high bits used for the result.
pub fn unit_interval(hash: u64) -> f64 {
    let mut x = hash;
    x ^= x >> 33;
    x = x.wrapping_mul(0xff51_afd7_ed55_8ccd);
    x ^= x >> 33;
    x = x.wrapping_mul(0xc4ce_b9fe_1a85_ec53);
    x ^= x >> 33;
    (x >> 11) as f64 / (1u64 << 53) as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fnv1a_reference_values() {
        assert_eq!(fnv1a(b""), 0xcbf29ce484222325);
        assert_eq!(fnv1a(b"a"), 0xaf63dc4c8601ec8c);
        assert_eq!(fnv1a(b"foobar"), 0x85944171f73967e8);
    }

    #[test]
    fn test_fnv1a_str_prefix() {
        let a = Fnv1a::new().write_str("ab").write_str("c").finish();
        let b = Fnv1a::new().write_str("a").write_str("bc").finish();
        assert_ne!(a, b);
    }

    #[test]
    fn test_unit_interval() {
        assert_eq!(unit_interval(0), 0.0);

        let values: Vec<f64> = (0..1000).map(|x| unit_interval(fnv1a(format!("read{x}").as_bytes()))).collect();
        assert!(values.iter().all(|x| (0.0..1.0).contains(x)));
        let below_half = values.iter().filter(|x| **x < 0.5).count();
        assert!((400..=600).contains(&below_half), "{below_half}");
    }
}
