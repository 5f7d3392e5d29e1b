use rand::{rng, RngCore};

/// The 62 symbols short codes are drawn from (0-9, A-Z, a-z)
pub const ALPHABET: &[u8; 62] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

/// Default number of symbols in a generated code
pub const DEFAULT_CODE_LENGTH: usize = 7;

/// Produces candidate short codes. Implementations never touch storage;
/// uniqueness is the allocator's job.
pub trait CodeGenerator: Send + Sync + 'static {
    fn generate(&self) -> String;
}

/// Random fixed-length codes backed by the thread-local CSPRNG.
///
/// Each symbol comes from one random byte reduced modulo 62. Since
/// `256 = 4 * 62 + 8`, the first 8 symbols of [`ALPHABET`] have five
/// preimages instead of four and show up 1.25x as often as the rest. That
/// bias is accepted for short links; switch to rejection sampling before
/// using these codes for anything secret.
///
/// The generator panics only if the operating system cannot seed the RNG.
#[derive(Debug, Clone)]
pub struct RandomCodeGenerator {
    length: usize,
}

impl RandomCodeGenerator {
    pub fn new(length: usize) -> Self {
        Self { length }
    }

    pub fn length(&self) -> usize {
        self.length
    }
}

impl Default for RandomCodeGenerator {
    fn default() -> Self {
        Self::new(DEFAULT_CODE_LENGTH)
    }
}

impl CodeGenerator for RandomCodeGenerator {
    fn generate(&self) -> String {
        let mut bytes = vec![0u8; self.length];
        rng().fill_bytes(&mut bytes);
        bytes.into_iter().map(symbol_for).collect()
    }
}

/// Maps one random byte onto the alphabet.
fn symbol_for(byte: u8) -> char {
    ALPHABET[byte as usize % ALPHABET.len()] as char
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn codes_have_fixed_length() {
        for length in [1, 7, 12] {
            let generator = RandomCodeGenerator::new(length);
            for _ in 0..100 {
                assert_eq!(generator.generate().len(), length);
            }
        }
    }

    #[test]
    fn codes_only_use_the_alphabet() {
        let generator = RandomCodeGenerator::default();
        for _ in 0..1_000 {
            let code = generator.generate();
            assert!(code.bytes().all(|b| ALPHABET.contains(&b)), "{}", code);
        }
    }

    #[test]
    fn alphabet_is_62_distinct_alphanumerics() {
        let unique: HashSet<_> = ALPHABET.iter().collect();
        assert_eq!(unique.len(), 62);
        assert!(ALPHABET.iter().all(u8::is_ascii_alphanumeric));
    }

    #[test]
    fn remainder_mapping_bias_is_documented() {
        let mut preimages = [0usize; 62];
        for byte in 0..=255u8 {
            let symbol = symbol_for(byte) as u8;
            let index = ALPHABET.iter().position(|&s| s == symbol).unwrap();
            preimages[index] += 1;
        }

        assert!(preimages[..8].iter().all(|&n| n == 5));
        assert!(preimages[8..].iter().all(|&n| n == 4));
    }

    #[test]
    fn default_length_codes_rarely_repeat() {
        let generator = RandomCodeGenerator::default();
        let codes: HashSet<String> = (0..10_000).map(|_| generator.generate()).collect();
        assert_eq!(codes.len(), 10_000);
    }
}
