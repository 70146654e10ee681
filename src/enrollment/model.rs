use rand::rngs::OsRng;
use rand::{RngCore, TryRngCore};
use sha2::{Digest, Sha256};

/// One-shot pairing codes live for 15 minutes (spec §4.10, "short TTL").
pub const PAIRING_CODE_TTL_MINUTES: i64 = 15;
const PAIRING_CODE_LENGTH: usize = 12;

/// Generates a one-shot pairing code for an operator to hand to a
/// newly-deployed SNA out of band: a CSPRNG-filled buffer hashed through
/// SHA-256 and hex-encoded, truncated to a length an operator can
/// reasonably type, the same OsRng+Sha256 pattern used for credential
/// material elsewhere in the pack.
pub fn generate_pairing_code() -> String {
    let mut rng = OsRng;
    let mut entropy = [0u8; 32];
    rng.try_fill_bytes(&mut entropy);

    let mut hasher = Sha256::new();
    hasher.update(entropy);
    hex::encode(hasher.finalize())[..PAIRING_CODE_LENGTH].to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pairing_code_has_expected_length() {
        assert_eq!(generate_pairing_code().len(), PAIRING_CODE_LENGTH);
    }

    #[test]
    fn pairing_codes_are_not_trivially_repeated() {
        let a = generate_pairing_code();
        let b = generate_pairing_code();
        assert_ne!(a, b);
    }
}
