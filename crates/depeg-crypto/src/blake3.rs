//! Domain-separated BLAKE3 hashing.
//!
//! Every digest the oracle produces goes through a registered derivation
//! context, so a hash computed for one purpose can never be confused with a
//! hash computed for another.
//!
//! All derivation goes through [`derive_key`]: feed ids, market addresses,
//! attestation digests, and the signed-message prefix.
//!
//! Attestation preimages are built with [`encode_multi_field`] so that field
//! boundaries are unambiguous regardless of field width.

/// Registered BLAKE3 derivation contexts.
/// Using an unregistered context string is a protocol violation.
pub mod contexts {
    /// Digest of a tagged attestation preimage.
    pub const ATTESTATION_DIGEST: &str = "Depeg v1 attestation-digest";
    /// Prefix applied to a digest before it is signed.
    pub const SIGNED_MESSAGE: &str = "Depeg v1 signed-message";
    /// Feed identifier derived from a `"<SYMBOL>-USD"` string.
    pub const FEED_ID: &str = "Depeg v1 feed-id";
    /// Deterministic market address derivation.
    pub const MARKET_ADDRESS: &str = "Depeg v1 market-address";

    /// All registered context strings. Used for validation.
    pub const ALL_CONTEXTS: &[&str] = &[ATTESTATION_DIGEST, SIGNED_MESSAGE, FEED_ID, MARKET_ADDRESS];
}

/// Derive a 32-byte value using BLAKE3's built-in key derivation mode.
///
/// # Arguments
///
/// * `context` - A registered context string (must start with "Depeg v1 ")
/// * `key_material` - The input material
pub fn derive_key(context: &str, key_material: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    let mut hasher = ::blake3::Hasher::new_derive_key(context);
    hasher.update(key_material);
    let hash = hasher.finalize();
    out.copy_from_slice(hash.as_bytes());
    out
}

/// Verify that a context string is registered.
pub fn is_registered_context(context: &str) -> bool {
    contexts::ALL_CONTEXTS.contains(&context)
}

/// Encode multiple dynamic fields using length-prefixed encoding.
///
/// `LE32(len(field1)) || field1 || LE32(len(field2)) || field2 || ...`
pub fn encode_multi_field(fields: &[&[u8]]) -> Vec<u8> {
    let total_len: usize = fields.iter().map(|f| 4 + f.len()).sum();
    let mut output = Vec::with_capacity(total_len);
    for field in fields {
        output.extend_from_slice(&(field.len() as u32).to_le_bytes());
        output.extend_from_slice(field);
    }
    output
}

/// Digest of a tagged, length-prefixed field tuple.
///
/// The tag is encoded as the first field, so two tuples with identical
/// numeric fields under different tags never share a digest.
pub fn tagged_digest(tag: &str, fields: &[&[u8]]) -> [u8; 32] {
    let mut all: Vec<&[u8]> = Vec::with_capacity(fields.len() + 1);
    all.push(tag.as_bytes());
    all.extend_from_slice(fields);
    derive_key(contexts::ATTESTATION_DIGEST, &encode_multi_field(&all))
}

/// Apply the signed-message prefix to a digest.
///
/// Keys never sign a raw digest; both signer and verifier go through this.
pub fn signed_message(digest: &[u8; 32]) -> [u8; 32] {
    derive_key(contexts::SIGNED_MESSAGE, digest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_context_strings_registered() {
        for ctx in contexts::ALL_CONTEXTS {
            assert!(
                ctx.starts_with("Depeg v1 "),
                "Context string '{ctx}' has wrong prefix"
            );
        }
    }

    #[test]
    fn test_derive_key_different_contexts() {
        let key1 = derive_key(contexts::FEED_ID, b"USDC-USD");
        let key2 = derive_key(contexts::MARKET_ADDRESS, b"USDC-USD");
        assert_ne!(key1, key2);
        assert_eq!(key1, derive_key(contexts::FEED_ID, b"USDC-USD"));
    }

    #[test]
    fn test_multi_field_encoding() {
        let encoded = encode_multi_field(&[b"hello", b"world"]);
        assert_eq!(encoded.len(), 4 + 5 + 4 + 5);
        assert_eq!(&encoded[0..4], &5u32.to_le_bytes());
        assert_eq!(&encoded[4..9], b"hello");
        assert_eq!(&encoded[9..13], &5u32.to_le_bytes());
        assert_eq!(&encoded[13..18], b"world");
    }

    #[test]
    fn test_multi_field_boundaries_unambiguous() {
        // "ab" + "c" must not collide with "a" + "bc"
        let a = encode_multi_field(&[b"ab", b"c"]);
        let b = encode_multi_field(&[b"a", b"bc"]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_tagged_digest_separates_tags() {
        let fields: [&[u8]; 2] = [&7u64.to_be_bytes(), &9u64.to_be_bytes()];
        let a = tagged_digest("FDC:INDEX_V1", &fields);
        let b = tagged_digest("FDC:TRIGGER_V1", &fields);
        assert_ne!(a, b);
        assert_eq!(a, tagged_digest("FDC:INDEX_V1", &fields));
    }

    #[test]
    fn test_signed_message_differs_from_digest() {
        let digest = tagged_digest("FDC:PROB_V1", &[&b"payload"[..]]);
        assert_ne!(signed_message(&digest), digest);
    }

    #[test]
    fn test_is_registered_context() {
        assert!(is_registered_context("Depeg v1 feed-id"));
        assert!(!is_registered_context("Depeg v1 made-up-context"));
    }
}
