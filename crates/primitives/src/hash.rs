//! Common wrapper around whatever we choose our native hash function to be.

use bitcoin::hashes::Hash;
use borsh::BorshSerialize;
use digest::Digest;
use sha2::{Sha256, Sha512};

use crate::buf::{Buf20, Buf32, Buf64};

/// Direct untagged hash.
pub fn raw(buf: &[u8]) -> Buf32 {
    Buf32::from(<[u8; 32]>::from(Sha256::digest(buf)))
}

/// Hashes the borsh encoding of a value.
pub fn compute_borsh_hash<T: BorshSerialize>(v: &T) -> Buf32 {
    let mut hasher = Sha256::new();
    v.serialize(&mut hasher).expect("hash: borsh serialize");
    let result = hasher.finalize();
    Buf32::from(<[u8; 32]>::from(result))
}

/// Computes a Bitcoin-style double-SHA-256.
pub fn sha256d(buf: &[u8]) -> Buf32 {
    let h = bitcoin::hashes::sha256d::Hash::hash(buf);
    h.to_byte_array().into()
}

/// Computes a Bitcoin-style hash160 (SHA-256 then RIPEMD-160).
pub fn hash160(buf: &[u8]) -> Buf20 {
    let h = bitcoin::hashes::hash160::Hash::hash(buf);
    h.to_byte_array().into()
}

/// Wide digest used for validator identities.
pub fn hash512(buf: &[u8]) -> Buf64 {
    Buf64::from(<[u8; 64]>::from(Sha512::digest(buf)))
}

/// Incremental hasher over multiple segments, avoids concatenating buffers.
pub fn raw_concat(parts: &[&[u8]]) -> Buf32 {
    let mut hasher = Sha256::new();
    for p in parts {
        hasher.update(p);
    }
    Buf32::from(<[u8; 32]>::from(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_concat_matches_raw() {
        let a = b"hello";
        let b = b"world";
        let mut joined = Vec::new();
        joined.extend_from_slice(a);
        joined.extend_from_slice(b);
        assert_eq!(raw(&joined), raw_concat(&[a, b]));
    }

    #[test]
    fn test_hash512_len() {
        let h = hash512(b"identity");
        assert_eq!(h.as_slice().len(), 64);
    }
}
