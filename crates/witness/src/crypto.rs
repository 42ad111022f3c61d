//! Schnorr signing over block digests.

use secp256k1::{Keypair, Message, Secp256k1, XOnlyPublicKey};
use tapnet_primitives::buf::{Buf32, Buf64};
use tapnet_primitives::hash;

/// Signs a 32-byte digest, deterministically.
pub fn sign_digest(keypair: &Keypair, digest: &Buf32) -> Buf64 {
    let secp = Secp256k1::new();
    let msg = Message::from_digest(*digest.as_bytes());
    let sig = secp.sign_schnorr_no_aux_rand(&msg, keypair);
    Buf64::from(*sig.as_ref())
}

/// Verifies a schnorr signature against an x-only key.
pub fn verify_signature(digest: &Buf32, signature: &Buf64, pubkey: &Buf32) -> bool {
    let secp = Secp256k1::verification_only();
    let Ok(pk) = XOnlyPublicKey::from_slice(pubkey.as_slice()) else {
        return false;
    };
    let Ok(sig) = secp256k1::schnorr::Signature::from_slice(signature.as_slice()) else {
        return false;
    };
    let msg = Message::from_digest(*digest.as_bytes());
    secp.verify_schnorr(&sig, &msg, &pk).is_ok()
}

/// x-only pubkey of a keypair as a Buf32.
pub fn pubkey_buf(keypair: &Keypair) -> Buf32 {
    Buf32::from(keypair.x_only_public_key().0.serialize())
}

/// Wide identity of a key: hash512 of its x-only serialization.
pub fn identity_of(pubkey: &Buf32) -> Buf64 {
    hash::hash512(pubkey.as_slice())
}

#[cfg(test)]
mod tests {
    use secp256k1::SecretKey;

    use super::*;

    fn keypair(seed: u8) -> Keypair {
        let secp = Secp256k1::new();
        let sk = SecretKey::from_slice(&[seed; 32]).unwrap();
        Keypair::from_secret_key(&secp, &sk)
    }

    #[test]
    fn test_sign_verify_roundtrip() {
        let kp = keypair(7);
        let digest = Buf32::from([3; 32]);
        let sig = sign_digest(&kp, &digest);
        assert!(verify_signature(&digest, &sig, &pubkey_buf(&kp)));
    }

    #[test]
    fn test_wrong_key_rejected() {
        let kp = keypair(7);
        let digest = Buf32::from([3; 32]);
        let sig = sign_digest(&kp, &digest);
        assert!(!verify_signature(&digest, &sig, &pubkey_buf(&keypair(8))));
        assert!(!verify_signature(&Buf32::from([4; 32]), &sig, &pubkey_buf(&kp)));
    }
}
