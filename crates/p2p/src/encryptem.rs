//! The "Encryptem" session envelope.
//!
//! Per session each side holds an ephemeral X25519 keypair and an Ed25519
//! signing pair deterministically derived from the node's long-term auth
//! key.  Sealed frames are:
//!
//! ```text
//! auth(32) ‖ signature(64) ‖ nonce(24) ‖ ciphertext
//! ```
//!
//! where `ciphertext` is XChaCha20-Poly1305 under the X25519 shared secret,
//! `signature` is Ed25519 over the ciphertext, and `auth` is an HMAC-SHA256
//! of the signature keyed by `sha256(sender_sign_pub)`, which binds the
//! authenticator to the sender identity without another key exchange.

use borsh::{BorshDeserialize, BorshSerialize};
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{Key, XChaCha20Poly1305, XNonce};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::{Digest, Sha256};
use x25519_dalek::{PublicKey as X25519Public, StaticSecret};

use crate::errors::SessionError;

type HmacSha256 = Hmac<Sha256>;

const AUTH_LEN: usize = 32;
const SIG_LEN: usize = 64;
const NONCE_LEN: usize = 24;
const ENVELOPE_OVERHEAD: usize = AUTH_LEN + SIG_LEN + NONCE_LEN;

/// Long-term node auth key; the per-session signing pair derives from it.
#[derive(Clone)]
pub struct NodeIdentity {
    auth_seed: [u8; 32],
}

impl NodeIdentity {
    pub fn new(auth_seed: [u8; 32]) -> Self {
        Self { auth_seed }
    }

    pub fn generate() -> Self {
        let mut auth_seed = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut auth_seed);
        Self { auth_seed }
    }

    fn signing_key(&self) -> SigningKey {
        // Domain-separate the session signing seed from the raw auth key.
        let seed: [u8; 32] = Sha256::new()
            .chain_update(self.auth_seed)
            .chain_update(b"encryptem-session-sign")
            .finalize()
            .into();
        SigningKey::from_bytes(&seed)
    }
}

/// Plaintext hello each side sends before anything encrypted.
#[derive(Clone, Debug, BorshSerialize, BorshDeserialize)]
pub struct Hello {
    pub session_pub: [u8; 32],
    pub sign_pub: [u8; 32],
}

/// Our half of a session before the peer's hello arrives.
pub struct PendingSession {
    session_secret: StaticSecret,
    signing_key: SigningKey,
}

impl PendingSession {
    pub fn new(identity: &NodeIdentity) -> Self {
        let session_secret = StaticSecret::random_from_rng(rand::rngs::OsRng);
        Self {
            session_secret,
            signing_key: identity.signing_key(),
        }
    }

    pub fn hello(&self) -> Hello {
        Hello {
            session_pub: X25519Public::from(&self.session_secret).to_bytes(),
            sign_pub: self.signing_key.verifying_key().to_bytes(),
        }
    }

    /// Completes the handshake with the peer's hello.
    pub fn establish(self, peer: &Hello) -> Result<EncryptemSession, SessionError> {
        let peer_session = X25519Public::from(peer.session_pub);
        let shared = self.session_secret.diffie_hellman(&peer_session);

        let peer_sign = VerifyingKey::from_bytes(&peer.sign_pub)
            .map_err(|_| SessionError::Crypto("peer signing key invalid"))?;

        let key: [u8; 32] = Sha256::digest(shared.as_bytes()).into();
        Ok(EncryptemSession {
            cipher: XChaCha20Poly1305::new(Key::from_slice(&key)),
            signing_key: self.signing_key,
            peer_sign,
            own_auth_key: hmac_key(&self.signing_key.verifying_key().to_bytes()),
            peer_auth_key: hmac_key(&peer.sign_pub),
        })
    }
}

/// Established session able to seal and open frames.
pub struct EncryptemSession {
    cipher: XChaCha20Poly1305,
    signing_key: SigningKey,
    peer_sign: VerifyingKey,
    own_auth_key: [u8; 32],
    peer_auth_key: [u8; 32],
}

impl EncryptemSession {
    pub fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>, SessionError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = XNonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext)
            .map_err(|_| SessionError::Crypto("encryption failed"))?;

        let signature = self.signing_key.sign(&ciphertext);
        let auth = hmac_tag(&self.own_auth_key, &signature.to_bytes());

        let mut envelope = Vec::with_capacity(ENVELOPE_OVERHEAD + ciphertext.len());
        envelope.extend_from_slice(&auth);
        envelope.extend_from_slice(&signature.to_bytes());
        envelope.extend_from_slice(&nonce_bytes);
        envelope.extend_from_slice(&ciphertext);
        Ok(envelope)
    }

    pub fn open(&self, envelope: &[u8]) -> Result<Vec<u8>, SessionError> {
        if envelope.len() < ENVELOPE_OVERHEAD {
            return Err(SessionError::Crypto("envelope too short"));
        }
        let (auth, rest) = envelope.split_at(AUTH_LEN);
        let (sig_bytes, rest) = rest.split_at(SIG_LEN);
        let (nonce_bytes, ciphertext) = rest.split_at(NONCE_LEN);

        // Authenticator binds to the peer's signing identity.
        let expected = hmac_tag(&self.peer_auth_key, sig_bytes);
        if auth != expected {
            return Err(SessionError::Crypto("authenticator mismatch"));
        }

        let signature = Signature::from_slice(sig_bytes)
            .map_err(|_| SessionError::Crypto("signature malformed"))?;
        self.peer_sign
            .verify(ciphertext, &signature)
            .map_err(|_| SessionError::Crypto("signature invalid"))?;

        self.cipher
            .decrypt(XNonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|_| SessionError::Crypto("decryption failed"))
    }
}

fn hmac_key(sign_pub: &[u8; 32]) -> [u8; 32] {
    // The deterministic per-identity HMAC key.
    Sha256::digest(sign_pub).into()
}

fn hmac_tag(key: &[u8; 32], data: &[u8]) -> [u8; 32] {
    let mut mac = HmacSha256::new_from_slice(key).expect("hmac accepts any key length");
    mac.update(data);
    mac.finalize().into_bytes().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handshake() -> (EncryptemSession, EncryptemSession) {
        let alice_id = NodeIdentity::new([1; 32]);
        let bob_id = NodeIdentity::new([2; 32]);

        let alice = PendingSession::new(&alice_id);
        let bob = PendingSession::new(&bob_id);
        let alice_hello = alice.hello();
        let bob_hello = bob.hello();

        (
            alice.establish(&bob_hello).unwrap(),
            bob.establish(&alice_hello).unwrap(),
        )
    }

    #[test]
    fn test_seal_open_roundtrip() {
        let (alice, bob) = handshake();
        let envelope = alice.seal(b"block witness payload").unwrap();
        let plain = bob.open(&envelope).unwrap();
        assert_eq!(plain, b"block witness payload");
    }

    #[test]
    fn test_tampered_ciphertext_rejected() {
        let (alice, bob) = handshake();
        let mut envelope = alice.seal(b"payload").unwrap();
        let last = envelope.len() - 1;
        envelope[last] ^= 0xff;
        assert!(bob.open(&envelope).is_err());
    }

    #[test]
    fn test_wrong_sender_auth_rejected() {
        // Mallory completes her own handshake with Bob but replays Alice's
        // envelope; the authenticator (bound to Alice's signing identity)
        // must not verify.
        let (alice, _bob) = handshake();

        let bob_id = NodeIdentity::new([2; 32]);
        let mallory_id = NodeIdentity::new([3; 32]);
        let mallory = PendingSession::new(&mallory_id);
        let bob2 = PendingSession::new(&bob_id);
        let mallory_hello = mallory.hello();
        let bob_session = bob2.establish(&mallory_hello).unwrap();

        let envelope = alice.seal(b"payload").unwrap();
        assert!(bob_session.open(&envelope).is_err());
    }

    #[test]
    fn test_signing_pair_is_deterministic_per_identity() {
        let id = NodeIdentity::new([9; 32]);
        let a = PendingSession::new(&id).hello();
        let b = PendingSession::new(&id).hello();
        assert_eq!(a.sign_pub, b.sign_pub, "sign pair derives from auth key");
        assert_ne!(a.session_pub, b.session_pub, "x25519 pair is ephemeral");
    }
}
