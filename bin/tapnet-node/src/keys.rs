//! Node key material on disk: a validator schnorr key and the p2p auth
//! seed, both generated on first run.

use std::fs;
use std::path::Path;

use anyhow::Context;
use rand::RngCore;
use secp256k1::{Keypair, Secp256k1, SecretKey};
use tapnet_p2p::encryptem::NodeIdentity;

fn load_or_generate_seed(path: &Path) -> anyhow::Result<[u8; 32]> {
    if path.exists() {
        let hex_str = fs::read_to_string(path)
            .with_context(|| format!("reading key file {}", path.display()))?;
        let bytes = hex::decode(hex_str.trim()).context("key file is not hex")?;
        let seed: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| anyhow::anyhow!("key file must hold 32 bytes"))?;
        return Ok(seed);
    }

    let mut seed = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut seed);
    fs::write(path, hex::encode(seed))
        .with_context(|| format!("writing key file {}", path.display()))?;
    Ok(seed)
}

pub fn load_validator_keypair(datadir: &Path) -> anyhow::Result<Keypair> {
    let seed = load_or_generate_seed(&datadir.join("validator.key"))?;
    let secp = Secp256k1::new();
    let sk = SecretKey::from_slice(&seed).context("validator key out of range")?;
    Ok(Keypair::from_secret_key(&secp, &sk))
}

pub fn load_p2p_identity(datadir: &Path) -> anyhow::Result<NodeIdentity> {
    let seed = load_or_generate_seed(&datadir.join("p2p_auth.key"))?;
    Ok(NodeIdentity::new(seed))
}
