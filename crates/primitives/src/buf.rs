use std::fmt;

use borsh::{BorshDeserialize, BorshSerialize};

macro_rules! impl_buf_common {
    ($name:ident, $len:expr) => {
        impl $name {
            pub const LEN: usize = $len;

            pub const fn new(data: [u8; $len]) -> Self {
                Self(data)
            }

            pub const fn zero() -> Self {
                Self([0; $len])
            }

            pub fn is_zero(&self) -> bool {
                self.0.iter().all(|b| *b == 0)
            }

            pub fn as_slice(&self) -> &[u8] {
                &self.0
            }

            pub fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }
        }

        impl AsRef<[u8; $len]> for $name {
            fn as_ref(&self) -> &[u8; $len] {
                &self.0
            }
        }

        impl From<[u8; $len]> for $name {
            fn from(data: [u8; $len]) -> Self {
                Self(data)
            }
        }

        impl From<$name> for [u8; $len] {
            fn from(buf: $name) -> Self {
                buf.0
            }
        }

        impl TryFrom<&[u8]> for $name {
            type Error = &'static str;

            fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
                let arr: [u8; $len] = value.try_into().map_err(|_| "buf: invalid length")?;
                Ok(Self(arr))
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::zero()
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&hex::encode(self.0))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                // Abbreviated for log lines, use Debug for the full buf.
                let h = hex::encode(self.0);
                f.write_str(&h[..8])?;
                f.write_str("..")?;
                f.write_str(&h[h.len() - 8..])
            }
        }

        impl BorshSerialize for $name {
            fn serialize<W: std::io::Write>(&self, writer: &mut W) -> std::io::Result<()> {
                writer.write_all(&self.0)
            }
        }

        impl BorshDeserialize for $name {
            fn deserialize_reader<R: std::io::Read>(reader: &mut R) -> std::io::Result<Self> {
                let mut array = [0u8; $len];
                reader.read_exact(&mut array)?;
                Ok(Self(array))
            }
        }

        impl<'a> arbitrary::Arbitrary<'a> for $name {
            fn arbitrary(u: &mut arbitrary::Unstructured<'a>) -> arbitrary::Result<Self> {
                let mut array = [0u8; $len];
                u.fill_buffer(&mut array)?;
                Ok(Self(array))
            }
        }

        impl serde::Serialize for $name {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                if serializer.is_human_readable() {
                    serializer.serialize_str(&hex::encode(self.0))
                } else {
                    serializer.serialize_bytes(&self.0)
                }
            }
        }

        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                use serde::de::Error;
                if deserializer.is_human_readable() {
                    let s = <String as serde::Deserialize>::deserialize(deserializer)?;
                    let mut array = [0u8; $len];
                    hex::decode_to_slice(&s, &mut array).map_err(D::Error::custom)?;
                    Ok(Self(array))
                } else {
                    let b = <Vec<u8> as serde::Deserialize>::deserialize(deserializer)?;
                    Self::try_from(b.as_slice()).map_err(D::Error::custom)
                }
            }
        }
    };
}

/// 20-byte buf, useful for hash160 outputs.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Buf20(pub [u8; 20]);

/// 32-byte buf, useful for hashes and schnorr pubkeys.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Buf32(pub [u8; 32]);

/// 33-byte buf, useful for compressed secp256k1 pubkeys.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Buf33(pub [u8; 33]);

/// 64-byte buf, useful for schnorr signatures and wide identities.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Buf64(pub [u8; 64]);

impl_buf_common!(Buf20, 20);
impl_buf_common!(Buf32, 32);
impl_buf_common!(Buf33, 33);
impl_buf_common!(Buf64, 64);

impl From<bitcoin::BlockHash> for Buf32 {
    fn from(hash: bitcoin::BlockHash) -> Self {
        use bitcoin::hashes::Hash;
        Self(hash.to_byte_array())
    }
}

impl From<bitcoin::Txid> for Buf32 {
    fn from(txid: bitcoin::Txid) -> Self {
        use bitcoin::hashes::Hash;
        Self(txid.to_byte_array())
    }
}

impl From<Buf32> for bitcoin::BlockHash {
    fn from(buf: Buf32) -> Self {
        use bitcoin::hashes::Hash;
        bitcoin::BlockHash::from_byte_array(buf.0)
    }
}

impl From<Buf32> for bitcoin::Txid {
    fn from(buf: Buf32) -> Self {
        use bitcoin::hashes::Hash;
        bitcoin::Txid::from_byte_array(buf.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buf32_borsh_roundtrip() {
        let buf = Buf32::from([7; 32]);
        let enc = borsh::to_vec(&buf).unwrap();
        assert_eq!(enc.len(), 32, "borsh encoding must be raw bytes");
        let dec: Buf32 = borsh::from_slice(&enc).unwrap();
        assert_eq!(buf, dec);
    }

    #[test]
    fn test_buf32_serde_hex() {
        let buf = Buf32::from([0xab; 32]);
        let s = serde_json::to_string(&buf).unwrap();
        assert_eq!(s, format!("\"{}\"", "ab".repeat(32)));
        let back: Buf32 = serde_json::from_str(&s).unwrap();
        assert_eq!(buf, back);
    }
}
