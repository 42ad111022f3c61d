//! Order-preserving key encodings for height-indexed tables.

use rockbound::CodecError;
use tapnet_primitives::buf::{Buf32, Buf64};

fn invalid_len(expected: usize, got: usize) -> CodecError {
    CodecError::InvalidKeyLength {
        expected,
        got,
    }
}

/// Keys whose byte encoding sorts the same way the key does.
pub trait SeekKey: Sized {
    fn to_seek_bytes(&self) -> Vec<u8>;
    fn from_seek_bytes(data: &[u8]) -> Result<Self, CodecError>;
}

impl SeekKey for u64 {
    fn to_seek_bytes(&self) -> Vec<u8> {
        self.to_be_bytes().to_vec()
    }

    fn from_seek_bytes(data: &[u8]) -> Result<Self, CodecError> {
        let arr: [u8; 8] = data.try_into().map_err(|_| invalid_len(8, data.len()))?;
        Ok(u64::from_be_bytes(arr))
    }
}

impl SeekKey for (u64, u32) {
    fn to_seek_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(12);
        buf.extend_from_slice(&self.0.to_be_bytes());
        buf.extend_from_slice(&self.1.to_be_bytes());
        buf
    }

    fn from_seek_bytes(data: &[u8]) -> Result<Self, CodecError> {
        if data.len() != 12 {
            return Err(invalid_len(12, data.len()));
        }
        let hi = u64::from_be_bytes(data[..8].try_into().expect("seek_key: split"));
        let lo = u32::from_be_bytes(data[8..].try_into().expect("seek_key: split"));
        Ok((hi, lo))
    }
}

impl SeekKey for (u64, Buf32) {
    fn to_seek_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(40);
        buf.extend_from_slice(&self.0.to_be_bytes());
        buf.extend_from_slice(self.1.as_slice());
        buf
    }

    fn from_seek_bytes(data: &[u8]) -> Result<Self, CodecError> {
        if data.len() != 40 {
            return Err(invalid_len(40, data.len()));
        }
        let height = u64::from_be_bytes(data[..8].try_into().expect("seek_key: split"));
        let buf = Buf32::try_from(&data[8..]).expect("seek_key: split");
        Ok((height, buf))
    }
}

impl SeekKey for (u64, Buf64) {
    fn to_seek_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(72);
        buf.extend_from_slice(&self.0.to_be_bytes());
        buf.extend_from_slice(self.1.as_slice());
        buf
    }

    fn from_seek_bytes(data: &[u8]) -> Result<Self, CodecError> {
        if data.len() != 72 {
            return Err(invalid_len(72, data.len()));
        }
        let height = u64::from_be_bytes(data[..8].try_into().expect("seek_key: split"));
        let buf = Buf64::try_from(&data[8..]).expect("seek_key: split");
        Ok((height, buf))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_u64_ordering_preserved() {
        let mut encoded: Vec<Vec<u8>> = [5u64, 300, 2, 70000, 1]
            .iter()
            .map(|v| v.to_seek_bytes())
            .collect();
        encoded.sort();
        let decoded: Vec<u64> = encoded
            .iter()
            .map(|b| u64::from_seek_bytes(b).unwrap())
            .collect();
        assert_eq!(decoded, vec![1, 2, 5, 300, 70000]);
    }

    #[test]
    fn test_tuple_roundtrip() {
        let key = (42u64, Buf64::from([7; 64]));
        let bytes = key.to_seek_bytes();
        assert_eq!(<(u64, Buf64)>::from_seek_bytes(&bytes).unwrap(), key);
    }
}
