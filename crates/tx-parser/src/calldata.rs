//! Calldata decompression.  Interactions may carry their payload as a raw
//! blob or a zlib stream; the decompressed size is consensus-capped.

use std::io::Read;

use flate2::read::ZlibDecoder;

use crate::errors::ParseError;

/// Leading CMF byte of a zlib stream (deflate, 32k window).
const ZLIB_CMF: u8 = 0x78;

/// Valid FLG bytes for the CMF above.
const ZLIB_FLG: [u8; 4] = [0x01, 0x5e, 0x9c, 0xda];

/// Whether the blob looks like a zlib stream.
pub fn is_compressed(data: &[u8]) -> bool {
    data.len() >= 2 && data[0] == ZLIB_CMF && ZLIB_FLG.contains(&data[1])
}

/// Decompresses if marked compressed, enforcing the size cap either way.
/// Returns the payload and whether it was compressed on the wire.
pub fn decode_calldata(data: &[u8], max_size: usize) -> Result<(Vec<u8>, bool), ParseError> {
    if !is_compressed(data) {
        if data.len() > max_size {
            return Err(ParseError::CalldataLimit {
                len: data.len(),
                max: max_size,
            });
        }
        return Ok((data.to_vec(), false));
    }

    let mut decoder = ZlibDecoder::new(data);
    let mut out = Vec::new();
    // Read one byte past the cap so we can tell "at the cap" from "over it"
    // without decompressing something huge.
    let mut limited = decoder.by_ref().take(max_size as u64 + 1);
    limited
        .read_to_end(&mut out)
        .map_err(|e| ParseError::Decompress(e.to_string()))?;

    if out.len() > max_size {
        return Err(ParseError::CalldataLimit {
            len: out.len(),
            max: max_size,
        });
    }
    Ok((out, true))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use flate2::write::ZlibEncoder;
    use flate2::Compression;

    use super::*;

    fn compress(data: &[u8]) -> Vec<u8> {
        let mut enc = ZlibEncoder::new(Vec::new(), Compression::default());
        enc.write_all(data).unwrap();
        enc.finish().unwrap()
    }

    #[test]
    fn test_raw_passthrough() {
        let (out, compressed) = decode_calldata(b"hello", 16).unwrap();
        assert_eq!(out, b"hello");
        assert!(!compressed);
    }

    #[test]
    fn test_compressed_roundtrip() {
        let payload = vec![7u8; 4096];
        let blob = compress(&payload);
        assert!(is_compressed(&blob));

        let (out, compressed) = decode_calldata(&blob, 8192).unwrap();
        assert_eq!(out, payload);
        assert!(compressed);
    }

    #[test]
    fn test_limit_enforced_after_decompression() {
        let payload = vec![7u8; 4096];
        let blob = compress(&payload);

        let res = decode_calldata(&blob, 4095);
        assert!(
            matches!(res, Err(ParseError::CalldataLimit { .. })),
            "one byte over the cap must be rejected"
        );
    }

    #[test]
    fn test_raw_limit() {
        let res = decode_calldata(&vec![1u8; 100], 99);
        assert!(matches!(res, Err(ParseError::CalldataLimit { len: 100, max: 99 })));
    }
}
