//! Key and value codecs for the on-disk dump format.
//!
//! A codec turns one key or value into bytes and back. Encoding is
//! size-bounded: it writes into the caller's buffer and returns the byte
//! count, or 0 when the buffer is too small. Decoding gets the exact
//! payload slice that was written and allocates a fresh item.

/// Encode/decode hook for one side of the key-value pair.
pub trait Codec<T> {
    /// Encode `item` into `buf`, returning the bytes written; 0 when the
    /// buffer is insufficient.
    fn encode(&self, item: &T, buf: &mut [u8]) -> usize;

    /// Decode an item from its exact payload slice.
    fn decode(&self, buf: &[u8]) -> Option<T>;
}

/// Maximum payload one `encode` call may produce. Zero-length encodings are
/// indistinguishable from "buffer too small", so the retry loop in the dump
/// writer gives up growing at this bound and records an empty payload.
pub(crate) const MAX_ENCODED_LEN: usize = 1 << 20;

/// Encode with a doubling scratch buffer.
pub(crate) fn encode_to_vec<T>(codec: &impl Codec<T>, item: &T) -> Vec<u8> {
    let mut capacity = 64;
    loop {
        let mut buf = vec![0u8; capacity];
        let written = codec.encode(item, &mut buf);
        if written > 0 {
            buf.truncate(written);
            return buf;
        }
        if capacity >= MAX_ENCODED_LEN {
            return Vec::new();
        }
        capacity *= 2;
    }
}

/// Little-endian codec for `i32` keys.
#[derive(Debug, Clone, Copy, Default)]
pub struct I32Codec;

impl Codec<i32> for I32Codec {
    fn encode(&self, item: &i32, buf: &mut [u8]) -> usize {
        if buf.len() < 4 {
            return 0;
        }
        buf[..4].copy_from_slice(&item.to_le_bytes());
        4
    }

    fn decode(&self, buf: &[u8]) -> Option<i32> {
        if buf.len() != 4 {
            return None;
        }
        let bytes: [u8; 4] = buf.try_into().ok()?;
        Some(i32::from_le_bytes(bytes))
    }
}

/// UTF-8 codec for `String` values.
#[derive(Debug, Clone, Copy, Default)]
pub struct StrCodec;

impl Codec<String> for StrCodec {
    fn encode(&self, item: &String, buf: &mut [u8]) -> usize {
        let bytes = item.as_bytes();
        if buf.len() < bytes.len() {
            return 0;
        }
        buf[..bytes.len()].copy_from_slice(bytes);
        bytes.len()
    }

    fn decode(&self, buf: &[u8]) -> Option<String> {
        std::str::from_utf8(buf).ok().map(str::to_owned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn i32_codec_round_trips() {
        let mut buf = [0u8; 8];
        for value in [0, 1, -1, i32::MIN, i32::MAX] {
            let n = I32Codec.encode(&value, &mut buf);
            assert_eq!(n, 4);
            assert_eq!(I32Codec.decode(&buf[..4]), Some(value));
        }
    }

    #[test]
    fn i32_codec_rejects_short_buffers_and_payloads() {
        let mut short = [0u8; 3];
        assert_eq!(I32Codec.encode(&7, &mut short), 0);
        assert_eq!(I32Codec.decode(&short), None);
        assert_eq!(I32Codec.decode(&[0u8; 5]), None);
    }

    #[test]
    fn str_codec_round_trips() {
        let mut buf = [0u8; 32];
        let value = String::from("crab apples");
        let n = StrCodec.encode(&value, &mut buf);
        assert_eq!(n, value.len());
        assert_eq!(StrCodec.decode(&buf[..n]), Some(value));
    }

    #[test]
    fn str_codec_rejects_invalid_utf8() {
        assert_eq!(StrCodec.decode(&[0xff, 0xfe]), None);
    }

    #[test]
    fn encode_to_vec_handles_empty_strings() {
        let bytes = encode_to_vec(&StrCodec, &String::new());
        assert!(bytes.is_empty());
        assert_eq!(StrCodec.decode(&bytes), Some(String::new()));
    }
}
