//! Text codecs for record strings
//!
//! Strings in QQWry files are stored in GBK. The decoder hands out raw
//! bytes; a [`TextCodec`] turns them into Rust strings for display and
//! turns strings back into bytes when building a file.

use encoding_rs::{Encoding, GBK, UTF_8};
use std::borrow::Cow;

/// Conversion between raw record bytes and `str`
pub trait TextCodec: Send + Sync {
    /// Decode raw bytes, replacing malformed sequences
    fn decode<'a>(&self, bytes: &'a [u8]) -> Cow<'a, str>;

    /// Encode a string into raw bytes.
    ///
    /// Returns `None` if the string has characters the encoding cannot represent.
    fn encode<'a>(&self, text: &'a str) -> Option<Cow<'a, [u8]>>;

    /// Encoding label for diagnostics
    fn name(&self) -> &'static str;
}

/// Codec backed by an `encoding_rs` encoding
#[derive(Debug, Clone, Copy)]
pub struct EncodingCodec {
    encoding: &'static Encoding,
}

impl EncodingCodec {
    /// Wrap an `encoding_rs` encoding
    pub const fn new(encoding: &'static Encoding) -> Self {
        Self { encoding }
    }

    /// GBK, the encoding of published QQWry files
    pub fn gbk() -> Self {
        Self::new(GBK)
    }

    /// UTF-8, for files re-encoded by third-party tools
    pub fn utf8() -> Self {
        Self::new(UTF_8)
    }

    /// Look up an encoding by WHATWG label (e.g. `"gbk"`, `"gb18030"`, `"utf-8"`)
    pub fn for_label(label: &str) -> Option<Self> {
        Encoding::for_label(label.as_bytes()).map(Self::new)
    }
}

impl TextCodec for EncodingCodec {
    fn decode<'a>(&self, bytes: &'a [u8]) -> Cow<'a, str> {
        let (text, _) = self.encoding.decode_without_bom_handling(bytes);
        text
    }

    fn encode<'a>(&self, text: &'a str) -> Option<Cow<'a, [u8]>> {
        let (bytes, _, had_errors) = self.encoding.encode(text);
        if had_errors {
            None
        } else {
            Some(bytes)
        }
    }

    fn name(&self) -> &'static str {
        self.encoding.name()
    }
}

impl Default for EncodingCodec {
    fn default() -> Self {
        Self::gbk()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gbk_decode() {
        // "北京" in GBK
        let bytes = [0xB1, 0xB1, 0xBE, 0xA9];
        assert_eq!(EncodingCodec::gbk().decode(&bytes), "北京");
    }

    #[test]
    fn test_gbk_encode_roundtrip() {
        let encoded = EncodingCodec::gbk().encode("中国").unwrap();
        assert_eq!(&*encoded, &[0xD6, 0xD0, 0xB9, 0xFA]);
        assert_eq!(EncodingCodec::gbk().decode(&encoded), "中国");
    }

    #[test]
    fn test_ascii_is_borrowed() {
        assert!(matches!(EncodingCodec::gbk().decode(b"CZ88.NET"), Cow::Borrowed(_)));
    }

    #[test]
    fn test_unencodable() {
        assert!(EncodingCodec::gbk().encode("🙂").is_none());
        assert!(EncodingCodec::utf8().encode("🙂").is_some());
    }

    #[test]
    fn test_malformed_input_replaced() {
        let text = EncodingCodec::gbk().decode(&[b'A', 0x81]);
        assert!(text.starts_with('A'));
        assert!(text.contains('\u{FFFD}'));
    }

    #[test]
    fn test_for_label() {
        assert_eq!(EncodingCodec::for_label("gbk").unwrap().name(), "GBK");
        assert!(EncodingCodec::for_label("not-an-encoding").is_none());
    }
}
