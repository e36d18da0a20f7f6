//! Word and sentence framing for the RouterOS API.
//!
//! A word is a length prefix followed by that many bytes. The prefix is 1 to 5
//! bytes long; the high bits of its first byte tag the class:
//!
//! ```text
//! 0xxxxxxx                                  len < 0x80
//! 10xxxxxx xxxxxxxx                         len < 0x4000
//! 110xxxxx xxxxxxxx xxxxxxxx                len < 0x200000
//! 1110xxxx xxxxxxxx xxxxxxxx xxxxxxxx       len < 0x10000000
//! 11110000 xxxxxxxx xxxxxxxx xxxxxxxx xxxxxxxx
//! ```
//!
//! A sentence is a run of words closed by a zero-length word.

use bytes::{Buf, BufMut, BytesMut};
use std::collections::HashMap;
use tokio_util::codec::{Decoder, Encoder};

use super::ApiError;

pub type Sentence = Vec<String>;

/// One reply record: `=key=value` words folded into a map.
pub type Record = HashMap<String, String>;

/// Synthetic field set on records produced by `!trap` / `!fatal`.
pub const ERROR_FIELD: &str = "error";

/// Guard against a corrupted prefix asking us to buffer gigabytes.
const DEFAULT_MAX_WORD_LEN: usize = 16 * 1024 * 1024;

pub fn encode_length(len: usize, dst: &mut BytesMut) -> Result<(), ApiError> {
    let len = u32::try_from(len)
        .map_err(|_| ApiError::MalformedWord(format!("word of {len} bytes is too long")))?;
    if len < 0x80 {
        dst.put_u8(len as u8);
    } else if len < 0x4000 {
        dst.put_u16((len | 0x8000) as u16);
    } else if len < 0x20_0000 {
        let tagged = len | 0xC0_0000;
        dst.put_u8((tagged >> 16) as u8);
        dst.put_u16(tagged as u16);
    } else if len < 0x1000_0000 {
        dst.put_u32(len | 0xE000_0000);
    } else {
        dst.put_u8(0xF0);
        dst.put_u32(len);
    }
    Ok(())
}

/// Decodes a length prefix at the start of `src`.
///
/// Returns the word length and the prefix size, or `None` when `src` does not
/// yet hold the whole prefix.
pub fn decode_length(src: &[u8]) -> Result<Option<(usize, usize)>, ApiError> {
    let Some(&first) = src.first() else {
        return Ok(None);
    };
    let (prefix_len, mut value) = if first & 0x80 == 0x00 {
        (1, u32::from(first))
    } else if first & 0xC0 == 0x80 {
        (2, u32::from(first & 0x3F))
    } else if first & 0xE0 == 0xC0 {
        (3, u32::from(first & 0x1F))
    } else if first & 0xF0 == 0xE0 {
        (4, u32::from(first & 0x0F))
    } else if first == 0xF0 {
        (5, 0)
    } else {
        return Err(ApiError::MalformedWord(format!(
            "reserved control byte 0x{first:02x}"
        )));
    };
    if src.len() < prefix_len {
        return Ok(None);
    }
    for &byte in &src[1..prefix_len] {
        value = (value << 8) | u32::from(byte);
    }
    Ok(Some((value as usize, prefix_len)))
}

pub fn encode_word(word: &str, dst: &mut BytesMut) -> Result<(), ApiError> {
    encode_length(word.len(), dst)?;
    dst.put_slice(word.as_bytes());
    Ok(())
}

/// Builds the words for one command. `?`-prefixed keys are query filters and
/// go out verbatim; every other key is sent as `=key=value`.
pub fn command_sentence(command: &str, args: &[(&str, &str)]) -> Sentence {
    let mut words = Vec::with_capacity(args.len() + 1);
    words.push(command.to_string());
    for (key, value) in args {
        let word = if key.starts_with('?') {
            if value.is_empty() {
                (*key).to_string()
            } else {
                format!("{key}={value}")
            }
        } else {
            format!("={key}={value}")
        };
        words.push(word);
    }
    words
}

/// Splits `=key=value` into its parts. The value may itself contain `=`.
fn split_attribute(word: &str) -> Option<(&str, &str)> {
    let rest = word.strip_prefix('=')?;
    match rest.split_once('=') {
        Some((key, value)) if !key.is_empty() => Some((key, value)),
        None if !rest.is_empty() => Some((rest, "")),
        _ => None,
    }
}

/// Folds a flat reply word stream into records.
///
/// `!re` opens a record; `!trap`/`!fatal` open one flagged with `error=true`;
/// attributes that follow `!done` (e.g. `=ret=`) form a record of their own.
pub fn parse_records<S: AsRef<str>>(words: &[S]) -> Vec<Record> {
    let mut records = Vec::new();
    let mut current: Option<Record> = None;

    for word in words {
        let word = word.as_ref();
        match word {
            "!re" => {
                records.extend(current.take());
                current = Some(Record::new());
            }
            "!trap" | "!fatal" => {
                records.extend(current.take());
                let mut record = Record::new();
                record.insert(ERROR_FIELD.to_string(), "true".to_string());
                current = Some(record);
            }
            "!done" => {
                records.extend(current.take());
            }
            w if w.starts_with('=') => {
                if let Some((key, value)) = split_attribute(w) {
                    current
                        .get_or_insert_with(Record::new)
                        .insert(key.to_string(), value.to_string());
                }
            }
            w if w.starts_with('.') || w.is_empty() => {}
            // `!fatal` carries its reason as a bare word.
            w => {
                if let Some(record) = current.as_mut().filter(|r| is_error(r)) {
                    record
                        .entry("message".to_string())
                        .or_insert_with(|| w.to_string());
                }
            }
        }
    }
    records.extend(current.take());
    records
}

pub fn is_error(record: &Record) -> bool {
    record.get(ERROR_FIELD).map(String::as_str) == Some("true")
}

/// `tokio_util` codec turning a byte stream into sentences and back.
#[derive(Debug, Clone)]
pub struct SentenceCodec {
    max_word_len: usize,
}

impl Default for SentenceCodec {
    fn default() -> Self {
        Self {
            max_word_len: DEFAULT_MAX_WORD_LEN,
        }
    }
}

impl Decoder for SentenceCodec {
    type Item = Sentence;
    type Error = ApiError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let mut offset = 0;
        let mut words = Vec::new();
        loop {
            let Some((len, prefix_len)) = decode_length(&src[offset..])? else {
                return Ok(None);
            };
            if len > self.max_word_len {
                return Err(ApiError::MalformedWord(format!(
                    "word length {len} exceeds limit {}",
                    self.max_word_len
                )));
            }
            let start = offset + prefix_len;
            if len == 0 {
                src.advance(start);
                return Ok(Some(words));
            }
            let end = start + len;
            if src.len() < end {
                src.reserve(end - src.len());
                return Ok(None);
            }
            words.push(String::from_utf8_lossy(&src[start..end]).into_owned());
            offset = end;
        }
    }
}

impl Encoder<Sentence> for SentenceCodec {
    type Error = ApiError;

    fn encode(&mut self, item: Sentence, dst: &mut BytesMut) -> Result<(), Self::Error> {
        for word in &item {
            encode_word(word, dst)?;
        }
        dst.put_u8(0);
        Ok(())
    }
}
