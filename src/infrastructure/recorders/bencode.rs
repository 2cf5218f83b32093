//! Minimal bencode for the rtpengine NG control protocol

use std::collections::BTreeMap;
use thiserror::Error;

/// Deepest list/dict nesting accepted from the wire
const MAX_DEPTH: usize = 64;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BencodeError {
    #[error("unexpected end of input")]
    Eof,

    #[error("invalid bencode at offset {0}")]
    Invalid(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Bencode {
    Int(i64),
    Bytes(Vec<u8>),
    List(Vec<Bencode>),
    Dict(BTreeMap<Vec<u8>, Bencode>),
}

impl From<&str> for Bencode {
    fn from(value: &str) -> Self {
        Bencode::Bytes(value.as_bytes().to_vec())
    }
}

impl From<String> for Bencode {
    fn from(value: String) -> Self {
        Bencode::Bytes(value.into_bytes())
    }
}

impl Bencode {
    /// Dictionary from string keys
    pub fn dict<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, Bencode)>,
        K: AsRef<str>,
    {
        Bencode::Dict(
            entries
                .into_iter()
                .map(|(k, v)| (k.as_ref().as_bytes().to_vec(), v))
                .collect(),
        )
    }

    pub fn get(&self, key: &str) -> Option<&Bencode> {
        match self {
            Bencode::Dict(map) => map.get(key.as_bytes()),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Bencode::Bytes(bytes) => std::str::from_utf8(bytes).ok(),
            _ => None,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.encode_into(&mut out);
        out
    }

    fn encode_into(&self, out: &mut Vec<u8>) {
        match self {
            Bencode::Int(value) => out.extend_from_slice(format!("i{}e", value).as_bytes()),
            Bencode::Bytes(bytes) => {
                out.extend_from_slice(format!("{}:", bytes.len()).as_bytes());
                out.extend_from_slice(bytes);
            }
            Bencode::List(items) => {
                out.push(b'l');
                for item in items {
                    item.encode_into(out);
                }
                out.push(b'e');
            }
            Bencode::Dict(map) => {
                out.push(b'd');
                // BTreeMap iteration keeps keys sorted as bencode requires
                for (key, value) in map {
                    out.extend_from_slice(format!("{}:", key.len()).as_bytes());
                    out.extend_from_slice(key);
                    value.encode_into(out);
                }
                out.push(b'e');
            }
        }
    }

    /// Decode a single value that spans all of `input`
    pub fn decode(input: &[u8]) -> Result<Bencode, BencodeError> {
        let (value, used) = Self::decode_at(input, 0, 0)?;
        if used != input.len() {
            return Err(BencodeError::Invalid(used));
        }
        Ok(value)
    }

    fn decode_at(input: &[u8], pos: usize, depth: usize) -> Result<(Bencode, usize), BencodeError> {
        let tag = input.get(pos).ok_or(BencodeError::Eof)?;
        if matches!(tag, b'l' | b'd') && depth >= MAX_DEPTH {
            return Err(BencodeError::Invalid(pos));
        }
        match tag {
            b'i' => {
                let end = find(input, pos + 1, b'e')?;
                let value = std::str::from_utf8(&input[pos + 1..end])
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .ok_or(BencodeError::Invalid(pos))?;
                Ok((Bencode::Int(value), end + 1))
            }
            b'l' => {
                let mut items = Vec::new();
                let mut cursor = pos + 1;
                while *input.get(cursor).ok_or(BencodeError::Eof)? != b'e' {
                    let (item, next) = Self::decode_at(input, cursor, depth + 1)?;
                    items.push(item);
                    cursor = next;
                }
                Ok((Bencode::List(items), cursor + 1))
            }
            b'd' => {
                let mut map = BTreeMap::new();
                let mut cursor = pos + 1;
                while *input.get(cursor).ok_or(BencodeError::Eof)? != b'e' {
                    let (key, next) = Self::decode_at(input, cursor, depth + 1)?;
                    let key = match key {
                        Bencode::Bytes(key) => key,
                        _ => return Err(BencodeError::Invalid(cursor)),
                    };
                    let (value, next) = Self::decode_at(input, next, depth + 1)?;
                    map.insert(key, value);
                    cursor = next;
                }
                Ok((Bencode::Dict(map), cursor + 1))
            }
            b'0'..=b'9' => {
                let colon = find(input, pos, b':')?;
                let len: usize = std::str::from_utf8(&input[pos..colon])
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .ok_or(BencodeError::Invalid(pos))?;
                let start = colon + 1;
                let end = start.checked_add(len).ok_or(BencodeError::Invalid(pos))?;
                let bytes = input.get(start..end).ok_or(BencodeError::Eof)?;
                Ok((Bencode::Bytes(bytes.to_vec()), end))
            }
            _ => Err(BencodeError::Invalid(pos)),
        }
    }
}

fn find(input: &[u8], from: usize, needle: u8) -> Result<usize, BencodeError> {
    input
        .get(from..)
        .and_then(|rest| rest.iter().position(|b| *b == needle))
        .map(|offset| from + offset)
        .ok_or(BencodeError::Eof)
}
