//! Bencode access for tracker replies and `.torrent` files
//!
//! Parsing is done by `bip_bencode`; the parsed tree is copied into an owned
//! closed enum so every extraction site matches the variants explicitly
//! instead of guessing at types.

use std::collections::BTreeMap;

use bip_bencode::{BDecodeOpt, BRefAccess, BencodeRef};

/// Nesting limit for lists and dictionaries.
const MAX_NESTING_DEPTH: usize = 64;

/// A bencoded value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BencodeValue {
    Integer(i64),
    Bytes(Vec<u8>),
    List(Vec<BencodeValue>),
    Dict(BTreeMap<Vec<u8>, BencodeValue>),
}

/// Errors produced while reading bencoded input.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BencodeError {
    #[error("Invalid bencode: {reason}")]
    Parse { reason: String },

    #[error("Unexpected end of input at byte {position}")]
    UnexpectedEnd { position: usize },

    #[error("Unexpected byte 0x{byte:02x} at byte {position}")]
    UnexpectedByte { byte: u8, position: usize },
}

impl BencodeValue {
    /// Decodes a single value that must span the whole input.
    ///
    /// # Errors
    /// - `BencodeError::Parse` - Malformed input or bytes left over after the value
    pub fn decode(input: &[u8]) -> Result<Self, BencodeError> {
        Self::decode_with(input, BDecodeOpt::new(MAX_NESTING_DEPTH, false, true))
    }

    /// Decodes the first value of `input`, ignoring anything after it.
    ///
    /// # Errors
    /// - `BencodeError::Parse` - Malformed input
    pub fn decode_leading(input: &[u8]) -> Result<Self, BencodeError> {
        Self::decode_with(input, BDecodeOpt::new(MAX_NESTING_DEPTH, false, false))
    }

    fn decode_with(input: &[u8], options: BDecodeOpt) -> Result<Self, BencodeError> {
        let parsed = BencodeRef::decode(input, options).map_err(|e| BencodeError::Parse {
            reason: e.to_string(),
        })?;
        Ok(Self::from(&parsed))
    }

    /// Looks up a dictionary entry; `None` for missing keys and non-dictionaries.
    pub fn get(&self, key: &str) -> Option<&BencodeValue> {
        match self {
            Self::Dict(dict) => dict.get(key.as_bytes()),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// Returns the byte string as UTF-8, replacing invalid sequences.
    pub fn as_text(&self) -> Option<String> {
        self.as_bytes()
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
    }

    pub fn as_list(&self) -> Option<&[BencodeValue]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }
}

impl From<&BencodeRef<'_>> for BencodeValue {
    fn from(value: &BencodeRef<'_>) -> Self {
        if let Some(integer) = value.int() {
            return Self::Integer(integer);
        }
        if let Some(bytes) = value.bytes() {
            return Self::Bytes(bytes.to_vec());
        }
        if let Some(list) = value.list() {
            let items = (0..list.len())
                .filter_map(|index| list.get(index))
                .map(|item| Self::from(item))
                .collect();
            return Self::List(items);
        }
        match value.dict() {
            Some(dict) => Self::Dict(
                dict.to_list()
                    .into_iter()
                    .map(|(key, item)| (key.to_vec(), Self::from(item)))
                    .collect(),
            ),
            None => Self::List(Vec::new()),
        }
    }
}

/// Returns the raw encoded bytes of `key`'s value in the top-level dictionary of `input`.
///
/// Used to hash a torrent's `info` dictionary exactly as it appears on disk.
///
/// # Errors
/// - `BencodeError` - Input is not a well-formed dictionary
pub fn dictionary_entry_span<'a>(
    input: &'a [u8],
    key: &[u8],
) -> Result<Option<&'a [u8]>, BencodeError> {
    match input.first().copied() {
        Some(b'd') => {}
        Some(byte) => return Err(BencodeError::UnexpectedByte { byte, position: 0 }),
        None => return Err(BencodeError::UnexpectedEnd { position: 0 }),
    }

    let mut position = 1;
    let mut found = None;
    loop {
        match input.get(position).copied() {
            Some(b'e') => return Ok(found),
            Some(_) => {}
            None => return Err(BencodeError::UnexpectedEnd { position }),
        }

        let (entry_key, value_start) = byte_string(input, position)?;
        let value_end = value_end(input, value_start)?;
        if entry_key == key {
            found = Some(&input[value_start..value_end]);
        }
        position = value_end;
    }
}

/// Finds the end of the value starting at `start` without building it.
fn value_end(input: &[u8], start: usize) -> Result<usize, BencodeError> {
    let mut position = start;
    let mut depth = 0usize;

    loop {
        let byte = *input
            .get(position)
            .ok_or(BencodeError::UnexpectedEnd { position })?;
        match byte {
            b'd' | b'l' => {
                depth += 1;
                position += 1;
            }
            b'e' if depth > 0 => {
                depth -= 1;
                position += 1;
            }
            b'i' => {
                let terminator = input[position..]
                    .iter()
                    .position(|b| *b == b'e')
                    .ok_or(BencodeError::UnexpectedEnd {
                        position: input.len(),
                    })?;
                position += terminator + 1;
            }
            b'0'..=b'9' => {
                let (_, end) = byte_string(input, position)?;
                position = end;
            }
            _ => return Err(BencodeError::UnexpectedByte { byte, position }),
        }

        if depth == 0 {
            return Ok(position);
        }
    }
}

/// Reads a `<length>:<bytes>` string, returning its contents and end position.
fn byte_string(input: &[u8], start: usize) -> Result<(&[u8], usize), BencodeError> {
    let mut position = start;
    while let Some(&byte) = input.get(position) {
        match byte {
            b'0'..=b'9' => position += 1,
            b':' => break,
            _ => return Err(BencodeError::UnexpectedByte { byte, position }),
        }
    }

    let length = std::str::from_utf8(&input[start..position])
        .ok()
        .and_then(|digits| digits.parse::<usize>().ok())
        .ok_or(BencodeError::UnexpectedEnd { position })?;
    let contents_start = position + 1;
    let end = contents_start
        .checked_add(length)
        .filter(|end| *end <= input.len())
        .ok_or(BencodeError::UnexpectedEnd {
            position: input.len(),
        })?;

    Ok((&input[contents_start..end], end))
}
