//! Memcache ASCII protocol codec.
//!
//! Pure command encoding and reply parsing, kept free of socket concerns so
//! it can be tested without I/O. Commands are built as complete byte
//! sequences ready to write; replies are parsed from single lines with the
//! trailing `\r\n` already stripped.

use memha_common::{validate_key, Item, MemhaError, Result};

/// Storage commands share one wire shape; the verb selects the server-side
/// condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageVerb {
    /// Unconditional store.
    Set,
    /// Store only if absent.
    Add,
}

impl StorageVerb {
    fn as_str(&self) -> &'static str {
        match self {
            StorageVerb::Set => "set",
            StorageVerb::Add => "add",
        }
    }
}

/// Header of a `VALUE` reply line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueHeader {
    pub key: String,
    pub flags: u32,
    pub len: usize,
    pub cas: Option<u64>,
}

/// Encodes a CAS-bearing retrieval: `gets <key>\r\n`.
pub fn encode_get(key: &str) -> Result<Vec<u8>> {
    validate_key(key)?;
    Ok(format!("gets {}\r\n", key).into_bytes())
}

/// Encodes `set`/`add`: `<verb> <key> <flags> <exptime> <len>\r\n<data>\r\n`.
pub fn encode_storage(verb: StorageVerb, item: &Item) -> Result<Vec<u8>> {
    validate_key(&item.key)?;
    let mut buf = format!(
        "{} {} {} {} {}\r\n",
        verb.as_str(),
        item.key,
        item.flags,
        item.protocol_expiry(),
        item.value.len()
    )
    .into_bytes();
    buf.extend_from_slice(&item.value);
    buf.extend_from_slice(b"\r\n");
    Ok(buf)
}

/// Encodes `delete <key>\r\n`.
pub fn encode_delete(key: &str) -> Result<Vec<u8>> {
    validate_key(key)?;
    Ok(format!("delete {}\r\n", key).into_bytes())
}

/// Encodes `incr <key> <delta>\r\n`.
pub fn encode_increment(key: &str, delta: u64) -> Result<Vec<u8>> {
    validate_key(key)?;
    Ok(format!("incr {} {}\r\n", key, delta).into_bytes())
}

/// Encodes `touch <key> <exptime>\r\n`.
pub fn encode_touch(key: &str, expiry_secs: u32) -> Result<Vec<u8>> {
    validate_key(key)?;
    Ok(format!("touch {} {}\r\n", key, expiry_secs).into_bytes())
}

/// Parses the first line of a retrieval reply.
///
/// Returns `Ok(Some(header))` for a `VALUE` line, `Ok(None)` for a bare
/// `END` (no value), and an error for anything else.
pub fn parse_value_header(line: &str) -> Result<Option<ValueHeader>> {
    if line == "END" {
        return Ok(None);
    }
    let mut parts = line.split_ascii_whitespace();
    if parts.next() != Some("VALUE") {
        return Err(reply_error(line));
    }
    let key = parts
        .next()
        .ok_or_else(|| malformed(line))?
        .to_string();
    let flags = parts
        .next()
        .and_then(|s| s.parse::<u32>().ok())
        .ok_or_else(|| malformed(line))?;
    let len = parts
        .next()
        .and_then(|s| s.parse::<usize>().ok())
        .ok_or_else(|| malformed(line))?;
    let cas = match parts.next() {
        Some(s) => Some(s.parse::<u64>().map_err(|_| malformed(line))?),
        None => None,
    };
    Ok(Some(ValueHeader { key, flags, len, cas }))
}

/// Parses the reply to `set`/`add`.
pub fn parse_storage_reply(line: &str) -> Result<()> {
    match line {
        "STORED" => Ok(()),
        "NOT_STORED" => Err(MemhaError::NotStored),
        _ => Err(reply_error(line)),
    }
}

/// Parses the reply to `delete`.
pub fn parse_delete_reply(line: &str) -> Result<()> {
    match line {
        "DELETED" => Ok(()),
        "NOT_FOUND" => Err(MemhaError::CacheMiss),
        _ => Err(reply_error(line)),
    }
}

/// Parses the reply to `incr`: the new value, or `NOT_FOUND`.
pub fn parse_increment_reply(line: &str) -> Result<u64> {
    if line == "NOT_FOUND" {
        return Err(MemhaError::CacheMiss);
    }
    line.parse::<u64>().map_err(|_| reply_error(line))
}

/// Parses the reply to `touch`.
pub fn parse_touch_reply(line: &str) -> Result<()> {
    match line {
        "TOUCHED" => Ok(()),
        "NOT_FOUND" => Err(MemhaError::CacheMiss),
        _ => Err(reply_error(line)),
    }
}

fn reply_error(line: &str) -> MemhaError {
    MemhaError::Protocol(line.to_string())
}

fn malformed(line: &str) -> MemhaError {
    MemhaError::Protocol(format!("malformed reply: {}", line))
}
