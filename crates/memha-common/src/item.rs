use crate::error::{MemhaError, Result};

/// Expiration values at or above this many seconds are interpreted by the
/// protocol as an absolute UNIX timestamp rather than a relative offset.
pub const RELATIVE_EXPIRY_LIMIT: u32 = 60 * 60 * 24 * 30;

/// Maximum key length in bytes accepted by memcache servers.
pub const MAX_KEY_LENGTH: usize = 250;

/// An item expiry, carried in the protocol's single `exptime` field.
///
/// The wire encoding overloads one integer: values below
/// [`RELATIVE_EXPIRY_LIMIT`] (30 days) are seconds-until-expiry, values at or
/// above it are an absolute UNIX epoch second. `Expiration` stores the raw
/// protocol value and exposes the distinction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Expiration(u32);

impl Expiration {
    /// Expire `secs` seconds from now.
    ///
    /// Values of 30 days or more cross into absolute-timestamp territory;
    /// use [`Expiration::at_unix`] for those.
    pub fn from_secs(secs: u32) -> Self {
        Expiration(secs)
    }

    /// Expire at the given UNIX epoch second.
    pub fn at_unix(epoch: u32) -> Self {
        Expiration(epoch)
    }

    /// Whether the protocol will read this value as an absolute timestamp.
    pub fn is_absolute(&self) -> bool {
        self.0 >= RELATIVE_EXPIRY_LIMIT
    }

    /// The raw `exptime` value sent on the wire.
    pub fn protocol_secs(&self) -> u32 {
        self.0
    }
}

/// A user-visible cache entry.
///
/// Items are immutable values passed by copy. The CAS token is opaque
/// pass-through: drivers that support it fill it on reads, and repair writes
/// carry it along unchanged; the replication core never interprets it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    /// Cache key, at most [`MAX_KEY_LENGTH`] bytes. The replication core
    /// trusts the caller; the shipped driver validates before the wire.
    pub key: String,
    /// Opaque value bytes.
    pub value: Vec<u8>,
    /// Driver-level flags stored alongside the value and round-tripped on
    /// reads.
    pub flags: u32,
    /// Optional expiry; `None` means the item does not expire.
    pub expiration: Option<Expiration>,
    /// Opaque compare-and-swap token, when the driver supplies one.
    pub cas: Option<u64>,
}

impl Item {
    pub fn new(key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            flags: 0,
            expiration: None,
            cas: None,
        }
    }

    pub fn with_flags(mut self, flags: u32) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_expiration(mut self, expiration: Expiration) -> Self {
        self.expiration = Some(expiration);
        self
    }

    pub fn with_cas(mut self, cas: u64) -> Self {
        self.cas = Some(cas);
        self
    }

    /// The `exptime` value to send for this item (0 = never expires).
    pub fn protocol_expiry(&self) -> u32 {
        self.expiration.map(|e| e.protocol_secs()).unwrap_or(0)
    }
}

/// Checks that a key is legal for the memcache protocol: non-empty, at most
/// 250 bytes, and free of whitespace and control bytes.
pub fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(MemhaError::InvalidKey("empty key".to_string()));
    }
    if key.len() > MAX_KEY_LENGTH {
        return Err(MemhaError::InvalidKey(format!(
            "key length {} exceeds {} bytes",
            key.len(),
            MAX_KEY_LENGTH
        )));
    }
    for &b in key.as_bytes() {
        if b <= b' ' || b == 0x7f {
            return Err(MemhaError::InvalidKey(format!(
                "key contains illegal byte 0x{:02x}",
                b
            )));
        }
    }
    Ok(())
}
