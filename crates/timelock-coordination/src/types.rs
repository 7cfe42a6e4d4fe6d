//! Shared types for the consistency core.

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;
use uuid::Uuid;

/// Half-open range `[lower, upper)` of allocated timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimestampRange {
    lower: u64,
    upper: u64,
}

impl TimestampRange {
    /// Create a range. `upper` must not be below `lower`.
    pub fn new(lower: u64, upper: u64) -> Self {
        debug_assert!(lower <= upper, "TimestampRange: lower {lower} > upper {upper}");
        Self {
            lower,
            upper: upper.max(lower),
        }
    }

    /// First timestamp in the range.
    pub fn lower(&self) -> u64 {
        self.lower
    }

    /// One past the last timestamp in the range.
    pub fn upper(&self) -> u64 {
        self.upper
    }

    pub fn len(&self) -> u64 {
        self.upper - self.lower
    }

    pub fn is_empty(&self) -> bool {
        self.lower == self.upper
    }

    pub fn contains(&self, timestamp: u64) -> bool {
        self.lower <= timestamp && timestamp < self.upper
    }
}

impl fmt::Display for TimestampRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.lower, self.upper)
    }
}

/// Network address of a timelock node, used to redirect clients to the leader.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LeaderAddress {
    pub host: String,
    pub port: u16,
}

impl LeaderAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for LeaderAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for LeaderAddress {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, port) = s.rsplit_once(':').ok_or_else(|| format!("missing port in '{s}'"))?;
        if host.is_empty() {
            return Err(format!("missing host in '{s}'"));
        }
        let port = port.parse::<u16>().map_err(|e| format!("invalid port in '{s}': {e}"))?;
        Ok(Self::new(host, port))
    }
}

/// Server-issued identifier of one lock grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LockToken(pub Uuid);

impl LockToken {
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for LockToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Fencing token attached to a lock grant.
///
/// Strictly increases every time the lock changes hands. Downstream services
/// reject operations carrying a token older than the newest they have seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FencingToken(pub u64);

impl FencingToken {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for FencingToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FencingToken({})", self.0)
    }
}

/// Lock record stored in the KV store.
///
/// Serialized as JSON for human readability and debugging.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LockEntry {
    /// Identifier of the holder (for elections, the holder's address).
    pub holder_id: String,
    /// Identifier of this particular grant.
    pub lock_id: LockToken,
    /// Monotonically increasing token for fencing.
    pub fencing_token: u64,
    /// When the lock was acquired (Unix timestamp milliseconds).
    pub acquired_at_ms: u64,
    /// TTL in milliseconds.
    pub ttl_ms: u64,
    /// Deadline in Unix milliseconds; 0 means released.
    pub deadline_ms: u64,
}

impl LockEntry {
    /// Create a released entry (preserves the fencing token for history).
    pub fn released(&self) -> Self {
        Self {
            holder_id: String::new(),
            lock_id: self.lock_id,
            fencing_token: self.fencing_token,
            acquired_at_ms: self.acquired_at_ms,
            ttl_ms: 0,
            deadline_ms: 0,
        }
    }
}

/// Get current Unix timestamp in milliseconds.
///
/// Returns 0 if system time is before UNIX epoch instead of panicking.
#[inline]
pub fn now_unix_ms() -> u64 {
    use std::time::SystemTime;
    use std::time::UNIX_EPOCH;
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or(0)
}
