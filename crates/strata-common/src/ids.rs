//! ID types for blocks and frames.

use serde::{Deserialize, Serialize};

/// Identifier for a block type.
///
/// Id 0 is reserved for air: never solid, never opaque, never meshed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockId(u16);

impl BlockId {
    /// The reserved air block id.
    pub const AIR: Self = Self(0);

    /// Creates a block id from a raw value.
    #[must_use]
    pub const fn from_raw(value: u16) -> Self {
        Self(value)
    }

    /// Returns the raw id value.
    #[must_use]
    pub const fn raw(self) -> u16 {
        self.0
    }

    /// Checks whether this is the air id.
    #[must_use]
    pub const fn is_air(self) -> bool {
        self.0 == 0
    }
}

impl Default for BlockId {
    fn default() -> Self {
        Self::AIR
    }
}

impl std::fmt::Display for BlockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Block#{}", self.0)
    }
}

/// Monotonic frame identifier for pipelined per-frame work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FrameId(u64);

impl FrameId {
    /// The first frame.
    pub const ZERO: Self = Self(0);

    /// Creates a frame id from a raw value.
    #[must_use]
    pub const fn from_raw(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw frame counter.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Returns the next frame id.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl std::fmt::Display for FrameId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Frame#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_air_is_reserved_zero() {
        assert_eq!(BlockId::AIR.raw(), 0);
        assert!(BlockId::AIR.is_air());
        assert!(!BlockId::from_raw(1).is_air());
    }

    #[test]
    fn test_frame_id_monotonic() {
        let f = FrameId::ZERO;
        assert_eq!(f.next().raw(), 1);
        assert!(f.next() > f);
    }
}
