use std::fmt;

use serde::Serialize;

/// A 32-bit engine class identifier, e.g. `0x03043000` for a map.
///
/// The low 12 bits of a class id are always zero; they are where chunk ids store
/// their per-class chunk number.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ClassId(u32);

impl ClassId {
    /// Creates a new `ClassId` from its raw value.
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the raw numeric value.
    pub const fn as_u32(&self) -> u32 {
        self.0
    }

    /// Builds the id of chunk `index` belonging to this class.
    pub const fn chunk(&self, index: u16) -> ChunkId {
        ChunkId((self.0 & ChunkId::CLASS_MASK) | (index as u32 & ChunkId::INDEX_MASK))
    }
}

impl fmt::Debug for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ClassId(0x{:08X})", self.0)
    }
}

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X}", self.0)
    }
}

/// A 32-bit chunk identifier: the owning class id plus a 12-bit chunk number.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ChunkId(u32);

impl ChunkId {
    const CLASS_MASK: u32 = 0xFFFF_F000;
    const INDEX_MASK: u32 = 0x0000_0FFF;

    /// Creates a new `ChunkId` from its raw value.
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the raw numeric value.
    pub const fn as_u32(&self) -> u32 {
        self.0
    }

    /// The class component of this chunk id.
    pub const fn class_id(&self) -> ClassId {
        ClassId(self.0 & Self::CLASS_MASK)
    }

    /// The chunk number within its class.
    pub const fn index(&self) -> u16 {
        (self.0 & Self::INDEX_MASK) as u16
    }

    /// Returns the same chunk number re-homed onto `class_id`.
    pub const fn with_class(&self, class_id: ClassId) -> Self {
        Self((class_id.0 & Self::CLASS_MASK) | (self.0 & Self::INDEX_MASK))
    }
}

impl fmt::Debug for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChunkId(0x{:08X})", self.0)
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X}", self.0)
    }
}
