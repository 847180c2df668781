//! The bidirectional codec context.
//!
//! Every chunk handler is a single routine that serves both directions. It receives a
//! [`Codec`] and calls one operation per field, passing the field by mutable
//! reference: when the codec is reading, the operation decodes into the field; when it
//! is writing, it encodes from it.
//!
//! ```rust
//! use gbx::{Codec, ReadWrite, Result};
//!
//! #[derive(Debug, Default, PartialEq)]
//! struct Checkpoint {
//!     version: i32,
//!     order: u32,
//!     tag: String,
//! }
//!
//! impl ReadWrite for Checkpoint {
//!     fn read_write(&mut self, ctx: &mut Codec<'_>) -> Result<()> {
//!         ctx.chunk_version(&mut self.version, 0, 1)?;
//!         ctx.u32(&mut self.order)?;
//!         if self.version >= 1 {
//!             ctx.string(&mut self.tag)?;
//!         }
//!         Ok(())
//!     }
//! }
//! ```
//!
//! Most handlers do not need to be written by hand: `#[derive(ReadWrite)]` generates
//! the same code from the struct definition.

mod field;
mod time;

pub use field::Field;
pub use time::{TimeInt, TimeSingle};

use std::sync::Arc;

use glam::{IVec3, Quat, Vec2, Vec3, Vec4};

use crate::engine::{EngineSettings, LoadReport};
use crate::error::{GbxError, Result};
use crate::ident::{Id, IdTable, Ident};
use crate::io::{ByteReader, ByteWriter};
use crate::reference::NodeTable;
use crate::registry::ClassRegistry;

/// A field routine that works in both directions.
pub trait ReadWrite {
    /// Decodes into `self` or encodes from `self`, depending on `ctx.direction()`.
    fn read_write(&mut self, ctx: &mut Codec<'_>) -> Result<()>;

    /// Whether coding this type can read or extend the Id and node lookback tables.
    ///
    /// Chunks registered as lazy are only deferred when this returns false, because a
    /// deferred payload is skipped during load and later chunks must still see every
    /// Id and node it declares. Hand-written handlers keep the conservative default;
    /// `#[derive(ReadWrite)]` computes it from the field types.
    fn uses_lookback() -> bool
    where
        Self: Sized,
    {
        true
    }
}

/// The direction a [`Codec`] operates in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Decoding from bytes into values.
    Read,
    /// Encoding values into bytes.
    Write,
}

#[derive(Debug)]
pub(crate) enum Stream<'a> {
    Read(ByteReader<'a>),
    Write(ByteWriter),
}

/// The state shared by every field operation of one section (header chunk or body).
///
/// Owns the byte cursor, the current Id lookback scope, and the node table used to
/// resolve back-references.
#[derive(Debug)]
pub struct Codec<'a> {
    stream: Stream<'a>,
    pub(crate) base: usize,
    pub(crate) ids: IdTable,
    pub(crate) nodes: NodeTable,
    pub(crate) registry: Arc<ClassRegistry>,
    pub(crate) settings: EngineSettings,
    pub(crate) depth: usize,
    pub(crate) report: LoadReport,
}

macro_rules! primitive {
    ($(#[$doc:meta])* $name:ident, $ty:ty, $read:ident, $write:ident) => {
        $(#[$doc])*
        pub fn $name(&mut self, v: &mut $ty) -> Result<()> {
            match &mut self.stream {
                Stream::Read(r) => *v = r.$read()?,
                Stream::Write(w) => w.$write(*v),
            }
            Ok(())
        }
    };
}

impl<'a> Codec<'a> {
    /// A codec decoding `data` with default engine settings.
    pub fn reader(data: &'a [u8], registry: Arc<ClassRegistry>) -> Self {
        Self::with_stream(
            Stream::Read(ByteReader::new(data)),
            registry,
            EngineSettings::default(),
        )
    }

    /// A codec encoding into a fresh buffer with default engine settings.
    pub fn writer(registry: Arc<ClassRegistry>) -> Codec<'static> {
        Codec::with_stream(
            Stream::Write(ByteWriter::new()),
            registry,
            EngineSettings::default(),
        )
    }

    pub(crate) fn with_stream(
        stream: Stream<'a>,
        registry: Arc<ClassRegistry>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            stream,
            base: 0,
            ids: IdTable::new(),
            nodes: NodeTable::default(),
            registry,
            settings,
            depth: 0,
            report: LoadReport::default(),
        }
    }

    /// The direction this codec operates in.
    pub fn direction(&self) -> Direction {
        match self.stream {
            Stream::Read(_) => Direction::Read,
            Stream::Write(_) => Direction::Write,
        }
    }

    /// Shorthand for `direction() == Direction::Read`.
    pub fn is_reading(&self) -> bool {
        self.direction() == Direction::Read
    }

    /// Shorthand for `direction() == Direction::Write`.
    pub fn is_writing(&self) -> bool {
        self.direction() == Direction::Write
    }

    /// Offset from the start of the section being decoded or encoded.
    pub fn position(&self) -> usize {
        self.base
            + match &self.stream {
                Stream::Read(r) => r.position(),
                Stream::Write(w) => w.position(),
            }
    }

    /// The class catalog this codec dispatches through.
    pub fn registry(&self) -> &Arc<ClassRegistry> {
        &self.registry
    }

    /// The current Id lookback scope.
    pub fn id_table(&self) -> &IdTable {
        &self.ids
    }

    pub(crate) fn reader_mut(&mut self) -> Result<&mut ByteReader<'a>> {
        match &mut self.stream {
            Stream::Read(r) => Ok(r),
            Stream::Write(_) => Err(GbxError::format("codec is writing, not reading")),
        }
    }

    pub(crate) fn writer_mut(&mut self) -> Result<&mut ByteWriter> {
        match &mut self.stream {
            Stream::Write(w) => Ok(w),
            Stream::Read(_) => Err(GbxError::format("codec is reading, not writing")),
        }
    }

    /// Runs `f` with the stream temporarily replaced by a reader over `data`, which
    /// starts at section offset `base`. Returns `f`'s output and the unread byte count.
    pub(crate) fn with_sub_reader<T>(
        &mut self,
        data: &'a [u8],
        base: usize,
        f: impl FnOnce(&mut Self) -> Result<T>,
    ) -> Result<(T, usize)> {
        let outer = std::mem::replace(&mut self.stream, Stream::Read(ByteReader::new(data)));
        let outer_base = std::mem::replace(&mut self.base, base);
        let result = f(self);
        let remaining = match &self.stream {
            Stream::Read(r) => r.remaining(),
            Stream::Write(_) => 0,
        };
        self.stream = outer;
        self.base = outer_base;
        result.map(|out| (out, remaining))
    }

    /// Consumes the codec and returns the encoded bytes.
    pub fn into_bytes(self) -> Result<Vec<u8>> {
        match self.stream {
            Stream::Write(w) => Ok(w.into_inner()),
            Stream::Read(_) => Err(GbxError::format("codec is reading, not writing")),
        }
    }

    /// Returns true once a reading codec has consumed its whole input.
    pub fn at_end(&self) -> bool {
        match &self.stream {
            Stream::Read(r) => r.is_empty(),
            Stream::Write(_) => false,
        }
    }

    /// The unread tail of a reading codec.
    pub(crate) fn rest(&self) -> &'a [u8] {
        match &self.stream {
            Stream::Read(r) => r.rest(),
            Stream::Write(_) => &[],
        }
    }

    primitive!(
        /// A single byte.
        u8, u8, read_u8, write_u8
    );
    primitive!(
        /// A 16-bit unsigned integer.
        u16, u16, read_u16, write_u16
    );
    primitive!(
        /// A 32-bit unsigned integer.
        u32, u32, read_u32, write_u32
    );
    primitive!(
        /// A 32-bit signed integer.
        i32, i32, read_i32, write_i32
    );
    primitive!(
        /// A 64-bit unsigned integer.
        u64, u64, read_u64, write_u64
    );
    primitive!(
        /// An IEEE-754 single precision float.
        f32, f32, read_f32, write_f32
    );

    /// A boolean stored as a 32-bit word.
    ///
    /// Any non-zero word decodes as `true`; `true` always encodes as `1`.
    pub fn boolean(&mut self, v: &mut bool) -> Result<()> {
        let mut word = u32::from(*v);
        self.u32(&mut word)?;
        *v = word != 0;
        Ok(())
    }

    /// A boolean stored as a single byte.
    pub fn byte_bool(&mut self, v: &mut bool) -> Result<()> {
        let mut byte = u8::from(*v);
        self.u8(&mut byte)?;
        *v = byte != 0;
        Ok(())
    }

    /// Two consecutive floats.
    pub fn vec2(&mut self, v: &mut Vec2) -> Result<()> {
        self.f32(&mut v.x)?;
        self.f32(&mut v.y)
    }

    /// Three consecutive floats.
    pub fn vec3(&mut self, v: &mut Vec3) -> Result<()> {
        self.f32(&mut v.x)?;
        self.f32(&mut v.y)?;
        self.f32(&mut v.z)
    }

    /// Four consecutive floats.
    pub fn vec4(&mut self, v: &mut Vec4) -> Result<()> {
        self.f32(&mut v.x)?;
        self.f32(&mut v.y)?;
        self.f32(&mut v.z)?;
        self.f32(&mut v.w)
    }

    /// A quaternion stored as `x y z w`.
    pub fn quat(&mut self, v: &mut Quat) -> Result<()> {
        let mut raw = Vec4::from(v.to_array());
        self.vec4(&mut raw)?;
        *v = Quat::from_xyzw(raw.x, raw.y, raw.z, raw.w);
        Ok(())
    }

    /// Three consecutive 32-bit signed integers, e.g. block coordinates.
    pub fn int3(&mut self, v: &mut IVec3) -> Result<()> {
        self.i32(&mut v.x)?;
        self.i32(&mut v.y)?;
        self.i32(&mut v.z)
    }

    /// A duration in milliseconds, `-1` meaning none.
    pub fn time_int(&mut self, v: &mut TimeInt) -> Result<()> {
        self.i32(&mut v.0)
    }

    /// A duration in seconds, `-1.0` meaning none.
    pub fn time_single(&mut self, v: &mut TimeSingle) -> Result<()> {
        self.f32(&mut v.0)
    }

    /// A plain `i32`-length-prefixed UTF-8 string.
    ///
    /// Plain strings never go through the Id table; use [`id`](Self::id) for
    /// interned names.
    pub fn string(&mut self, v: &mut String) -> Result<()> {
        match &mut self.stream {
            Stream::Read(r) => *v = r.read_string()?,
            Stream::Write(w) => w.write_string(v)?,
        }
        Ok(())
    }

    /// An `i32`-count-prefixed byte array.
    pub fn bytes(&mut self, v: &mut Vec<u8>) -> Result<()> {
        match &mut self.stream {
            Stream::Read(r) => {
                let len = r.read_count("byte array")?;
                *v = r.take_declared(len, "byte array")?.to_vec();
            }
            Stream::Write(w) => {
                w.write_count(v.len(), "byte array")?;
                w.write_bytes(v);
            }
        }
        Ok(())
    }

    /// A byte block whose length is known from context rather than a prefix.
    pub fn fixed(&mut self, v: &mut [u8]) -> Result<()> {
        match &mut self.stream {
            Stream::Read(r) => v.copy_from_slice(r.take(v.len())?),
            Stream::Write(w) => w.write_bytes(v),
        }
        Ok(())
    }

    /// An interned identifier, resolved through the current lookback scope.
    pub fn id(&mut self, v: &mut Id) -> Result<()> {
        match &mut self.stream {
            Stream::Read(r) => *v = self.ids.read(r)?,
            Stream::Write(w) => self.ids.write(w, v)?,
        }
        Ok(())
    }

    /// The `{name, collection, author}` identifier triple.
    pub fn ident(&mut self, v: &mut Ident) -> Result<()> {
        self.id(&mut v.id)?;
        self.id(&mut v.collection)?;
        self.id(&mut v.author)
    }

    /// Any [`Field`] value.
    pub fn field<T: Field + ?Sized>(&mut self, v: &mut T) -> Result<()> {
        v.field(self)
    }

    /// An `i32`-count-prefixed list, coding each element with `f`.
    ///
    /// A negative count is a format error, and so is a count whose elements run past
    /// the end of the section. Elements may encode to zero bytes.
    pub fn array<T: Default>(
        &mut self,
        items: &mut Vec<T>,
        mut f: impl FnMut(&mut Self, &mut T) -> Result<()>,
    ) -> Result<()> {
        match self.direction() {
            Direction::Read => {
                let r = self.reader_mut()?;
                let count = r.read_count("array")?;
                items.clear();
                items.reserve(count.min(r.remaining()));
                for read in 0..count {
                    let mut item = T::default();
                    f(self, &mut item).map_err(|e| {
                        if e.is_eof() {
                            GbxError::Format(format!(
                                "array declares {count} elements but the section ends after {read}"
                            ))
                        } else {
                            e
                        }
                    })?;
                    items.push(item);
                }
            }
            Direction::Write => {
                self.writer_mut()?.write_count(items.len(), "array")?;
                for item in items.iter_mut() {
                    f(self, item)?;
                }
            }
        }
        Ok(())
    }

    /// A handler's own version tag.
    ///
    /// When reading, a value below `min` raises [`GbxError::UnsupportedVersion`] and a
    /// value above `max` raises [`GbxError::UnseenVersion`]. When writing, the stored
    /// value is emitted unchanged: a version read from a file is never upgraded or
    /// downgraded.
    pub fn chunk_version(&mut self, version: &mut i32, min: i32, max: i32) -> Result<()> {
        self.i32(version)?;
        if self.is_reading() {
            if *version < min {
                return Err(GbxError::UnsupportedVersion {
                    version: *version,
                    min,
                });
            }
            if *version > max {
                return Err(GbxError::UnseenVersion {
                    version: *version,
                    max,
                });
            }
        }
        Ok(())
    }

    /// A size-prefixed block with its own Id lookback scope.
    ///
    /// The block is `[size u32][payload]`; Ids inside the payload neither see nor
    /// extend the enclosing scope. When reading, `f` must consume the payload exactly.
    pub fn encapsulated(&mut self, f: impl FnOnce(&mut Self) -> Result<()>) -> Result<()> {
        let outer_ids = std::mem::take(&mut self.ids);
        let result = self.encapsulated_inner(f);
        self.ids = outer_ids;
        result
    }

    fn encapsulated_inner(&mut self, f: impl FnOnce(&mut Self) -> Result<()>) -> Result<()> {
        match self.direction() {
            Direction::Read => {
                let base = self.base;
                let r = self.reader_mut()?;
                let len = r.read_u32()? as usize;
                let start = base + r.position();
                let data = r.take_declared(len, "encapsulated block")?;
                let ((), remaining) = self.with_sub_reader(data, start, f)?;
                if remaining != 0 {
                    return Err(GbxError::Format(format!(
                        "encapsulated block left {remaining} of {len} bytes unread"
                    )));
                }
                Ok(())
            }
            Direction::Write => {
                let w = self.writer_mut()?;
                let at = w.reserve_u32();
                let start = w.position();
                f(self)?;
                self.writer_mut()?.patch_len_since(at, start)
            }
        }
    }
}
