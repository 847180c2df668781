//! Interned identifiers ("Ids") and their per-scope lookback table.
//!
//! Short names that repeat throughout a container (block names, collections, authors)
//! are stored once per scope. The first occurrence serializes the literal string; later
//! occurrences serialize only a 1-based index into the scope's table.
//!
//! ## Wire layout
//!
//! ```text
//! [Id version u32]   only before the first Id of a scope, always >= 3
//! [Id word u32]      0xFFFFFFFF         -> empty
//!                    top two bits clear  -> numeric Id (e.g. a collection number)
//!                    0x40000000 / 0x80000000 with zero index -> literal follows
//!                    otherwise low 30 bits -> 1-based table index
//! [string]           i32 length + UTF-8, only after a literal marker
//! ```
//!
//! A named Id read from a file remembers its exact word, so a save writes the same
//! marker (or the same repeated literal) back even where a fresh encoder would pick a
//! shorter form.

use std::collections::HashMap;
use std::fmt;
use std::hash::{BuildHasher, Hash, Hasher};
use std::ops::Deref;

use serde::{Serialize, Serializer};
use twox_hash::XxHash64;

use crate::error::{GbxError, Result};
use crate::io::{ByteReader, ByteWriter};

/// The Id version written before the first Id of every scope.
pub const ID_VERSION: u32 = 3;

const EMPTY_WORD: u32 = 0xFFFF_FFFF;
const FLAG_MASK: u32 = 0xC000_0000;
const INDEX_MASK: u32 = 0x3FFF_FFFF;
const STRING_FLAG: u32 = 0x4000_0000;

/// An interned identifier.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize)]
pub enum Id {
    /// The empty Id.
    #[default]
    Empty,
    /// A named Id, stored through the lookback table.
    Name(IdName),
    /// A numeric Id, used by the engine for well-known collections.
    Number(u32),
}

impl Id {
    /// Creates a named Id.
    pub fn name(s: impl Into<String>) -> Self {
        Self::Name(IdName::new(s.into()))
    }

    /// Returns the name, if this is a named Id.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Name(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Returns true for [`Id::Empty`].
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }
}

impl From<&str> for Id {
    fn from(s: &str) -> Self {
        if s.is_empty() { Self::Empty } else { Self::name(s) }
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => Ok(()),
            Self::Name(s) => f.write_str(s),
            Self::Number(n) => write!(f, "#{n}"),
        }
    }
}

/// The text of a named Id.
///
/// Equality, hashing and serialization only look at the text. The word the name was
/// read from is kept as an encoding hint.
#[derive(Clone, Default)]
pub struct IdName {
    text: String,
    word: Option<u32>,
}

impl IdName {
    /// A name with no encoding hint.
    pub fn new(text: String) -> Self {
        Self { text, word: None }
    }

    fn read(text: String, word: u32) -> Self {
        Self {
            text,
            word: Some(word),
        }
    }

    /// The name.
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// The Id word this name was decoded from, if it came from a file.
    pub fn word(&self) -> Option<u32> {
        self.word
    }
}

impl Deref for IdName {
    type Target = str;

    fn deref(&self) -> &str {
        &self.text
    }
}

impl PartialEq for IdName {
    fn eq(&self, other: &Self) -> bool {
        self.text == other.text
    }
}

impl Eq for IdName {}

impl Hash for IdName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.text.hash(state);
    }
}

impl fmt::Debug for IdName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.text, f)
    }
}

impl Serialize for IdName {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.text)
    }
}

/// The composite identifier of a resource: name, collection and author.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize)]
pub struct Ident {
    /// Resource name or uid.
    pub id: Id,
    /// Collection (environment) the resource belongs to.
    pub collection: Id,
    /// Author login.
    pub author: Id,
}

impl Ident {
    /// Creates an ident from its three parts.
    pub fn new(id: impl Into<Id>, collection: impl Into<Id>, author: impl Into<Id>) -> Self {
        Self {
            id: id.into(),
            collection: collection.into(),
            author: author.into(),
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
struct SeededXxHash;

impl BuildHasher for SeededXxHash {
    type Hasher = XxHash64;

    fn build_hasher(&self) -> XxHash64 {
        XxHash64::with_seed(0)
    }
}

/// One lookback scope.
///
/// A table lives inside exactly one codec and is never shared between containers. Its
/// length only grows within a scope.
#[derive(Clone, Debug, Default)]
pub struct IdTable {
    version: Option<u32>,
    strings: Vec<String>,
    positions: HashMap<String, u32, SeededXxHash>,
}

impl IdTable {
    /// Creates an empty scope.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of strings interned in this scope.
    pub fn len(&self) -> usize {
        self.strings.len()
    }

    /// Returns true if nothing has been interned yet.
    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }

    /// Looks up a 1-based index.
    pub fn get(&self, index: u32) -> Option<&str> {
        let slot = usize::try_from(index).ok()?.checked_sub(1)?;
        self.strings.get(slot).map(String::as_str)
    }

    /// The Id version read or written in this scope, if any Id was seen yet.
    pub fn version(&self) -> Option<u32> {
        self.version
    }

    /// Strings interned after the table had `len` entries.
    pub(crate) fn since(&self, len: usize) -> Vec<String> {
        self.strings.get(len..).map(<[String]>::to_vec).unwrap_or_default()
    }

    /// Re-applies growth that happened while reading bytes the writer emits raw.
    pub(crate) fn replay(&mut self, version: Option<u32>, strings: &[String]) {
        if self.version.is_none() {
            self.version = version;
        }
        for s in strings {
            self.push(s.clone());
        }
    }

    fn push(&mut self, s: String) -> u32 {
        let index = self.strings.len() as u32 + 1;
        self.positions.entry(s.clone()).or_insert(index);
        self.strings.push(s);
        index
    }

    /// Decodes one Id.
    pub fn read(&mut self, r: &mut ByteReader<'_>) -> Result<Id> {
        if self.version.is_none() {
            let version = r.read_u32()?;
            if version < ID_VERSION {
                return Err(GbxError::Format(format!(
                    "Id version {version} is older than {ID_VERSION}"
                )));
            }
            self.version = Some(version);
        }

        let word = r.read_u32()?;
        if word == EMPTY_WORD {
            return Ok(Id::Empty);
        }
        if word & FLAG_MASK == 0 {
            return Ok(Id::Number(word));
        }

        let index = word & INDEX_MASK;
        if index == 0 {
            let s = r.read_string()?;
            self.push(s.clone());
            return Ok(Id::Name(IdName::read(s, word)));
        }

        match self.get(index) {
            Some(s) => Ok(Id::Name(IdName::read(s.to_owned(), word))),
            None => Err(GbxError::Reference(format!(
                "Id index {index} outside table of {} entries",
                self.strings.len()
            ))),
        }
    }

    /// Encodes one Id, interning new names.
    ///
    /// A name that carries the word it was read with is written with that word again
    /// when the word is still valid here: a literal marker always is, an index only
    /// while it points at the same text.
    pub fn write(&mut self, w: &mut ByteWriter, id: &Id) -> Result<()> {
        if self.version.is_none() {
            w.write_u32(ID_VERSION);
            self.version = Some(ID_VERSION);
        }

        match id {
            Id::Empty => w.write_u32(EMPTY_WORD),
            Id::Number(n) => {
                if n & FLAG_MASK != 0 {
                    return Err(GbxError::Format(format!(
                        "numeric Id 0x{n:08X} collides with the string flags"
                    )));
                }
                w.write_u32(*n);
            }
            Id::Name(name) => {
                let hint = name.word.filter(|&word| {
                    let index = word & INDEX_MASK;
                    index == 0 || self.get(index) == Some(name.as_str())
                });
                let known = self.positions.get(name.as_str()).copied();
                match (hint, known) {
                    (Some(word), _) if word & INDEX_MASK != 0 => w.write_u32(word),
                    (Some(_), _) | (None, None) => {
                        w.write_u32(hint.unwrap_or(STRING_FLAG));
                        w.write_string(name)?;
                        self.push(name.text.clone());
                    }
                    (None, Some(index)) => w.write_u32(STRING_FLAG | index),
                }
            }
        }
        Ok(())
    }
}
