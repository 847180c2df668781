// src/inspector.rs

//! Tools for inspecting the structure of GBX containers.
//! Useful for finding which chunks a schema catalog does not cover yet.

use std::path::Path;

use serde::Serialize;

use crate::api::{Gbx, GbxOptions};
use crate::error::Result;
use crate::graph::{Chunk, ChunkId, ClassId, Node, Payload};
use crate::registry::ClassRegistry;
use crate::writer;

/// A structural report of a GBX container.
#[derive(Debug, Serialize)]
pub struct DebugReport {
    /// Container version.
    pub version: u16,
    /// Root class.
    pub class: ClassInfo,
    /// Node count declared by the container.
    pub num_nodes: u32,
    /// Header chunks in stream order.
    pub header: Vec<ChunkInfo>,
    /// Paths (or resource ids) listed in the external file table.
    pub externals: Vec<String>,
    /// The root node, followed by every indexed body node in index order.
    pub nodes: Vec<NodeInfo>,
    /// Classes the registry does not know.
    pub unknown_classes: Vec<ClassId>,
}

/// A class id and its registered name.
#[derive(Debug, Serialize)]
pub struct ClassInfo {
    /// The class id as stored.
    pub id: ClassId,
    /// Registered engine name, if any.
    pub name: Option<&'static str>,
}

/// Metadata for one node.
#[derive(Debug, Serialize)]
pub struct NodeInfo {
    /// Node index, `None` for the root.
    pub index: Option<u32>,
    /// Node class.
    pub class: ClassInfo,
    /// Chunks in stream order.
    pub chunks: Vec<ChunkInfo>,
}

/// Metadata for one chunk.
#[derive(Debug, Serialize)]
pub struct ChunkInfo {
    /// Chunk id.
    pub id: ChunkId,
    /// Registered chunk name, if any.
    pub name: Option<&'static str>,
    /// Whether the chunk carries a size prefix.
    pub skippable: bool,
    /// "Known", "Deferred" or "Opaque".
    pub state: &'static str,
    /// Raw size of deferred and opaque chunks.
    pub raw_size: Option<usize>,
    /// Version tag of a raw chunk whose handler is registered as versioned.
    pub version: Option<i32>,
}

/// The GBX Inspector tool.
#[derive(Debug)]
pub struct GbxInspector;

impl GbxInspector {
    /// Loads a file and returns a structural report.
    pub fn inspect_file<P: AsRef<Path>>(path: P, options: &GbxOptions) -> Result<DebugReport> {
        let gbx = options.open(path)?;
        Self::inspect(&gbx)
    }

    /// Reports on a loaded container.
    ///
    /// Nodes are enumerated by walking the graph the same way a save does, so the
    /// indices listed are the ones the next save would write.
    pub fn inspect(gbx: &Gbx) -> Result<DebugReport> {
        let registry = gbx.options.registry();
        let header = gbx.header();
        let (_, table) = writer::encode_body(gbx)?;

        let mut nodes = Vec::with_capacity(table.len() + 1);
        nodes.push(Self::inspect_node(registry, None, &gbx.root().borrow()));
        for (index, handle) in table.nodes() {
            nodes.push(Self::inspect_node(registry, Some(index), &handle.borrow()));
        }

        let references = header.references();
        let externals = references
            .entries
            .iter()
            .map(|entry| match references.relative_path(entry) {
                Ok(path) => path.display().to_string(),
                Err(_) => format!("resource #{}", entry.node_index),
            })
            .collect();

        Ok(DebugReport {
            version: header.version(),
            class: Self::class_info(registry, header.class_id()),
            num_nodes: header.num_nodes(),
            header: header
                .chunks()
                .iter()
                .map(|h| Self::chunk_info(registry, &h.chunk))
                .collect(),
            externals,
            nodes,
            unknown_classes: gbx.report().unknown_classes.clone(),
        })
    }

    fn class_info(registry: &ClassRegistry, id: ClassId) -> ClassInfo {
        ClassInfo {
            id,
            name: registry.resolve(id).map(|d| d.name),
        }
    }

    fn inspect_node(registry: &ClassRegistry, index: Option<u32>, node: &Node) -> NodeInfo {
        NodeInfo {
            index,
            class: Self::class_info(registry, node.class_id()),
            chunks: node
                .chunks()
                .iter()
                .map(|c| Self::chunk_info(registry, c))
                .collect(),
        }
    }

    fn chunk_info(registry: &ClassRegistry, chunk: &Chunk) -> ChunkInfo {
        let (state, raw) = match chunk.payload() {
            Payload::Known(_) => ("Known", None),
            Payload::Deferred(d) => ("Deferred", Some(d.bytes())),
            Payload::Opaque(bytes) => ("Opaque", Some(bytes.as_slice())),
        };
        let desc = registry.resolve_chunk(chunk.id());
        let version = raw
            .filter(|_| desc.is_some_and(|d| d.flags.versioned))
            .and_then(|bytes| bytes.first_chunk::<4>())
            .map(|tag| i32::from_le_bytes(*tag));
        ChunkInfo {
            id: chunk.id(),
            name: desc.map(|d| d.name),
            skippable: chunk.is_skippable(),
            state,
            raw_size: raw.map(<[u8]>::len),
            version,
        }
    }
}

impl std::fmt::Display for DebugReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== GBX INSPECTOR REPORT ===")?;
        writeln!(f, "Version:        {}", self.version)?;
        writeln!(f, "Class:          {}", self.class)?;
        writeln!(f, "Declared Nodes: {}", self.num_nodes)?;

        writeln!(f, "\n[HEADER]")?;
        for (i, chunk) in self.header.iter().enumerate() {
            chunk.fmt_line(f, "", i == self.header.len() - 1)?;
        }

        if !self.externals.is_empty() {
            writeln!(f, "\n[EXTERNAL FILES]")?;
            for path in &self.externals {
                writeln!(f, "  {path}")?;
            }
        }

        writeln!(f, "\n[BODY]")?;
        for node in &self.nodes {
            match node.index {
                Some(index) => writeln!(f, "#{index} {}", node.class)?,
                None => writeln!(f, "root {}", node.class)?,
            }
            for (i, chunk) in node.chunks.iter().enumerate() {
                chunk.fmt_line(f, "  ", i == node.chunks.len() - 1)?;
            }
        }
        Ok(())
    }
}

impl std::fmt::Display for ClassInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.name {
            Some(name) => write!(f, "{} ({name})", self.id),
            None => write!(f, "{} (unregistered)", self.id),
        }
    }
}

impl ChunkInfo {
    fn fmt_line(
        &self,
        f: &mut std::fmt::Formatter<'_>,
        prefix: &str,
        is_last: bool,
    ) -> std::fmt::Result {
        let connector = if is_last { "└── " } else { "├── " };
        let size = self
            .raw_size
            .map(|s| format!(" | Size: {s}b"))
            .unwrap_or_default();
        let version = self
            .version
            .map(|v| format!(" | Version: {v}"))
            .unwrap_or_default();
        writeln!(
            f,
            "{}{}[{}] {} {}{}{}{}",
            prefix,
            connector,
            self.state,
            self.id,
            self.name.unwrap_or("?"),
            if self.skippable { " | Skippable" } else { "" },
            size,
            version
        )
    }
}
