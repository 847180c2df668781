#![allow(dead_code)]

use std::sync::Arc;

use glam::IVec3;
use gbx::{
    Chunk, ChunkFlags, ClassId, ClassRegistry, Gbx, GbxOptions, HeaderChunk, Id, Ident, Node,
    NodeHandle, NodeRef, ReadWrite, TimeInt,
};

pub const BASE: ClassId = ClassId::new(0x0700_1000);
pub const MAP: ClassId = ClassId::new(0x0304_3000);
pub const BLOCK: ClassId = ClassId::new(0x0305_7000);
pub const LEGACY_MAP: ClassId = ClassId::new(0x2400_3000);
pub const UNKNOWN: ClassId = ClassId::new(0x0909_0000);

#[derive(Debug, Default, PartialEq, ReadWrite)]
pub struct HeaderDesc {
    pub ident: Ident,
    pub author: String,
}

#[derive(Debug, Default, PartialEq, ReadWrite)]
pub struct MapInfo {
    pub ident: Ident,
    pub name: String,
}

#[derive(Debug, Default, PartialEq, ReadWrite)]
#[gbx(version(min = 0, max = 3))]
pub struct MapSettings {
    #[gbx(version)]
    pub version: i32,
    pub laps: u32,
    #[gbx(since = 2)]
    pub time_limit: Option<TimeInt>,
}

#[derive(Debug, Default, PartialEq, ReadWrite)]
pub struct MapBlocks {
    pub blocks: Vec<NodeRef>,
}

#[derive(Debug, Default, PartialEq, ReadWrite)]
#[gbx(version(min = 0, max = 1))]
pub struct MapMood {
    #[gbx(version)]
    pub version: i32,
    pub mood: String,
}

#[derive(Debug, Default, PartialEq, ReadWrite)]
pub struct MapStyle {
    pub style: Id,
    pub decoration: Id,
}

/// A versioned chunk whose version tag follows an Id.
#[derive(Debug, Default, PartialEq, ReadWrite)]
#[gbx(version(min = 0, max = 1))]
pub struct MapTheme {
    pub theme: Id,
    #[gbx(version)]
    pub version: i32,
    pub color: String,
}

#[derive(Debug, Default, PartialEq, ReadWrite)]
pub struct BlockData {
    pub name: Id,
    pub coord: IVec3,
    #[gbx(with = "gbx::Codec::byte_bool")]
    pub ground: bool,
}

#[derive(Debug, Default, PartialEq, ReadWrite)]
pub struct BlockNote {
    pub note: String,
}

#[derive(Debug, Default, PartialEq, ReadWrite)]
pub struct BaseComment {
    pub comment: String,
}

/// The registry the fixtures are written against.
pub fn registry() -> Arc<ClassRegistry> {
    let mut b = ClassRegistry::builder();
    b.register_node(BASE, "CMwNod", None);
    b.register_node(MAP, "CGameCtnChallenge", Some(BASE));
    b.register_node(BLOCK, "CGameCtnBlock", Some(BASE));
    b.register_alias(LEGACY_MAP, MAP);

    b.register_chunk::<HeaderDesc>(MAP.chunk(0x05), "Description", ChunkFlags::header());
    b.register_chunk::<MapInfo>(MAP.chunk(0x01), "Info", ChunkFlags::body());
    b.register_chunk::<MapSettings>(
        MAP.chunk(0x02),
        "Settings",
        ChunkFlags::skippable().versioned(),
    );
    b.register_chunk::<MapBlocks>(MAP.chunk(0x03), "Blocks", ChunkFlags::body());
    b.register_chunk::<MapMood>(MAP.chunk(0x04), "Mood", ChunkFlags::body().versioned());
    b.register_chunk::<MapStyle>(MAP.chunk(0x06), "Style", ChunkFlags::skippable());
    b.register_chunk::<MapTheme>(
        MAP.chunk(0x07),
        "Theme",
        ChunkFlags::skippable().versioned(),
    );
    b.register_chunk::<BlockData>(BLOCK.chunk(0x01), "Data", ChunkFlags::body());
    b.register_chunk::<BlockNote>(BLOCK.chunk(0x02), "Note", ChunkFlags::skippable().lazy());
    b.register_chunk::<BaseComment>(BASE.chunk(0x01), "Comment", ChunkFlags::skippable());
    b.build()
}

pub fn options() -> GbxOptions {
    GbxOptions::new(registry())
}

pub fn block(name: &str, x: i32, note: &str) -> NodeHandle {
    let mut node = Node::new(BLOCK);
    node.push_data(
        BLOCK.chunk(0x01),
        false,
        BlockData {
            name: Id::from(name),
            coord: IVec3::new(x, 1, 0),
            ground: true,
        },
    );
    node.push_data(
        BLOCK.chunk(0x02),
        true,
        BlockNote {
            note: note.to_string(),
        },
    );
    node.into_handle()
}

/// A map whose block list references the same road block twice, followed by an
/// unregistered chunk and an inherited one.
pub fn sample_root() -> Node {
    let road = block("StadiumRoad", 0, "start line");
    let grass = block("StadiumGrass", 1, "");

    let mut map = Node::new(MAP);
    map.push_data(
        MAP.chunk(0x01),
        false,
        MapInfo {
            ident: Ident::new("kq3Tx1", "Stadium", "nadeo"),
            name: "A01-Race".to_string(),
        },
    );
    map.push_data(
        MAP.chunk(0x02),
        true,
        MapSettings {
            version: 3,
            laps: 3,
            time_limit: Some(TimeInt(45_000)),
        },
    );
    map.push_data(
        MAP.chunk(0x03),
        false,
        MapBlocks {
            blocks: vec![
                NodeRef::Node(road.clone()),
                NodeRef::Node(grass),
                NodeRef::Node(road),
                NodeRef::Null,
            ],
        },
    );
    map.push(Chunk::opaque(MAP.chunk(0x7F), true, vec![1, 2, 3, 4]));
    map.push_data(
        BASE.chunk(0x01),
        true,
        BaseComment {
            comment: "made for tests".to_string(),
        },
    );
    map
}

pub fn sample_header() -> HeaderChunk {
    HeaderChunk::new(Chunk::known(
        MAP.chunk(0x05),
        true,
        Box::new(HeaderDesc {
            ident: Ident::new("kq3Tx1", "Stadium", "nadeo"),
            author: "nadeo".to_string(),
        }),
    ))
}

pub fn sample() -> Gbx {
    let mut gbx = Gbx::new(sample_root(), options());
    gbx.header_chunks_mut().push(sample_header());
    gbx
}

pub fn sample_bytes() -> Vec<u8> {
    sample().to_bytes().expect("sample map encodes")
}

/// Encodes a single-node container whose root carries `chunks`.
pub fn container(class: ClassId, chunks: Vec<Chunk>) -> Vec<u8> {
    let mut root = Node::new(class);
    for chunk in chunks {
        root.push(chunk);
    }
    Gbx::new(root, options())
        .to_bytes()
        .expect("container encodes")
}
