#![allow(missing_docs)]

mod common;

use std::rc::Rc;

use common::*;
use gbx::io::ByteWriter;
use gbx::{Chunk, Compression, Gbx, Id, Ident, Node, NodeRef};

/// Bytes -> graph -> bytes with no edits reproduces the input.
#[test]
fn test_unmodified_roundtrip_is_byte_exact() -> gbx::Result<()> {
    let original = sample_bytes();

    let mut loaded = options().load(&original)?;
    assert_eq!(loaded.to_bytes()?, original);

    let mut eager = options().discover_lazily(false).load(&original)?;
    assert_eq!(eager.to_bytes()?, original);
    Ok(())
}

#[test]
fn test_uncompressed_body_roundtrip() -> gbx::Result<()> {
    let mut gbx = sample();
    gbx.preamble_mut().body_compression = Compression::Uncompressed;
    let original = gbx.to_bytes()?;

    let mut loaded = options().load(&original)?;
    assert_eq!(
        loaded.header().preamble().body_compression,
        Compression::Uncompressed
    );
    assert_eq!(loaded.to_bytes()?, original);
    Ok(())
}

/// graph -> bytes -> graph yields a structurally equal graph.
#[test]
fn test_graph_roundtrip_is_structurally_equal() -> gbx::Result<()> {
    let bytes = sample_bytes();
    let loaded = options().discover_lazily(false).load(&bytes)?;

    assert!(*loaded.root().borrow() == sample_root());
    let expected = sample_header();
    assert_eq!(
        loaded.header().get::<HeaderDesc>(),
        expected.chunk.data::<HeaderDesc>()
    );
    assert_eq!(loaded.header().num_nodes(), 2);
    Ok(())
}

#[test]
fn test_known_chunks_decode_to_their_types() -> gbx::Result<()> {
    let loaded = options().load(&sample_bytes())?;
    let root = loaded.root().borrow();

    let info = root.get::<MapInfo>().expect("info chunk");
    assert_eq!(info.name, "A01-Race");
    assert_eq!(info.ident.collection.as_str(), Some("Stadium"));

    let settings = root.get::<MapSettings>().expect("settings chunk");
    assert_eq!(settings.version, 3);
    assert_eq!(settings.time_limit.map(|t| t.0), Some(45_000));

    let comment = root.get::<BaseComment>().expect("inherited chunk");
    assert_eq!(comment.comment, "made for tests");
    Ok(())
}

/// Unregistered chunks keep their bytes and their position among known siblings.
#[test]
fn test_unregistered_chunk_keeps_order_and_bytes() -> gbx::Result<()> {
    let loaded = options().load(&sample_bytes())?;
    let root = loaded.root().borrow();

    let ids: Vec<u16> = root.chunks().iter().map(|c| c.id().index()).collect();
    assert_eq!(ids, vec![0x01, 0x02, 0x03, 0x7F, 0x01]);

    let opaque = root.chunk(MAP.chunk(0x7F)).expect("opaque chunk");
    assert!(opaque.is_opaque());
    assert_eq!(opaque, &Chunk::opaque(MAP.chunk(0x7F), true, vec![1, 2, 3, 4]));

    let report = loaded.report();
    assert_eq!(report.opaque.len(), 1);
    assert_eq!(report.degraded().count(), 0);
    Ok(())
}

/// Ids keep the word they were stored with: an 0x80000000 literal, a repeated literal
/// for a name already in the table, and a flagged back-reference to the repeat.
#[test]
fn test_id_words_are_written_as_read() -> gbx::Result<()> {
    let mut style = ByteWriter::new();
    style.write_u32(3);
    style.write_u32(0x8000_0000);
    style.write_string("Road")?;
    style.write_u32(0x4000_0000);
    style.write_string("Road")?;

    let mut info = ByteWriter::new();
    info.write_u32(0x8000_0002);
    info.write_u32(26);
    info.write_u32(0xFFFF_FFFF);
    info.write_string("x")?;

    let bytes = container(
        MAP,
        vec![
            Chunk::opaque(MAP.chunk(0x06), true, style.into_inner()),
            Chunk::opaque(MAP.chunk(0x01), false, info.into_inner()),
        ],
    );

    let mut loaded = options().load(&bytes)?;
    {
        let root = loaded.root().borrow();
        let style = root.get::<MapStyle>().expect("style chunk");
        assert_eq!(style.style, Id::from("Road"));
        assert_eq!(style.decoration, Id::from("Road"));
        let info = root.get::<MapInfo>().expect("info chunk");
        assert_eq!(info.ident, Ident::new("Road", Id::Number(26), Id::Empty));
        match &info.ident.id {
            Id::Name(name) => assert_eq!(name.word(), Some(0x8000_0002)),
            other => panic!("expected a named Id, got {other:?}"),
        }
    }
    assert_eq!(loaded.to_bytes()?, bytes);

    // A fresh Id with the same text still uses the short form.
    let mut root = Node::new(MAP);
    root.push_data(
        MAP.chunk(0x06),
        true,
        MapStyle {
            style: Id::from("Road"),
            decoration: Id::from("Road"),
        },
    );
    let fresh = Gbx::new(root, options()).to_bytes()?;
    let mut short = ByteWriter::new();
    short.write_u32(3);
    short.write_u32(0x4000_0000);
    short.write_string("Road")?;
    short.write_u32(0x4000_0001);
    let expected = container(MAP, vec![Chunk::opaque(MAP.chunk(0x06), true, short.into_inner())]);
    assert_eq!(fresh, expected);
    Ok(())
}

#[test]
fn test_back_reference_shares_the_node() -> gbx::Result<()> {
    let loaded = options().load(&sample_bytes())?;
    let root = loaded.root().borrow();
    let blocks = &root.get::<MapBlocks>().expect("blocks chunk").blocks;

    assert_eq!(blocks.len(), 4);
    let first = blocks[0].as_node().expect("inline node");
    let third = blocks[2].as_node().expect("back-reference");
    assert!(Rc::ptr_eq(first, third));
    assert!(!Rc::ptr_eq(first, blocks[1].as_node().expect("inline node")));
    assert!(blocks[3].is_null());

    assert_eq!(first.borrow().source_index(), Some(0));
    Ok(())
}

/// A mutation through one alias is visible through the other and survives a save.
#[test]
fn test_mutation_through_alias_survives_save() -> gbx::Result<()> {
    let mut loaded = options().load(&sample_bytes())?;
    {
        let root = loaded.root().borrow();
        let blocks = &root.get::<MapBlocks>().expect("blocks chunk").blocks;
        let first = blocks[0].as_node().expect("inline node");
        first
            .borrow_mut()
            .get_mut::<BlockData>()
            .expect("block data")
            .coord
            .x = 31;
        let third = blocks[2].as_node().expect("back-reference").borrow();
        assert_eq!(third.get::<BlockData>().expect("block data").coord.x, 31);
    }

    let bytes = loaded.to_bytes()?;
    let reloaded = options().load(&bytes)?;
    let root = reloaded.root().borrow();
    let blocks = &root.get::<MapBlocks>().expect("blocks chunk").blocks;
    let first = blocks[0].as_node().expect("inline node");
    assert!(Rc::ptr_eq(first, blocks[2].as_node().expect("back-reference")));
    assert_eq!(first.borrow().get::<BlockData>().expect("block data").coord.x, 31);
    Ok(())
}

#[test]
fn test_edits_are_written() -> gbx::Result<()> {
    let mut loaded = options().load(&sample_bytes())?;
    {
        let mut root = loaded.root().borrow_mut();
        root.get_mut::<MapInfo>().expect("info chunk").name = "A02-Race".to_string();
        root.get_mut::<MapSettings>().expect("settings chunk").laps = 5;
    }

    let reloaded = options().load(&loaded.to_bytes()?)?;
    let root = reloaded.root().borrow();
    assert_eq!(root.get::<MapInfo>().expect("info chunk").name, "A02-Race");
    assert_eq!(root.get::<MapSettings>().expect("settings chunk").laps, 5);
    Ok(())
}

/// A slot replaced by a fresh node is written inline and given a free index.
#[test]
fn test_new_node_gets_free_index() -> gbx::Result<()> {
    let mut loaded = options().load(&sample_bytes())?;
    {
        let mut root = loaded.root().borrow_mut();
        let blocks = &mut root.get_mut::<MapBlocks>().expect("blocks chunk").blocks;
        blocks[3] = NodeRef::Node(block("StadiumDirt", 7, "new"));
    }

    let bytes = loaded.to_bytes()?;
    let reloaded = options().load(&bytes)?;
    assert_eq!(reloaded.header().num_nodes(), 3);

    let root = reloaded.root().borrow();
    let blocks = &root.get::<MapBlocks>().expect("blocks chunk").blocks;
    let added = blocks[3].as_node().expect("inline node").borrow();
    assert_eq!(added.source_index(), Some(2));
    assert_eq!(added.get::<BlockData>().expect("block data").coord.x, 7);
    Ok(())
}

#[test]
fn test_unknown_class_roundtrips() -> gbx::Result<()> {
    let mut stranger = Node::new(UNKNOWN);
    stranger.push(Chunk::opaque(UNKNOWN.chunk(0x01), true, vec![9; 12]));
    stranger.push(Chunk::opaque(UNKNOWN.chunk(0x02), true, Vec::new()));

    let mut root = Node::new(MAP);
    root.push_data(
        MAP.chunk(0x03),
        false,
        MapBlocks {
            blocks: vec![NodeRef::new(stranger)],
        },
    );
    let original = Gbx::new(root, options()).to_bytes()?;

    let mut loaded = options().load(&original)?;
    assert_eq!(loaded.report().unknown_classes, vec![UNKNOWN]);
    {
        let root = loaded.root().borrow();
        let blocks = &root.get::<MapBlocks>().expect("blocks chunk").blocks;
        let node = blocks[0].as_node().expect("inline node").borrow();
        assert_eq!(node.class_id(), UNKNOWN);
        assert_eq!(node.opaque_chunk_ids().count(), 2);
    }
    assert_eq!(loaded.to_bytes()?, original);
    Ok(())
}

#[test]
fn test_unknown_root_class_roundtrips() -> gbx::Result<()> {
    let original = container(
        UNKNOWN,
        vec![Chunk::opaque(UNKNOWN.chunk(0x10), true, b"payload".to_vec())],
    );
    let mut loaded = options().load(&original)?;
    assert_eq!(loaded.class_id(), UNKNOWN);
    assert_eq!(loaded.to_bytes()?, original);
    Ok(())
}

/// Legacy class ids dispatch to the current handlers and are written back as found.
#[test]
fn test_aliased_class_keeps_its_id() -> gbx::Result<()> {
    let mut root = Node::new(LEGACY_MAP);
    root.push_data(
        LEGACY_MAP.chunk(0x02),
        true,
        MapSettings {
            version: 1,
            laps: 2,
            time_limit: None,
        },
    );
    let original = Gbx::new(root, options()).to_bytes()?;

    let mut loaded = options().load(&original)?;
    {
        let root = loaded.root().borrow();
        assert_eq!(root.class_id(), LEGACY_MAP);
        assert_eq!(root.chunks()[0].id(), LEGACY_MAP.chunk(0x02));
        assert_eq!(root.get::<MapSettings>().expect("settings chunk").laps, 2);
    }
    assert!(loaded.report().is_clean());
    assert_eq!(loaded.to_bytes()?, original);
    Ok(())
}

#[test]
fn test_trailing_bytes_are_preserved() -> gbx::Result<()> {
    let mut original = sample_bytes();
    original.extend_from_slice(&[0xAB, 0xCD, 0xEF]);

    let mut loaded = options().load(&original)?;
    assert_eq!(loaded.trailing_bytes(), 3);
    assert_eq!(loaded.to_bytes()?, original);
    Ok(())
}

#[test]
fn test_save_to_file_and_open() -> gbx::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("A01.Map.Gbx");

    let mut gbx = sample();
    gbx.save(std::fs::File::create(&path)?)?;

    let opened = options().open(&path)?;
    assert_eq!(
        opened.root().borrow().get::<MapInfo>().map(|i| i.name.clone()),
        Some("A01-Race".to_string())
    );

    let header = options().open_header(&path)?;
    assert!(header.get::<HeaderDesc>().is_some());
    Ok(())
}
