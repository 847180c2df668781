#![allow(missing_docs)]

mod common;

use common::*;
use gbx::io::ByteWriter;
use gbx::{Chunk, ChunkData, GbxError, GbxInspector, Id, Node, NodeRef, TimeInt};

fn boxed<T: ChunkData>(data: T) -> Box<dyn ChunkData> {
    Box::new(data)
}

fn settings_container(version: i32) -> Vec<u8> {
    container(
        MAP,
        vec![
            Chunk::known(
                MAP.chunk(0x01),
                false,
                boxed(MapInfo {
                    name: "Versioned".to_string(),
                    ..Default::default()
                }),
            ),
            Chunk::known(
                MAP.chunk(0x02),
                true,
                boxed(MapSettings {
                    version,
                    laps: 1,
                    time_limit: Some(TimeInt(1000)),
                }),
            ),
            Chunk::known(
                BASE.chunk(0x01),
                true,
                boxed(BaseComment {
                    comment: "sibling".to_string(),
                }),
            ),
        ],
    )
}

#[test]
fn test_strict_mode_rejects_unseen_version() {
    let bytes = settings_container(5);
    let err = options()
        .lenient(false)
        .load(&bytes)
        .expect_err("version 5 is above the handler's maximum");

    assert!(err.is_version_error());
    assert!(matches!(
        err.root_cause(),
        GbxError::UnseenVersion { version: 5, max: 3 }
    ));
    match err {
        GbxError::Chunk {
            class_id, chunk_id, ..
        } => {
            assert_eq!(class_id, MAP);
            assert_eq!(chunk_id, MAP.chunk(0x02));
        }
        other => panic!("expected a chunk-located error, got {other}"),
    }
}

#[test]
fn test_strict_mode_rejects_retired_version() {
    let bytes = settings_container(-1);
    let err = options().lenient(false).load(&bytes).expect_err("retired");
    assert!(matches!(
        err.root_cause(),
        GbxError::UnsupportedVersion { version: -1, min: 0 }
    ));
}

/// Lenient mode keeps the failing chunk raw and decodes its siblings.
#[test]
fn test_lenient_mode_degrades_skippable_chunk() -> gbx::Result<()> {
    let bytes = settings_container(5);
    let mut loaded = options().load(&bytes)?;
    {
        let root = loaded.root().borrow();
        assert!(root.chunk(MAP.chunk(0x02)).expect("settings chunk").is_opaque());
        assert!(root.get::<MapSettings>().is_none());
        assert_eq!(root.get::<MapInfo>().expect("info chunk").name, "Versioned");
        assert_eq!(
            root.get::<BaseComment>().expect("comment chunk").comment,
            "sibling"
        );
    }

    let degraded: Vec<_> = loaded.report().degraded().collect();
    assert_eq!(degraded.len(), 1);
    assert_eq!(degraded[0].chunk_id, MAP.chunk(0x02));
    assert!(
        degraded[0]
            .error
            .as_ref()
            .is_some_and(GbxError::is_version_error)
    );

    assert_eq!(loaded.to_bytes()?, bytes);
    Ok(())
}

#[test]
fn test_inspector_shows_version_of_degraded_chunk() -> gbx::Result<()> {
    let loaded = options().load(&settings_container(5))?;
    let report = GbxInspector::inspect(&loaded)?;

    let chunks = &report.nodes[0].chunks;
    assert_eq!(chunks[1].state, "Opaque");
    assert_eq!(chunks[1].version, Some(5));
    // Known chunks and unversioned handlers carry no tag.
    assert_eq!(chunks[0].version, None);
    assert_eq!(chunks[2].version, None);
    assert!(report.to_string().contains("| Version: 5"));
    Ok(())
}

#[test]
fn test_non_skippable_version_error_is_fatal_in_lenient_mode() {
    let bytes = container(
        MAP,
        vec![Chunk::known(
            MAP.chunk(0x04),
            false,
            boxed(MapMood {
                version: 2,
                mood: "Night".to_string(),
            }),
        )],
    );
    let err = options().load(&bytes).expect_err("cursor cannot be recovered");
    assert!(err.is_version_error());
}

#[test]
fn test_unknown_non_skippable_chunk_is_fatal() {
    let bytes = container(MAP, vec![Chunk::opaque(MAP.chunk(0x50), false, vec![0; 4])]);
    let err = options().load(&bytes).expect_err("unframed unknown chunk");
    assert!(matches!(err.root_cause(), GbxError::Format(_)));
}

/// Only version errors degrade. A skippable chunk with malformed content aborts the
/// load even in lenient mode.
#[test]
fn test_unconsumed_skippable_payload_is_fatal() -> gbx::Result<()> {
    let mut w = ByteWriter::new();
    w.write_string("hi")?;
    w.write_u8(0xFF);
    let bytes = container(MAP, vec![Chunk::opaque(BASE.chunk(0x01), true, w.into_inner())]);

    let err = options().lenient(false).load(&bytes).expect_err("one byte left");
    assert!(matches!(err.root_cause(), GbxError::Format(_)));
    let err = options().load(&bytes).expect_err("one byte left");
    assert!(matches!(err.root_cause(), GbxError::Format(_)));
    Ok(())
}

#[test]
fn test_invalid_utf8_in_skippable_chunk_is_fatal() {
    let mut w = ByteWriter::new();
    w.write_u32(2);
    w.write_bytes(&[0xFF, 0xFE]);
    let bytes = container(MAP, vec![Chunk::opaque(BASE.chunk(0x01), true, w.into_inner())]);

    let err = options().load(&bytes).expect_err("not UTF-8");
    assert!(!err.is_version_error());
    assert!(matches!(err, GbxError::Chunk { chunk_id, .. } if chunk_id == BASE.chunk(0x01)));
}

#[test]
fn test_id_index_out_of_range_is_fatal_in_lenient_mode() -> gbx::Result<()> {
    let mut w = ByteWriter::new();
    w.write_u32(3);
    w.write_u32(0x4000_0000);
    w.write_string("Road")?;
    w.write_u32(0x4000_0009);
    let bytes = container(MAP, vec![Chunk::opaque(MAP.chunk(0x06), true, w.into_inner())]);

    let err = options().load(&bytes).expect_err("index 9 of a one-entry table");
    assert!(matches!(err.root_cause(), GbxError::Reference(_)));
    Ok(())
}

/// Ids interned by a chunk before its version check failed stay visible to later
/// chunks, and the save replays them so later back-references are still written the
/// same way.
#[test]
fn test_degraded_chunk_keeps_interned_ids() -> gbx::Result<()> {
    let mut failing = ByteWriter::new();
    failing.write_u32(3);
    failing.write_u32(0x4000_0000);
    failing.write_string("Sky")?;
    failing.write_i32(5);
    failing.write_string("blue")?;

    let mut following = ByteWriter::new();
    following.write_u32(0x4000_0001);
    following.write_u32(7);

    let bytes = container(
        MAP,
        vec![
            Chunk::opaque(MAP.chunk(0x07), true, failing.into_inner()),
            Chunk::opaque(MAP.chunk(0x06), true, following.into_inner()),
        ],
    );

    let err = options().lenient(false).load(&bytes).expect_err("theme version 5");
    assert!(matches!(
        err.root_cause(),
        GbxError::UnseenVersion { version: 5, max: 1 }
    ));

    let mut loaded = options().load(&bytes)?;
    {
        let root = loaded.root().borrow();
        assert!(root.chunks()[0].is_opaque());
        let style = root.chunks()[1].data::<MapStyle>().expect("decoded sibling");
        assert_eq!(style.style, Id::from("Sky"));
        assert_eq!(style.decoration, Id::Number(7));
    }
    let degraded: Vec<_> = loaded.report().degraded().collect();
    assert_eq!(degraded.len(), 1);
    assert_eq!(degraded[0].chunk_id, MAP.chunk(0x07));

    assert_eq!(loaded.to_bytes()?, bytes);
    Ok(())
}

#[test]
fn test_gated_field_follows_version() -> gbx::Result<()> {
    let old = options().load(&settings_container(1))?;
    let root = old.root().borrow();
    let settings = root.get::<MapSettings>().expect("settings chunk");
    assert_eq!(settings.version, 1);
    assert_eq!(settings.time_limit, None);

    let new = options().load(&settings_container(2))?;
    let root = new.root().borrow();
    let settings = root.get::<MapSettings>().expect("settings chunk");
    assert_eq!(settings.time_limit, Some(TimeInt(1000)));
    Ok(())
}

#[test]
fn test_missing_gated_value_cannot_be_written() {
    let mut root = Node::new(MAP);
    root.push_data(
        MAP.chunk(0x02),
        true,
        MapSettings {
            version: 3,
            laps: 1,
            time_limit: None,
        },
    );
    let err = gbx::Gbx::new(root, options())
        .to_bytes()
        .expect_err("time limit is required from version 2");
    assert!(matches!(err.root_cause(), GbxError::Format(msg) if msg.contains("time_limit")));
}

#[test]
fn test_nesting_beyond_max_depth_is_rejected() -> gbx::Result<()> {
    let mut node = Node::new(MAP);
    for _ in 0..6 {
        let mut parent = Node::new(MAP);
        parent.push_data(
            MAP.chunk(0x03),
            false,
            MapBlocks {
                blocks: vec![NodeRef::new(node)],
            },
        );
        node = parent;
    }
    let bytes = gbx::Gbx::new(node, options()).to_bytes()?;

    assert!(options().load(&bytes).is_ok());
    let err = options().max_depth(4).load(&bytes).expect_err("too deep");
    assert!(matches!(err.root_cause(), GbxError::Format(msg) if msg.contains("nesting")));
    Ok(())
}
