#![allow(missing_docs)]

mod common;

use std::io;
use std::time::Duration;

use common::*;
use glam::{Quat, Vec3};
use gbx::io::ByteWriter;
use gbx::{
    Codec, Direction, Gbx, GbxError, Id, Ident, Node, NodeHandle, NodeRef, ReadWrite, TimeInt,
    TimeSingle,
};

#[derive(Debug, Default, PartialEq, ReadWrite)]
struct Waypoint {
    position: Vec3,
    rotation: Quat,
    #[gbx(skip)]
    selected: bool,
    checkpoint: bool,
    respawn: TimeSingle,
    tags: Vec<Id>,
    thumbnail: [u8; 4],
}

#[derive(Debug, Default, PartialEq, ReadWrite)]
struct Pair(u16, String);

/// The lookback sequence for repeated names: three literals, then two back-references.
#[test]
fn test_id_table_interns_repeated_names() -> gbx::Result<()> {
    let names = ["Foo", "Bar", "Foo", "Baz", "Bar"];

    let mut ctx = Codec::writer(registry());
    for name in names {
        ctx.id(&mut Id::from(name))?;
    }
    assert_eq!(ctx.id_table().len(), 3);
    let bytes = ctx.into_bytes()?;

    let mut expected = ByteWriter::new();
    expected.write_u32(3);
    expected.write_u32(0x4000_0000);
    expected.write_string("Foo")?;
    expected.write_u32(0x4000_0000);
    expected.write_string("Bar")?;
    expected.write_u32(0x4000_0001);
    expected.write_u32(0x4000_0000);
    expected.write_string("Baz")?;
    expected.write_u32(0x4000_0002);
    assert_eq!(bytes, expected.into_inner());

    let mut ctx = Codec::reader(&bytes, registry());
    let mut decoded = Vec::new();
    for _ in names {
        let mut id = Id::default();
        ctx.id(&mut id)?;
        decoded.push(id);
    }
    assert_eq!(decoded, names.map(Id::from));
    assert_eq!(ctx.id_table().get(2), Some("Bar"));
    assert!(ctx.at_end());
    Ok(())
}

#[test]
fn test_numeric_and_empty_ids() -> gbx::Result<()> {
    let mut ctx = Codec::writer(registry());
    let mut ident = Ident::new(Id::Number(26), Id::Empty, "nadeo");
    ctx.ident(&mut ident)?;
    let bytes = ctx.into_bytes()?;

    let mut ctx = Codec::reader(&bytes, registry());
    let mut decoded = Ident::default();
    ctx.ident(&mut decoded)?;
    assert_eq!(decoded, ident);
    assert_eq!(ctx.id_table().len(), 1);
    Ok(())
}

#[test]
fn test_numeric_id_with_flag_bits_is_rejected() {
    let mut ctx = Codec::writer(registry());
    let err = ctx.id(&mut Id::Number(0x8000_0001)).expect_err("flag bits");
    assert!(matches!(err, GbxError::Format(_)));
}

#[test]
fn test_id_back_reference_out_of_range() {
    let mut w = ByteWriter::new();
    w.write_u32(3);
    w.write_u32(0x4000_0004);
    let bytes = w.into_inner();

    let mut ctx = Codec::reader(&bytes, registry());
    let err = ctx.id(&mut Id::default()).expect_err("empty table");
    assert!(matches!(err, GbxError::Reference(_)));
}

#[test]
fn test_id_version_below_three_is_rejected() {
    let mut w = ByteWriter::new();
    w.write_u32(2);
    w.write_u32(7);
    let bytes = w.into_inner();

    let mut ctx = Codec::reader(&bytes, registry());
    let err = ctx.id(&mut Id::default()).expect_err("old Id version");
    assert!(matches!(err, GbxError::Format(_)));
}

/// An encapsulated block starts its own Id scope and restores the outer one after.
#[test]
fn test_encapsulated_block_has_own_id_scope() -> gbx::Result<()> {
    let mut ctx = Codec::writer(registry());
    ctx.id(&mut Id::from("A"))?;
    ctx.encapsulated(|inner| {
        inner.id(&mut Id::from("A"))?;
        inner.id(&mut Id::from("A"))
    })?;
    ctx.id(&mut Id::from("A"))?;
    let bytes = ctx.into_bytes()?;

    let mut expected = ByteWriter::new();
    expected.write_u32(3);
    expected.write_u32(0x4000_0000);
    expected.write_string("A")?;
    expected.write_u32(17);
    expected.write_u32(3);
    expected.write_u32(0x4000_0000);
    expected.write_string("A")?;
    expected.write_u32(0x4000_0001);
    expected.write_u32(0x4000_0001);
    assert_eq!(bytes, expected.into_inner());

    let mut ctx = Codec::reader(&bytes, registry());
    let mut ids = vec![Id::default(); 4];
    ctx.id(&mut ids[0])?;
    let (first, second) = ids.split_at_mut(2);
    ctx.encapsulated(|inner| {
        inner.id(&mut first[1])?;
        inner.id(&mut second[0])
    })?;
    ctx.id(&mut second[1])?;
    assert!(ids.iter().all(|id| id.as_str() == Some("A")));
    assert!(ctx.at_end());
    Ok(())
}

#[test]
fn test_encapsulated_block_must_be_consumed() -> gbx::Result<()> {
    let mut ctx = Codec::writer(registry());
    ctx.encapsulated(|inner| {
        inner.u32(&mut 1)?;
        inner.u32(&mut 2)
    })?;
    let bytes = ctx.into_bytes()?;

    let mut ctx = Codec::reader(&bytes, registry());
    let err = ctx
        .encapsulated(|inner| inner.u32(&mut 0))
        .expect_err("one word left");
    assert!(matches!(err, GbxError::Format(_)));
    Ok(())
}

#[test]
fn test_negative_array_count_is_format_error() {
    let mut w = ByteWriter::new();
    w.write_i32(-1);
    let bytes = w.into_inner();

    let mut ctx = Codec::reader(&bytes, registry());
    let mut items: Vec<u32> = Vec::new();
    let err = ctx
        .array(&mut items, |c, v| c.u32(v))
        .expect_err("negative count");
    assert!(matches!(err, GbxError::Format(_)));
}

#[test]
fn test_oversized_array_count_is_format_error() {
    let mut w = ByteWriter::new();
    w.write_i32(1_000_000);
    w.write_u32(5);
    let bytes = w.into_inner();

    let mut ctx = Codec::reader(&bytes, registry());
    let mut items: Vec<u32> = Vec::new();
    let err = ctx
        .array(&mut items, |c, v| c.u32(v))
        .expect_err("count past the end");
    assert!(matches!(err, GbxError::Format(_)));
}

/// Elements that encode to nothing still honor the declared count.
#[test]
fn test_array_of_empty_elements() -> gbx::Result<()> {
    let bytes = 3i32.to_le_bytes();

    let mut ctx = Codec::reader(&bytes, registry());
    let mut items: Vec<()> = Vec::new();
    ctx.array(&mut items, |_, _| Ok(()))?;
    assert_eq!(items.len(), 3);
    assert!(ctx.at_end());
    Ok(())
}

#[test]
fn test_truncated_primitive_is_io_error() {
    let bytes = [1u8, 2];
    let mut ctx = Codec::reader(&bytes, registry());
    let err = ctx.u32(&mut 0).expect_err("two bytes only");
    assert!(matches!(err, GbxError::Io(e) if e.kind() == io::ErrorKind::UnexpectedEof));
}

#[test]
fn test_derived_struct_codes_fields_in_order() -> gbx::Result<()> {
    let mut waypoint = Waypoint {
        position: Vec3::new(16.0, 9.0, 48.0),
        rotation: Quat::from_rotation_y(1.5),
        selected: true,
        checkpoint: true,
        respawn: TimeSingle(2.5),
        tags: vec![Id::from("Start"), Id::from("Start")],
        thumbnail: [1, 2, 3, 4],
    };

    let mut ctx = Codec::writer(registry());
    waypoint.read_write(&mut ctx)?;
    let bytes = ctx.into_bytes()?;
    // 12 + 16 + 4 + 4 + (4 + 4 + 4 + 9 + 4) + 4
    assert_eq!(bytes.len(), 65);

    let mut ctx = Codec::reader(&bytes, registry());
    assert_eq!(ctx.direction(), Direction::Read);
    let mut decoded = Waypoint::default();
    decoded.read_write(&mut ctx)?;
    assert!(!decoded.selected);
    decoded.selected = true;
    assert_eq!(decoded, waypoint);
    Ok(())
}

#[test]
fn test_tuple_struct_derive() -> gbx::Result<()> {
    let mut ctx = Codec::writer(registry());
    Pair(7, "seven".to_string()).read_write(&mut ctx)?;
    let bytes = ctx.into_bytes()?;
    assert_eq!(bytes.len(), 2 + 4 + 5);

    let mut decoded = Pair::default();
    decoded.read_write(&mut Codec::reader(&bytes, registry()))?;
    assert_eq!(decoded, Pair(7, "seven".to_string()));
    Ok(())
}

#[test]
fn test_time_values() {
    assert_eq!(TimeInt(1500).duration(), Some(Duration::from_millis(1500)));
    assert_eq!(TimeInt::NONE.duration(), None);
    assert_eq!(TimeInt::default(), TimeInt(-1));
    assert_eq!(TimeInt::from(Duration::from_secs(2)), TimeInt(2000));
    assert_eq!(TimeSingle(0.5).duration(), Some(Duration::from_millis(500)));
    assert_eq!(TimeSingle::NONE.duration(), None);
}

#[test]
fn test_negative_node_index_is_reference_error() {
    let mut w = ByteWriter::new();
    w.write_i32(-5);
    let bytes = w.into_inner();

    let mut ctx = Codec::reader(&bytes, registry());
    let err = ctx.node_ref(&mut NodeRef::Null).expect_err("negative index");
    assert!(matches!(err, GbxError::Reference(_)));
}

#[test]
fn test_direct_node_field() -> gbx::Result<()> {
    let mut node = Node::new(BLOCK);
    node.push_data(
        BLOCK.chunk(0x01),
        false,
        BlockData {
            name: Id::from("StadiumCircuit"),
            ..Default::default()
        },
    );
    let mut slots: [Option<NodeHandle>; 2] = [Some(node.into_handle()), None];

    let mut ctx = Codec::writer(registry());
    for slot in &mut slots {
        ctx.node(slot)?;
    }
    let bytes = ctx.into_bytes()?;

    let mut ctx = Codec::reader(&bytes, registry());
    let mut decoded: [Option<NodeHandle>; 2] = [None, None];
    for slot in &mut decoded {
        ctx.node(slot)?;
    }
    assert!(ctx.at_end());
    assert!(decoded[1].is_none());
    let node = decoded[0].as_ref().expect("direct node").borrow();
    assert_eq!(node.class_id(), BLOCK);
    assert_eq!(node.source_index(), None);
    assert_eq!(
        node.get::<BlockData>().map(|b| b.name.clone()),
        Some(Id::from("StadiumCircuit"))
    );
    Ok(())
}

/// A node reachable from its own chunks cannot be written.
#[test]
fn test_self_referencing_node_is_rejected_on_save() {
    let looped = Node::new(MAP).into_handle();
    looped.borrow_mut().push_data(
        MAP.chunk(0x03),
        false,
        MapBlocks {
            blocks: vec![NodeRef::Node(looped.clone())],
        },
    );

    let mut root = Node::new(MAP);
    root.push_data(
        MAP.chunk(0x03),
        false,
        MapBlocks {
            blocks: vec![NodeRef::Node(looped.clone())],
        },
    );
    let err = Gbx::new(root, options())
        .to_bytes()
        .expect_err("cycle through chunk data");
    assert!(matches!(err.root_cause(), GbxError::Reference(_)));

    looped.borrow_mut().chunks_mut().clear();
}
