#![allow(missing_docs)]

mod common;

use common::*;
use gbx::{Chunk, ChunkData, Id, Ident};
use proptest::prelude::*;

fn chunk_list() -> impl Strategy<Value = Vec<(u16, Vec<u8>)>> {
    prop::collection::vec(
        (0x40u16..0x60, prop::collection::vec(any::<u8>(), 0..64)),
        0..8,
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Unregistered chunks interleaved with known ones survive load and save untouched.
    #[test]
    fn prop_opaque_chunks_roundtrip(
        raw in chunk_list(),
        comment in ".{0,40}",
        name in "[A-Za-z0-9]{1,12}",
    ) {
        let mut chunks: Vec<Chunk> = Vec::new();
        for (index, bytes) in raw {
            chunks.push(Chunk::opaque(MAP.chunk(index), true, bytes));
        }
        let known: Box<dyn ChunkData> = Box::new(BaseComment { comment: comment.clone() });
        chunks.insert(chunks.len() / 2, Chunk::known(BASE.chunk(0x01), true, known));
        let info: Box<dyn ChunkData> = Box::new(MapInfo {
            ident: Ident::new(name.as_str(), name.as_str(), Id::Number(26)),
            name: name.clone(),
        });
        chunks.insert(0, Chunk::known(MAP.chunk(0x01), false, info));

        let original = container(MAP, chunks);
        let mut loaded = options().load(&original).expect("generated container loads");
        {
            let root = loaded.root().borrow();
            prop_assert_eq!(&root.get::<BaseComment>().expect("comment").comment, &comment);
            prop_assert_eq!(&root.get::<MapInfo>().expect("info").name, &name);
        }
        prop_assert_eq!(loaded.to_bytes().expect("re-encodes"), original);
    }
}
