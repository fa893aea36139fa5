//! Integration tests: chain producer → memory store → reconstruct.
//!
//! Verifies that a file split into a chain of encrypted chunks comes back
//! byte-for-byte, through both the in-memory path and archive extraction.

use std::io::Write;
use std::sync::Arc;

use chainfs_assembler::{reconstruct, RawExtractor, Reconstructor, WalkOptions};
use chainfs_core::Address;
use chainfs_crypto::producer::{build_chain, build_chain_short_tail, SealedChain};
use chainfs_crypto::XChaChaCipher;
use chainfs_storage::OpendalStore;
use opendal::Operator;
use proptest::prelude::*;
use tempfile::TempDir;

fn memory_store() -> OpendalStore {
    let op = Operator::new(opendal::services::Memory::default())
        .expect("memory operator")
        .finish();
    OpendalStore::new(op, "test/chains")
}

async fn store_chain(store: &OpendalStore, chain: &SealedChain) {
    for (address, bytes) in &chain.chunks {
        let stored = store.put_sealed(bytes).await.expect("store chunk");
        assert_eq!(&stored, address);
    }
}

fn tar_gz(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for (name, content) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, name, *content).unwrap();
    }
    let tar = builder.into_inner().unwrap();

    let mut enc = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    enc.write_all(&tar).unwrap();
    enc.finish().unwrap()
}

fn make_data(size: usize) -> Vec<u8> {
    (0..size)
        .map(|i| (i.wrapping_mul(31) ^ (i >> 5)) as u8)
        .collect()
}

#[tokio::test]
async fn scenario_abcdefghi() {
    let store = memory_store();
    let chain = build_chain(b"ABCDEFGHI", 4).unwrap();
    store_chain(&store, &chain).await;

    let assembled = Reconstructor::new(&store)
        .assemble(chain.tail, chain.tail_key.clone())
        .await
        .expect("assemble should succeed");

    assert_eq!(assembled.data, b"ABCDEFGHI");
    assert_eq!(assembled.chunks, 3);
    assert_eq!(assembled.nominal_size, 4);
}

#[tokio::test]
async fn short_tail_chain_abcdefghij() {
    let store = memory_store();
    let chain = build_chain_short_tail(b"ABCDEFGHIJ", 4).unwrap();
    store_chain(&store, &chain).await;

    let assembled = Reconstructor::new(&store)
        .assemble(chain.tail, chain.tail_key.clone())
        .await
        .expect("short tail chain should assemble");

    assert_eq!(assembled.data, b"ABCDEFGHIJ");
    assert_eq!(assembled.chunks, 3);
    assert_eq!(assembled.nominal_size, 4);
}

#[tokio::test]
async fn short_tail_tar_gz_roundtrip() {
    let tmp = TempDir::new().unwrap();
    let store = memory_store();
    let body = make_data(7777);
    let archive = tar_gz(&[("restore/body.bin", &body[..])]);
    let chain = build_chain_short_tail(&archive, 300).unwrap();
    store_chain(&store, &chain).await;

    let dest = tmp.path().join("restored");
    Reconstructor::new(&store)
        .reconstruct(chain.tail, chain.tail_key.clone(), &dest)
        .await
        .unwrap();
    assert_eq!(std::fs::read(dest.join("restore/body.bin")).unwrap(), body);
}

#[tokio::test]
async fn tar_gz_roundtrip_to_destination() {
    let tmp = TempDir::new().unwrap();
    let store = memory_store();

    let readme = make_data(5000);
    let archive = tar_gz(&[
        ("project/README.md", &b"# chained archive\n"[..]),
        ("project/data.bin", &readme[..]),
    ]);
    let chain = build_chain(&archive, 256).unwrap();
    assert!(chain.len() > 2);
    store_chain(&store, &chain).await;

    let dest = tmp.path().join("restored");
    let report = reconstruct(
        &store,
        XChaChaCipher,
        chain.tail,
        chain.tail_key.clone(),
        &dest,
        WalkOptions::default(),
    )
    .await
    .expect("reconstruct should succeed");

    assert_eq!(report.chunks, chain.len() as u64);
    assert_eq!(report.bytes, archive.len() as u64);
    assert_eq!(report.nominal_size, 256);
    assert_eq!(report.tail, chain.tail);
    assert_eq!(
        std::fs::read(dest.join("project/README.md")).unwrap(),
        b"# chained archive\n"
    );
    assert_eq!(std::fs::read(dest.join("project/data.bin")).unwrap(), readme);
}

#[tokio::test]
async fn raw_roundtrip_exact_multiple() {
    let tmp = TempDir::new().unwrap();
    let store = memory_store();
    let original = make_data(64 * 10);
    let chain = build_chain(&original, 64).unwrap();
    store_chain(&store, &chain).await;

    let dest = tmp.path().join("out.bin");
    Reconstructor::new(&store)
        .with_extractor(Arc::new(RawExtractor))
        .reconstruct(chain.tail, chain.tail_key.clone(), &dest)
        .await
        .unwrap();

    assert_eq!(std::fs::read(&dest).unwrap(), original);
}

#[tokio::test]
async fn single_chunk_chains() {
    let store = memory_store();

    // Short single chunk with padding
    let chain = build_chain(b"tiny", 4096).unwrap();
    assert_eq!(chain.len(), 1);
    store_chain(&store, &chain).await;
    let out = Reconstructor::new(&store)
        .assemble(chain.tail, chain.tail_key.clone())
        .await
        .unwrap();
    assert_eq!(out.data, b"tiny");

    // Exactly one full chunk, no padding
    let chain = build_chain(b"full", 4).unwrap();
    assert_eq!(chain.len(), 1);
    store_chain(&store, &chain).await;
    let out = Reconstructor::new(&store)
        .assemble(chain.tail, chain.tail_key.clone())
        .await
        .unwrap();
    assert_eq!(out.data, b"full");
}

#[tokio::test]
async fn repeated_reconstruction_is_identical() {
    let tmp = TempDir::new().unwrap();
    let store = memory_store();
    let original = make_data(3333);
    let chain = build_chain(&original, 100).unwrap();
    store_chain(&store, &chain).await;

    let rebuilder = Reconstructor::new(&store).with_extractor(Arc::new(RawExtractor));
    let first = tmp.path().join("first.bin");
    let second = tmp.path().join("second.bin");
    rebuilder
        .reconstruct(chain.tail, chain.tail_key.clone(), &first)
        .await
        .unwrap();
    rebuilder
        .reconstruct(chain.tail, chain.tail_key.clone(), &second)
        .await
        .unwrap();

    assert_eq!(std::fs::read(&first).unwrap(), std::fs::read(&second).unwrap());
    assert_eq!(std::fs::read(&first).unwrap(), original);
}

#[tokio::test]
async fn concurrent_reconstructions_share_a_store() {
    let store = Arc::new(memory_store());
    let a = make_data(2000);
    let b: Vec<u8> = make_data(1500).into_iter().rev().collect();
    let chain_a = build_chain(&a, 128).unwrap();
    let chain_b = build_chain(&b, 200).unwrap();
    store_chain(&store, &chain_a).await;
    store_chain(&store, &chain_b).await;

    let (tail_a, key_a) = (chain_a.tail, chain_a.tail_key.clone());
    let (tail_b, key_b) = (chain_b.tail, chain_b.tail_key.clone());
    let store_a = store.clone();
    let store_b = store.clone();

    let task_a = tokio::spawn(async move {
        Reconstructor::new(store_a).assemble(tail_a, key_a).await
    });
    let task_b = tokio::spawn(async move {
        Reconstructor::new(store_b).assemble(tail_b, key_b).await
    });

    assert_eq!(task_a.await.unwrap().unwrap().data, a);
    assert_eq!(task_b.await.unwrap().unwrap().data, b);
}

#[tokio::test]
async fn chunks_are_addressed_by_ciphertext_hash() {
    let store = memory_store();
    let chain = build_chain(&make_data(1000), 128).unwrap();
    store_chain(&store, &chain).await;

    for (address, bytes) in &chain.chunks {
        assert_eq!(*address, Address::of(bytes));
        let path = store.path_for(address);
        assert!(store.operator().exists(&path).await.unwrap());
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn any_file_roundtrips(
        data in proptest::collection::vec(any::<u8>(), 0..=4096),
        chunk_size in 1usize..=512,
    ) {
        let out = tokio_test::block_on(async {
            let store = memory_store();
            let chain = build_chain(&data, chunk_size).unwrap();
            store_chain(&store, &chain).await;
            Reconstructor::new(&store)
                .assemble(chain.tail, chain.tail_key.clone())
                .await
        }).unwrap();
        prop_assert_eq!(out.data, data);
    }

    #[test]
    fn any_file_roundtrips_with_short_tail(
        data in proptest::collection::vec(any::<u8>(), 0..=4096),
        chunk_size in 1usize..=512,
    ) {
        let out = tokio_test::block_on(async {
            let store = memory_store();
            let chain = build_chain_short_tail(&data, chunk_size).unwrap();
            store_chain(&store, &chain).await;
            Reconstructor::new(&store)
                .assemble(chain.tail, chain.tail_key.clone())
                .await
        }).unwrap();
        prop_assert_eq!(out.data, data);
    }
}
