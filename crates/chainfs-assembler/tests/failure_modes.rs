//! Integration tests: broken chains must fail cleanly and write nothing.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chainfs_assembler::{RawExtractor, Reconstructor, WalkOptions};
use chainfs_core::config::{ArchiveFormat, ChainfsConfig};
use chainfs_core::{Address, ChainError};
use chainfs_crypto::producer::{build_chain, build_from_segments, SealedChain};
use chainfs_crypto::{generate_chunk_key, ChunkHeader, XChaChaCipher};
use chainfs_storage::OpendalStore;
use opendal::Operator;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

fn memory_store() -> OpendalStore {
    let op = Operator::new(opendal::services::Memory::default())
        .expect("memory operator")
        .finish();
    OpendalStore::new(op, "failures")
}

async fn stored_chain(data: &[u8], chunk_size: usize) -> (OpendalStore, SealedChain) {
    let store = memory_store();
    let chain = build_chain(data, chunk_size).unwrap();
    for (_, bytes) in &chain.chunks {
        store.put_sealed(bytes).await.unwrap();
    }
    (store, chain)
}

fn assert_untouched(dir: &TempDir) {
    let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
    assert!(entries.is_empty(), "destination parent must stay empty");
}

#[tokio::test]
async fn wrong_key_writes_nothing() {
    let tmp = TempDir::new().unwrap();
    let (store, chain) = stored_chain(b"secret archive bytes", 8).await;

    let err = Reconstructor::new(&store)
        .with_extractor(Arc::new(RawExtractor))
        .reconstruct(chain.tail, generate_chunk_key(), &tmp.path().join("out"))
        .await
        .unwrap_err();

    assert!(matches!(err, ChainError::AuthenticationFailed { step: 0, .. }));
    assert_untouched(&tmp);
}

#[tokio::test]
async fn missing_terminal_chunk_writes_nothing() {
    let tmp = TempDir::new().unwrap();
    let (store, chain) = stored_chain(&[7u8; 100], 16).await;
    let terminal = chain.chunks[0].0;
    store.delete(&terminal).await.unwrap();

    let err = Reconstructor::new(&store)
        .with_extractor(Arc::new(RawExtractor))
        .reconstruct(chain.tail, chain.tail_key.clone(), &tmp.path().join("out"))
        .await
        .unwrap_err();

    match err {
        ChainError::NotFound { address, step } => {
            assert_eq!(address, terminal);
            assert_eq!(step, chain.len() as u64 - 1);
        }
        other => panic!("expected NotFound, got {other:?}"),
    }
    assert_untouched(&tmp);
}

#[tokio::test]
async fn unknown_tail_is_not_found() {
    let store = memory_store();
    let tail = Address::from_bytes([0x42; 32]);

    let err = Reconstructor::new(&store)
        .assemble(tail, generate_chunk_key())
        .await
        .unwrap_err();
    assert!(matches!(err, ChainError::NotFound { step: 0, address } if address == tail));
}

#[tokio::test]
async fn tampered_chunk_is_rejected() {
    let (store, chain) = stored_chain(&[1u8; 64], 16).await;
    let (victim, bytes) = &chain.chunks[2];
    let mut tampered = bytes.clone();
    let last = tampered.len() - 1;
    tampered[last] ^= 0x80;
    store.put(victim, &tampered).await.unwrap();

    let err = Reconstructor::new(&store)
        .assemble(chain.tail, chain.tail_key.clone())
        .await
        .unwrap_err();
    assert!(matches!(err, ChainError::AddressMismatch { address, .. } if address == *victim));

    let err = Reconstructor::new(&store)
        .with_options(WalkOptions {
            verify_addresses: false,
            ..Default::default()
        })
        .assemble(chain.tail, chain.tail_key.clone())
        .await
        .unwrap_err();
    assert!(matches!(err, ChainError::AuthenticationFailed { address, .. } if address == *victim));
}

#[tokio::test]
async fn empty_payload_chain_is_degenerate() {
    let tmp = TempDir::new().unwrap();
    let store = memory_store();
    let segments: [&[u8]; 2] = [b"", b""];
    let chain = build_from_segments(&segments, 0).unwrap();
    for (_, bytes) in &chain.chunks {
        store.put_sealed(bytes).await.unwrap();
    }

    let err = Reconstructor::new(&store)
        .assemble(chain.tail, chain.tail_key.clone())
        .await
        .unwrap_err();
    assert!(matches!(err, ChainError::DegenerateChain { chunks: 2 }));

    let err = Reconstructor::new(&store)
        .with_extractor(Arc::new(RawExtractor))
        .reconstruct(chain.tail, chain.tail_key.clone(), &tmp.path().join("out"))
        .await
        .unwrap_err();
    assert!(matches!(err, ChainError::DegenerateChain { chunks: 2 }));
    assert_untouched(&tmp);
}

#[tokio::test]
async fn self_hash_mismatch_is_malformed() {
    let tmp = TempDir::new().unwrap();
    let store = memory_store();
    let key = generate_chunk_key();
    let sealed = XChaChaCipher
        .seal(&key, &ChunkHeader::terminal(b"other", 0), b"real")
        .unwrap();
    let address = store.put_sealed(&sealed).await.unwrap();

    let err = Reconstructor::new(&store)
        .with_extractor(Arc::new(RawExtractor))
        .reconstruct(address, key, &tmp.path().join("out"))
        .await
        .unwrap_err();

    match err {
        ChainError::MalformedHeader { address: at, step, reason } => {
            assert_eq!(at, address);
            assert_eq!(step, 0);
            assert!(reason.contains("self hash"));
        }
        other => panic!("expected MalformedHeader, got {other:?}"),
    }
    assert_untouched(&tmp);
}

#[tokio::test]
async fn non_archive_stream_fails_extraction() {
    let tmp = TempDir::new().unwrap();
    let (store, chain) = stored_chain(b"plain text, not a tarball", 8).await;

    let err = Reconstructor::new(&store)
        .reconstruct(chain.tail, chain.tail_key.clone(), &tmp.path().join("out"))
        .await
        .unwrap_err();

    assert!(matches!(err, ChainError::ExtractionFailed(_)));
    assert_untouched(&tmp);
}

#[tokio::test]
async fn cancellation_aborts_reconstruction() {
    let tmp = TempDir::new().unwrap();
    let (store, chain) = stored_chain(&[3u8; 256], 16).await;
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = Reconstructor::new(&store)
        .with_extractor(Arc::new(RawExtractor))
        .with_cancellation(cancel)
        .reconstruct(chain.tail, chain.tail_key.clone(), &tmp.path().join("out"))
        .await
        .unwrap_err();

    assert!(matches!(err, ChainError::Cancelled { steps: 0 }));
    assert_untouched(&tmp);
}

#[tokio::test]
async fn config_limits_apply() {
    let (store, chain) = stored_chain(&[5u8; 80], 8).await;
    let mut config = ChainfsConfig::default();
    config.assembler.max_chain_length = 3;
    config.extract.format = ArchiveFormat::Raw;

    let err = Reconstructor::from_config(&store, &config)
        .assemble(chain.tail, chain.tail_key.clone())
        .await
        .unwrap_err();
    assert!(matches!(err, ChainError::ChainTooLong { limit: 3 }));
}

#[tokio::test]
async fn config_format_selects_extractor() {
    let tmp = TempDir::new().unwrap();
    let data = b"written verbatim".to_vec();
    let (store, chain) = stored_chain(&data, 5).await;
    let mut config = ChainfsConfig::default();
    config.extract.format = ArchiveFormat::Raw;

    let dest = tmp.path().join("verbatim.bin");
    Reconstructor::from_config(&store, &config)
        .reconstruct(chain.tail, chain.tail_key.clone(), &dest)
        .await
        .unwrap();
    assert_eq!(std::fs::read(&dest).unwrap(), data);
}

#[tokio::test]
async fn progress_reports_every_chunk() {
    let (store, chain) = stored_chain(&[9u8; 50], 10).await;
    let calls = Arc::new(AtomicU64::new(0));
    let counter = calls.clone();

    let out = Reconstructor::new(&store)
        .with_progress(Box::new(move |_, _, _| {
            counter.fetch_add(1, Ordering::Relaxed);
        }))
        .assemble(chain.tail, chain.tail_key.clone())
        .await
        .unwrap();

    assert_eq!(out.data, vec![9u8; 50]);
    assert_eq!(calls.load(Ordering::Relaxed), chain.len() as u64);
}
