//! End-to-end integration tests for the archive timestamp service

use std::sync::Arc;

use ats_client::testutil::FakeAuthority;
use ats_client::{ArchiveTimestampService, RecordStorage};
use ats_core::{hash, verify, Document, MerkleTree, Verdict};
use ats_types::{ArchiveTimestamp, HashAlgorithm};
use chrono::{TimeZone, Utc};

fn sample_tree(algorithm: HashAlgorithm) -> MerkleTree {
    let document = Document::new("R")
        .with_child(Document::new("A"))
        .with_child(Document::new("B").with_leaves(["D", "E"]))
        .with_child(Document::new("C"));
    MerkleTree::from_document(&document, algorithm)
}

fn find(tree: &MerkleTree, content: &[u8]) -> ats_core::NodeId {
    let wanted = hash::digest(content, tree.algorithm());
    tree.find_node(|node| node.content_digest() == &wanted)
        .expect("node not in tree")
}

#[tokio::test]
async fn test_archive_and_verify() {
    let authority = Arc::new(FakeAuthority::new());
    let service = ArchiveTimestampService::new(authority.clone());
    let tree = sample_tree(HashAlgorithm::Sha256);

    let record = service
        .archive_node(&tree, find(&tree, b"D"))
        .await
        .expect("archive failed");

    assert_eq!(record.reduced_hash_tree.len(), 3);
    assert_eq!(record.digest_algorithm, HashAlgorithm::Sha256);

    let verified = verify(&record, b"D").into_result().expect("verification failed");
    assert_eq!(&verified.root_hash, tree.root_hash());

    let request = authority.last_request().expect("no request recorded");
    assert_eq!(&request.digest, tree.root_hash());
    assert_eq!(request.algorithm, HashAlgorithm::Sha256);
    assert!(request.cert_req);
}

#[tokio::test]
async fn test_token_carries_authority_time() {
    let gen_time = Utc.with_ymd_and_hms(2021, 6, 1, 12, 0, 0).unwrap();
    let service =
        ArchiveTimestampService::new(Arc::new(FakeAuthority::new().with_gen_time(gen_time)));
    let tree = sample_tree(HashAlgorithm::Sha256);

    let record = service.archive_node(&tree, tree.root_id()).await.unwrap();
    assert_eq!(record.reduced_hash_tree.len(), 1);

    match verify(&record, b"R") {
        Verdict::Verified(v) => assert_eq!(v.gen_time, gen_time),
        other => panic!("unexpected verdict: {other:?}"),
    }
}

#[tokio::test]
async fn test_archive_by_hash() {
    let service = ArchiveTimestampService::new(Arc::new(FakeAuthority::new()));
    let tree = sample_tree(HashAlgorithm::Sha384);
    let b = find(&tree, b"B");
    let b_hash = tree.node(b).unwrap().hash().clone();

    let record = service.archive_hash(&tree, &b_hash).await.unwrap();
    assert_eq!(record.node_hash(), Some(b_hash));
    assert!(verify(&record, b"B").is_verified());
    assert!(!verify(&record, b"D").is_verified());
}

#[tokio::test]
async fn test_every_algorithm_end_to_end() {
    let service = ArchiveTimestampService::new(Arc::new(FakeAuthority::new()));
    for algorithm in HashAlgorithm::ALL {
        let tree = sample_tree(algorithm);
        let record = service.archive_node(&tree, find(&tree, b"E")).await.unwrap();
        assert!(verify(&record, b"E").is_verified(), "{algorithm} failed");
    }
}

#[tokio::test]
async fn test_archive_nodes_share_one_token() {
    let authority = Arc::new(FakeAuthority::new());
    let service = ArchiveTimestampService::new(authority.clone());
    let tree = sample_tree(HashAlgorithm::Sha256);

    let contents: [&[u8]; 4] = [b"A", b"C", b"D", b"E"];
    let ids: Vec<_> = contents.iter().map(|c| find(&tree, c)).collect();
    let records = service.archive_nodes(&tree, &ids).await.unwrap();

    assert_eq!(authority.request_count(), 1);
    assert_eq!(records.len(), 4);
    for (content, record) in contents.iter().zip(&records) {
        assert!(verify(record, content).is_verified());
        assert_eq!(record.timestamp_token, records[0].timestamp_token);
    }
}

#[tokio::test]
async fn test_stored_record_still_verifies() {
    let service = ArchiveTimestampService::new(Arc::new(FakeAuthority::new()));
    let tree = sample_tree(HashAlgorithm::Sha256);
    let record = service.archive_node(&tree, find(&tree, b"E")).await.unwrap();

    let dir = tempfile::tempdir().unwrap();
    let storage = RecordStorage::open(dir.path()).unwrap();
    let key = storage.store(&record).unwrap();

    let loaded = storage.get(&key).unwrap().expect("record missing");
    assert!(verify(&loaded, b"E").is_verified());

    // The DER form survives a round trip through the RFC 4998 encoding
    let der = storage.export_der(&key).unwrap();
    let decoded = ArchiveTimestamp::from_der(&der).unwrap();
    assert_eq!(decoded, record);
    assert!(verify(&decoded, b"E").is_verified());
}

#[tokio::test]
async fn test_order_of_children_does_not_matter_for_records() {
    let service = ArchiveTimestampService::new(Arc::new(FakeAuthority::new()));
    let reordered = MerkleTree::from_document(
        &Document::new("R")
            .with_child(Document::new("C"))
            .with_child(Document::new("B").with_leaves(["E", "D"]))
            .with_child(Document::new("A")),
        HashAlgorithm::Sha256,
    );
    let original = sample_tree(HashAlgorithm::Sha256);
    assert_eq!(reordered.root_hash(), original.root_hash());

    // A record made from one ordering verifies the same content
    let record = service
        .archive_node(&reordered, find(&reordered, b"D"))
        .await
        .unwrap();
    let from_original = ats_core::extract_path_for(&original, find(&original, b"D")).unwrap();
    assert_eq!(record.reduced_hash_tree, from_original);
}
