//! Basic usage example for archive timestamps
//!
//! This example demonstrates:
//! - Building a hash tree over nested content
//! - Extracting the reduced hash tree for one node
//! - Verifying an archive timestamp offline
//!
//! The timestamp token here is an unsigned stand-in issued locally; the
//! `ats` binary obtains real tokens from an RFC 3161 authority.
//!
//! Run with: cargo run --example basic_usage

use ats_core::{extract_path, hash, verify, Document, MerkleTree, Verdict};
use ats_types::asn1::encode_unsigned_token;
use ats_types::{ArchiveTimestamp, HashAlgorithm, MessageImprint, TokenInfo};
use chrono::Utc;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("Archive Timestamp Example");
    println!("=========================\n");

    let algorithm = HashAlgorithm::Sha256;

    // Step 1: Describe the content as a tree
    let document = Document::new("case file")
        .with_child(Document::new("contract").with_leaves(["page 1", "page 2"]))
        .with_child(Document::new("invoice"))
        .with_leaves(["cover letter"]);

    // Step 2: Build the hash tree
    let tree = MerkleTree::from_document(&document, algorithm);
    println!("Hash Tree Built:");
    println!("  Nodes:     {}", tree.node_count());
    println!("  Root Hash: {}", tree.root_hash());
    println!();

    // Step 3: Pick a node and extract its reduced hash tree
    let page = hash::digest(b"page 2", algorithm);
    let target = tree
        .find_node(|node| node.content_digest() == &page)
        .ok_or("page 2 not found")?;
    let target_hash = tree.node(target).ok_or("node vanished")?.hash().clone();
    let reduced = extract_path(&tree, &target_hash).ok_or("no path")?;

    println!("Reduced Hash Tree for \"page 2\":");
    for (level, set) in reduced.levels().iter().enumerate() {
        println!("  Level {} ({} hashes):", level, set.len());
        for h in set.hashes() {
            println!("    {}", h);
        }
    }
    println!();

    // Step 4: Timestamp the root hash
    let token = encode_unsigned_token(&TokenInfo {
        policy: "1.2.3.4.1".parse().map_err(|e| format!("{e:?}"))?,
        message_imprint: MessageImprint {
            algorithm: algorithm.tsp_oid(),
            digest: tree.root_hash().clone(),
        },
        serial_number: vec![1],
        gen_time: Utc::now(),
        nonce: None,
    })?;
    let record = ArchiveTimestamp {
        digest_algorithm: algorithm,
        reduced_hash_tree: reduced,
        timestamp_token: token,
    };

    // Step 5: Verify with the original content, then with altered content
    for content in [&b"page 2"[..], &b"page 3"[..]] {
        match verify(&record, content) {
            Verdict::Verified(v) => println!(
                "  {:?}: verified, timestamped at {} ({} levels)",
                String::from_utf8_lossy(content),
                v.gen_time,
                v.depth
            ),
            Verdict::Rejected { step, reason } => println!(
                "  {:?}: rejected at {:?}: {}",
                String::from_utf8_lossy(content),
                step,
                reason
            ),
        }
    }
    println!();

    println!("DER record size: {} bytes", record.to_der()?.len());
    println!("Example completed successfully!");

    Ok(())
}
