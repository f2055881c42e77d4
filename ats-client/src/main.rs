//! ATS (archive timestamp) command line client

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use ats_client::{ArchiveTimestampService, AtsConfig, HttpTimestampAuthority, RecordStorage};
use ats_core::{verify, Document, MerkleTree, NodeId, TreeBuilder, Verdict};
use ats_types::{ArchiveTimestamp, HashAlgorithm, HashValue};
use clap::{Parser, Subcommand};
use rand::Rng;
use tracing::{info, warn, Level};

#[derive(Parser)]
#[command(name = "ats")]
#[command(about = "RFC 4998 archive timestamp client", long_about = None)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Timestamp authority URL (overrides configuration)
    #[arg(long)]
    tsa_url: Option<String>,

    /// Storage directory (overrides configuration)
    #[arg(short = 'd', long)]
    storage_dir: Option<PathBuf>,

    /// Digest algorithm for new trees, e.g. SHA-256
    #[arg(short, long)]
    algorithm: Option<HashAlgorithm>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a sample tree, archive a random node and print the record
    Demo,

    /// Archive the files of a directory
    Archive {
        /// Directory to build the hash tree over
        dir: PathBuf,

        /// Archive only this path, relative to the directory
        #[arg(short, long)]
        node: Option<PathBuf>,
    },

    /// Verify content against a stored archive timestamp
    Verify {
        /// Node hash in hex format
        node_hash: String,

        /// File holding the node's content
        content: PathBuf,
    },

    /// List all stored archive timestamps
    List,

    /// Show details of an archive timestamp
    Show {
        /// Node hash in hex format
        node_hash: String,
    },

    /// Export an archive timestamp
    Export {
        /// Node hash in hex format
        node_hash: String,

        /// Write the RFC 4998 DER encoding instead of JSON
        #[arg(long)]
        der: bool,

        /// Output file (defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Import an archive timestamp from a JSON or DER file
    Import {
        /// Input file
        file: PathBuf,
    },
}

fn load_config(cli: &Cli) -> Result<AtsConfig> {
    let mut config = AtsConfig::load_or_default(cli.config.as_deref())?;
    if let Some(url) = &cli.tsa_url {
        config.authority.url = url.clone();
    }
    if let Some(dir) = &cli.storage_dir {
        config.storage.path = dir.clone();
    }
    if let Some(algorithm) = cli.algorithm {
        config.hash_algorithm = algorithm;
    }
    Ok(config)
}

fn build_service(config: &AtsConfig) -> Result<ArchiveTimestampService> {
    let authority = HttpTimestampAuthority::from_config(&config.authority)?;
    Ok(ArchiveTimestampService::new(Arc::new(authority))
        .with_certificate_request(config.authority.request_certificates))
}

fn parse_hash(hex: &str) -> Result<HashValue> {
    HashValue::from_hex(hex).with_context(|| format!("Invalid node hash: {}", hex))
}

fn load_record(storage: &RecordStorage, node_hash: &HashValue) -> Result<ArchiveTimestamp> {
    storage
        .get(node_hash)?
        .ok_or_else(|| anyhow!("No archive timestamp found for node: {}", node_hash))
}

/// Sample tree: a root with three children, two of them composites
fn sample_document(rng: &mut impl Rng) -> Document {
    let mut leaf = || Document::new(rng.gen::<[u8; 16]>().to_vec());
    let left_left = Document::new("leftLeft").with_child(leaf()).with_child(leaf());
    let left = Document::new("left").with_child(left_left).with_child(leaf());
    let right = Document::new("right").with_child(leaf()).with_child(leaf());
    Document::new("root")
        .with_child(left)
        .with_child(right)
        .with_child(leaf())
}

/// Build a tree over `dir`: files carry their bytes, directories are empty
/// containers. Returns each node's path relative to `dir`.
fn directory_tree(
    dir: &Path,
    algorithm: HashAlgorithm,
) -> Result<(MerkleTree, Vec<(PathBuf, NodeId, bool)>)> {
    let mut builder = TreeBuilder::new(algorithm, &[]);
    let mut nodes = vec![(PathBuf::new(), builder.root_id(), false)];
    let mut pending = VecDeque::from([(dir.to_path_buf(), builder.root_id())]);

    while let Some((path, parent)) = pending.pop_front() {
        let mut entries = std::fs::read_dir(&path)
            .with_context(|| format!("Failed to read directory {}", path.display()))?
            .collect::<std::io::Result<Vec<_>>>()?;
        entries.sort_by_key(|e| e.file_name());

        for entry in entries {
            let file_type = entry.file_type()?;
            let full = entry.path();
            let relative = full.strip_prefix(dir)?.to_path_buf();
            if file_type.is_dir() {
                let id = builder.add_child(parent, &[]);
                nodes.push((relative, id, false));
                pending.push_back((full, id));
            } else if file_type.is_file() {
                let content = std::fs::read(&full)
                    .with_context(|| format!("Failed to read {}", full.display()))?;
                let id = builder.add_child(parent, &content);
                nodes.push((relative, id, true));
            } else {
                warn!(path = %full.display(), "Skipping entry that is neither file nor directory");
            }
        }
    }

    Ok((builder.build(), nodes))
}

fn print_record(node_hash: &HashValue, record: &ArchiveTimestamp) -> Result<()> {
    let info = record.token_info()?;
    println!("Node:        {}", node_hash);
    println!("Algorithm:   {}", record.digest_algorithm);
    println!("Levels:      {}", record.reduced_hash_tree.len());
    println!("Root Hash:   {}", info.message_imprint.digest);
    println!("Timestamp:   {}", info.gen_time);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose { Level::DEBUG } else { Level::INFO })
        .init();

    let config = load_config(&cli)?;
    let storage = RecordStorage::open(&config.storage.path)?;

    match cli.command {
        Commands::Demo => {
            let document = sample_document(&mut rand::thread_rng());
            let tree = MerkleTree::from_document(&document, config.hash_algorithm);
            let pick = rand::thread_rng().gen_range(0..tree.node_count());
            let (target, _) = tree
                .iter_preorder()
                .nth(pick)
                .ok_or_else(|| anyhow!("Sample tree has no node {}", pick))?;

            info!(nodes = tree.node_count(), root = %tree.root_hash(), "Sample tree built");

            let service = build_service(&config)?;
            let record = service.archive_node(&tree, target).await?;
            let node_hash = storage.store(&record)?;

            println!("Archive timestamp created");
            print_record(&node_hash, &record)?;
            println!();
            println!("{}", serde_json::to_string_pretty(&record)?);
        }

        Commands::Archive { dir, node } => {
            let (tree, nodes) = directory_tree(&dir, config.hash_algorithm)?;
            info!(nodes = tree.node_count(), root = %tree.root_hash(), "Directory tree built");

            let selected: Vec<(PathBuf, NodeId)> = match node {
                Some(wanted) => {
                    let found = nodes
                        .into_iter()
                        .find(|(path, _, _)| path == &wanted)
                        .ok_or_else(|| anyhow!("{} is not part of {}", wanted.display(), dir.display()))?;
                    vec![(found.0, found.1)]
                }
                None => nodes
                    .into_iter()
                    .filter(|(_, _, is_file)| *is_file)
                    .map(|(path, id, _)| (path, id))
                    .collect(),
            };
            if selected.is_empty() {
                bail!("Nothing to archive in {}", dir.display());
            }

            let service = build_service(&config)?;
            let ids: Vec<NodeId> = selected.iter().map(|(_, id)| *id).collect();
            let records = service.archive_nodes(&tree, &ids).await?;

            println!("Archived {} node(s) under root {}", records.len(), tree.root_hash());
            for ((path, _), record) in selected.iter().zip(&records) {
                let node_hash = storage.store(record)?;
                println!("  {}  {}", node_hash, path.display());
            }
        }

        Commands::Verify { node_hash, content } => {
            let node_hash = parse_hash(&node_hash)?;
            let record = load_record(&storage, &node_hash)?;
            let data = std::fs::read(&content)
                .with_context(|| format!("Failed to read {}", content.display()))?;

            match verify(&record, &data) {
                Verdict::Verified(verified) => {
                    println!("Archive timestamp verified");
                    println!("Node:      {}", node_hash);
                    println!("Root Hash: {}", verified.root_hash);
                    println!("Timestamp: {}", verified.gen_time);
                    println!("Levels:    {}", verified.depth);
                }
                Verdict::Rejected { step, reason } => {
                    bail!("Verification rejected at {:?}: {}", step, reason);
                }
            }
        }

        Commands::List => {
            let records = storage.list()?;

            if records.is_empty() {
                println!("No stored archive timestamps");
            } else {
                println!("Stored archive timestamps ({})", records.len());
                println!();
                for (node_hash, record) in records {
                    print_record(&node_hash, &record)?;
                    println!();
                }
            }
        }

        Commands::Show { node_hash } => {
            let node_hash = parse_hash(&node_hash)?;
            let record = load_record(&storage, &node_hash)?;
            let info = record.token_info()?;

            println!("Archive Timestamp");
            println!("=================");
            print_record(&node_hash, &record)?;
            println!("Policy:      {}", info.policy);
            println!("Serial:      {}", hex::encode(&info.serial_number));
            if let Some(nonce) = info.nonce {
                println!("Nonce:       {}", nonce);
            }
            println!("Token Size:  {} bytes", record.timestamp_token.as_der().len());
            println!("Reduced Hash Tree:");
            for (level, set) in record.reduced_hash_tree.levels().iter().enumerate() {
                println!("  [{}]", level);
                for hash in set.hashes() {
                    println!("    {}", hash);
                }
            }
        }

        Commands::Export {
            node_hash,
            der,
            output,
        } => {
            let node_hash = parse_hash(&node_hash)?;
            let bytes = if der {
                storage.export_der(&node_hash)?
            } else {
                storage.export_json(&node_hash)?.into_bytes()
            };

            match output {
                Some(output_path) => {
                    std::fs::write(&output_path, bytes)?;
                    println!("Archive timestamp exported to {}", output_path.display());
                }
                None if der => println!("{}", hex::encode(bytes)),
                None => println!("{}", String::from_utf8_lossy(&bytes)),
            }
        }

        Commands::Import { file } => {
            let bytes = std::fs::read(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let node_hash = match std::str::from_utf8(&bytes) {
                Ok(json) if json.trim_start().starts_with('{') => storage.import_json(json)?,
                _ => storage.import_der(&bytes)?,
            };

            println!("Archive timestamp imported successfully");
            println!("Node: {}", node_hash);
        }
    }

    Ok(())
}
