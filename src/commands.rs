//! The interactive prompt and its client-side operations. These sit outside
//! the protocol engine: everything here resolves a key to a node address
//! through the routing layer and then talks to that node with the same RPCs
//! the ring itself uses.

use std::io::Write as _;
use std::path::PathBuf;

use log::debug;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

use crate::chord::types::{Node, NodeAddr};
use crate::error::{ChordError, NetworkError, RingletError};
use crate::network::node::Peer;
use crate::network::rpc::FileRecord;

/// Resolve a key to the address of the node responsible for it.
pub async fn lookup_key(node: &Node, key: &str) -> Result<NodeAddr, ChordError> {
    let id = node.space.hash(key);
    node.find(&id, node.address.clone()).await
}

/// Read a file from this node's upload directory, seal it, and hand it to
/// the node responsible for its key. Returns where it was stored.
pub async fn store_file(node: &Node, file_name: &str) -> Result<NodeAddr, RingletError> {
    let target = lookup_key(node, file_name).await?;
    let content = node.read_upload(file_name)?;
    let sealed = node.keys.seal(&content)?;
    let record = FileRecord {
        id: node.space.hash(file_name),
        name: file_name.to_string(),
        content: sealed,
        backup: false,
    };
    let reply = node
        .rpc
        .store_file(&target, &record)
        .await
        .map_err(RingletError::Network)?;
    if let Some(err) = reply.err {
        return Err(RingletError::Network(NetworkError::Remote(err)));
    }
    debug!(
        "stored {file_name} on {target} (backup placed: {})",
        reply.backup
    );
    Ok(target)
}

/// Fetch a file from the ring, open the seal, and write it to this node's
/// download directory. Returns the path written.
pub async fn get_file(node: &Node, file_name: &str) -> Result<PathBuf, RingletError> {
    let target = lookup_key(node, file_name).await?;
    let request = FileRecord {
        id: node.space.hash(file_name),
        name: file_name.to_string(),
        content: Vec::new(),
        backup: false,
    };
    let served = node
        .rpc
        .get_file(&target, &request)
        .await
        .map_err(RingletError::Network)?;
    let plaintext = node.keys.open(&served.content)?;
    Ok(node.save_download(file_name, &plaintext)?)
}

/// Line-oriented command loop; returns when the operator quits.
pub async fn run_prompt(peer: Peer) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        prompt("Enter command: ");
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            _ => break, // stdin closed
        };
        match line.trim().to_uppercase().as_str() {
            "PRINTSTATE" | "PS" => peer.node.print_state(),
            "LOOKUP" | "L" => {
                if let Some(key) = read_arg(&mut lines, "Enter the key to look up: ").await {
                    lookup_command(&peer.node, &key).await;
                }
            }
            "STOREFILE" | "S" => {
                if let Some(name) = read_arg(&mut lines, "Enter the file name to store: ").await {
                    match store_file(&peer.node, &name).await {
                        Ok(addr) => println!("Stored {name} on {addr}"),
                        Err(e) => println!("Store failed: {e}"),
                    }
                }
            }
            "GET" | "G" => {
                if let Some(name) = read_arg(&mut lines, "Enter the file name to get: ").await {
                    match get_file(&peer.node, &name).await {
                        Ok(path) => println!("Fetched {name} to {}", path.display()),
                        Err(e) => println!("Get failed: {e}"),
                    }
                }
            }
            "QUIT" | "Q" => break,
            _ => println!("Invalid command"),
        }
    }
    peer.shutdown().await;
}

async fn lookup_command(node: &Node, key: &str) {
    let addr = match lookup_key(node, key).await {
        Ok(addr) => addr,
        Err(e) => {
            println!("Lookup failed: {e}");
            return;
        }
    };
    println!("The key is resolved to {addr}");
    match node.rpc.check_file_exist(&addr, key).await {
        Err(e) => println!("Could not check for the file: {e}"),
        Ok(reply) if reply.exist => match node.resolve_name(&addr).await {
            Ok(name) => println!("The file is stored at {name}"),
            Err(e) => println!("Could not fetch the storing node's name: {e}"),
        },
        Ok(_) => println!("The file is not stored in the node"),
    }
}

async fn read_arg(lines: &mut Lines<BufReader<Stdin>>, label: &str) -> Option<String> {
    prompt(label);
    match lines.next_line().await {
        Ok(Some(line)) if !line.trim().is_empty() => Some(line.trim().to_string()),
        _ => None,
    }
}

fn prompt(label: &str) {
    print!("{label}");
    let _ = std::io::stdout().flush();
}
