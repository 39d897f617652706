//! Multi-node ring tests: every test spins up real nodes on loopback TCP
//! with shortened maintenance intervals, waits past a few stabilization
//! rounds, and then inspects ring state directly.
//!
//! A wide identifier space (m = 32) keeps node identifiers collision-free
//! regardless of the ports a test picks.

use std::fs;
use std::path::Path;
use std::time::Duration;

use tokio::time::sleep;

use ringlet::chord::id::Identifier;
use ringlet::chord::types::{NodeAddr, NodeConfig};
use ringlet::commands;
use ringlet::network::node::Peer;

fn config(port: u16, seed: Option<u16>, bits: u32, root: &Path) -> NodeConfig {
    NodeConfig {
        bind_addr: "127.0.0.1".to_string(),
        bind_port: port,
        join_addr: seed.map(|p| NodeAddr::new(format!("127.0.0.1:{p}"))),
        stabilize_interval: Duration::from_millis(150),
        fix_fingers_interval: Duration::from_millis(100),
        check_predecessor_interval: Duration::from_millis(150),
        successor_count: 3,
        client_name: None,
        bits,
        files_root: root.to_path_buf(),
    }
}

async fn spawn(port: u16, seed: Option<u16>, bits: u32, root: &Path) -> Peer {
    Peer::start(config(port, seed, bits, root))
        .await
        .expect("node should start")
}

async fn settle(ms: u64) {
    sleep(Duration::from_millis(ms)).await;
}

/// The node whose identifier is the smallest one clockwise from `key`.
fn expected_owner(peers: &[&Peer], key: &Identifier) -> NodeAddr {
    let mut ids: Vec<(Identifier, NodeAddr)> = peers
        .iter()
        .map(|p| (p.node.identifier.clone(), p.node.address.clone()))
        .collect();
    ids.sort_by(|a, b| a.0.cmp(&b.0));
    for (id, addr) in &ids {
        if id >= key {
            return addr.clone();
        }
    }
    ids[0].1.clone()
}

#[tokio::test]
async fn solo_node_forms_its_own_ring() {
    let dir = tempfile::tempdir().unwrap();
    let peer = spawn(7301, None, 6, dir.path()).await;

    assert!(peer.node.predecessor_addr().is_none());
    assert_eq!(peer.node.successor(), peer.node.address);

    peer.shutdown().await;
}

#[tokio::test]
async fn two_node_ring_converges() {
    let dir = tempfile::tempdir().unwrap();
    let a = spawn(7311, None, 32, dir.path()).await;
    let b = spawn(7312, Some(7311), 32, dir.path()).await;

    settle(2000).await;

    assert_eq!(a.node.successor(), b.node.address);
    assert_eq!(b.node.successor(), a.node.address);
    assert_eq!(a.node.predecessor_addr(), Some(b.node.address.clone()));
    assert_eq!(b.node.predecessor_addr(), Some(a.node.address.clone()));

    // Re-notifying with the same candidate leaves the predecessor alone.
    assert!(b.node.notify(a.node.address.clone()).await);
    assert_eq!(b.node.predecessor_addr(), Some(a.node.address.clone()));

    a.shutdown().await;
    b.shutdown().await;
}

#[tokio::test]
async fn lookups_land_on_the_responsible_node() {
    let dir = tempfile::tempdir().unwrap();
    let a = spawn(7321, None, 32, dir.path()).await;
    let b = spawn(7322, Some(7321), 32, dir.path()).await;
    let c = spawn(7323, Some(7321), 32, dir.path()).await;

    settle(3000).await;

    let peers = [&a, &b, &c];
    for key in ["alpha", "beta", "gamma", "delta", "hello.txt"] {
        let id = a.node.space.hash(key);
        let expected = expected_owner(&peers, &id);
        let resolved = commands::lookup_key(&a.node, key)
            .await
            .expect("lookup should resolve");
        assert_eq!(resolved, expected, "key {key} (id {id})");

        // Lookups are idempotent while the ring is unchanged.
        let again = commands::lookup_key(&a.node, key).await.unwrap();
        assert_eq!(again, resolved);
    }

    a.shutdown().await;
    b.shutdown().await;
    c.shutdown().await;
}

#[tokio::test]
async fn stored_files_are_placed_and_fetched_by_key() {
    let dir = tempfile::tempdir().unwrap();
    let a = spawn(7331, None, 32, dir.path()).await;
    let b = spawn(7332, Some(7331), 32, dir.path()).await;
    let c = spawn(7333, Some(7331), 32, dir.path()).await;

    settle(3000).await;

    let upload = a.node.upload_path("hello.txt");
    fs::create_dir_all(upload.parent().unwrap()).unwrap();
    fs::write(&upload, b"hello ring").unwrap();

    let target = commands::store_file(&a.node, "hello.txt")
        .await
        .expect("store should succeed");
    let peers = [&a, &b, &c];
    let expected = expected_owner(&peers, &a.node.space.hash("hello.txt"));
    assert_eq!(target, expected);

    // Exactly the responsible node answers for the key; the backup copy on
    // its successor stays invisible to lookups.
    for peer in &peers {
        let reply = a
            .node
            .rpc
            .check_file_exist(&peer.node.address, "hello.txt")
            .await
            .unwrap();
        assert_eq!(reply.exist, peer.node.address == expected, "{}", peer.node.address);
    }

    let path = commands::get_file(&a.node, "hello.txt")
        .await
        .expect("get should succeed");
    assert_eq!(fs::read(path).unwrap(), b"hello ring");

    a.shutdown().await;
    b.shutdown().await;
    c.shutdown().await;
}

#[tokio::test]
async fn ring_heals_after_a_node_dies() {
    let dir = tempfile::tempdir().unwrap();
    let a = spawn(7341, None, 32, dir.path()).await;
    let b = spawn(7342, Some(7341), 32, dir.path()).await;
    let c = spawn(7343, Some(7341), 32, dir.path()).await;

    settle(3000).await;
    let dead = c.node.address.clone();
    c.shutdown().await;
    settle(3000).await;

    // The survivors dropped the dead node from their successor seats and
    // predecessor slots and closed ranks into a two-node ring.
    assert_eq!(a.node.successor(), b.node.address);
    assert_eq!(b.node.successor(), a.node.address);
    assert_eq!(a.node.predecessor_addr(), Some(b.node.address.clone()));
    assert_eq!(b.node.predecessor_addr(), Some(a.node.address.clone()));
    assert_ne!(a.node.successor(), dead);
    assert_ne!(b.node.successor(), dead);

    a.shutdown().await;
    b.shutdown().await;
}
