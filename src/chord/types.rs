use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::chord::crypto::NodeKeys;
use crate::chord::id::{IdSpace, Identifier};
use crate::chord::{
    DEFAULT_BITS, DEFAULT_CHECK_PREDECESSOR_MS, DEFAULT_FIX_FINGERS_MS, DEFAULT_STABILIZE_MS,
    DEFAULT_SUCCESSOR_COUNT,
};
use crate::network::rpc::client::RpcClient;

// Shared state types for thread-safe access. Every lock guards a short,
// CPU-only critical section; none is ever held across an outbound RPC.
pub type SharedPredecessor = Arc<Mutex<Option<NodeAddr>>>;
pub type SharedSuccessors = Arc<Mutex<SuccessorList>>;
pub type SharedFingerTable = Arc<Mutex<FingerTable>>;
pub type SharedBucket = Arc<Mutex<HashMap<Identifier, String>>>;

/// A transport endpoint of the form `host:port`. The hash of a node's name
/// (which defaults to its address) gives the node's ring identifier.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeAddr(String);

impl NodeAddr {
    pub fn new(addr: impl Into<String>) -> Self {
        NodeAddr(addr.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for NodeAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for NodeAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeAddr({})", self.0)
    }
}

impl From<&str> for NodeAddr {
    fn from(s: &str) -> Self {
        NodeAddr(s.to_string())
    }
}

/// One finger table slot: the ring position `(n + 2^i) mod 2^m` together
/// with the node currently believed to succeed that position.
#[derive(Debug, Clone)]
pub struct FingerEntry {
    pub id: Identifier,
    pub address: NodeAddr,
}

/// The routing table proper, plus the rotating index of the next slot to
/// refresh. The index lives here because `fix_fingers` mutates both under
/// one lock.
#[derive(Debug)]
pub struct FingerTable {
    entries: Vec<FingerEntry>,
    next: usize,
}

impl FingerTable {
    /// All slot ids are computed up front; every address starts out pointing
    /// at the local node so lookups before stabilization never see an empty
    /// entry. The rotating index is positioned so that the first refresh
    /// targets slot 0.
    pub fn bootstrap(space: &IdSpace, identifier: &Identifier, own: &NodeAddr) -> Self {
        let m = space.bits();
        let entries = (0..m)
            .map(|i| FingerEntry {
                id: space.finger_offset(identifier, i),
                address: own.clone(),
            })
            .collect();
        FingerTable {
            entries,
            next: m as usize - 1,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entry(&self, i: usize) -> &FingerEntry {
        &self.entries[i]
    }

    pub fn entries(&self) -> &[FingerEntry] {
        &self.entries
    }

    pub fn set_address(&mut self, i: usize, addr: NodeAddr) {
        self.entries[i].address = addr;
    }

    /// Advance the rotating index and return the slot it now points at.
    pub fn advance(&mut self) -> usize {
        self.next = (self.next + 1) % self.entries.len();
        self.next
    }

    /// Step the rotating index back one slot, so the next refresh retries
    /// the slot that could not be filled.
    pub fn retreat(&mut self) {
        self.next = (self.next + self.entries.len() - 1) % self.entries.len();
    }

    pub fn addresses(&self) -> Vec<NodeAddr> {
        self.entries.iter().map(|e| e.address.clone()).collect()
    }
}

/// Fixed-length successor list. Slot 0 is the immediate successor; empty
/// slots are the sentinel for "unknown".
#[derive(Debug, Clone)]
pub struct SuccessorList {
    slots: Vec<Option<NodeAddr>>,
}

impl SuccessorList {
    pub fn new(len: usize) -> Self {
        SuccessorList {
            slots: vec![None; len],
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn head(&self) -> Option<&NodeAddr> {
        self.slots[0].as_ref()
    }

    pub fn set_head(&mut self, addr: NodeAddr) {
        self.slots[0] = Some(addr);
    }

    /// Overwrite every slot after the head with the first `len - 1` entries
    /// of another node's list: the refresh step of stabilization, and the
    /// seeding step of join.
    pub fn adopt_tail(&mut self, theirs: &[Option<NodeAddr>]) {
        for i in 1..self.slots.len() {
            self.slots[i] = theirs.get(i - 1).cloned().flatten();
        }
    }

    /// Drop the (failed) head; everything moves up one slot and the last
    /// slot becomes empty.
    pub fn shift_left(&mut self) {
        self.slots.rotate_left(1);
        let last = self.slots.len() - 1;
        self.slots[last] = None;
    }

    pub fn snapshot(&self) -> Vec<Option<NodeAddr>> {
        self.slots.clone()
    }

    /// Wire form: empty slots become empty address strings.
    pub fn to_wire(&self) -> Vec<NodeAddr> {
        self.slots
            .iter()
            .map(|s| s.clone().unwrap_or_else(|| NodeAddr::new("")))
            .collect()
    }

    pub fn slots_from_wire(list: Vec<NodeAddr>) -> Vec<Option<NodeAddr>> {
        list.into_iter()
            .map(|a| if a.is_empty() { None } else { Some(a) })
            .collect()
    }
}

/// Everything resolved from the command line, fixed for the node's lifetime.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub bind_addr: String,
    pub bind_port: u16,
    /// Absent means create a new ring instead of joining one.
    pub join_addr: Option<NodeAddr>,
    pub stabilize_interval: Duration,
    pub fix_fingers_interval: Duration,
    pub check_predecessor_interval: Duration,
    pub successor_count: usize,
    /// Overrides `host:port` as the name whose hash gives the identifier.
    pub client_name: Option<String>,
    pub bits: u32,
    pub files_root: PathBuf,
}

impl NodeConfig {
    pub fn address(&self) -> NodeAddr {
        NodeAddr::new(format!("{}:{}", self.bind_addr, self.bind_port))
    }

    pub fn dial_timeout(&self) -> Duration {
        3 * self.stabilize_interval
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        NodeConfig {
            bind_addr: "localhost".to_string(),
            bind_port: 8000,
            join_addr: None,
            stabilize_interval: Duration::from_millis(DEFAULT_STABILIZE_MS),
            fix_fingers_interval: Duration::from_millis(DEFAULT_FIX_FINGERS_MS),
            check_predecessor_interval: Duration::from_millis(DEFAULT_CHECK_PREDECESSOR_MS),
            successor_count: DEFAULT_SUCCESSOR_COUNT,
            client_name: None,
            bits: DEFAULT_BITS,
            files_root: PathBuf::from("../files"),
        }
    }
}

/// The per-node state record: one per process, shared between the RPC
/// server, the maintenance tickers and the interactive prompt.
pub struct Node {
    pub name: String,
    pub identifier: Identifier,
    pub address: NodeAddr,
    pub space: IdSpace,
    pub config: NodeConfig,
    pub keys: NodeKeys,
    pub rpc: RpcClient,

    pub predecessor: SharedPredecessor,
    pub successors: SharedSuccessors,
    pub fingers: SharedFingerTable,
    pub bucket: SharedBucket,
    pub backups: SharedBucket,
}

pub type SharedNode = Arc<Node>;

impl Node {
    pub fn new(config: NodeConfig) -> Node {
        let address = config.address();
        let name = config
            .client_name
            .clone()
            .unwrap_or_else(|| address.as_str().to_string());
        let space = IdSpace::new(config.bits);
        let identifier = space.hash(&name);
        let fingers = FingerTable::bootstrap(&space, &identifier, &address);
        let successors = SuccessorList::new(config.successor_count);
        let rpc = RpcClient::new(config.dial_timeout());

        Node {
            name,
            identifier,
            address,
            space,
            config,
            keys: NodeKeys::generate(),
            rpc,
            predecessor: Arc::new(Mutex::new(None)),
            successors: Arc::new(Mutex::new(successors)),
            fingers: Arc::new(Mutex::new(fingers)),
            bucket: Arc::new(Mutex::new(HashMap::new())),
            backups: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// The immediate successor, falling back to the local address while the
    /// list is still unseeded.
    pub fn successor(&self) -> NodeAddr {
        self.successors
            .lock()
            .unwrap()
            .head()
            .cloned()
            .unwrap_or_else(|| self.address.clone())
    }

    pub fn predecessor_addr(&self) -> Option<NodeAddr> {
        self.predecessor.lock().unwrap().clone()
    }

    pub fn print_state(&self) {
        println!("-------------- current node state --------------");
        println!("name:        {}", self.name);
        println!("address:     {}", self.address);
        println!("identifier:  {}", self.identifier);
        println!("public key:  {}", hex::encode(self.keys.public_key()));
        match self.predecessor_addr() {
            Some(p) => println!("predecessor: {p}"),
            None => println!("predecessor: (empty)"),
        }
        println!("successors:");
        for (i, slot) in self.successors.lock().unwrap().snapshot().iter().enumerate() {
            match slot {
                Some(addr) => println!("  [{i}] {addr}"),
                None => println!("  [{i}] (empty)"),
            }
        }
        println!("finger table:");
        let fingers = self.fingers.lock().unwrap();
        for (i, entry) in fingers.entries().iter().enumerate() {
            println!("  [{i}] id {} -> {}", entry.id, entry.address);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_node(bits: u32) -> Node {
        Node::new(NodeConfig {
            bind_addr: "127.0.0.1".to_string(),
            bind_port: 9100,
            bits,
            ..NodeConfig::default()
        })
    }

    #[test]
    fn new_node_bootstraps_fingers_to_self() {
        let node = test_node(6);
        let fingers = node.fingers.lock().unwrap();
        assert_eq!(fingers.len(), 6);
        for (i, entry) in fingers.entries().iter().enumerate() {
            let expected = node.space.finger_offset(&node.identifier, i as u32);
            assert_eq!(entry.id, expected);
            assert_eq!(entry.address, node.address);
        }
    }

    #[test]
    fn first_finger_refresh_targets_slot_zero() {
        let node = test_node(6);
        let mut fingers = node.fingers.lock().unwrap();
        assert_eq!(fingers.advance(), 0);
        assert_eq!(fingers.advance(), 1);
    }

    #[test]
    fn new_node_has_empty_ring_state() {
        let node = test_node(6);
        assert!(node.predecessor_addr().is_none());
        let successors = node.successors.lock().unwrap();
        assert_eq!(successors.len(), 3);
        assert!(successors.head().is_none());
    }

    #[test]
    fn client_name_overrides_address_as_identity() {
        let node = Node::new(NodeConfig {
            client_name: Some("cafe42".to_string()),
            ..NodeConfig::default()
        });
        assert_eq!(node.name, "cafe42");
        assert_eq!(node.identifier, node.space.hash("cafe42"));
    }

    #[test]
    fn successor_list_adopt_tail_keeps_head() {
        let mut ours = SuccessorList::new(3);
        ours.set_head(NodeAddr::from("10.0.0.1:8000"));
        let theirs = vec![
            Some(NodeAddr::from("10.0.0.2:8000")),
            Some(NodeAddr::from("10.0.0.3:8000")),
            Some(NodeAddr::from("10.0.0.4:8000")),
        ];
        ours.adopt_tail(&theirs);
        let slots = ours.snapshot();
        assert_eq!(slots[0].as_ref().unwrap().as_str(), "10.0.0.1:8000");
        assert_eq!(slots[1].as_ref().unwrap().as_str(), "10.0.0.2:8000");
        assert_eq!(slots[2].as_ref().unwrap().as_str(), "10.0.0.3:8000");
    }

    #[test]
    fn successor_list_shift_left_drains() {
        let mut list = SuccessorList::new(2);
        list.set_head(NodeAddr::from("10.0.0.1:8000"));
        list.shift_left();
        assert!(list.head().is_none());
        assert_eq!(list.snapshot(), vec![None, None]);
    }

    #[test]
    fn successor_list_wire_round_trip() {
        let mut list = SuccessorList::new(3);
        list.set_head(NodeAddr::from("10.0.0.1:8000"));
        let wire = list.to_wire();
        assert_eq!(wire.len(), 3);
        assert_eq!(wire[0].as_str(), "10.0.0.1:8000");
        assert!(wire[1].is_empty());
        let slots = SuccessorList::slots_from_wire(wire);
        assert_eq!(slots[0].as_ref().unwrap().as_str(), "10.0.0.1:8000");
        assert!(slots[1].is_none());
    }
}
