use log::debug;

use crate::chord::id::{between, Identifier};
use crate::chord::types::{Node, NodeAddr};
use crate::error::{ChordError, NetworkError};

impl Node {
    /// The name of the node at `addr`, fetched over the wire. Names are
    /// resolved remotely on every routing decision rather than cached,
    /// because stabilization may swap the node behind a finger or successor
    /// slot at any time.
    pub async fn resolve_name(&self, addr: &NodeAddr) -> Result<String, NetworkError> {
        if addr == &self.address {
            Ok(self.name.clone())
        } else {
            self.rpc.get_name(addr).await
        }
    }

    pub async fn resolve_identifier(&self, addr: &NodeAddr) -> Result<Identifier, NetworkError> {
        Ok(self.space.hash(&self.resolve_name(addr).await?))
    }

    /// One step of lookup resolution: if `id` falls on the arc between us
    /// and our immediate successor (inclusive of the successor), the
    /// successor is the answer; otherwise hand back the closest preceding
    /// node we know as the next hop.
    pub async fn find_successor(&self, id: &Identifier) -> (bool, NodeAddr) {
        let successor = self.successor();
        match self.resolve_identifier(&successor).await {
            Ok(successor_id) => {
                if between(&self.identifier, id, &successor_id, true) {
                    (true, successor)
                } else {
                    (false, self.closest_preceding_node(id).await)
                }
            }
            Err(e) => {
                debug!("could not resolve successor {successor}: {e}");
                (false, self.closest_preceding_node(id).await)
            }
        }
    }

    /// Scan the finger table top-down for the closest node strictly inside
    /// the arc `(self, id)`; fall back to the immediate successor when no
    /// finger qualifies. Unreachable fingers are skipped, not repaired here:
    /// fix_fingers owns the repair.
    pub async fn closest_preceding_node(&self, id: &Identifier) -> NodeAddr {
        let fingers = self.fingers.lock().unwrap().addresses();
        for addr in fingers.into_iter().skip(1).rev() {
            let finger_id = match self.resolve_identifier(&addr).await {
                Ok(fid) => fid,
                Err(_) => continue,
            };
            if between(&self.identifier, &finger_id, id, false) {
                return addr;
            }
        }
        self.successor()
    }

    /// Iterative multi-hop lookup: chase FindSuccessorRPC from `start`
    /// until a hop reports success, up to m hops. Any transport error
    /// aborts the lookup; the caller may simply retry.
    pub async fn find(&self, id: &Identifier, start: NodeAddr) -> Result<NodeAddr, ChordError> {
        let budget = self.space.bits();
        let mut next = start;
        for hop in 0..budget {
            let reply = if next == self.address {
                let (found, addr) = self.find_successor(id).await;
                (found, addr)
            } else {
                let r = self.rpc.find_successor(&next, id).await?;
                (r.found, r.successor_address)
            };
            if reply.0 {
                debug!("lookup of {id} resolved to {} in {} hops", reply.1, hop + 1);
                return Ok(reply.1);
            }
            next = reply.1;
        }
        Err(ChordError::LookupExhausted { hops: budget })
    }
}
