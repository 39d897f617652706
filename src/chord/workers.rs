//! The ring-maintenance state machine: create, join, stabilize, notify,
//! fix_fingers and check_predecessor, plus the periodic tickers that drive
//! the last three.
//!
//! Every operation follows the same locking discipline: snapshot the fields
//! it needs, drop the lock, talk to the network, then reacquire and commit
//! only if the snapshot still matches. Failed RPCs are never retried in
//! place; the next tick retries implicitly.

use std::future::Future;

use log::{debug, info, warn};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use crate::chord::id::between;
use crate::chord::types::{Node, NodeAddr, SharedNode, SuccessorList};
use crate::error::NetworkError;

impl Node {
    /// Form a single-node ring: no predecessor, ourselves as successor.
    pub fn create_chord(&self) {
        *self.predecessor.lock().unwrap() = None;
        self.successors
            .lock()
            .unwrap()
            .set_head(self.address.clone());
        info!("created a new ring as {}", self.address);
    }

    /// Join the ring that `seed` belongs to. The seed becomes our immediate
    /// successor, its successor list seeds the rest of ours, and it is told
    /// about us right away (stabilization would get there eventually, this
    /// just shortens the window).
    pub async fn join_chord(&self, seed: &NodeAddr) -> Result<(), NetworkError> {
        {
            *self.predecessor.lock().unwrap() = None;
            self.successors.lock().unwrap().set_head(seed.clone());
        }

        let theirs = self.rpc.get_successor_list(seed).await?;
        {
            let mut successors = self.successors.lock().unwrap();
            let slots = SuccessorList::slots_from_wire(theirs);
            successors.adopt_tail(&slots);
        }

        self.rpc.set_predecessor(seed, &self.address).await?;
        info!("joined the ring through {seed}");
        Ok(())
    }

    /// Verify the immediate successor and propagate our predecessor claim.
    pub async fn stabilize(&self) {
        // (i) Refresh the successor list from the current head, or evict
        // the head if it stopped answering.
        let head = match self.successors.lock().unwrap().head().cloned() {
            Some(head) => head,
            None => {
                // Drained list: become a solo ring until someone notifies us.
                self.successors
                    .lock()
                    .unwrap()
                    .set_head(self.address.clone());
                self.address.clone()
            }
        };

        if head != self.address {
            match self.rpc.get_successor_list(&head).await {
                Ok(theirs) => {
                    let mut successors = self.successors.lock().unwrap();
                    if successors.head() == Some(&head) {
                        let slots = SuccessorList::slots_from_wire(theirs);
                        successors.adopt_tail(&slots);
                    }
                }
                Err(e) => {
                    debug!("successor {head} unreachable, dropping it: {e}");
                    let mut successors = self.successors.lock().unwrap();
                    if successors.head() == Some(&head) {
                        successors.shift_left();
                        if successors.head().is_none() {
                            successors.set_head(self.address.clone());
                        }
                    }
                }
            }
        }

        // (ii) If the successor knows a predecessor that sits between us and
        // it on the ring, that node is our true successor.
        let head = self.successor();
        let claimed = if head == self.address {
            self.predecessor_addr()
        } else {
            self.rpc.get_predecessor(&head).await.ok()
        };
        if let Some(claimed) = claimed {
            if claimed != self.address && !claimed.is_empty() {
                let resolved = match (
                    self.resolve_identifier(&head).await,
                    self.resolve_identifier(&claimed).await,
                ) {
                    (Ok(head_id), Ok(claimed_id)) => Some((head_id, claimed_id)),
                    _ => None,
                };
                if let Some((head_id, claimed_id)) = resolved {
                    if between(&self.identifier, &claimed_id, &head_id, false) {
                        let mut successors = self.successors.lock().unwrap();
                        if successors.head() == Some(&head) {
                            debug!("adopting {claimed} as successor in place of {head}");
                            successors.set_head(claimed);
                        }
                    }
                }
            }
        }

        // (iii) Tell the (possibly new) successor that we are its
        // predecessor candidate.
        let head = self.successor();
        if head != self.address {
            if let Err(e) = self.rpc.notify(&head, &self.address).await {
                debug!("notify to {head} failed: {e}");
            }
        }
    }

    /// RPC handler: `candidate` believes it is our predecessor. Adopt it if
    /// we have none, or if it sits closer behind us than the current one.
    pub async fn notify(&self, candidate: NodeAddr) -> bool {
        let current = self.predecessor_addr();
        let current = match current {
            None => {
                *self.predecessor.lock().unwrap() = Some(candidate);
                return true;
            }
            Some(current) => current,
        };

        let resolved = match (
            self.resolve_identifier(&current).await,
            self.resolve_identifier(&candidate).await,
        ) {
            (Ok(current_id), Ok(candidate_id)) => Some((current_id, candidate_id)),
            _ => None,
        };
        match resolved {
            Some((current_id, candidate_id))
                if between(&current_id, &candidate_id, &self.identifier, false) =>
            {
                let mut predecessor = self.predecessor.lock().unwrap();
                // Commit unless someone else claimed the slot meanwhile.
                if predecessor.as_ref() == Some(&current) || predecessor.is_none() {
                    *predecessor = Some(candidate);
                }
                true
            }
            Some(_) => true,
            None => false,
        }
    }

    /// Refresh one finger slot, then opportunistically fill every following
    /// slot whose offset still falls short of the freshly found successor;
    /// those all resolve to the same node, so no further lookups are needed.
    pub async fn fix_fingers(&self) {
        let (index, offset) = {
            let mut fingers = self.fingers.lock().unwrap();
            let index = fingers.advance();
            (index, self.space.finger_offset(&self.identifier, index as u32))
        };

        let (_found, addr) = self.find_successor(&offset).await;
        if addr.is_empty() {
            return;
        }
        self.fingers.lock().unwrap().set_address(index, addr.clone());

        let successor_id = match self.resolve_identifier(&addr).await {
            Ok(id) => id,
            Err(e) => {
                debug!("finger bulk-fill skipped, {addr} did not answer: {e}");
                return;
            }
        };

        let mut fingers = self.fingers.lock().unwrap();
        loop {
            let next = fingers.advance();
            if next == 0 {
                // Wrapped all the way around; start fresh next tick.
                return;
            }
            let offset = self.space.finger_offset(&self.identifier, next as u32);
            if between(&self.identifier, &offset, &successor_id, false) {
                fingers.set_address(next, addr.clone());
            } else {
                fingers.retreat();
                return;
            }
        }
    }

    /// Probe the predecessor with a bare connect; clear it on failure.
    /// Its data is not recovered here, that falls out of the next
    /// stabilization round of its own predecessor.
    pub async fn check_predecessor(&self) {
        let predecessor = self.predecessor_addr();
        if let Some(addr) = predecessor {
            if let Err(e) = self.rpc.probe(&addr).await {
                warn!("predecessor {addr} stopped answering, clearing it: {e}");
                let mut predecessor = self.predecessor.lock().unwrap();
                if predecessor.as_ref() == Some(&addr) {
                    *predecessor = None;
                }
            }
        }
    }
}

/// Start the three periodic tickers. Each tick spawns a detached task and
/// does not await the previous one: the operations are idempotent and
/// overlapping runs converge on a later tick.
pub fn spawn_maintenance(node: SharedNode, quit: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
    vec![
        spawn_ticker(
            "stabilize",
            node.clone(),
            node.config.stabilize_interval,
            quit.clone(),
            |n| async move { n.stabilize().await },
        ),
        spawn_ticker(
            "fix_fingers",
            node.clone(),
            node.config.fix_fingers_interval,
            quit.clone(),
            |n| async move { n.fix_fingers().await },
        ),
        spawn_ticker(
            "check_predecessor",
            node.clone(),
            node.config.check_predecessor_interval,
            quit,
            |n| async move { n.check_predecessor().await },
        ),
    ]
}

fn spawn_ticker<F, Fut>(
    name: &'static str,
    node: SharedNode,
    period: std::time::Duration,
    mut quit: watch::Receiver<bool>,
    task: F,
) -> JoinHandle<()>
where
    F: Fn(SharedNode) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick of tokio's interval fires immediately; skip it so
        // a fresh node settles before its first maintenance round.
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    tokio::spawn(task(node.clone()));
                }
                changed = quit.changed() => {
                    if changed.is_err() || *quit.borrow() {
                        break;
                    }
                }
            }
        }
        debug!("{name} ticker stopped");
    })
}
