//! Peer lifecycle: bind the listener, bring up the RPC server, bootstrap
//! the ring membership and start the maintenance tickers; tear everything
//! down again on quit.

use std::sync::Arc;

use log::info;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::chord::types::{Node, NodeConfig, SharedNode};
use crate::chord::workers::spawn_maintenance;
use crate::error::{NetworkError, RingletError};
use crate::network::rpc::server::serve;

pub struct Peer {
    pub node: SharedNode,
    quit_tx: watch::Sender<bool>,
    server_handle: JoinHandle<()>,
    ticker_handles: Vec<JoinHandle<()>>,
}

impl Peer {
    /// Bring a node up: bind, serve, then create or join a ring. The
    /// listener is accepting before the join call goes out, so the seed's
    /// stabilization can reach back immediately.
    pub async fn start(config: NodeConfig) -> Result<Peer, RingletError> {
        let bind = format!("{}:{}", config.bind_addr, config.bind_port);
        let listener = TcpListener::bind(&bind).await.map_err(NetworkError::Io)?;

        let node: SharedNode = Arc::new(Node::new(config));
        let (quit_tx, quit_rx) = watch::channel(false);
        let server_handle = tokio::spawn(serve(listener, node.clone(), quit_rx.clone()));
        info!("node {} listening on {}", node.name, node.address);

        match node.config.join_addr.clone() {
            Some(seed) => node.join_chord(&seed).await.map_err(RingletError::from)?,
            None => node.create_chord(),
        }

        let ticker_handles = spawn_maintenance(node.clone(), quit_rx);
        Ok(Peer {
            node,
            quit_tx,
            server_handle,
            ticker_handles,
        })
    }

    /// Stop the tickers and close the listener. Tasks already spawned for
    /// in-flight ticks and connections drain on their own.
    pub async fn shutdown(self) {
        let _ = self.quit_tx.send(true);
        for handle in self.ticker_handles {
            let _ = handle.await;
        }
        let _ = self.server_handle.await;
        info!("node {} stopped", self.node.address);
    }
}
