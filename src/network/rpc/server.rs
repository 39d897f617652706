//! The serving half of the transport: accept connections, read framed
//! requests, dispatch them against the node state, write framed replies.
//! Requests on one connection are served in order; connections are served
//! concurrently, one task each.

use log::{debug, warn};
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;

use super::{CheckFileExistReply, FindSuccessorReply, NodeRequest, ReplyFrame, RequestFrame};
use crate::chord::types::SharedNode;

pub async fn serve(listener: TcpListener, node: SharedNode, mut quit: watch::Receiver<bool>) {
    loop {
        tokio::select! {
            changed = quit.changed() => {
                if changed.is_err() || *quit.borrow() {
                    break;
                }
            }
            accepted = listener.accept() => {
                match accepted {
                    Ok((stream, peer)) => {
                        debug!("accepted connection from {peer}");
                        tokio::spawn(handle_connection(stream, node.clone()));
                    }
                    Err(e) => warn!("accept failed: {e}"),
                }
            }
        }
    }
    debug!("listener stopped");
}

async fn handle_connection(stream: TcpStream, node: SharedNode) {
    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if line.trim().is_empty() {
            continue;
        }
        let frame: RequestFrame = match serde_json::from_str(&line) {
            Ok(frame) => frame,
            Err(e) => {
                debug!("closing connection on malformed request: {e}");
                break;
            }
        };
        let id = frame.id;
        let outcome = match NodeRequest::parse(&frame.method, frame.params.0) {
            Ok(request) => dispatch(&node, request).await,
            Err(e) => Err(e.to_string()),
        };
        let reply = match outcome {
            Ok(result) => ReplyFrame {
                id,
                result: Some(result),
                error: None,
            },
            Err(error) => ReplyFrame {
                id,
                result: None,
                error: Some(error),
            },
        };
        let mut out = serde_json::to_string(&reply).expect("reply frames always serialize");
        out.push('\n');
        if write_half.write_all(out.as_bytes()).await.is_err() {
            break;
        }
    }
}

/// The single dispatch point for every method on the wire.
async fn dispatch(node: &SharedNode, request: NodeRequest) -> Result<serde_json::Value, String> {
    match request {
        NodeRequest::FindSuccessor(id) => {
            let (found, successor_address) = node.find_successor(&id).await;
            encode(FindSuccessorReply {
                found,
                successor_address,
            })
        }
        NodeRequest::GetPredecessor => match node.predecessor_addr() {
            Some(addr) => encode(addr),
            None => Err("predecessor is empty".to_string()),
        },
        NodeRequest::GetSuccessorList => encode(node.successors.lock().unwrap().to_wire()),
        NodeRequest::SetPredecessor(addr) => {
            *node.predecessor.lock().unwrap() = Some(addr);
            encode(true)
        }
        NodeRequest::Notify(candidate) => encode(node.notify(candidate).await),
        NodeRequest::GetName => encode(&node.name),
        NodeRequest::StoreFile(record) => encode(node.handle_store_file(record).await),
        NodeRequest::GetFile(record) => node
            .load_payload(&record)
            .map_err(|e| e.to_string())
            .and_then(encode),
        NodeRequest::CheckFileExist(key) => encode(CheckFileExistReply {
            exist: node.has_key(&key),
        }),
    }
}

fn encode<T: Serialize>(value: T) -> Result<serde_json::Value, String> {
    serde_json::to_value(value).map_err(|e| e.to_string())
}
