//! Wire types for the peer-to-peer protocol: newline-delimited JSON-RPC
//! over TCP. Each request names a method on the remote node object and
//! carries a single argument; each reply carries either a result or an
//! error string.

pub mod client;
pub mod server;

use serde::{Deserialize, Serialize};

use crate::chord::id::Identifier;
use crate::chord::types::NodeAddr;
use crate::error::NetworkError;

// The method names are part of the external interface and must not change.
pub const FIND_SUCCESSOR: &str = "Node.FindSuccessorRPC";
pub const GET_PREDECESSOR: &str = "Node.GetPredecessorRPC";
pub const GET_SUCCESSOR_LIST: &str = "Node.GetSuccessorListRPC";
pub const SET_PREDECESSOR: &str = "Node.SetPredecessorRPC";
pub const NOTIFY: &str = "Node.NotifyRPC";
pub const GET_NAME: &str = "Node.GetNameRPC";
pub const STORE_FILE: &str = "Node.StoreFileRPC";
pub const GET_FILE: &str = "Node.GetFileRPC";
pub const CHECK_FILE_EXIST: &str = "Node.CheckFileExistRPC";

/// One request line: `{"method": ..., "params": [arg], "id": n}`.
#[derive(Debug, Serialize, Deserialize)]
pub struct RequestFrame {
    pub method: String,
    pub params: (serde_json::Value,),
    pub id: u64,
}

/// One reply line: `{"id": n, "result": ..., "error": null}`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ReplyFrame {
    pub id: u64,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<String>,
}

/// A file payload crossing the wire. `content` is empty in fetch requests;
/// `backup` marks a replica copy so it is not forwarded again.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: Identifier,
    pub name: String,
    #[serde(with = "b64")]
    pub content: Vec<u8>,
    #[serde(default)]
    pub backup: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FindSuccessorReply {
    pub found: bool,
    pub successor_address: NodeAddr,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreFileReply {
    pub err: Option<String>,
    pub backup: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckFileExistReply {
    pub exist: bool,
}

/// Every recognized request, decoded. The server dispatches through a
/// single match on this enum.
#[derive(Debug)]
pub enum NodeRequest {
    FindSuccessor(Identifier),
    GetPredecessor,
    GetSuccessorList,
    SetPredecessor(NodeAddr),
    Notify(NodeAddr),
    GetName,
    StoreFile(FileRecord),
    GetFile(FileRecord),
    CheckFileExist(String),
}

impl NodeRequest {
    pub fn parse(method: &str, param: serde_json::Value) -> Result<NodeRequest, NetworkError> {
        let bad = |e: serde_json::Error| {
            NetworkError::Protocol(format!("bad argument for {method}: {e}"))
        };
        match method {
            FIND_SUCCESSOR => Ok(NodeRequest::FindSuccessor(
                serde_json::from_value(param).map_err(bad)?,
            )),
            GET_PREDECESSOR => Ok(NodeRequest::GetPredecessor),
            GET_SUCCESSOR_LIST => Ok(NodeRequest::GetSuccessorList),
            SET_PREDECESSOR => Ok(NodeRequest::SetPredecessor(
                serde_json::from_value(param).map_err(bad)?,
            )),
            NOTIFY => Ok(NodeRequest::Notify(
                serde_json::from_value(param).map_err(bad)?,
            )),
            GET_NAME => Ok(NodeRequest::GetName),
            STORE_FILE => Ok(NodeRequest::StoreFile(
                serde_json::from_value(param).map_err(bad)?,
            )),
            GET_FILE => Ok(NodeRequest::GetFile(
                serde_json::from_value(param).map_err(bad)?,
            )),
            CHECK_FILE_EXIST => Ok(NodeRequest::CheckFileExist(
                serde_json::from_value(param).map_err(bad)?,
            )),
            other => Err(NetworkError::Protocol(format!("unknown method {other}"))),
        }
    }
}

mod b64 {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(s).map_err(serde::de::Error::custom)
    }
}
