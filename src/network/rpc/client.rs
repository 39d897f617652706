//! The calling half of the transport. Every logical call dials the target,
//! sends one request, awaits one reply and closes the connection; a dial or
//! read failure therefore signals suspected peer failure immediately.

use std::time::Duration;

use log::debug;
use serde::de::DeserializeOwned;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::timeout;

use super::{
    CheckFileExistReply, FileRecord, FindSuccessorReply, ReplyFrame, RequestFrame, StoreFileReply,
    CHECK_FILE_EXIST, FIND_SUCCESSOR, GET_FILE, GET_NAME, GET_PREDECESSOR, GET_SUCCESSOR_LIST,
    NOTIFY, SET_PREDECESSOR, STORE_FILE,
};
use crate::chord::id::Identifier;
use crate::chord::types::NodeAddr;
use crate::error::NetworkError;

#[derive(Debug, Clone)]
pub struct RpcClient {
    timeout: Duration,
}

impl RpcClient {
    pub fn new(timeout: Duration) -> Self {
        RpcClient { timeout }
    }

    /// Bare reachability check: dial and hang up.
    pub async fn probe(&self, addr: &NodeAddr) -> Result<(), NetworkError> {
        self.connect(addr).await.map(drop)
    }

    pub async fn find_successor(
        &self,
        addr: &NodeAddr,
        id: &Identifier,
    ) -> Result<FindSuccessorReply, NetworkError> {
        self.call(addr, FIND_SUCCESSOR, serde_json::to_value(id).unwrap())
            .await
    }

    /// Errors both on transport failure and when the remote predecessor is
    /// empty; callers that care must tell the two apart by the error kind.
    pub async fn get_predecessor(&self, addr: &NodeAddr) -> Result<NodeAddr, NetworkError> {
        self.call(addr, GET_PREDECESSOR, serde_json::Value::Null)
            .await
    }

    pub async fn get_successor_list(
        &self,
        addr: &NodeAddr,
    ) -> Result<Vec<NodeAddr>, NetworkError> {
        self.call(addr, GET_SUCCESSOR_LIST, serde_json::Value::Null)
            .await
    }

    pub async fn set_predecessor(
        &self,
        addr: &NodeAddr,
        predecessor: &NodeAddr,
    ) -> Result<bool, NetworkError> {
        self.call(
            addr,
            SET_PREDECESSOR,
            serde_json::to_value(predecessor).unwrap(),
        )
        .await
    }

    pub async fn notify(
        &self,
        addr: &NodeAddr,
        candidate: &NodeAddr,
    ) -> Result<bool, NetworkError> {
        self.call(addr, NOTIFY, serde_json::to_value(candidate).unwrap())
            .await
    }

    pub async fn get_name(&self, addr: &NodeAddr) -> Result<String, NetworkError> {
        self.call(addr, GET_NAME, serde_json::json!("")).await
    }

    pub async fn store_file(
        &self,
        addr: &NodeAddr,
        record: &FileRecord,
    ) -> Result<StoreFileReply, NetworkError> {
        self.call(addr, STORE_FILE, serde_json::to_value(record).unwrap())
            .await
    }

    pub async fn get_file(
        &self,
        addr: &NodeAddr,
        record: &FileRecord,
    ) -> Result<FileRecord, NetworkError> {
        self.call(addr, GET_FILE, serde_json::to_value(record).unwrap())
            .await
    }

    pub async fn check_file_exist(
        &self,
        addr: &NodeAddr,
        key: &str,
    ) -> Result<CheckFileExistReply, NetworkError> {
        self.call(addr, CHECK_FILE_EXIST, serde_json::json!(key))
            .await
    }

    async fn connect(&self, addr: &NodeAddr) -> Result<TcpStream, NetworkError> {
        if addr.as_str().split(':').count() != 2 {
            return Err(NetworkError::InvalidAddress(addr.as_str().to_string()));
        }
        match timeout(self.timeout, TcpStream::connect(addr.as_str())).await {
            Err(_) => Err(NetworkError::Timeout {
                addr: addr.as_str().to_string(),
            }),
            Ok(Err(source)) => Err(NetworkError::Dial {
                addr: addr.as_str().to_string(),
                source,
            }),
            Ok(Ok(stream)) => Ok(stream),
        }
    }

    async fn call<R: DeserializeOwned>(
        &self,
        addr: &NodeAddr,
        method: &str,
        param: serde_json::Value,
    ) -> Result<R, NetworkError> {
        let stream = self.connect(addr).await?;
        let exchange = async move {
            let (read_half, mut write_half) = stream.into_split();
            let frame = RequestFrame {
                method: method.to_string(),
                params: (param,),
                id: 0,
            };
            let mut line = serde_json::to_string(&frame)
                .map_err(|e| NetworkError::Protocol(e.to_string()))?;
            line.push('\n');
            write_half.write_all(line.as_bytes()).await?;

            let mut reply = String::new();
            let n = BufReader::new(read_half).read_line(&mut reply).await?;
            if n == 0 {
                return Err(NetworkError::Protocol(
                    "connection closed before reply".to_string(),
                ));
            }
            let frame: ReplyFrame = serde_json::from_str(reply.trim_end())
                .map_err(|e| NetworkError::Protocol(format!("malformed reply: {e}")))?;
            if let Some(error) = frame.error {
                return Err(NetworkError::Remote(error));
            }
            let result = frame.result.ok_or_else(|| {
                NetworkError::Protocol("reply carried neither result nor error".to_string())
            })?;
            serde_json::from_value(result)
                .map_err(|e| NetworkError::Protocol(format!("unexpected reply shape: {e}")))
        };
        match timeout(self.timeout, exchange).await {
            Err(_) => {
                debug!("{method} to {addr} timed out");
                Err(NetworkError::Timeout {
                    addr: addr.as_str().to_string(),
                })
            }
            Ok(result) => result,
        }
    }
}
