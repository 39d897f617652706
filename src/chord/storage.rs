//! The node-local file bucket: a map from key identifier to file name,
//! backed by payload files on disk.
//!
//! The directory layout is part of the external contract with operators:
//! `<files_root>/<node_name>/file_upload/` holds files a client offers to
//! the ring, `<files_root>/<node_name>/file_download/` receives fetched
//! files, and `<files_root>/<node_name>/chord_storage/` holds the payloads
//! this node is responsible for.

use std::fs;
use std::path::PathBuf;

use log::{debug, info};

use crate::chord::types::Node;
use crate::error::StorageError;
use crate::network::rpc::{FileRecord, StoreFileReply};

impl Node {
    fn node_dir(&self) -> PathBuf {
        self.config.files_root.join(&self.name)
    }

    pub fn upload_path(&self, file_name: &str) -> PathBuf {
        self.node_dir().join("file_upload").join(file_name)
    }

    pub fn download_path(&self, file_name: &str) -> PathBuf {
        self.node_dir().join("file_download").join(file_name)
    }

    fn storage_path(&self, file_name: &str) -> PathBuf {
        self.node_dir().join("chord_storage").join(file_name)
    }

    pub fn read_upload(&self, file_name: &str) -> Result<Vec<u8>, StorageError> {
        Ok(fs::read(self.upload_path(file_name))?)
    }

    pub fn save_download(&self, file_name: &str, content: &[u8]) -> Result<PathBuf, StorageError> {
        let path = self.download_path(file_name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, content)?;
        Ok(path)
    }

    /// Persist an inbound payload and record it under its key. Backup
    /// copies land on disk too but are tracked separately, so they are not
    /// served by lookups against this node.
    pub fn store_payload(&self, record: &FileRecord) -> Result<(), StorageError> {
        let path = self.storage_path(&record.name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, &record.content)?;
        let registry = if record.backup {
            &self.backups
        } else {
            &self.bucket
        };
        registry
            .lock()
            .unwrap()
            .insert(record.id.clone(), record.name.clone());
        debug!(
            "stored {} under key {} (backup: {})",
            record.name, record.id, record.backup
        );
        Ok(())
    }

    /// Serve a payload this node is responsible for.
    pub fn load_payload(&self, request: &FileRecord) -> Result<FileRecord, StorageError> {
        let name = self
            .bucket
            .lock()
            .unwrap()
            .get(&request.id)
            .cloned()
            .ok_or_else(|| StorageError::KeyNotFound(request.name.clone()))?;
        let content = fs::read(self.storage_path(&name))?;
        Ok(FileRecord {
            id: request.id.clone(),
            name,
            content,
            backup: false,
        })
    }

    pub fn has_key(&self, key: &str) -> bool {
        let id = self.space.hash(key);
        self.bucket.lock().unwrap().contains_key(&id)
    }

    /// The StoreFileRPC handler: persist the payload, then place one backup
    /// copy on the immediate successor. The copy is marked so the successor
    /// does not forward it again.
    pub async fn handle_store_file(&self, record: FileRecord) -> StoreFileReply {
        let is_backup = record.backup;
        if let Err(e) = self.store_payload(&record) {
            return StoreFileReply {
                err: Some(e.to_string()),
                backup: false,
            };
        }

        let mut backed_up = false;
        if !is_backup {
            let successor = self.successor();
            if successor != self.address {
                let mut copy = record;
                copy.backup = true;
                match self.rpc.store_file(&successor, &copy).await {
                    Ok(_) => {
                        backed_up = true;
                        info!("backed up {} to {successor}", copy.name);
                    }
                    Err(e) => debug!("backup of {} to {successor} failed: {e}", copy.name),
                }
            }
        }
        StoreFileReply {
            err: None,
            backup: backed_up,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chord::types::NodeConfig;

    fn test_node(root: &std::path::Path) -> Node {
        Node::new(NodeConfig {
            bind_addr: "127.0.0.1".to_string(),
            bind_port: 9200,
            files_root: root.to_path_buf(),
            ..NodeConfig::default()
        })
    }

    fn record(node: &Node, name: &str, content: &[u8], backup: bool) -> FileRecord {
        FileRecord {
            id: node.space.hash(name),
            name: name.to_string(),
            content: content.to_vec(),
            backup,
        }
    }

    #[test]
    fn store_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let node = test_node(dir.path());
        let stored = record(&node, "hello.txt", b"hello world", false);
        node.store_payload(&stored).unwrap();

        assert!(node.has_key("hello.txt"));
        let request = record(&node, "hello.txt", b"", false);
        let served = node.load_payload(&request).unwrap();
        assert_eq!(served.name, "hello.txt");
        assert_eq!(served.content, b"hello world");
    }

    #[test]
    fn missing_key_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let node = test_node(dir.path());
        assert!(!node.has_key("absent.txt"));
        let request = record(&node, "absent.txt", b"", false);
        assert!(matches!(
            node.load_payload(&request),
            Err(StorageError::KeyNotFound(_))
        ));
    }

    #[test]
    fn backup_copies_are_not_served() {
        let dir = tempfile::tempdir().unwrap();
        let node = test_node(dir.path());
        let stored = record(&node, "replica.txt", b"copy", true);
        node.store_payload(&stored).unwrap();

        // On disk for recovery, but invisible to key lookups.
        assert!(node.storage_path("replica.txt").exists());
        assert!(!node.has_key("replica.txt"));
        let request = record(&node, "replica.txt", b"", false);
        assert!(node.load_payload(&request).is_err());
    }

    #[test]
    fn upload_and_download_paths_are_per_node() {
        let dir = tempfile::tempdir().unwrap();
        let node = test_node(dir.path());
        let up = node.upload_path("a.txt");
        let down = node.download_path("a.txt");
        assert!(up.starts_with(dir.path().join(&node.name)));
        assert!(up.ends_with("file_upload/a.txt"));
        assert!(down.ends_with("file_download/a.txt"));
    }

    #[test]
    fn save_download_creates_directories() {
        let dir = tempfile::tempdir().unwrap();
        let node = test_node(dir.path());
        let path = node.save_download("fetched.txt", b"data").unwrap();
        assert_eq!(fs::read(path).unwrap(), b"data");
    }
}
