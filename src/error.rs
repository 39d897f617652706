use thiserror::Error;

#[derive(Error, Debug)]
pub enum RingletError {
    #[error("network error: {0}")]
    Network(#[from] NetworkError),

    #[error("chord protocol error: {0}")]
    Chord(#[from] ChordError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("failed to dial {addr}: {source}")]
    Dial {
        addr: String,
        source: std::io::Error,
    },

    #[error("request to {addr} timed out")]
    Timeout { addr: String },

    #[error("invalid node address: {0}")]
    InvalidAddress(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("remote error: {0}")]
    Remote(String),
}

#[derive(Error, Debug)]
pub enum ChordError {
    #[error("lookup gave up after {hops} hops")]
    LookupExhausted { hops: u32 },

    #[error("lookup aborted: {0}")]
    LookupAborted(#[from] NetworkError),
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("no file stored under key {0}")]
    KeyNotFound(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("payload cipher failure: {0}")]
    Cipher(String),
}
