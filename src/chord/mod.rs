pub mod crypto;
pub mod id;
pub mod routing;
pub mod storage;
pub mod types;
pub mod workers;

// Protocol defaults; every one of them is overridable on the command line.
pub const DEFAULT_BITS: u32 = 6;
pub const DEFAULT_STABILIZE_MS: u64 = 3000;
pub const DEFAULT_FIX_FINGERS_MS: u64 = 1000;
pub const DEFAULT_CHECK_PREDECESSOR_MS: u64 = 3000;
pub const DEFAULT_SUCCESSOR_COUNT: usize = 3;
