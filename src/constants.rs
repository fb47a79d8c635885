// src/constants.rs

pub const HOLESKY_CHAIN_ID: u64 = 17000;

pub const DEFAULT_ETH_RPC_URL: &str = "https://rpc.ankr.com/eth_holesky";

/// Pimlico relay; the API key is appended as `?apikey=`.
pub const DEFAULT_BUNDLER_URL: &str = "https://api.pimlico.io/v2/17069/rpc";

/// Canonical v0.6 entry point.
pub const ENTRY_POINT_V06: &str = "0x5FF137D4b0FDCD49DcA30c7CF57E578a026d2789";

pub const PROOF_SUBMITTER_FACTORY: &str = "0x9d979efFFce38D910979BbF4177894cd8817220B";

/// Deployed ProofSubmitter for the test owner.
pub const PROOF_SUBMITTER_ACCOUNT: &str = "0x80509AA12753582aA4CF4D0Cc3781D35099d0f5d";

pub const DEFAULT_POLL_INTERVAL_MS: u64 = 4_000;

pub const DEFAULT_RECEIPT_TIMEOUT_SECS: u64 = 180;
