// src/error.rs
use std::time::Duration;

use ethers::types::H256;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AccountError {
    #[error("{method} is not supported: account isn't EIP-1271 compliant")]
    Unsupported1271 { method: &'static str },

    #[error("Contract call failed: {0}")]
    Contract(String),

    #[error("Signing failed: {0}")]
    Signer(String),

    #[error("Call encoding failed: {0}")]
    Encoding(String),
}

#[derive(Error, Debug)]
pub enum BundlerError {
    #[error(transparent)]
    Account(#[from] AccountError),

    #[error("Ethereum provider error: {0}")]
    EthereumProviderError(String),

    #[error("Bundler RPC error: {0}")]
    Rpc(#[from] jsonrpsee::core::Error),

    #[error("Timed out after {timeout:?} waiting for receipt of user operation {hash:?}")]
    ReceiptTimeout { hash: H256, timeout: Duration },
}
