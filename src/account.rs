// src/account.rs
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use ethers::prelude::*;
use ethers::signers::{LocalWallet, Signer};
use ethers::types::transaction::eip712::TypedData;
use tracing::{debug, info};

use crate::constants::{ENTRY_POINT_V06, PROOF_SUBMITTER_FACTORY};
use crate::contracts::{EntryPoint, ProofSubmitter, ProofSubmitterFactory};
use crate::error::AccountError;
use crate::types::{Call, FactoryArgs, UserOperation};

/// Capabilities a bundler client needs from a smart account.
#[async_trait]
pub trait SmartAccount: Send + Sync {
    /// Address of the smart account contract.
    async fn address(&self) -> Result<Address, AccountError>;

    /// Current entry point nonce for `key` (0 when absent).
    async fn nonce(&self, key: Option<U256>) -> Result<U256, AccountError>;

    /// Encodes the account's own calldata for executing `calls`.
    fn encode_calls(&self, calls: &[Call]) -> Result<Bytes, AccountError>;

    async fn sign_user_operation(&self, user_op: &UserOperation) -> Result<Bytes, AccountError>;

    async fn sign_message(&self, message: &[u8]) -> Result<Bytes, AccountError>;

    async fn sign_typed_data(&self, data: &TypedData) -> Result<Bytes, AccountError>;

    /// Placeholder signature for gas estimation. Never submitted.
    fn stub_signature(&self) -> Bytes;

    async fn factory_args(&self) -> Result<FactoryArgs, AccountError>;

    fn entry_point(&self) -> Address;
}

/// ProofSubmitter smart account owned by a single externally owned key.
pub struct ProofSubmitterAccount<M> {
    owner: LocalWallet,
    address: Address,
    chain_id: u64,
    entry_point: EntryPoint<M>,
    contract: ProofSubmitter<M>,
    factory: ProofSubmitterFactory<M>,
}

impl<M: Middleware + 'static> ProofSubmitterAccount<M> {
    pub fn new(private_key: &str, address: Address, chain_id: u64, client: Arc<M>) -> Result<Self> {
        // Create the owner wallet from private key
        let owner = private_key.parse::<LocalWallet>()?.with_chain_id(chain_id);

        // Bind the entry point, the account itself and its factory
        let entry_point = EntryPoint::new(ENTRY_POINT_V06.parse::<Address>()?, client.clone());
        let contract = ProofSubmitter::new(address, client.clone());
        let factory = ProofSubmitterFactory::new(PROOF_SUBMITTER_FACTORY.parse::<Address>()?, client);

        info!("Initialized ProofSubmitter account {} owned by {}", address, owner.address());

        Ok(Self {
            owner,
            address,
            chain_id,
            entry_point,
            contract,
            factory,
        })
    }

    pub fn owner(&self) -> Address {
        self.owner.address()
    }
}

#[async_trait]
impl<M: Middleware + 'static> SmartAccount for ProofSubmitterAccount<M> {
    async fn address(&self) -> Result<Address, AccountError> {
        Ok(self.address)
    }

    async fn nonce(&self, key: Option<U256>) -> Result<U256, AccountError> {
        let nonce = self
            .entry_point
            .get_nonce(self.address, key.unwrap_or_default())
            .call()
            .await
            .map_err(|e| AccountError::Contract(e.to_string()))?;

        debug!("Nonce for {}: {}", self.address, nonce);
        Ok(nonce)
    }

    fn encode_calls(&self, calls: &[Call]) -> Result<Bytes, AccountError> {
        let call = match calls {
            [call] => self.contract.execute(call.to, call.data.clone()),
            _ => self.contract.execute_batch(
                calls.iter().map(|call| call.to).collect(),
                calls.iter().map(|call| call.data.clone()).collect(),
            ),
        };

        call.calldata()
            .ok_or_else(|| AccountError::Encoding(format!("no calldata for {} call(s)", calls.len())))
    }

    async fn sign_user_operation(&self, user_op: &UserOperation) -> Result<Bytes, AccountError> {
        let sender = if user_op.sender.is_zero() {
            self.address().await?
        } else {
            user_op.sender
        };
        let unsigned = UserOperation {
            sender,
            signature: Bytes::default(),
            ..user_op.clone()
        };

        let user_op_hash = unsigned.hash(self.entry_point(), U256::from(self.chain_id));
        debug!("Signing user operation {:?} for {}", user_op_hash, sender);

        // Signed as a personal message over the raw 32 hash bytes
        let signature = self
            .owner
            .sign_message(user_op_hash.as_bytes())
            .await
            .map_err(|e| AccountError::Signer(e.to_string()))?;

        Ok(Bytes::from(signature.to_vec()))
    }

    async fn sign_message(&self, _message: &[u8]) -> Result<Bytes, AccountError> {
        Err(AccountError::Unsupported1271 { method: "signMessage" })
    }

    async fn sign_typed_data(&self, _data: &TypedData) -> Result<Bytes, AccountError> {
        Err(AccountError::Unsupported1271 { method: "signTypedData" })
    }

    fn stub_signature(&self) -> Bytes {
        Bytes::default()
    }

    async fn factory_args(&self) -> Result<FactoryArgs, AccountError> {
        let factory_data = self
            .factory
            .create_proof_submitter()
            .calldata()
            .ok_or_else(|| AccountError::Encoding("no calldata for createProofSubmitter".to_string()))?;

        Ok(FactoryArgs {
            factory: self.factory.address(),
            factory_data,
        })
    }

    fn entry_point(&self) -> Address {
        self.entry_point.address()
    }
}
