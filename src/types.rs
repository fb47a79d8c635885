// src/types.rs
use ethers::abi::{encode, Token};
use ethers::types::{Address, Bytes, Log, TransactionReceipt, H256, U256};
use ethers::utils::keccak256;
use serde::{Deserialize, Serialize};

/// ERC-4337 user operation as consumed by the v0.6 entry point.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOperation {
    pub sender: Address,
    pub nonce: U256,
    pub init_code: Bytes,
    pub call_data: Bytes,
    pub call_gas_limit: U256,
    pub verification_gas_limit: U256,
    pub pre_verification_gas: U256,
    pub max_fee_per_gas: U256,
    pub max_priority_fee_per_gas: U256,
    pub paymaster_and_data: Bytes,
    pub signature: Bytes,
}

impl UserOperation {
    /// ABI-encodes every field except the signature, with the dynamic
    /// fields replaced by their keccak256 hashes.
    pub fn pack_without_signature(&self) -> Bytes {
        let encoded = encode(&[
            Token::Address(self.sender),
            Token::Uint(self.nonce),
            Token::FixedBytes(keccak256(&self.init_code).to_vec()),
            Token::FixedBytes(keccak256(&self.call_data).to_vec()),
            Token::Uint(self.call_gas_limit),
            Token::Uint(self.verification_gas_limit),
            Token::Uint(self.pre_verification_gas),
            Token::Uint(self.max_fee_per_gas),
            Token::Uint(self.max_priority_fee_per_gas),
            Token::FixedBytes(keccak256(&self.paymaster_and_data).to_vec()),
        ]);

        Bytes::from(encoded)
    }

    /// The hash the account signs: binds the packed operation to an entry
    /// point and a chain.
    pub fn hash(&self, entry_point: Address, chain_id: U256) -> H256 {
        let packed_hash = keccak256(self.pack_without_signature());

        H256::from(keccak256(encode(&[
            Token::FixedBytes(packed_hash.to_vec()),
            Token::Address(entry_point),
            Token::Uint(chain_id),
        ])))
    }
}

/// A single call the smart account should make.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Call {
    pub to: Address,
    pub data: Bytes,
}

impl Call {
    pub fn new(to: Address, data: impl Into<Bytes>) -> Self {
        Self { to, data: data.into() }
    }
}

/// Factory deployment data, used as init code while the account has no code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FactoryArgs {
    pub factory: Address,
    pub factory_data: Bytes,
}

impl FactoryArgs {
    pub fn init_code(&self) -> Bytes {
        let mut init_code = self.factory.as_bytes().to_vec();
        init_code.extend_from_slice(&self.factory_data);
        Bytes::from(init_code)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOperationGasEstimation {
    pub pre_verification_gas: U256,
    pub verification_gas_limit: U256,
    pub call_gas_limit: U256,
}

/// Receipt returned by `eth_getUserOperationReceipt` once the operation is mined.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserOperationReceipt {
    pub user_op_hash: H256,
    #[serde(default)]
    pub entry_point: Option<Address>,
    pub sender: Address,
    pub nonce: U256,
    #[serde(default)]
    pub paymaster: Option<Address>,
    pub actual_gas_cost: U256,
    pub actual_gas_used: U256,
    pub success: bool,
    /// Revert reason, when the relay reports one
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub logs: Vec<Log>,
    /// Receipt of the whole bundle transaction, not only this operation.
    pub receipt: TransactionReceipt,
}
