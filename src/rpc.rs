// src/rpc.rs
use ethers::types::{Address, H256, U64};
use jsonrpsee::core::RpcResult;
use jsonrpsee::proc_macros::rpc;

use crate::types::{UserOperation, UserOperationGasEstimation, UserOperationReceipt};

/// The ERC-4337 `eth` namespace exposed by bundler relays
#[rpc(client, server, namespace = "eth")]
pub trait BundlerApi {
    /// Submits a signed user operation, returning its hash
    #[method(name = "sendUserOperation")]
    async fn send_user_operation(
        &self,
        user_operation: UserOperation,
        entry_point: Address,
    ) -> RpcResult<H256>;

    #[method(name = "estimateUserOperationGas")]
    async fn estimate_user_operation_gas(
        &self,
        user_operation: UserOperation,
        entry_point: Address,
    ) -> RpcResult<UserOperationGasEstimation>;

    /// `None` until the operation is included in a bundle
    #[method(name = "getUserOperationReceipt")]
    async fn get_user_operation_receipt(
        &self,
        user_operation_hash: H256,
    ) -> RpcResult<Option<UserOperationReceipt>>;

    #[method(name = "supportedEntryPoints")]
    async fn supported_entry_points(&self) -> RpcResult<Vec<Address>>;

    #[method(name = "chainId")]
    async fn chain_id(&self) -> RpcResult<U64>;
}
