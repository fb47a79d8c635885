// src/bundler.rs
use std::sync::Arc;
use std::time::Duration;

use ethers::prelude::*;
use jsonrpsee::http_client::{HttpClient, HttpClientBuilder};
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::account::SmartAccount;
use crate::constants::{DEFAULT_POLL_INTERVAL_MS, DEFAULT_RECEIPT_TIMEOUT_SECS};
use crate::error::BundlerError;
use crate::rpc::BundlerApiClient;
use crate::types::{Call, UserOperation, UserOperationReceipt};

/// Sends user operations for a smart account through an ERC-4337 relay.
pub struct BundlerClient<A, M> {
    account: A,
    provider: Arc<M>,
    client: HttpClient,
    poll_interval: Duration,
    timeout: Duration,
}

impl<A: SmartAccount, M: Middleware + 'static> BundlerClient<A, M> {
    pub fn new(account: A, provider: Arc<M>, bundler_url: &str) -> Result<Self, BundlerError> {
        let client = HttpClientBuilder::default().build(bundler_url)?;

        Ok(Self {
            account,
            provider,
            client,
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            timeout: Duration::from_secs(DEFAULT_RECEIPT_TIMEOUT_SECS),
        })
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn account(&self) -> &A {
        &self.account
    }

    /// Builds an unsigned operation for `calls`, with fees from the node and
    /// gas limits from the relay's estimate.
    pub async fn prepare_user_operation(&self, calls: &[Call]) -> Result<UserOperation, BundlerError> {
        let sender = self.account.address().await?;
        let nonce = self.account.nonce(None).await?;
        let call_data = self.account.encode_calls(calls)?;

        let code = self
            .provider
            .get_code(sender, None)
            .await
            .map_err(|e| BundlerError::EthereumProviderError(e.to_string()))?;
        let init_code = if code.is_empty() {
            debug!("Account {} not deployed, attaching factory init code", sender);
            self.account.factory_args().await?.init_code()
        } else {
            Bytes::default()
        };

        let (max_fee_per_gas, max_priority_fee_per_gas) = self.estimate_fees_per_gas().await?;

        let mut user_op = UserOperation {
            sender,
            nonce,
            init_code,
            call_data,
            max_fee_per_gas,
            max_priority_fee_per_gas,
            signature: self.account.stub_signature(),
            ..Default::default()
        };

        let estimation = self
            .client
            .estimate_user_operation_gas(user_op.clone(), self.account.entry_point())
            .await?;
        debug!("Gas estimation: {:?}", estimation);

        user_op.call_gas_limit = estimation.call_gas_limit;
        user_op.verification_gas_limit = estimation.verification_gas_limit;
        user_op.pre_verification_gas = estimation.pre_verification_gas;

        Ok(user_op)
    }

    /// Prepares, signs and submits an operation executing `calls`.
    pub async fn send_user_operation(&self, calls: &[Call]) -> Result<H256, BundlerError> {
        let mut user_op = self.prepare_user_operation(calls).await?;
        user_op.signature = self.account.sign_user_operation(&user_op).await?;

        let hash = self
            .client
            .send_user_operation(user_op, self.account.entry_point())
            .await?;

        info!("Submitted user operation {:?}", hash);
        Ok(hash)
    }

    pub async fn get_user_operation_receipt(
        &self,
        hash: H256,
    ) -> Result<Option<UserOperationReceipt>, BundlerError> {
        Ok(self.client.get_user_operation_receipt(hash).await?)
    }

    /// Polls the relay until the operation's receipt is available.
    ///
    /// A timeout too large to represent as an instant never expires.
    pub async fn wait_for_user_operation_receipt(
        &self,
        hash: H256,
    ) -> Result<UserOperationReceipt, BundlerError> {
        let deadline = Instant::now().checked_add(self.timeout);

        loop {
            if let Some(receipt) = self.get_user_operation_receipt(hash).await? {
                info!("User operation {:?} included, success: {}", hash, receipt.success);
                return Ok(receipt);
            }

            if let Some(deadline) = deadline {
                let next_poll = Instant::now().checked_add(self.poll_interval);
                if next_poll.map_or(true, |next_poll| next_poll > deadline) {
                    return Err(BundlerError::ReceiptTimeout {
                        hash,
                        timeout: self.timeout,
                    });
                }
            }

            debug!("Receipt for {:?} pending", hash);
            sleep(self.poll_interval).await;
        }
    }

    pub async fn supported_entry_points(&self) -> Result<Vec<Address>, BundlerError> {
        Ok(self.client.supported_entry_points().await?)
    }

    pub async fn chain_id(&self) -> Result<U64, BundlerError> {
        Ok(self.client.chain_id().await?)
    }

    /// Checks the relay's entry points and chain id against the account.
    ///
    /// Never fails: problems are logged as warnings and reported as `false`.
    pub async fn check_relay(&self) -> bool {
        let entry_point = self.account.entry_point();
        let mut ok = true;

        match self.supported_entry_points().await {
            Ok(supported) if !supported.contains(&entry_point) => {
                warn!("Bundler does not list entry point {} (supports {:?})", entry_point, supported);
                ok = false;
            }
            Ok(_) => {}
            Err(e) => {
                warn!("Could not fetch supported entry points: {}", e);
                ok = false;
            }
        }

        match self.chain_id().await {
            Ok(chain_id) => info!("Bundler chain id: {}", chain_id),
            Err(e) => {
                warn!("Could not fetch bundler chain id: {}", e);
                ok = false;
            }
        }

        ok
    }

    // maxFeePerGas = baseFee * 1.2 + maxPriorityFeePerGas
    async fn estimate_fees_per_gas(&self) -> Result<(U256, U256), BundlerError> {
        let block = self
            .provider
            .get_block(BlockNumber::Latest)
            .await
            .map_err(|e| BundlerError::EthereumProviderError(e.to_string()))?
            .ok_or_else(|| BundlerError::EthereumProviderError("latest block not found".to_string()))?;
        let base_fee = block.base_fee_per_gas.ok_or_else(|| {
            BundlerError::EthereumProviderError("latest block has no base fee".to_string())
        })?;

        let max_priority_fee_per_gas: U256 = self
            .provider
            .provider()
            .request("eth_maxPriorityFeePerGas", ())
            .await
            .map_err(|e| BundlerError::EthereumProviderError(e.to_string()))?;

        let max_fee_per_gas = base_fee * U256::from(12) / U256::from(10) + max_priority_fee_per_gas;

        Ok((max_fee_per_gas, max_priority_fee_per_gas))
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use ethers::abi::{encode, Token};
    use jsonrpsee::core::{async_trait, RpcResult};
    use jsonrpsee::server::{ServerBuilder, ServerHandle};
    use jsonrpsee::types::ErrorObjectOwned;
    use jsonrpsee::RpcModule;
    use serde_json::json;

    use super::*;
    use crate::account::tests::OWNER_KEY;
    use crate::account::ProofSubmitterAccount;
    use crate::rpc::BundlerApiServer;
    use crate::types::{UserOperationGasEstimation, UserOperationReceipt};

    const BASE_FEE: u64 = 1_000_000_000;
    const PRIORITY_FEE: u64 = 1_500_000;
    const NONCE: u64 = 5;

    fn user_op_hash() -> H256 {
        H256::repeat_byte(0x42)
    }

    fn estimation() -> UserOperationGasEstimation {
        UserOperationGasEstimation {
            pre_verification_gas: 50_000.into(),
            verification_gas_limit: 150_000.into(),
            call_gas_limit: 80_000.into(),
        }
    }

    /// In-process relay that records what it receives.
    #[derive(Clone, Default)]
    struct MockRelay {
        estimated: Arc<Mutex<Vec<UserOperation>>>,
        sent: Arc<Mutex<Vec<UserOperation>>>,
        polls: Arc<AtomicUsize>,
        // receipt is returned from this poll on; `None` keeps it pending
        ready_after: Option<usize>,
    }

    #[async_trait]
    impl BundlerApiServer for MockRelay {
        async fn send_user_operation(
            &self,
            user_operation: UserOperation,
            _entry_point: Address,
        ) -> RpcResult<H256> {
            self.sent.lock().unwrap().push(user_operation);
            Ok(user_op_hash())
        }

        async fn estimate_user_operation_gas(
            &self,
            user_operation: UserOperation,
            _entry_point: Address,
        ) -> RpcResult<UserOperationGasEstimation> {
            self.estimated.lock().unwrap().push(user_operation);
            Ok(estimation())
        }

        async fn get_user_operation_receipt(
            &self,
            user_operation_hash: H256,
        ) -> RpcResult<Option<UserOperationReceipt>> {
            let poll = self.polls.fetch_add(1, Ordering::SeqCst);
            match self.ready_after {
                Some(ready_after) if poll >= ready_after => Ok(Some(UserOperationReceipt {
                    user_op_hash: user_operation_hash,
                    entry_point: None,
                    sender: Address::zero(),
                    nonce: NONCE.into(),
                    paymaster: None,
                    actual_gas_cost: 1_000.into(),
                    actual_gas_used: 100.into(),
                    success: true,
                    reason: None,
                    logs: vec![],
                    receipt: TransactionReceipt::default(),
                })),
                _ => Ok(None),
            }
        }

        async fn supported_entry_points(&self) -> RpcResult<Vec<Address>> {
            Ok(vec![crate::constants::ENTRY_POINT_V06.parse().unwrap()])
        }

        async fn chain_id(&self) -> RpcResult<U64> {
            Ok(U64::from(17000))
        }
    }

    /// Serves both the relay and the few node methods the client reads.
    async fn start_server(relay: MockRelay, code: Bytes) -> (SocketAddr, ServerHandle) {
        let mut module = relay.into_rpc();

        let mut node = RpcModule::new(());
        let nonce = Bytes::from(encode(&[Token::Uint(NONCE.into())]));
        node.register_method("eth_call", move |_, _| Ok::<_, ErrorObjectOwned>(nonce.clone()))
            .unwrap();
        node.register_method("eth_getCode", move |_, _| Ok::<_, ErrorObjectOwned>(code.clone()))
            .unwrap();
        let block = serde_json::to_value(Block::<H256> {
            number: Some(1.into()),
            base_fee_per_gas: Some(BASE_FEE.into()),
            ..Default::default()
        })
        .unwrap();
        node.register_method("eth_getBlockByNumber", move |_, _| {
            Ok::<_, ErrorObjectOwned>(block.clone())
        })
        .unwrap();
        node.register_method("eth_maxPriorityFeePerGas", |_, _| {
            Ok::<_, ErrorObjectOwned>(json!(format!("{:#x}", PRIORITY_FEE)))
        })
        .unwrap();
        module.merge(node).unwrap();

        let server = ServerBuilder::default().build("127.0.0.1:0").await.unwrap();
        let addr = server.local_addr().unwrap();
        (addr, server.start(module))
    }

    fn client_for(
        addr: SocketAddr,
    ) -> BundlerClient<ProofSubmitterAccount<Provider<Http>>, Provider<Http>> {
        let url = format!("http://{}", addr);
        let provider = Arc::new(Provider::<Http>::try_from(url.as_str()).unwrap());
        let account = ProofSubmitterAccount::new(
            OWNER_KEY,
            crate::constants::PROOF_SUBMITTER_ACCOUNT.parse().unwrap(),
            17000,
            provider.clone(),
        )
        .unwrap();

        BundlerClient::new(account, provider, &url)
            .unwrap()
            .with_poll_interval(Duration::from_millis(10))
            .with_timeout(Duration::from_millis(500))
    }

    #[tokio::test]
    async fn send_user_operation_submits_signed_operation() {
        let relay = MockRelay::default();
        let (addr, _handle) = start_server(relay.clone(), vec![0x60, 0x80].into()).await;
        let bundler = client_for(addr);
        let calls = vec![Call::new(Address::repeat_byte(0xef), vec![0x3c, 0xcc, 0x86, 0x1d])];

        let hash = bundler.send_user_operation(&calls).await.unwrap();
        assert!(!hash.is_zero());
        assert_eq!(hash, user_op_hash());

        let estimated = relay.estimated.lock().unwrap().clone();
        assert_eq!(estimated.len(), 1);
        assert!(estimated[0].signature.is_empty());

        let sent = relay.sent.lock().unwrap().clone();
        assert_eq!(sent.len(), 1);
        let user_op = &sent[0];
        assert_eq!(user_op.sender, bundler.account().address().await.unwrap());
        assert_eq!(user_op.nonce, U256::from(NONCE));
        assert!(user_op.init_code.is_empty());
        assert_eq!(user_op.call_data, bundler.account().encode_calls(&calls).unwrap());
        assert_eq!(user_op.call_gas_limit, estimation().call_gas_limit);
        assert_eq!(user_op.verification_gas_limit, estimation().verification_gas_limit);
        assert_eq!(user_op.pre_verification_gas, estimation().pre_verification_gas);
        assert_eq!(user_op.max_priority_fee_per_gas, U256::from(PRIORITY_FEE));
        assert_eq!(
            user_op.max_fee_per_gas,
            U256::from(BASE_FEE) * U256::from(12) / U256::from(10) + U256::from(PRIORITY_FEE)
        );
        assert_eq!(user_op.signature.len(), 65);

        let signature = Signature::try_from(user_op.signature.as_ref()).unwrap();
        let hash = user_op.hash(bundler.account().entry_point(), U256::from(17000));
        assert_eq!(signature.recover(hash.as_bytes()).unwrap(), bundler.account().owner());
    }

    #[tokio::test]
    async fn undeployed_account_carries_factory_init_code() {
        let relay = MockRelay::default();
        let (addr, _handle) = start_server(relay.clone(), Bytes::default()).await;
        let bundler = client_for(addr);

        let user_op = bundler
            .prepare_user_operation(&[Call::new(Address::repeat_byte(1), vec![])])
            .await
            .unwrap();

        let factory_args = bundler.account().factory_args().await.unwrap();
        assert_eq!(user_op.init_code, factory_args.init_code());
    }

    #[tokio::test]
    async fn wait_returns_receipt_once_included() {
        let relay = MockRelay { ready_after: Some(2), ..Default::default() };
        let (addr, _handle) = start_server(relay.clone(), vec![0x60].into()).await;
        let bundler = client_for(addr);

        let receipt = bundler.wait_for_user_operation_receipt(user_op_hash()).await.unwrap();

        assert_eq!(receipt.user_op_hash, user_op_hash());
        assert!(receipt.success);
        assert_eq!(relay.polls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn wait_times_out_while_pending() {
        let relay = MockRelay::default();
        let (addr, _handle) = start_server(relay.clone(), vec![0x60].into()).await;
        let bundler = client_for(addr).with_timeout(Duration::from_millis(50));

        let err = bundler.wait_for_user_operation_receipt(user_op_hash()).await.unwrap_err();

        assert!(matches!(err, BundlerError::ReceiptTimeout { hash, .. } if hash == user_op_hash()));
        assert!(relay.polls.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn unbounded_timeout_still_returns_receipt() {
        let relay = MockRelay { ready_after: Some(0), ..Default::default() };
        let (addr, _handle) = start_server(relay.clone(), vec![0x60].into()).await;
        let bundler = client_for(addr).with_timeout(Duration::from_secs(u64::MAX));

        let receipt = bundler.wait_for_user_operation_receipt(user_op_hash()).await.unwrap();

        assert_eq!(receipt.user_op_hash, user_op_hash());
        assert_eq!(relay.polls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn oversized_poll_interval_times_out_instead_of_sleeping() {
        let relay = MockRelay::default();
        let (addr, _handle) = start_server(relay.clone(), vec![0x60].into()).await;
        let bundler = client_for(addr).with_poll_interval(Duration::from_secs(u64::MAX));

        let err = bundler.wait_for_user_operation_receipt(user_op_hash()).await.unwrap_err();

        assert!(matches!(err, BundlerError::ReceiptTimeout { .. }));
        assert_eq!(relay.polls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn relay_metadata_passes_through() {
        let (addr, _handle) = start_server(MockRelay::default(), vec![0x60].into()).await;
        let bundler = client_for(addr);

        assert_eq!(bundler.chain_id().await.unwrap(), U64::from(17000));
        assert_eq!(
            bundler.supported_entry_points().await.unwrap(),
            vec![bundler.account().entry_point()]
        );
        assert!(bundler.check_relay().await);
    }

    #[tokio::test]
    async fn relay_check_does_not_fail_when_metadata_is_unavailable() {
        // node methods only, so both relay metadata calls are rejected
        let mut module = RpcModule::new(());
        module
            .register_method("eth_getCode", |_, _| Ok::<_, ErrorObjectOwned>(Bytes::default()))
            .unwrap();
        let server = ServerBuilder::default().build("127.0.0.1:0").await.unwrap();
        let addr = server.local_addr().unwrap();
        let _handle = server.start(module);
        let bundler = client_for(addr);

        assert!(bundler.supported_entry_points().await.is_err());
        assert!(bundler.chain_id().await.is_err());
        assert!(!bundler.check_relay().await);
    }
}
