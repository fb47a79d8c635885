// src/contracts.rs
#![allow(clippy::all, non_camel_case_types)]

use ethers::contract::abigen;

abigen!(ProofSubmitter, "src/abi/ProofSubmitter.json");

abigen!(ProofSubmitterFactory, "src/abi/ProofSubmitterFactory.json");

abigen!(
    EntryPoint,
    r#"[
        function getNonce(address sender, uint192 key) external view returns (uint256 nonce)
    ]"#
);
