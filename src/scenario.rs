// src/scenario.rs
use std::sync::Arc;

use anyhow::Result;
use ethers::prelude::*;

use crate::contracts::ProofSubmitter;
use crate::types::Call;

/// ProofSubmitter that the account forwards the proof call through.
pub const TARGET_PROOF_SUBMITTER: &str = "0xEf0E898C1013dd59f03A66947690Aa58F8A5F578";

/// EigenPod receiving the proof.
pub const EIGEN_POD: &str = "0xAcc1fb458a1317E886dB376Fc8141540537E68fE";

/// Pre-built proof calldata forwarded to the EigenPod.
const PROOF_CALLDATA: &str = concat!(
    "3ccc861d00000000000000000000000000000000000000000000000000000000",
    "00000040000000000000000000000000D5e069BC58dedb2a3A348995ee753Eef",
    "0274004F00000000000000000000000000000000000000000000000000000000",
    "0000004b00000000000000000000000000000000000000000000000000000000",
    "0001923500000000000000000000000000000000000000000000000000000000",
    "00000100000000000000000000000000D5e069BC58dedb2a3A348995ee753Eef",
    "0274004F95f0093489d51d9e2f039ed2fce75382c01a534a81d210f9dac82c7e",
    "27aea19f00000000000000000000000000000000000000000000000000000000",
    "0000034000000000000000000000000000000000000000000000000000000000",
    "0000038000000000000000000000000000000000000000000000000000000000",
    "000003e000000000000000000000000000000000000000000000000000000000",
    "000002206bd8b8552455002951ab0141d76f12d24ce2c75a916c88d55bad21e2",
    "573e30d81ff53126be651b2ee23ac0978db0ef57249f7024fb2975b67d33832b",
    "92cf25fd7b04224e2508aa18c9a5e141fe1b7bab61541c90282dd771d4c4efc6",
    "51f202671563a379cd034e64b2138864dacd05f1b998b6a1c18f8cb6527d095b",
    "991581fb595adee1ce007161da3247b0fcc1b312d1c57537320517c837c68e3b",
    "89d233cd0bb2251248851a8cbc96be2de63cde11ba6986fc0e43bf73fc8eea74",
    "01cb254d73c6c73c96e04e8a79491b6eccfecbac37be3cc3c0444fd858aab9b1",
    "169eb73735487409170623edc2b4714fe99ad5291f584eea5b9073ef7d2ef226",
    "06d75164835bce9ca91fb56c57318fecc85403388fe1d2e034f25ce84e719aa4",
    "5cad462f9058dd5a949125136139812a13d649923e924df607f4c17211cbf4f0",
    "46288ac7b0ede366758f6abf153ed2c8d3580de3144ec6777ce6281ba50f1a3e",
    "da93611deaea3a4ceef182b0fe8cbfb7c58b2f84ba7f234db49a8007d3454452",
    "47d63594061228864e78b39c7de495c2953ceee805987b2d278c72b87e7ca902",
    "9e514f37ba20cf2d697283f958e4a32a88c15ecb5c2476aa7e6f26e8da1e924c",
    "763c582ae44946784deda2609277e536824a70e81e515aa6e84328cce37e519a",
    "beac06689964710330b3195b2aaa356608d28666e4c3b3f97a54addece11f91b",
    "81ce1f0c5d5dab4d4bb07541c125acd5ee0a8a77170289b87a9e4b99e699f6b2",
    "8843d2e700000000000000000000000000000000000000000000000000000000",
    "0000000100000000000000000000000000000000000000000000000000000000",
    "0000000000000000000000000000000000000000000000000000000000000000",
    "0000000100000000000000000000000000000000000000000000000000000000",
    "0000002000000000000000000000000000000000000000000000000000000000",
    "0000000000000000000000000000000000000000000000000000000000000000",
    "00000001000000000000000000000000deeeee2b48c121e6728ed95c860e2961",
    "7784993200000000000000000000000000000000000000000000005264d3061e",
    "a97744f0",
);

/// The single call the smoke test submits: `execute(EIGEN_POD, PROOF_CALLDATA)`
/// on the target ProofSubmitter.
pub fn proof_submission_call<M: Middleware + 'static>(client: Arc<M>) -> Result<Call> {
    let target = TARGET_PROOF_SUBMITTER.parse::<Address>()?;
    let eigen_pod = EIGEN_POD.parse::<Address>()?;
    let proof = Bytes::from(hex::decode(PROOF_CALLDATA)?);

    let data = ProofSubmitter::new(target, client)
        .execute(eigen_pod, proof)
        .calldata()
        .ok_or_else(|| anyhow::anyhow!("failed to encode proof submission"))?;

    Ok(Call::new(target, data))
}
