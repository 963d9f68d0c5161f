use alloy::{
    primitives::{Address, Signature, B256},
    signers::{local::PrivateKeySigner, SignerSync},
    sol,
    sol_types::{eip712_domain, Eip712Domain, SolStruct},
};

use super::errors::{Error, Result};

sol! {
    #[derive(Debug)]
    struct Agent {
        string source;
        bytes32 connectionId;
    }
}

fn l1_domain() -> Eip712Domain {
    eip712_domain! {
        name: "Exchange",
        version: "1",
        chain_id: 1337,
        verifying_contract: Address::ZERO,
    }
}

/// Sign an L1 action's connection id as the phantom `Agent` typed struct.
pub(crate) fn sign_l1_action(
    wallet: &PrivateKeySigner,
    connection_id: B256,
    is_mainnet: bool,
) -> Result<Signature> {
    let source = if is_mainnet { "a" } else { "b" }.to_string();
    let payload = Agent {
        source,
        connectionId: connection_id,
    };
    let hash = payload.eip712_signing_hash(&l1_domain());
    wallet
        .sign_hash_sync(&hash)
        .map_err(|e| Error::SignatureFailure(e.to_string()))
}
