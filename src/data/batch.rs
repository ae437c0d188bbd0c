use alloy::eips::BlockId;
use alloy::primitives::{Address, Bytes};
use alloy::providers::Provider;
use alloy::rpc::client::BatchRequest;
use alloy::rpc::types::TransactionRequest;
use alloy::sol_types::SolCall;

use crate::error::BatchCallError;

/// One contract call inside a batch. The context value is opaque to the
/// executor and rides along to the matching outcome.
#[derive(Debug, Clone)]
pub struct BatchCall<C> {
    pub target: Address,
    pub calldata: Bytes,
    pub context: C,
}

/// Result of one batched call, in submission order.
#[derive(Debug)]
pub struct BatchOutcome<C> {
    pub target: Address,
    pub context: C,
    pub result: Result<Bytes, BatchCallError>,
}

impl<C> BatchOutcome<C> {
    /// Decode the return data as the given call's typed return value.
    pub fn decode_as<T: SolCall>(self) -> (C, Result<T::Return, BatchCallError>) {
        let BatchOutcome {
            target,
            context,
            result,
        } = self;
        let decoded = result.and_then(|data| {
            T::abi_decode_returns(&data, true).map_err(|e| BatchCallError::Decode {
                target: target.to_string(),
                message: e.to_string(),
            })
        });
        (context, decoded)
    }
}

/// Execute a set of `eth_call`s as a single JSON-RPC batch.
///
/// One round trip for the whole set. Only a transport-level failure of the
/// batch itself is a hard error; an individual call that errors lands in its
/// own outcome and leaves the other items untouched.
pub async fn batch_eth_call<C>(
    provider: &(dyn Provider + Send + Sync),
    calls: Vec<BatchCall<C>>,
) -> Result<Vec<BatchOutcome<C>>, BatchCallError> {
    if calls.is_empty() {
        return Ok(Vec::new());
    }

    // the provider hands out a borrowed client; a batch is built over it
    let mut batch = BatchRequest::new(provider.client());

    let mut waiters = Vec::with_capacity(calls.len());
    for BatchCall {
        target,
        calldata,
        context,
    } in calls
    {
        let tx = TransactionRequest::default().to(target).input(calldata.into());
        let waiter = batch
            .add_call::<_, Bytes>("eth_call", &(tx, BlockId::latest()))
            .map_err(|e| BatchCallError::Transport(e.to_string()))?;
        waiters.push((target, context, waiter));
    }

    batch
        .send()
        .await
        .map_err(|e| BatchCallError::Transport(e.to_string()))?;

    let mut outcomes = Vec::with_capacity(waiters.len());
    for (target, context, waiter) in waiters {
        let result = waiter.await.map_err(|e| BatchCallError::Call {
            target: target.to_string(),
            message: e.to_string(),
        });
        outcomes.push(BatchOutcome {
            target,
            context,
            result,
        });
    }
    Ok(outcomes)
}

// separate from batch_eth_call: getCode takes (address, block), not a call request
/// Fetch the deployed bytecode of each address in a single JSON-RPC batch.
pub async fn batch_get_code<C>(
    provider: &(dyn Provider + Send + Sync),
    targets: Vec<(Address, C)>,
) -> Result<Vec<BatchOutcome<C>>, BatchCallError> {
    if targets.is_empty() {
        return Ok(Vec::new());
    }

    let mut batch = BatchRequest::new(provider.client());

    let mut waiters = Vec::with_capacity(targets.len());
    for (target, context) in targets {
        let waiter = batch
            .add_call::<_, Bytes>("eth_getCode", &(target, BlockId::latest()))
            .map_err(|e| BatchCallError::Transport(e.to_string()))?;
        waiters.push((target, context, waiter));
    }

    batch
        .send()
        .await
        .map_err(|e| BatchCallError::Transport(e.to_string()))?;

    let mut outcomes = Vec::with_capacity(waiters.len());
    for (target, context, waiter) in waiters {
        let result = waiter.await.map_err(|e| BatchCallError::Call {
            target: target.to_string(),
            message: e.to_string(),
        });
        outcomes.push(BatchOutcome {
            target,
            context,
            result,
        });
    }
    Ok(outcomes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::U256;
    use alloy::providers::ProviderBuilder;
    use alloy::sol;

    sol! {
        #[allow(missing_docs)]
        function totalSupply() external view returns (uint256);
    }

    fn outcome(result: Result<Bytes, BatchCallError>) -> BatchOutcome<&'static str> {
        BatchOutcome {
            target: Address::from_slice(&[0x70; 20]),
            context: "supply",
            result,
        }
    }

    #[test]
    fn test_decode_as_typed_return() {
        let word = U256::from(1234u64).to_be_bytes::<32>();
        let (context, decoded) = outcome(Ok(Bytes::from(word.to_vec()))).decode_as::<totalSupplyCall>();
        assert_eq!(context, "supply");
        assert_eq!(decoded.unwrap()._0, U256::from(1234u64));
    }

    #[test]
    fn test_decode_as_rejects_garbage() {
        let (_, decoded) = outcome(Ok(Bytes::from(vec![1, 2, 3]))).decode_as::<totalSupplyCall>();
        assert!(matches!(decoded, Err(BatchCallError::Decode { .. })));
    }

    #[test]
    fn test_decode_as_keeps_call_errors() {
        let err = BatchCallError::Call {
            target: "0x70".to_string(),
            message: "execution reverted".to_string(),
        };
        let (_, decoded) = outcome(Err(err)).decode_as::<totalSupplyCall>();
        assert!(matches!(decoded, Err(BatchCallError::Call { .. })));
    }

    #[tokio::test]
    async fn test_batch_builds_over_borrowed_provider_client() {
        // construction only; nothing is sent
        let provider = ProviderBuilder::new().on_http("http://127.0.0.1:1".parse().unwrap());
        let mut batch = BatchRequest::new(provider.client());

        let waiter = batch
            .add_call::<_, Bytes>("eth_getCode", &(Address::ZERO, BlockId::latest()))
            .unwrap();
        drop(batch);

        // an unsent batch resolves its waiters with an error
        assert!(waiter.await.is_err());
    }
}
