use alloy::primitives::{Address, Bytes, U256};
use tracing::warn;

use crate::data::classify::{classify, decode_params};
use crate::data::tokens::KnownTokens;
use crate::data::types::{
    Confirmation, OutgoingHistory, RawTransactionRecord, RefundParams, SafeTransaction, TxClass,
};
use crate::data::TokenSource;
use crate::error::NormalizeError;
use crate::utils::format_u256_as_decimal;

/// Decimal precision of the chain's native currency.
const NATIVE_DECIMALS: u8 = 18;

/// Everything one record needs besides itself: the owning wallet, the chain's
/// native symbol, the fungible-token registry, and the metadata resolver.
pub struct NormalizeContext<'a> {
    pub safe: Address,
    pub native_symbol: &'a str,
    pub known_tokens: &'a KnownTokens,
    pub tokens: &'a dyn TokenSource,
}

/// Turn one raw service record into its canonical form.
///
/// Classification is provisional until token metadata is settled: a transfer
/// whose token answers neither metadata interface is demoted to a custom call,
/// since a token transfer is never asserted without a symbol/decimals pair.
/// Parameter decode failures are soft; a refund fee that overflows is the one
/// fatal per-record error.
pub async fn normalize_record(
    record: RawTransactionRecord,
    code: Option<Bytes>,
    ctx: &NormalizeContext<'_>,
) -> Result<SafeTransaction, NormalizeError> {
    let confirmations = record
        .confirmations
        .iter()
        .map(|c| Confirmation {
            owner: c.owner,
            transaction_hash: c.transaction_hash,
            signature: c.signature.clone(),
        })
        .collect();

    let mut class = classify(
        ctx.safe,
        record.to,
        record.value,
        record.data.as_ref(),
        code.as_ref(),
        ctx.known_tokens,
    );

    let mut symbol = None;
    let mut decimals = None;
    if class == TxClass::TokenTransfer {
        match ctx.tokens.token_info(record.to).await {
            Ok(info) => {
                symbol = Some(info.symbol);
                decimals = Some(info.decimals);
            }
            Err(err) => {
                warn!(token = %record.to, %err, "token metadata unresolvable, treating as custom call");
                class = TxClass::Custom;
            }
        }
    }

    let decoded = decode_params(class, record.data.as_ref());
    let refund_params = compute_refund(&record, ctx).await?;

    Ok(SafeTransaction {
        record,
        class,
        symbol,
        decimals,
        decoded,
        refund_params,
        confirmations,
    })
}

/// Refund owed to the submitter: `gasPrice * (baseGas + safeTxGas)`, rendered
/// in the gas token's precision. The zero address means the refund is paid in
/// the native currency.
async fn compute_refund(
    record: &RawTransactionRecord,
    ctx: &NormalizeContext<'_>,
) -> Result<Option<RefundParams>, NormalizeError> {
    if record.gas_price.is_zero() {
        return Ok(None);
    }

    let total_gas = U256::from(record.base_gas) + U256::from(record.safe_tx_gas);
    let fee = record
        .gas_price
        .checked_mul(total_gas)
        .ok_or_else(|| NormalizeError::RefundOverflow {
            gas_price: record.gas_price.to_string(),
            base_gas: record.base_gas,
            safe_tx_gas: record.safe_tx_gas,
        })?;

    let (symbol, decimals) = if record.gas_token == Address::ZERO {
        (ctx.native_symbol.to_string(), NATIVE_DECIMALS)
    } else {
        match ctx.tokens.token_info(record.gas_token).await {
            Ok(info) => (info.symbol, info.decimals),
            Err(err) => {
                warn!(
                    gas_token = %record.gas_token,
                    %err,
                    "gas token metadata unresolvable, pricing refund in native units"
                );
                (ctx.native_symbol.to_string(), NATIVE_DECIMALS)
            }
        }
    };

    Ok(Some(RefundParams {
        fee: format_u256_as_decimal(fee, decimals),
        symbol,
    }))
}

/// Split one wallet's normalized list by the cancellation flag.
///
/// The partition is stable: within each group, relative order follows the
/// input list.
pub fn partition_by_cancellation(safe: Address, txs: Vec<SafeTransaction>) -> OutgoingHistory {
    let mut outgoing = Vec::new();
    let mut cancel = Vec::new();
    for tx in txs {
        if tx.class.is_cancellation() {
            cancel.push(tx);
        } else {
            outgoing.push(tx);
        }
    }

    let mut history = OutgoingHistory::default();
    history.outgoing.insert(safe, outgoing);
    history.cancel.insert(safe, cancel);
    history
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::classify::{ERC20_TRANSFER, ERC721_SAFE_TRANSFER_FROM};
    use crate::data::types::{DecodedParams, ParamDecode, TokenInfo};
    use crate::error::TokenResolutionError;
    use async_trait::async_trait;
    use std::collections::HashMap;

    struct StaticTokens(HashMap<Address, TokenInfo>);

    impl StaticTokens {
        fn empty() -> Self {
            Self(HashMap::new())
        }

        fn with(tokens: &[(Address, &str, u8)]) -> Self {
            Self(
                tokens
                    .iter()
                    .map(|(address, symbol, decimals)| {
                        (
                            *address,
                            TokenInfo {
                                address: *address,
                                symbol: symbol.to_string(),
                                decimals: *decimals,
                            },
                        )
                    })
                    .collect(),
            )
        }
    }

    #[async_trait]
    impl TokenSource for StaticTokens {
        async fn token_info(&self, address: Address) -> Result<TokenInfo, TokenResolutionError> {
            self.0
                .get(&address)
                .cloned()
                .ok_or_else(|| TokenResolutionError::Unresolvable(address.to_string()))
        }
    }

    fn safe() -> Address {
        Address::from_slice(&[0x5a; 20])
    }

    fn token() -> Address {
        Address::from_slice(&[0x70; 20])
    }

    fn recipient() -> Address {
        Address::from_slice(&[0xd8; 20])
    }

    fn make_record(to: Address, value: u64, data: Option<Bytes>) -> RawTransactionRecord {
        let mut record = RawTransactionRecord::creation();
        record.creation = false;
        record.to = to;
        record.value = U256::from(value);
        record.data = data;
        record
    }

    fn transfer_data(to: Address, amount: u64) -> Bytes {
        let mut out = ERC20_TRANSFER.to_vec();
        let mut word = [0u8; 32];
        word[12..].copy_from_slice(to.as_slice());
        out.extend_from_slice(&word);
        out.extend_from_slice(&U256::from(amount).to_be_bytes::<32>());
        Bytes::from(out)
    }

    fn registry_with_token() -> KnownTokens {
        KnownTokens::from_iter([TokenInfo {
            address: token(),
            symbol: "GNO".to_string(),
            decimals: 18,
        }])
    }

    #[tokio::test]
    async fn test_token_transfer_gets_metadata() {
        let known = registry_with_token();
        let tokens = StaticTokens::with(&[(token(), "GNO", 18)]);
        let ctx = NormalizeContext {
            safe: safe(),
            native_symbol: "ETH",
            known_tokens: &known,
            tokens: &tokens,
        };

        let record = make_record(token(), 0, Some(transfer_data(recipient(), 1000)));
        let tx = normalize_record(record, None, &ctx).await.unwrap();

        assert_eq!(tx.class, TxClass::TokenTransfer);
        assert_eq!(tx.symbol.as_deref(), Some("GNO"));
        assert_eq!(tx.decimals, Some(18));
        assert_eq!(
            tx.decoded,
            ParamDecode::Decoded(DecodedParams::Transfer {
                to: recipient(),
                amount: U256::from(1000u64),
            })
        );
    }

    #[tokio::test]
    async fn test_unresolvable_token_demotes_to_custom() {
        // the registry says fungible but the chain answers neither interface
        let known = registry_with_token();
        let tokens = StaticTokens::empty();
        let ctx = NormalizeContext {
            safe: safe(),
            native_symbol: "ETH",
            known_tokens: &known,
            tokens: &tokens,
        };

        let record = make_record(token(), 0, Some(transfer_data(recipient(), 5)));
        let tx = normalize_record(record, None, &ctx).await.unwrap();

        assert_eq!(tx.class, TxClass::Custom);
        assert!(tx.symbol.is_none());
        assert!(tx.decimals.is_none());
        // params re-decoded for the demoted class
        assert_eq!(
            tx.decoded,
            ParamDecode::Decoded(DecodedParams::Custom {
                selector: ERC20_TRANSFER,
                data_len: 64,
            })
        );
    }

    #[tokio::test]
    async fn test_erc721_class_never_demotes() {
        let known = KnownTokens::default();
        let tokens = StaticTokens::empty();
        let ctx = NormalizeContext {
            safe: safe(),
            native_symbol: "ETH",
            known_tokens: &known,
            tokens: &tokens,
        };

        let mut code = vec![0x60, 0x80];
        code.extend_from_slice(&ERC721_SAFE_TRANSFER_FROM);
        let record = make_record(token(), 0, Some(transfer_data(recipient(), 1)));
        let tx = normalize_record(record, Some(Bytes::from(code)), &ctx)
            .await
            .unwrap();

        assert_eq!(tx.class, TxClass::Erc721Transfer);
        assert!(tx.symbol.is_none());
    }

    #[tokio::test]
    async fn test_refund_fee_in_token_units() {
        let known = KnownTokens::default();
        let gas_token = Address::from_slice(&[0x99; 20]);
        let tokens = StaticTokens::with(&[(gas_token, "TKN", 2)]);
        let ctx = NormalizeContext {
            safe: safe(),
            native_symbol: "ETH",
            known_tokens: &known,
            tokens: &tokens,
        };

        let mut record = make_record(recipient(), 10, None);
        record.gas_price = U256::from(2u64);
        record.base_gas = 3;
        record.safe_tx_gas = 4;
        record.gas_token = gas_token;

        let tx = normalize_record(record, None, &ctx).await.unwrap();
        let refund = tx.refund_params.unwrap();
        assert_eq!(refund.fee, "0.14");
        assert_eq!(refund.symbol, "TKN");
    }

    #[tokio::test]
    async fn test_refund_defaults_to_native_currency() {
        let known = KnownTokens::default();
        let tokens = StaticTokens::empty();
        let ctx = NormalizeContext {
            safe: safe(),
            native_symbol: "xDAI",
            known_tokens: &known,
            tokens: &tokens,
        };

        let mut record = make_record(recipient(), 10, None);
        record.gas_price = U256::from(10u64).pow(U256::from(18u64));
        record.base_gas = 1;

        let tx = normalize_record(record, None, &ctx).await.unwrap();
        let refund = tx.refund_params.unwrap();
        assert_eq!(refund.fee, "1");
        assert_eq!(refund.symbol, "xDAI");
    }

    #[tokio::test]
    async fn test_no_refund_without_gas_price() {
        let known = KnownTokens::default();
        let tokens = StaticTokens::empty();
        let ctx = NormalizeContext {
            safe: safe(),
            native_symbol: "ETH",
            known_tokens: &known,
            tokens: &tokens,
        };

        let tx = normalize_record(make_record(recipient(), 5, None), None, &ctx)
            .await
            .unwrap();
        assert!(tx.refund_params.is_none());
        assert_eq!(tx.class, TxClass::EtherTransfer);
    }

    #[tokio::test]
    async fn test_unresolvable_gas_token_prices_in_native() {
        let known = KnownTokens::default();
        let tokens = StaticTokens::empty();
        let ctx = NormalizeContext {
            safe: safe(),
            native_symbol: "ETH",
            known_tokens: &known,
            tokens: &tokens,
        };

        let mut record = make_record(recipient(), 0, None);
        record.gas_price = U256::from(5u64);
        record.safe_tx_gas = 2;
        record.gas_token = Address::from_slice(&[0x77; 20]);

        let tx = normalize_record(record, None, &ctx).await.unwrap();
        let refund = tx.refund_params.unwrap();
        assert_eq!(refund.symbol, "ETH");
    }

    #[tokio::test]
    async fn test_refund_overflow_is_fatal() {
        let known = KnownTokens::default();
        let tokens = StaticTokens::empty();
        let ctx = NormalizeContext {
            safe: safe(),
            native_symbol: "ETH",
            known_tokens: &known,
            tokens: &tokens,
        };

        let mut record = make_record(recipient(), 0, None);
        record.gas_price = U256::MAX;
        record.base_gas = 2;

        let err = normalize_record(record, None, &ctx).await.unwrap_err();
        assert!(matches!(err, NormalizeError::RefundOverflow { base_gas: 2, .. }));
    }

    #[tokio::test]
    async fn test_confirmations_map_one_to_one() {
        let known = KnownTokens::default();
        let tokens = StaticTokens::empty();
        let ctx = NormalizeContext {
            safe: safe(),
            native_symbol: "ETH",
            known_tokens: &known,
            tokens: &tokens,
        };

        let owner_a = Address::from_slice(&[0x01; 20]);
        let owner_b = Address::from_slice(&[0x02; 20]);
        let mut record = make_record(recipient(), 1, None);
        record.confirmations = vec![
            crate::data::types::RawConfirmation {
                owner: owner_a,
                submission_date: None,
                transaction_hash: None,
                signature: Some(Bytes::from(vec![0x01])),
            },
            crate::data::types::RawConfirmation {
                owner: owner_b,
                submission_date: None,
                transaction_hash: None,
                signature: None,
            },
        ];

        let tx = normalize_record(record, None, &ctx).await.unwrap();
        assert_eq!(tx.confirmations.len(), 2);
        assert_eq!(tx.confirmations[0].owner, owner_a);
        assert_eq!(tx.confirmations[1].owner, owner_b);
        assert!(tx.confirmations[1].signature.is_none());
    }

    #[tokio::test]
    async fn test_creation_record_normalizes() {
        let known = KnownTokens::default();
        let tokens = StaticTokens::empty();
        let ctx = NormalizeContext {
            safe: safe(),
            native_symbol: "ETH",
            known_tokens: &known,
            tokens: &tokens,
        };

        let tx = normalize_record(RawTransactionRecord::creation(), None, &ctx)
            .await
            .unwrap();
        assert!(tx.record.creation);
        assert_eq!(tx.class, TxClass::EtherTransfer);
        assert_eq!(tx.decoded, ParamDecode::NotApplicable);
        assert!(tx.refund_params.is_none());
    }

    #[tokio::test]
    async fn test_partition_is_stable() {
        let known = KnownTokens::default();
        let tokens = StaticTokens::empty();
        let ctx = NormalizeContext {
            safe: safe(),
            native_symbol: "ETH",
            known_tokens: &known,
            tokens: &tokens,
        };

        // nonces identify records across the partition
        let mut txs = Vec::new();
        for (nonce, cancels) in [(1u64, true), (2, false), (3, true), (4, false)] {
            let mut record = if cancels {
                make_record(safe(), 0, None)
            } else {
                make_record(recipient(), 1, None)
            };
            record.nonce = Some(nonce);
            txs.push(normalize_record(record, None, &ctx).await.unwrap());
        }

        let history = partition_by_cancellation(safe(), txs);
        let cancel_nonces: Vec<_> = history
            .cancel_for(safe())
            .iter()
            .map(|t| t.record.nonce.unwrap())
            .collect();
        let outgoing_nonces: Vec<_> = history
            .outgoing_for(safe())
            .iter()
            .map(|t| t.record.nonce.unwrap())
            .collect();

        assert_eq!(cancel_nonces, vec![1, 3]);
        assert_eq!(outgoing_nonces, vec![2, 4]);
    }
}
