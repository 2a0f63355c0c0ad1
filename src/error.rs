// Copyright (c) Chain Fusion Bridge Contributors
// SPDX-License-Identifier: Apache-2.0

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    // The input is not a valid transaction hash
    InvalidTxHash,
    // The referenced lock transaction does not exist
    TxNotFound,
    // Lock event found but emitted from an unrecognized contract
    EventInUnrecognizedContract,
    // Log exists but is not a decodable TokensLocked event
    NotALockEvent,
    // Token has no entry in the static token mapping table
    UnmappedToken(String),
    // Destination-declared recipient is not a well-formed address
    InvalidRecipient(String),
    // Amount rescaling overflowed the 256-bit range
    AmountOverflow(String),
    // Bridge custodial balance cannot cover a release
    InsufficientCustodialBalance { required: String, available: String },
    // Explicit `err` variant returned by the bridge canister
    CanisterRejection(String),
    // Transient ICP agent error (network, certification, timeout)
    TransientCanisterError(String),
    // Transient Ethereum provider error
    TransientProviderError(String),
    // Ethereum provider error
    ProviderError(String),
    // Release transaction was mined but reverted
    EthTxFailure(String),
    // Submission failed with a nonce-conflict signature
    NonceConflict(String),
    // Failure to serialize
    SerializationError(String),
    // Durable store I/O failure
    StorageError(String),
    // Signing failure
    SigningError(String),
    // Internal bridge error
    InternalError(String),
    // Uncategorized error
    Generic(String),
}

impl BridgeError {
    /// Returns a short string identifying the error type for metrics labels
    pub fn error_type(&self) -> &'static str {
        match self {
            BridgeError::InvalidTxHash => "invalid_tx_hash",
            BridgeError::TxNotFound => "tx_not_found",
            BridgeError::EventInUnrecognizedContract => "unrecognized_contract",
            BridgeError::NotALockEvent => "not_a_lock_event",
            BridgeError::UnmappedToken(_) => "unmapped_token",
            BridgeError::InvalidRecipient(_) => "invalid_recipient",
            BridgeError::AmountOverflow(_) => "amount_overflow",
            BridgeError::InsufficientCustodialBalance { .. } => "insufficient_custodial_balance",
            BridgeError::CanisterRejection(_) => "canister_rejection",
            BridgeError::TransientCanisterError(_) => "transient_canister_error",
            BridgeError::TransientProviderError(_) => "transient_provider_error",
            BridgeError::ProviderError(_) => "provider_error",
            BridgeError::EthTxFailure(_) => "eth_tx_failure",
            BridgeError::NonceConflict(_) => "nonce_conflict",
            BridgeError::SerializationError(_) => "serialization_error",
            BridgeError::StorageError(_) => "storage_error",
            BridgeError::SigningError(_) => "signing_error",
            BridgeError::InternalError(_) => "internal_error",
            BridgeError::Generic(_) => "generic",
        }
    }

    /// Whether the failure is worth retrying on a later scan/poll cycle.
    ///
    /// Permanently unrelayable conditions (unmapped token, malformed
    /// recipient) return false; the same item will be observed and skipped
    /// again on every subsequent cycle.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            BridgeError::UnmappedToken(_) | BridgeError::InvalidRecipient(_)
        )
    }
}

pub type BridgeResult<T> = Result<T, BridgeError>;

impl From<ethers::providers::ProviderError> for BridgeError {
    fn from(e: ethers::providers::ProviderError) -> Self {
        match &e {
            ethers::providers::ProviderError::JsonRpcClientError(_) => {
                BridgeError::TransientProviderError(format!("{e:?}"))
            }
            _ => BridgeError::ProviderError(format!("{e:?}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_type_simple_variants() {
        let cases = vec![
            (BridgeError::InvalidTxHash, "invalid_tx_hash"),
            (BridgeError::TxNotFound, "tx_not_found"),
            (
                BridgeError::EventInUnrecognizedContract,
                "unrecognized_contract",
            ),
            (BridgeError::NotALockEvent, "not_a_lock_event"),
            (
                BridgeError::UnmappedToken("aaaaa-aa".to_string()),
                "unmapped_token",
            ),
            (
                BridgeError::InvalidRecipient("not-an-address".to_string()),
                "invalid_recipient",
            ),
            (
                BridgeError::InsufficientCustodialBalance {
                    required: "100".to_string(),
                    available: "1".to_string(),
                },
                "insufficient_custodial_balance",
            ),
            (
                BridgeError::CanisterRejection("err".to_string()),
                "canister_rejection",
            ),
            (
                BridgeError::NonceConflict("nonce too low".to_string()),
                "nonce_conflict",
            ),
        ];
        for (error, expected) in cases {
            assert_eq!(error.error_type(), expected, "mismatch for {:?}", error);
        }
    }

    /// error_type values are used as Prometheus label values and must stay
    /// lowercase/underscore only
    #[test]
    fn test_error_type_valid_prometheus_labels() {
        let errors = vec![
            BridgeError::InvalidTxHash,
            BridgeError::TxNotFound,
            BridgeError::ProviderError("x".to_string()),
            BridgeError::TransientCanisterError("x".to_string()),
            BridgeError::AmountOverflow("x".to_string()),
            BridgeError::EthTxFailure("x".to_string()),
            BridgeError::StorageError("x".to_string()),
            BridgeError::Generic("x".to_string()),
        ];
        for error in errors {
            let label = error.error_type();
            assert!(!label.is_empty());
            for c in label.chars() {
                assert!(
                    c.is_ascii_lowercase() || c == '_',
                    "error_type '{}' contains invalid character '{}'",
                    label,
                    c
                );
            }
            assert!(!label.starts_with('_'));
            assert!(!label.ends_with('_'));
        }
    }

    #[test]
    fn test_error_type_payload_independence() {
        let err1 = BridgeError::CanisterRejection("short".to_string());
        let err2 = BridgeError::CanisterRejection("a much longer rejection message".to_string());
        assert_eq!(err1.error_type(), err2.error_type());
    }

    #[test]
    fn test_retryability_classification() {
        // Permanently unrelayable conditions are the only non-retryable ones
        assert!(!BridgeError::UnmappedToken("t".to_string()).is_retryable());
        assert!(!BridgeError::InvalidRecipient("r".to_string()).is_retryable());

        assert!(BridgeError::TransientProviderError("x".to_string()).is_retryable());
        assert!(BridgeError::CanisterRejection("x".to_string()).is_retryable());
        assert!(BridgeError::InsufficientCustodialBalance {
            required: "2".to_string(),
            available: "1".to_string(),
        }
        .is_retryable());
    }
}
