use alloy_primitives::{Address, Bytes};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity an authorization is issued for.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AuthorizationKey {
    pub owner: Address,
    pub contract: Address,
}

impl AuthorizationKey {
    #[must_use]
    pub const fn new(owner: Address, contract: Address) -> Self {
        Self { owner, contract }
    }
}

impl fmt::Display for AuthorizationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.owner, self.contract)
    }
}

/// Ephemeral key pair for the decryption channel.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyPair {
    pub public_key: Bytes,
    pub private_key: Bytes,
}

/// Signed, time-bounded permission to decrypt the handles of one contract on
/// behalf of one owner. Never mutated once issued.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecryptionAuthorization {
    pub owner_address: Address,
    pub contract_address: Address,
    pub public_key: Bytes,
    pub private_key: Bytes,
    pub signature: Bytes,
    /// Unix seconds.
    pub issued_at: u64,
    pub valid_duration_seconds: u64,
}

impl DecryptionAuthorization {
    #[must_use]
    pub const fn key(&self) -> AuthorizationKey {
        AuthorizationKey::new(self.owner_address, self.contract_address)
    }

    #[must_use]
    pub const fn expires_at(&self) -> u64 {
        self.issued_at.saturating_add(self.valid_duration_seconds)
    }

    #[must_use]
    pub const fn is_valid_at(&self, now: u64) -> bool {
        now < self.expires_at()
    }

    #[must_use]
    pub fn matches(&self, key: &AuthorizationKey) -> bool {
        self.owner_address == key.owner && self.contract_address == key.contract
    }

    /// Usable for `key` at time `now`.
    #[must_use]
    pub fn is_usable_for(&self, key: &AuthorizationKey, now: u64) -> bool {
        self.matches(key) && self.is_valid_at(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn authorization(issued_at: u64, valid: u64) -> DecryptionAuthorization {
        DecryptionAuthorization {
            owner_address: Address::repeat_byte(1),
            contract_address: Address::repeat_byte(2),
            public_key: Bytes::from(vec![0xaa]),
            private_key: Bytes::from(vec![0xbb]),
            signature: Bytes::from(vec![0xcc; 65]),
            issued_at,
            valid_duration_seconds: valid,
        }
    }

    #[test]
    fn test_validity_window_is_half_open() {
        let auth = authorization(100, 50);
        assert!(auth.is_valid_at(100));
        assert!(auth.is_valid_at(149));
        assert!(!auth.is_valid_at(150));
    }

    #[test]
    fn test_expiry_saturates() {
        let auth = authorization(u64::MAX - 1, 10);
        assert_eq!(auth.expires_at(), u64::MAX);
    }

    #[test]
    fn test_key_matching() {
        let auth = authorization(0, 10);
        let own = AuthorizationKey::new(Address::repeat_byte(1), Address::repeat_byte(2));
        let other = AuthorizationKey::new(Address::repeat_byte(3), Address::repeat_byte(2));
        assert!(auth.is_usable_for(&own, 5));
        assert!(!auth.is_usable_for(&other, 5));
        assert!(!auth.is_usable_for(&own, 10));
    }

    #[test]
    fn test_serde_uses_camel_case() {
        let json = serde_json::to_value(authorization(1, 2)).unwrap();
        assert!(json.get("ownerAddress").is_some());
        assert!(json.get("validDurationSeconds").is_some());
    }
}
