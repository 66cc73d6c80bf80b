use alloy_primitives::{Bytes, B256};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque reference to the encrypted counter value held on-chain.
///
/// Two handles with the same bytes denote the same ciphertext, which lets
/// callers skip a redundant decryption.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EncryptedHandle(B256);

impl EncryptedHandle {
    /// Handle of a counter that was never written.
    pub const ZERO: Self = Self(B256::ZERO);

    #[must_use]
    pub const fn new(raw: B256) -> Self {
        Self(raw)
    }

    #[must_use]
    pub const fn as_b256(&self) -> &B256 {
        &self.0
    }

    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0 == B256::ZERO
    }
}

impl From<B256> for EncryptedHandle {
    fn from(raw: B256) -> Self {
        Self(raw)
    }
}

impl fmt::Display for EncryptedHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0.as_slice()))
    }
}

/// Plaintext obtained by decrypting an [`EncryptedHandle`].
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClearValue(i64);

impl ClearValue {
    pub const ZERO: Self = Self(0);

    #[must_use]
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    #[must_use]
    pub const fn get(&self) -> i64 {
        self.0
    }

    /// Reading of the counter as a net trading exposure.
    #[must_use]
    pub const fn exposure(&self) -> ExposureLabel {
        if self.0 > 0 {
            ExposureLabel::NetLong
        } else if self.0 < 0 {
            ExposureLabel::NetShort
        } else {
            ExposureLabel::Flat
        }
    }
}

impl fmt::Display for ClearValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExposureLabel {
    Encrypted,
    NetLong,
    NetShort,
    Flat,
}

impl ExposureLabel {
    /// Label for an optionally revealed value; `None` stays encrypted.
    #[must_use]
    pub const fn from_clear(clear: Option<ClearValue>) -> Self {
        match clear {
            Some(value) => value.exposure(),
            None => Self::Encrypted,
        }
    }
}

impl fmt::Display for ExposureLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Encrypted => "Encrypted",
            Self::NetLong => "Net Long",
            Self::NetShort => "Net Short",
            Self::Flat => "Flat",
        };
        f.write_str(label)
    }
}

/// Encrypted operand ready to be passed to the contract, together with the
/// proof that binds it to the contract and user.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedInput {
    pub handles: Vec<B256>,
    pub input_proof: Bytes,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_handle() {
        assert!(EncryptedHandle::ZERO.is_zero());
        assert!(!EncryptedHandle::new(B256::with_last_byte(1)).is_zero());
    }

    #[test]
    fn test_handle_display() {
        let handle = EncryptedHandle::new(B256::with_last_byte(0xab));
        let rendered = handle.to_string();
        assert!(rendered.starts_with("0x"));
        assert!(rendered.ends_with("ab"));
        assert_eq!(rendered.len(), 66);
    }

    #[test]
    fn test_exposure_labels() {
        assert_eq!(ExposureLabel::from_clear(None), ExposureLabel::Encrypted);
        assert_eq!(ClearValue::new(3).exposure(), ExposureLabel::NetLong);
        assert_eq!(ClearValue::new(-2).exposure(), ExposureLabel::NetShort);
        assert_eq!(ClearValue::ZERO.exposure(), ExposureLabel::Flat);
        assert_eq!(ExposureLabel::NetShort.to_string(), "Net Short");
    }
}
