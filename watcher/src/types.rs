//! Balance types shared by the observer, the dispatcher and the node client
//!
//! All amounts are held in token base units (wei-equivalent) as arbitrary
//! precision unsigned integers. Formatting to a human readable decimal only
//! happens when a notification message is built.

use num_bigint::BigUint;
use num_traits::Zero;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{Result, WatcherError};

/// Decimals of both the native gas token and the wrapped HOPR token
pub const TOKEN_DECIMALS: u32 = 18;

/// Display symbol of the native gas token
pub const NATIVE_SYMBOL: &str = "xDai";

/// Display symbol of the wrapped HOPR token held by the Safe
pub const HOPR_SYMBOL: &str = "wxHOPR";

/// A non-negative token amount in base units
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TokenAmount(BigUint);

impl TokenAmount {
    /// Wrap a raw base-unit integer
    pub fn new(value: BigUint) -> Self {
        Self(value)
    }

    /// The zero amount
    pub fn zero() -> Self {
        Self(BigUint::zero())
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Subtract `other`, returning `None` if the result would be negative
    pub fn checked_sub(&self, other: &TokenAmount) -> Option<TokenAmount> {
        if self.0 < other.0 {
            None
        } else {
            Some(TokenAmount(&self.0 - &other.0))
        }
    }

    /// Borrow the underlying integer
    pub fn as_biguint(&self) -> &BigUint {
        &self.0
    }

    /// Human readable amount using the shared token decimals
    pub fn formatted(&self) -> String {
        format_units(self, TOKEN_DECIMALS)
    }
}

impl From<u64> for TokenAmount {
    fn from(value: u64) -> Self {
        Self(BigUint::from(value))
    }
}

impl From<u128> for TokenAmount {
    fn from(value: u128) -> Self {
        Self(BigUint::from(value))
    }
}

impl FromStr for TokenAmount {
    type Err = WatcherError;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
            return Err(WatcherError::invalid_amount(s));
        }

        BigUint::parse_bytes(trimmed.as_bytes(), 10)
            .map(TokenAmount)
            .ok_or_else(|| WatcherError::invalid_amount(s))
    }
}

impl TryFrom<String> for TokenAmount {
    type Error = WatcherError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<TokenAmount> for String {
    fn from(value: TokenAmount) -> Self {
        value.0.to_str_radix(10)
    }
}

impl fmt::Display for TokenAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Format a base-unit amount as a decimal string without losing precision
///
/// Trailing fractional zeros are dropped, as is a dangling decimal point.
pub fn format_units(amount: &TokenAmount, decimals: u32) -> String {
    let digits = amount.0.to_str_radix(10);
    let decimals = decimals as usize;
    if decimals == 0 {
        return digits;
    }

    let padded = if digits.len() <= decimals {
        format!("{}{}", "0".repeat(decimals - digits.len() + 1), digits)
    } else {
        digits
    };

    let (integer, fraction) = padded.split_at(padded.len() - decimals);
    let fraction = fraction.trim_end_matches('0');

    if fraction.is_empty() {
        integer.to_string()
    } else {
        format!("{}.{}", integer, fraction)
    }
}

/// Balances of a node and its Safe at one point in time
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceSnapshot {
    /// Node's native gas-token balance
    pub native: TokenAmount,

    /// Node's HOPR token balance
    pub hopr: TokenAmount,

    /// Safe's native gas-token balance
    pub safe_native: TokenAmount,

    /// Safe's wrapped HOPR token balance
    pub safe_hopr: TokenAmount,
}

/// Floor below which a balance warning fires; same shape as a snapshot
pub type MinimumBalanceThresholds = BalanceSnapshot;

/// Threshold values as they appear in configuration files
///
/// Keys missing from a layer keep their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    pub native: String,
    pub hopr: String,
    pub safe_native: String,
    pub safe_hopr: String,
}

impl ThresholdConfig {
    /// Parse the configured strings into base-unit thresholds
    pub fn to_thresholds(&self) -> Result<MinimumBalanceThresholds> {
        Ok(BalanceSnapshot {
            native: self.native.parse()?,
            hopr: self.hopr.parse()?,
            safe_native: self.safe_native.parse()?,
            safe_hopr: self.safe_hopr.parse()?,
        })
    }
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            // 0.001 xDai keeps a node able to open and close channels
            native: "1000000000000000".to_string(),
            hopr: "0".to_string(),
            safe_native: "0".to_string(),
            safe_hopr: "0".to_string(),
        }
    }
}
