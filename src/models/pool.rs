//! Pools as the catalog knows them: static metadata plus, for secondary pools, the order book.
use std::fmt::{self, Debug, Display};
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use alloy::primitives::{Address, B256, U256};
use eyre::Result;

use super::order::OrderBook;
use crate::math::{self, MathResult};

/// Vault pool id. The first 20 bytes are the pool contract address.
#[derive(Clone, Copy, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct PoolId(B256);

impl PoolId {
    pub const fn new(id: B256) -> Self {
        Self(id)
    }

    pub fn address(&self) -> Address {
        Address::from_slice(&self.0[..20])
    }

    pub const fn as_b256(&self) -> B256 {
        self.0
    }
}

impl Debug for PoolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex = format!("{}", self.0);
        write!(f, "{}..", &hex[..10])
    }
}

impl Display for PoolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<&str> for PoolId {
    type Error = eyre::Error;

    fn try_from(s: &str) -> Result<Self> {
        B256::from_str(s)
            .map(Self)
            .map_err(|e| eyre::eyre!("Invalid pool id {s}: {e}"))
    }
}

impl From<B256> for PoolId {
    fn from(id: B256) -> Self {
        Self(id)
    }
}

/// A pool token and its native decimals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PoolToken {
    pub address: Address,
    pub decimals: u8,
}

impl PoolToken {
    pub const fn new(address: Address, decimals: u8) -> Self {
        Self { address, decimals }
    }

    pub fn scaling_factor(&self) -> MathResult<U256> {
        math::scaling_factor(self.decimals)
    }
}

/// The two modeled venue kinds. Secondary pools own their resting orders and trades.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolKind {
    Primary,
    Secondary(OrderBook),
}

impl PoolKind {
    pub const fn is_primary(&self) -> bool {
        matches!(self, Self::Primary)
    }

    pub const fn name(&self) -> &'static str {
        match self {
            Self::Primary => "PrimaryIssue",
            Self::Secondary(_) => "SecondaryIssue",
        }
    }
}

/// Pool as it comes from the catalog
#[derive(Debug, Clone, Eq)]
pub struct Pool {
    pub id: PoolId,
    pub address: Address,
    pub kind: PoolKind,
    /// Vault token order; balances and scaling factors use this index space
    pub tokens: Vec<PoolToken>,
    pub security: Address,
    pub currency: Address,
}

/// Two pools are equal if they have the same address
impl PartialEq for Pool {
    fn eq(&self, other: &Self) -> bool {
        self.address == other.address
    }
}

impl Hash for Pool {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.address.hash(state);
    }
}

impl Pool {
    pub fn new(
        id: PoolId,
        kind: PoolKind,
        tokens: Vec<PoolToken>,
        security: Address,
        currency: Address,
    ) -> Self {
        Self {
            address: id.address(),
            id,
            kind,
            tokens,
            security,
            currency,
        }
    }

    pub fn token_index(&self, token: Address) -> Option<usize> {
        self.tokens.iter().position(|t| t.address == token)
    }

    pub fn token(&self, token: Address) -> Option<&PoolToken> {
        self.tokens.iter().find(|t| t.address == token)
    }

    /// Security and currency, the only pair an issue pool prices.
    pub const fn local_tokens(&self) -> [Address; 2] {
        [self.security, self.currency]
    }

    pub fn is_local(&self, token: Address) -> bool {
        token == self.security || token == self.currency
    }

    pub const fn order_book(&self) -> Option<&OrderBook> {
        match &self.kind {
            PoolKind::Secondary(book) => Some(book),
            PoolKind::Primary => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::address;

    #[test]
    fn test_pool_id_address() {
        let id = PoolId::try_from(
            "0x1a5f6d9e5c4a6e2b2a3f4c5d6e7f8091a2b3c4d5000100000000000000000123",
        )
        .unwrap();
        assert_eq!(
            id.address(),
            address!("0x1a5f6d9e5c4a6e2b2a3f4c5d6e7f8091a2b3c4d5")
        );
        assert!(PoolId::try_from("0x1234").is_err());
    }

    #[test]
    fn test_token_lookup() {
        let security = address!("0x00000000000000000000000000000000000000a1");
        let currency = address!("0x00000000000000000000000000000000000000c1");
        let pool = Pool::new(
            PoolId::new(B256::repeat_byte(0x11)),
            PoolKind::Primary,
            vec![PoolToken::new(currency, 6), PoolToken::new(security, 18)],
            security,
            currency,
        );

        assert_eq!(pool.token_index(security), Some(1));
        assert_eq!(pool.token_index(Address::ZERO), None);
        assert_eq!(
            pool.token(currency).unwrap().scaling_factor(),
            Ok(U256::from(1_000_000_000_000u64))
        );
        assert!(pool.is_local(currency));
        assert_eq!(pool.kind.name(), "PrimaryIssue");
        assert!(pool.order_book().is_none());
    }
}
