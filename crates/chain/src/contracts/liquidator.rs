//! Liquidator contract bindings and batch call encoding.

use alloy::primitives::{Bytes, U256};
use alloy::sol;
use alloy::sol_types::SolCall;

sol! {
    /// Keeper-facing liquidator contract.
    #[sol(rpc)]
    interface ILiquidator {
        function liquidate(uint256[] calldata _toLiquidate) external;
        function claimExpiredInsuranceNFT(uint256[] calldata _toClaim) external;
    }
}

/// Batch action the liquidator contract can perform on a list of positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LiquidatorAction {
    /// Seize collateral of liquidatable positions.
    Liquidate,
    /// Claim collateral of liquidated positions whose insurance window expired.
    ClaimExpiredInsurance,
}

impl LiquidatorAction {
    /// Contract method name (for logging).
    pub fn method(self) -> &'static str {
        match self {
            Self::Liquidate => "liquidate",
            Self::ClaimExpiredInsurance => "claimExpiredInsuranceNFT",
        }
    }

    /// ABI-encode the call for the given position indices.
    pub fn encode(self, indices: &[U256]) -> Bytes {
        let indices = indices.to_vec();
        match self {
            Self::Liquidate => ILiquidator::liquidateCall {
                _toLiquidate: indices,
            }
            .abi_encode()
            .into(),
            Self::ClaimExpiredInsurance => ILiquidator::claimExpiredInsuranceNFTCall {
                _toClaim: indices,
            }
            .abi_encode()
            .into(),
        }
    }
}

impl std::fmt::Display for LiquidatorAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.method())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_liquidate() {
        let indices = vec![U256::from(1u64), U256::from(7u64)];
        let data = LiquidatorAction::Liquidate.encode(&indices);

        assert_eq!(&data[..4], ILiquidator::liquidateCall::SELECTOR.as_slice());
        let decoded = ILiquidator::liquidateCall::abi_decode(&data, true).unwrap();
        assert_eq!(decoded._toLiquidate, indices);
    }

    #[test]
    fn test_encode_claim() {
        let indices = vec![U256::from(3u64)];
        let data = LiquidatorAction::ClaimExpiredInsurance.encode(&indices);

        let decoded = ILiquidator::claimExpiredInsuranceNFTCall::abi_decode(&data, true).unwrap();
        assert_eq!(decoded._toClaim, indices);
        assert_eq!(
            LiquidatorAction::ClaimExpiredInsurance.to_string(),
            "claimExpiredInsuranceNFT"
        );
    }
}
