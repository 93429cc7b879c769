//! NFTVault bindings and the position preview returned by `showPosition`.

use alloy::primitives::{Address, U256};
use alloy::sol;

use crate::error::DecodeError;

sol! {
    /// Fractional rate as stored by the vault.
    #[derive(Debug)]
    struct Rate {
        uint128 numerator;
        uint128 denominator;
    }

    /// Vault-wide settings embedded in every position preview.
    #[derive(Debug)]
    struct VaultSettings {
        Rate debtInterestApr;
        Rate creditLimitRate;
        Rate liquidationLimitRate;
        Rate valueIncreaseLockRate;
        Rate organizationFeeRate;
        Rate insurancePurchaseRate;
        Rate insuranceLiquidationPenaltyRate;
        uint256 insuraceRepurchaseTimeLimit;
        uint256 borrowAmountCap;
    }

    /// Position preview as returned by `showPosition`.
    ///
    /// `borrowType` is the vault's `BorrowType` enum, ABI-encoded as uint8.
    #[derive(Debug)]
    struct PositionPreviewData {
        address owner;
        uint256 nftIndex;
        bytes32 nftType;
        uint256 nftValueUSD;
        VaultSettings vaultSettings;
        uint256 creditLimit;
        uint256 debtPrincipal;
        uint256 debtInterest;
        uint8 borrowType;
        bool liquidatable;
        uint256 liquidatedAt;
        address liquidator;
    }

    /// NFTVault interface (subset used by the keeper)
    #[sol(rpc)]
    interface INFTVault {
        function showPosition(uint256 _nftIndex) external view returns (PositionPreviewData memory);
        function openPositionsIndexes() external view returns (uint256[] memory);

        event PositionOpened(address indexed owner, uint256 indexed index);
        event PositionClosed(address indexed owner, uint256 indexed index);
        event Liquidated(address indexed liquidator, address indexed owner, uint256 indexed index, bool insured);
        event Repurchased(address indexed owner, uint256 indexed index);
        event InsuranceExpired(address indexed owner, uint256 indexed index);
    }
}

/// How a position's debt was taken.
///
/// The vault deletes position storage on close, so a closed (or fully
/// liquidated) position reads back as `NotConfirmed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BorrowType {
    /// No live position for this index.
    NotConfirmed,
    /// Standard borrow without insurance.
    NonInsurance,
    /// Insured borrow; liquidation starts a repurchase window.
    UseInsurance,
}

impl BorrowType {
    /// Whether the vault holds no live position for this index.
    pub fn is_closed(self) -> bool {
        matches!(self, Self::NotConfirmed)
    }

    /// Whether the position carries insurance.
    pub fn is_insured(self) -> bool {
        matches!(self, Self::UseInsurance)
    }
}

impl TryFrom<u8> for BorrowType {
    type Error = DecodeError;

    fn try_from(raw: u8) -> Result<Self, Self::Error> {
        match raw {
            0 => Ok(Self::NotConfirmed),
            1 => Ok(Self::NonInsurance),
            2 => Ok(Self::UseInsurance),
            other => Err(DecodeError::BorrowType(other)),
        }
    }
}

/// The subset of a position's on-chain state the keeper acts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionPreview {
    /// Position (NFT) index
    pub index: U256,
    /// Position owner
    pub owner: Address,
    /// Borrow type
    pub borrow_type: BorrowType,
    /// On-chain liquidation eligibility
    pub liquidatable: bool,
    /// Liquidation timestamp (unix seconds, 0 if never liquidated)
    pub liquidated_at: u64,
}

impl PositionPreview {
    /// Build a preview from the raw `showPosition` result.
    pub fn from_raw(index: U256, raw: PositionPreviewData) -> Result<Self, DecodeError> {
        Ok(Self {
            index,
            owner: raw.owner,
            borrow_type: BorrowType::try_from(raw.borrowType)?,
            liquidatable: raw.liquidatable,
            liquidated_at: raw.liquidatedAt.saturating_to::<u64>(),
        })
    }
}
