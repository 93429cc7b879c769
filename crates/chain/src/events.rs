//! Vault lifecycle and oracle events.
//!
//! The [`EventRegistry`] maps event signatures to [`EventKind`]s for one vault
//! deployment. It is built once at startup and handed to whoever needs to
//! build filters or decode logs.

use std::collections::{HashMap, HashSet};

use alloy::primitives::{Address, B256, I256, U256};
use alloy::rpc::types::{Filter, Log};
use alloy::sol_types::SolEvent;
use tracing::debug;

use crate::contracts::{IAggregator, INFTVault};
use crate::error::DecodeError;

/// Kind of event the keeper reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    PositionOpened,
    PositionClosed,
    Repurchased,
    InsuranceExpired,
    Liquidated,
    AnswerUpdated,
}

impl EventKind {
    /// Every kind, vault lifecycle first.
    pub const ALL: [EventKind; 6] = [
        Self::PositionOpened,
        Self::PositionClosed,
        Self::Repurchased,
        Self::InsuranceExpired,
        Self::Liquidated,
        Self::AnswerUpdated,
    ];

    /// Event name.
    pub fn name(self) -> &'static str {
        match self {
            Self::PositionOpened => "PositionOpened",
            Self::PositionClosed => "PositionClosed",
            Self::Repurchased => "Repurchased",
            Self::InsuranceExpired => "InsuranceExpired",
            Self::Liquidated => "Liquidated",
            Self::AnswerUpdated => "AnswerUpdated",
        }
    }

    /// Keccak256 of the event signature (topic 0).
    pub fn signature(self) -> B256 {
        match self {
            Self::PositionOpened => INFTVault::PositionOpened::SIGNATURE_HASH,
            Self::PositionClosed => INFTVault::PositionClosed::SIGNATURE_HASH,
            Self::Repurchased => INFTVault::Repurchased::SIGNATURE_HASH,
            Self::InsuranceExpired => INFTVault::InsuranceExpired::SIGNATURE_HASH,
            Self::Liquidated => INFTVault::Liquidated::SIGNATURE_HASH,
            Self::AnswerUpdated => IAggregator::AnswerUpdated::SIGNATURE_HASH,
        }
    }

    /// Whether the event is emitted by the vault (as opposed to an oracle).
    pub fn is_lifecycle(self) -> bool {
        !matches!(self, Self::AnswerUpdated)
    }
}

/// Position of a log in the chain, used to order and de-duplicate events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LogPosition {
    pub block_number: u64,
    pub log_index: u64,
}

impl LogPosition {
    /// Extract the position of a mined log. Pending logs have none.
    pub fn of(log: &Log) -> Option<Self> {
        Some(Self {
            block_number: log.block_number?,
            log_index: log.log_index?,
        })
    }
}

/// Decoded event payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VaultEvent {
    PositionOpened { index: U256 },
    PositionClosed { index: U256 },
    Repurchased { index: U256 },
    InsuranceExpired { index: U256 },
    Liquidated { index: U256, insured: bool },
    AnswerUpdated { oracle: Address, answer: I256, round_id: U256 },
}

impl VaultEvent {
    /// Kind of this event.
    pub fn kind(&self) -> EventKind {
        match self {
            Self::PositionOpened { .. } => EventKind::PositionOpened,
            Self::PositionClosed { .. } => EventKind::PositionClosed,
            Self::Repurchased { .. } => EventKind::Repurchased,
            Self::InsuranceExpired { .. } => EventKind::InsuranceExpired,
            Self::Liquidated { .. } => EventKind::Liquidated,
            Self::AnswerUpdated { .. } => EventKind::AnswerUpdated,
        }
    }

    /// Position index the event refers to (none for price updates).
    pub fn position_index(&self) -> Option<U256> {
        match self {
            Self::PositionOpened { index }
            | Self::PositionClosed { index }
            | Self::Repurchased { index }
            | Self::InsuranceExpired { index }
            | Self::Liquidated { index, .. } => Some(*index),
            Self::AnswerUpdated { .. } => None,
        }
    }
}

/// A decoded log together with its chain metadata.
#[derive(Debug, Clone)]
pub struct DecodedEvent {
    pub event: VaultEvent,
    /// Ordering key, `None` for pending logs
    pub position: Option<LogPosition>,
    /// Set by the node when the log was retracted by a reorg
    pub removed: bool,
    pub tx_hash: Option<B256>,
}

/// Signature → event kind mapping for one vault deployment.
#[derive(Debug, Clone)]
pub struct EventRegistry {
    vault: Address,
    oracles: Vec<Address>,
    oracle_set: HashSet<Address>,
    kinds: HashMap<B256, EventKind>,
}

impl EventRegistry {
    /// Build the registry for a vault and the oracles it prices with.
    pub fn new(vault: Address, oracles: impl IntoIterator<Item = Address>) -> Self {
        let mut oracle_list = Vec::new();
        let mut oracle_set = HashSet::new();
        for oracle in oracles {
            if oracle_set.insert(oracle) {
                oracle_list.push(oracle);
            }
        }

        let kinds = EventKind::ALL
            .iter()
            .map(|kind| (kind.signature(), *kind))
            .collect();

        Self {
            vault,
            oracles: oracle_list,
            oracle_set,
            kinds,
        }
    }

    /// Vault address.
    pub fn vault(&self) -> Address {
        self.vault
    }

    /// Oracle addresses, de-duplicated, in configuration order.
    pub fn oracles(&self) -> &[Address] {
        &self.oracles
    }

    /// Signatures of the vault lifecycle events.
    pub fn lifecycle_signatures(&self) -> Vec<B256> {
        EventKind::ALL
            .iter()
            .filter(|kind| kind.is_lifecycle())
            .map(|kind| kind.signature())
            .collect()
    }

    /// Filter for historical vault lifecycle logs.
    pub fn lifecycle_filter(&self) -> Filter {
        Filter::new()
            .address(self.vault)
            .event_signature(self.lifecycle_signatures())
    }

    /// Filter for oracle price updates only.
    pub fn price_filter(&self) -> Filter {
        Filter::new()
            .address(self.oracles.clone())
            .event_signature(EventKind::AnswerUpdated.signature())
    }

    /// Filter for the live subscription: vault lifecycle plus price updates.
    pub fn live_filter(&self) -> Filter {
        let mut addresses = Vec::with_capacity(self.oracles.len() + 1);
        addresses.push(self.vault);
        addresses.extend(self.oracles.iter().copied());

        let signatures: Vec<B256> = EventKind::ALL.iter().map(|kind| kind.signature()).collect();

        Filter::new().address(addresses).event_signature(signatures)
    }

    /// Decode a log into a [`DecodedEvent`].
    ///
    /// Logs with unregistered signatures, or emitted by an address that
    /// should not emit that event, are decode errors.
    pub fn decode(&self, log: &Log) -> Result<DecodedEvent, DecodeError> {
        let address = log.address();
        let signature = *log
            .topics()
            .first()
            .ok_or(DecodeError::MissingTopic { address })?;

        let kind = *self
            .kinds
            .get(&signature)
            .ok_or(DecodeError::UnknownSignature { signature, address })?;

        let expected_emitter = if kind.is_lifecycle() {
            address == self.vault
        } else {
            self.oracle_set.contains(&address)
        };
        if !expected_emitter {
            return Err(DecodeError::UnexpectedEmitter {
                event: kind.name(),
                address,
            });
        }

        let event = match kind {
            EventKind::PositionOpened => {
                let data = decode_as::<INFTVault::PositionOpened>(log, kind)?;
                VaultEvent::PositionOpened { index: data.index }
            }
            EventKind::PositionClosed => {
                let data = decode_as::<INFTVault::PositionClosed>(log, kind)?;
                VaultEvent::PositionClosed { index: data.index }
            }
            EventKind::Repurchased => {
                let data = decode_as::<INFTVault::Repurchased>(log, kind)?;
                VaultEvent::Repurchased { index: data.index }
            }
            EventKind::InsuranceExpired => {
                let data = decode_as::<INFTVault::InsuranceExpired>(log, kind)?;
                VaultEvent::InsuranceExpired { index: data.index }
            }
            EventKind::Liquidated => {
                let data = decode_as::<INFTVault::Liquidated>(log, kind)?;
                VaultEvent::Liquidated {
                    index: data.index,
                    insured: data.insured,
                }
            }
            EventKind::AnswerUpdated => {
                let data = decode_as::<IAggregator::AnswerUpdated>(log, kind)?;
                VaultEvent::AnswerUpdated {
                    oracle: address,
                    answer: data.current,
                    round_id: data.roundId,
                }
            }
        };

        let position = LogPosition::of(log);

        debug!(
            event = kind.name(),
            index = ?event.position_index(),
            block = ?position.map(|p| p.block_number),
            "Decoded log"
        );

        Ok(DecodedEvent {
            event,
            position,
            removed: log.removed,
            tx_hash: log.transaction_hash,
        })
    }
}

fn decode_as<E: SolEvent>(log: &Log, kind: EventKind) -> Result<E, DecodeError> {
    log.log_decode::<E>()
        .map(|decoded| decoded.inner.data)
        .map_err(|source| DecodeError::Malformed {
            event: kind.name(),
            source,
        })
}
