//! Append-only record of accepted view changes.
//!
//! The ledger keeps the chain tip for linkage and every view-change record
//! that passed validation, keyed by `(ds_epoch, epoch, counter)`. Records
//! are never updated in place. Primary blocks only move the tip; their
//! bodies live elsewhere.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use thiserror::Error;
use tracing::{info, warn};
use vigil_crypto::CryptoProvider;
use vigil_types::{ChainHeader, HeaderCodec, TxBlockHeader};

use crate::committee::CommitteeDirectory;
use crate::engine::FinalizedSink;
use crate::types::FinalizedViewChange;
use crate::validation::{ChainTip, ValidationError, ViewChangeValidator};

/// Errors appending to the ledger
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// The view-change record failed validation
    #[error("view change rejected: {0}")]
    Rejected(#[from] ValidationError),

    /// A primary block does not extend the tip
    #[error("primary block rejected: {0}")]
    PrimaryBlock(String),
}

struct LedgerState {
    tip: ChainTip,
    tip_header: ChainHeader,
    records: BTreeMap<(u64, u64, u32), FinalizedViewChange>,
}

/// Validated, append-only view-change history.
pub struct ViewChangeLedger<D, C> {
    directory: Arc<D>,
    validator: ViewChangeValidator<C>,
    state: RwLock<LedgerState>,
}

impl<D, C> ViewChangeLedger<D, C>
where
    D: CommitteeDirectory,
    C: CryptoProvider,
{
    /// Create a ledger whose tip is `genesis`.
    pub fn new(genesis: ChainHeader, directory: Arc<D>, validator: ViewChangeValidator<C>) -> Self {
        let tip = ChainTip::from_header(&genesis);
        info!(tip = %tip, "View-change ledger opened");
        Self {
            directory,
            validator,
            state: RwLock::new(LedgerState {
                tip,
                tip_header: genesis,
                records: BTreeMap::new(),
            }),
        }
    }

    /// Validate `record` against the tip and append it.
    ///
    /// Returns the new tip. On rejection nothing changes. A record whose
    /// counter does not exceed every counter already recorded for its
    /// `(ds_epoch, epoch)` is refused even when it links to the tip.
    pub fn append(&self, record: FinalizedViewChange) -> Result<ChainTip, LedgerError> {
        let mut state = self.state.write();
        let key = record.header.ordering_key();
        // A primary block tip carries counter 0, so the validator alone would
        // let a counter already recorded for this epoch through again.
        if let Some((&recorded, _)) = state
            .records
            .range((key.0, key.1, 0)..=(key.0, key.1, u32::MAX))
            .next_back()
        {
            if key <= recorded {
                warn!(
                    ds_epoch = key.0,
                    epoch = key.1,
                    counter = key.2,
                    recorded_counter = recorded.2,
                    "View-change counter already recorded"
                );
                return Err(LedgerError::Rejected(ValidationError::StaleOrFutureHeader {
                    tip: recorded,
                    got: key,
                }));
            }
        }

        let tip = self.validator.accept(
            &record.header,
            &record.endorsement,
            &state.tip,
            self.directory.as_ref(),
        )?;

        info!(
            ds_epoch = tip.ds_epoch,
            epoch = tip.epoch,
            counter = tip.counter,
            candidate = %record.header.candidate_leader_key().short_hex(),
            hash = %tip.hash.short_hex(),
            "View change appended"
        );
        state.tip = tip;
        state.tip_header = ChainHeader::ViewChange(record.header.clone());
        state.records.insert(tip.ordering_key(), record);
        Ok(tip)
    }

    /// Move the tip to a primary block that links to it.
    pub fn record_primary_block(&self, block: TxBlockHeader) -> Result<ChainTip, LedgerError> {
        let mut state = self.state.write();
        let current = state.tip;

        if block.prev_hash() != current.hash {
            return Err(LedgerError::PrimaryBlock(format!(
                "links to {}, tip is {}",
                block.prev_hash().short_hex(),
                current.hash.short_hex()
            )));
        }
        let position = (block.ds_epoch_number(), block.epoch_number());
        let tip_position = (current.ds_epoch, current.epoch);
        if position < tip_position || (position == tip_position && current.counter == 0) {
            warn!(
                ds_epoch = block.ds_epoch_number(),
                epoch = block.epoch_number(),
                tip = %current,
                "Primary block does not advance the chain"
            );
            return Err(LedgerError::PrimaryBlock(format!(
                "epoch ({}, {}) does not advance tip {}",
                position.0, position.1, current
            )));
        }

        let header = ChainHeader::Tx(block);
        let tip = ChainTip::from_header(&header);
        state.tip = tip;
        state.tip_header = header;
        Ok(tip)
    }

    /// Latest record for `(ds_epoch, epoch)`, i.e. the one with the highest counter.
    pub fn get_by_epoch(&self, ds_epoch: u64, epoch: u64) -> Option<FinalizedViewChange> {
        self.state
            .read()
            .records
            .range((ds_epoch, epoch, 0)..=(ds_epoch, epoch, u32::MAX))
            .next_back()
            .map(|(_, r)| r.clone())
    }

    /// Every record for `(ds_epoch, epoch)`, in counter order.
    pub fn records_for_epoch(&self, ds_epoch: u64, epoch: u64) -> Vec<FinalizedViewChange> {
        self.state
            .read()
            .records
            .range((ds_epoch, epoch, 0)..=(ds_epoch, epoch, u32::MAX))
            .map(|(_, r)| r.clone())
            .collect()
    }

    /// Most recent record.
    pub fn latest(&self) -> Option<FinalizedViewChange> {
        self.state
            .read()
            .records
            .values()
            .next_back()
            .cloned()
    }

    /// Current tip.
    pub fn tip(&self) -> ChainTip {
        self.state.read().tip
    }

    /// Header at the tip.
    pub fn tip_header(&self) -> ChainHeader {
        self.state.read().tip_header.clone()
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.state.read().records.len()
    }

    /// Whether no view change has been recorded.
    pub fn is_empty(&self) -> bool {
        self.state.read().records.is_empty()
    }
}

#[async_trait]
impl<D, C> FinalizedSink for ViewChangeLedger<D, C>
where
    D: CommitteeDirectory + 'static,
    C: CryptoProvider + 'static,
{
    async fn on_finalized(&self, record: &FinalizedViewChange) -> Result<(), String> {
        let hash = record.header.compute_hash();
        if self.tip().hash == hash {
            return Ok(());
        }
        self.append(record.clone()).map(|_| ()).map_err(|e| e.to_string())
    }
}
