//! Transaction helpers and the transactional matrix view.
//!
//! Every read goes through `get_for_update`, so RocksDB tracks it for
//! optimistic conflict detection: if another transaction commits a write to
//! any key we read, our commit fails with `Busy` and the operation is retried
//! against fresh state.

use crate::error::{Error, Result};
use crate::keys;
use orion_matrix::{MatrixPosition, MatrixView, Member, MemberId};
use rocksdb::{ErrorKind, OptimisticTransactionDB, Transaction};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// A transaction on the ledger database.
pub(crate) type Txn<'db> = Transaction<'db, OptimisticTransactionDB>;

/// Read and decode a JSON value, tracking the key for conflicts.
pub(crate) fn read<T: DeserializeOwned>(txn: &Txn<'_>, key: impl AsRef<[u8]>) -> Result<Option<T>> {
    match txn.get_for_update(key, true)? {
        Some(data) => Ok(Some(serde_json::from_slice(&data)?)),
        None => Ok(None),
    }
}

/// Encode and write a JSON value.
pub(crate) fn write<T: Serialize + ?Sized>(
    txn: &Txn<'_>,
    key: impl AsRef<[u8]>,
    value: &T,
) -> Result<()> {
    txn.put(key, serde_json::to_vec(value)?)?;
    Ok(())
}

/// Whether a commit failure is transient write contention.
pub(crate) fn is_conflict(e: &rocksdb::Error) -> bool {
    matches!(
        e.kind(),
        ErrorKind::Busy | ErrorKind::TryAgain | ErrorKind::TimedOut
    )
}

/// Convert a ledger error into the engine's error type for `MatrixView`.
/// Only transient failures stay retryable.
pub(crate) fn into_engine(e: Error) -> orion_matrix::Error {
    match e {
        Error::Engine(inner) => inner,
        Error::Busy(msg) => orion_matrix::Error::Store(msg),
        other => orion_matrix::Error::Corrupt(other.to_string()),
    }
}

/// Matrix view over an open transaction. Sees the transaction's own writes.
pub(crate) struct TxnView<'t, 'db> {
    txn: &'t Txn<'db>,
}

impl<'t, 'db> TxnView<'t, 'db> {
    pub(crate) fn new(txn: &'t Txn<'db>) -> Self {
        Self { txn }
    }
}

impl MatrixView for TxnView<'_, '_> {
    fn member(&self, id: MemberId) -> orion_matrix::Result<Option<Member>> {
        read(self.txn, keys::member(id)).map_err(into_engine)
    }

    fn position(&self, id: MemberId) -> orion_matrix::Result<Option<MatrixPosition>> {
        read(self.txn, keys::position(id)).map_err(into_engine)
    }

    fn children(&self, parent: MemberId) -> orion_matrix::Result<Vec<MatrixPosition>> {
        let count: u32 = read(self.txn, keys::slots(parent))
            .map_err(into_engine)?
            .unwrap_or(0);

        (1..=count)
            .map(|slot| {
                let child: MemberId = read(self.txn, keys::child(parent, slot))
                    .map_err(into_engine)?
                    .ok_or_else(|| {
                        orion_matrix::Error::Corrupt(format!("slot {} of {} is empty", slot, parent))
                    })?;
                self.position(child)?.ok_or_else(|| {
                    orion_matrix::Error::Corrupt(format!("child {} of {} has no position", child, parent))
                })
            })
            .collect()
    }
}
