//! Persistent storage using RocksDB optimistic transactions.

use crate::config::{LedgerConfig, DEFAULT_MAX_PLACEMENT_ATTEMPTS};
use crate::error::{Error, Result};
use crate::keys;
use crate::txn::{self, is_conflict, Txn};
use orion_matrix::{
    open_slots, resolve_ancestors, setting_keys, Ancestor, CommissionEntry, CommissionKey,
    CommissionStatus, MatrixPosition, MatrixView, Member, MemberCode, MemberId, SettingsProvider,
    SettingsSnapshot,
};
use rocksdb::{OptimisticTransactionDB, Options};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

/// Commission totals for one beneficiary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    /// Sum of approved entries
    pub approved: u64,

    /// Sum of entries awaiting approval
    pub pending: u64,

    /// Sum of rejected entries
    pub rejected: u64,

    /// Withdrawable amount (withdrawals are tracked elsewhere)
    pub available: u64,

    /// Members recruited by this member
    pub referrals: usize,
}

/// Storage backend for the ledger.
pub struct Storage {
    db: OptimisticTransactionDB,
    max_attempts: u32,
}

impl Storage {
    /// Open or create storage at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_attempts(path, DEFAULT_MAX_PLACEMENT_ATTEMPTS)
    }

    /// Open storage in the configured data directory, creating it if needed.
    pub fn from_config(config: &LedgerConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.data_dir)?;
        Self::open_with_attempts(&config.data_dir, config.max_placement_attempts)
    }

    fn open_with_attempts<P: AsRef<Path>>(path: P, max_attempts: u32) -> Result<Self> {
        if max_attempts == 0 {
            return Err(Error::Config("max_placement_attempts must be at least 1".into()));
        }
        let mut opts = Options::default();
        opts.create_if_missing(true);
        let db = OptimisticTransactionDB::open(&opts, path)?;
        Ok(Self { db, max_attempts })
    }

    /// Run `op` in a fresh transaction, retrying on commit conflicts.
    ///
    /// An error from `op` drops the transaction, discarding its writes.
    pub(crate) fn run_txn<T, F>(&self, name: &'static str, mut op: F) -> Result<T>
    where
        F: FnMut(&Txn<'_>) -> Result<T>,
    {
        for attempt in 1..=self.max_attempts {
            let txn = self.db.transaction();
            let value = op(&txn)?;
            match txn.commit() {
                Ok(()) => return Ok(value),
                Err(e) if is_conflict(&e) => {
                    tracing::warn!(op = name, attempt, error = %e, "transaction conflict, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }

        tracing::warn!(op = name, attempts = self.max_attempts, "conflicts persisted, giving up");
        Err(orion_matrix::Error::StoreConflict {
            attempts: self.max_attempts,
        }
        .into())
    }

    fn get_json<T: DeserializeOwned>(&self, key: impl AsRef<[u8]>) -> Result<Option<T>> {
        match self.db.get(key)? {
            Some(data) => Ok(Some(serde_json::from_slice(&data)?)),
            None => Ok(None),
        }
    }

    /// Collect every key/value pair under a prefix.
    fn scan_prefix(&self, prefix: &str) -> Result<Vec<(Box<[u8]>, Box<[u8]>)>> {
        let prefix = prefix.as_bytes();
        let mut items = Vec::new();

        let iter = self.db.prefix_iterator(prefix);
        for item in iter {
            let (key, value) = item?;
            if key.starts_with(prefix) {
                items.push((key, value));
            } else {
                break;
            }
        }

        Ok(items)
    }

    // --- Bootstrap ---

    /// Create the root member and seed default settings if absent.
    pub fn bootstrap_root(&self) -> Result<Member> {
        let root = self.run_txn("bootstrap", |txn| {
            let root = match txn::read::<Member>(txn, keys::member(MemberId::ROOT))? {
                Some(existing) => existing,
                None => {
                    let root = Member::root(MemberId::ROOT, now_millis());
                    txn::write(txn, keys::member(root.id), &root)?;
                    txn::write(txn, keys::code(&root.code), &root.id)?;
                    let seq: u64 = txn::read(txn, keys::MEMBER_SEQ)?.unwrap_or(0);
                    txn::write(txn, keys::MEMBER_SEQ, &seq.max(root.id.0))?;
                    tracing::info!(code = %root.code, "created root member");
                    root
                }
            };

            if txn::read::<BTreeMap<String, String>>(txn, keys::SETTINGS)?.is_none() {
                let defaults: BTreeMap<String, String> =
                    SettingsSnapshot::default().to_pairs().into_iter().collect();
                txn::write(txn, keys::SETTINGS, &defaults)?;
                tracing::info!(settings = defaults.len(), "seeded default settings");
            }

            Ok(root)
        })?;
        Ok(root)
    }

    // --- Members ---

    /// Enroll a pending member under `sponsor`, placed later under `upline`
    /// (defaults to the sponsor).
    pub fn enroll_member(&self, sponsor: MemberId, upline: Option<MemberId>) -> Result<Member> {
        let upline = upline.unwrap_or(sponsor);
        let member = self.run_txn("enroll", |txn| {
            for id in [sponsor, upline] {
                if txn::read::<Member>(txn, keys::member(id))?.is_none() {
                    return Err(orion_matrix::Error::UnknownMember(id).into());
                }
            }

            let seq: u64 = txn::read(txn, keys::MEMBER_SEQ)?.unwrap_or(0);
            let id = MemberId(seq + 1);
            let member = Member::pending(id, sponsor, upline, now_millis());

            txn::write(txn, keys::member(id), &member)?;
            txn::write(txn, keys::code(&member.code), &id)?;
            txn.put(keys::sponsored(sponsor, id), b"")?;
            txn::write(txn, keys::MEMBER_SEQ, &id.0)?;
            Ok(member)
        })?;

        tracing::info!(code = %member.code, %sponsor, %upline, "enrolled member");
        Ok(member)
    }

    /// Get a member by id.
    pub fn member(&self, id: MemberId) -> Result<Option<Member>> {
        self.get_json(keys::member(id))
    }

    /// Get a member by code.
    pub fn member_by_code(&self, code: &MemberCode) -> Result<Option<Member>> {
        match self.get_json::<MemberId>(keys::code(code))? {
            Some(id) => self.member(id),
            None => Ok(None),
        }
    }

    /// Resolve user input that is either a member code or a numeric id.
    pub fn resolve_member(&self, input: &str) -> Result<Member> {
        let found = if let Some(code) = MemberCode::parse(input) {
            self.member_by_code(&code)?
        } else if let Ok(id) = input.trim().parse::<u64>() {
            self.member(MemberId(id))?
        } else {
            return Err(Error::InvalidInput(format!("not a member code or id: {:?}", input)));
        };
        found.ok_or_else(|| Error::NotFound(format!("member {}", input.trim())))
    }

    /// Members recruited by `sponsor`, in enrollment order.
    pub fn referrals(&self, sponsor: MemberId) -> Result<Vec<MemberId>> {
        let prefix = keys::sponsored_prefix(sponsor);
        self.scan_prefix(&prefix)?
            .into_iter()
            .map(|(key, _)| {
                let raw = String::from_utf8_lossy(&key[prefix.len()..]).into_owned();
                raw.parse()
                    .map(MemberId)
                    .map_err(|_| Error::Corrupt(format!("sponsor index key: {}", raw)))
            })
            .collect()
    }

    // --- Settings ---

    /// Raw stored settings.
    pub fn settings_pairs(&self) -> Result<BTreeMap<String, String>> {
        Ok(self.get_json(keys::SETTINGS)?.unwrap_or_default())
    }

    /// Update one setting. The result must still form a valid snapshot.
    pub fn set_setting(&self, key: &str, value: &str) -> Result<SettingsSnapshot> {
        let known = matches!(
            key,
            setting_keys::PACKAGE_PRICE
                | setting_keys::MIN_WITHDRAWAL
                | setting_keys::MAX_MATRIX_LEVELS
                | setting_keys::REFERRALS_PER_LEVEL
        ) || setting_keys::parse_level_commission(key).is_some();
        if !known {
            return Err(Error::InvalidInput(format!("unknown setting: {}", key)));
        }

        let snapshot = self.run_txn("set_setting", |txn| {
            let mut pairs: BTreeMap<String, String> =
                txn::read(txn, keys::SETTINGS)?.unwrap_or_default();
            pairs.insert(key.to_string(), value.trim().to_string());
            let snapshot =
                SettingsSnapshot::from_pairs(pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())))?;
            txn::write(txn, keys::SETTINGS, &pairs)?;
            Ok(snapshot)
        })?;

        tracing::info!(key, value, "setting updated");
        Ok(snapshot)
    }

    // --- Matrix ---

    /// Get the matrix position of a member.
    pub fn position(&self, id: MemberId) -> Result<Option<MatrixPosition>> {
        self.get_json(keys::position(id))
    }

    /// Upline chain of a member under the current settings.
    pub fn ancestors(&self, member: MemberId) -> Result<Vec<Ancestor>> {
        let settings = self.snapshot()?;
        Ok(resolve_ancestors(self, member, settings.max_matrix_levels())?)
    }

    /// Activations that still fit below `upline` under the current settings.
    pub fn open_slots(&self, upline: MemberId) -> Result<u64> {
        let settings = self.snapshot()?;
        Ok(open_slots(self, upline, &settings)?)
    }

    // --- Commissions ---

    /// Get a commission entry by natural key.
    pub fn commission(&self, key: &CommissionKey) -> Result<Option<CommissionEntry>> {
        self.get_json(keys::commission(key))
    }

    /// Commission entries credited to `beneficiary`, optionally filtered by status.
    pub fn commissions_for(
        &self,
        beneficiary: MemberId,
        status: Option<CommissionStatus>,
    ) -> Result<Vec<CommissionEntry>> {
        let mut entries = Vec::new();
        for (_, value) in self.scan_prefix(&keys::commission_prefix(beneficiary))? {
            let entry: CommissionEntry = serde_json::from_slice(&value)?;
            if status.map_or(true, |s| entry.status == s) {
                entries.push(entry);
            }
        }
        Ok(entries)
    }

    /// Approve a pending commission.
    pub fn approve_commission(
        &self,
        key: &CommissionKey,
        approver: MemberId,
    ) -> Result<CommissionEntry> {
        self.resolve_commission(key, CommissionStatus::Approved, approver)
    }

    /// Reject a pending commission.
    pub fn reject_commission(
        &self,
        key: &CommissionKey,
        approver: MemberId,
    ) -> Result<CommissionEntry> {
        self.resolve_commission(key, CommissionStatus::Rejected, approver)
    }

    /// Move a pending commission to a terminal status. Only admins resolve.
    pub fn resolve_commission(
        &self,
        key: &CommissionKey,
        to: CommissionStatus,
        approver: MemberId,
    ) -> Result<CommissionEntry> {
        let entry = self.run_txn("resolve_commission", |txn| {
            let admin: Member = txn::read(txn, keys::member(approver))?
                .ok_or(orion_matrix::Error::UnknownMember(approver))?;
            if !admin.is_admin() {
                return Err(Error::InvalidInput(format!(
                    "member {} is not an admin",
                    admin.code
                )));
            }

            let mut entry: CommissionEntry = txn::read(txn, keys::commission(key))?
                .ok_or(orion_matrix::Error::UnknownCommission(*key))?;
            let from = entry.status;
            entry.resolve(to, approver, now_millis())?;

            txn::write(txn, keys::commission(key), &entry)?;
            txn.delete(keys::earning(key, from))?;
            txn::write(txn, keys::earning(key, entry.status), &entry.amount)?;
            Ok(entry)
        })?;

        tracing::info!(
            beneficiary = %key.beneficiary_id,
            originator = %key.originator_id,
            level = key.level,
            status = %entry.status,
            %approver,
            "commission resolved"
        );
        Ok(entry)
    }

    /// Commission totals and referral count for `member`.
    pub fn balance(&self, member: MemberId) -> Result<Balance> {
        if self.member(member)?.is_none() {
            return Err(orion_matrix::Error::UnknownMember(member).into());
        }

        let mut balance = Balance::default();
        for (key, value) in self.scan_prefix(&keys::earning_prefix(member))? {
            let amount: u64 = serde_json::from_slice(&value)?;
            match keys::earning_status(&key, member) {
                Some(CommissionStatus::Approved) => balance.approved += amount,
                Some(CommissionStatus::Pending) => balance.pending += amount,
                Some(CommissionStatus::Rejected) => balance.rejected += amount,
                None => {
                    return Err(Error::Corrupt(format!(
                        "earning key: {}",
                        String::from_utf8_lossy(&key)
                    )))
                }
            }
        }
        balance.available = balance.approved;
        balance.referrals = self.referrals(member)?.len();
        Ok(balance)
    }
}

impl MatrixView for Storage {
    fn member(&self, id: MemberId) -> orion_matrix::Result<Option<Member>> {
        Storage::member(self, id).map_err(txn::into_engine)
    }

    fn position(&self, id: MemberId) -> orion_matrix::Result<Option<MatrixPosition>> {
        Storage::position(self, id).map_err(txn::into_engine)
    }

    fn children(&self, parent: MemberId) -> orion_matrix::Result<Vec<MatrixPosition>> {
        let count: u32 = self
            .get_json(keys::slots(parent))
            .map_err(txn::into_engine)?
            .unwrap_or(0);

        (1..=count)
            .map(|slot| {
                let child: MemberId = self
                    .get_json(keys::child(parent, slot))
                    .map_err(txn::into_engine)?
                    .ok_or_else(|| {
                        orion_matrix::Error::Corrupt(format!("slot {} of {} is empty", slot, parent))
                    })?;
                Storage::position(self, child)
                    .map_err(txn::into_engine)?
                    .ok_or_else(|| {
                        orion_matrix::Error::Corrupt(format!(
                            "child {} of {} has no position",
                            child, parent
                        ))
                    })
            })
            .collect()
    }
}

impl SettingsProvider for Storage {
    /// One read of the settings object; concurrent edits land before or after.
    fn snapshot(&self) -> orion_matrix::Result<SettingsSnapshot> {
        let pairs: BTreeMap<String, String> = self
            .get_json(keys::SETTINGS)
            .map_err(|e| orion_matrix::Error::SettingsUnavailable(e.to_string()))?
            .ok_or_else(|| {
                orion_matrix::Error::SettingsUnavailable("settings not initialized".to_string())
            })?;
        SettingsSnapshot::from_pairs(pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
    }
}

/// Milliseconds since the Unix epoch.
pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn open() -> (tempfile::TempDir, Storage) {
        let dir = tempdir().unwrap();
        let storage = Storage::open(dir.path()).unwrap();
        (dir, storage)
    }

    fn open_with_attempts(attempts: u32) -> (tempfile::TempDir, Storage) {
        let dir = tempdir().unwrap();
        let config = LedgerConfig {
            data_dir: dir.path().join("ledger"),
            max_placement_attempts: attempts,
            ..LedgerConfig::default()
        };
        let storage = Storage::from_config(&config).unwrap();
        (dir, storage)
    }

    /// Claim the root's slot counter while an outside writer commits the
    /// same key first on the listed attempts.
    fn contended_claim(storage: &Storage, interfere_on: &[u32]) -> (Result<()>, u32) {
        let mut calls = 0;
        let result = storage.run_txn("contended", |txn| {
            calls += 1;
            let seen: u32 = txn::read(txn, keys::slots(MemberId::ROOT))?.unwrap_or(0);
            if interfere_on.contains(&calls) {
                storage.db.put(keys::slots(MemberId::ROOT), b"7")?;
            }
            txn::write(txn, keys::slots(MemberId::ROOT), &(seen + 1))?;
            txn::write(txn, keys::child(MemberId::ROOT, seen + 1), &MemberId(2))?;
            Ok(())
        });
        (result, calls)
    }

    #[test]
    fn persistent_conflicts_surface_as_store_conflict() {
        let (_dir, storage) = open_with_attempts(1);

        let (result, calls) = contended_claim(&storage, &[1]);
        let err = result.unwrap_err();
        assert_eq!(calls, 1);
        assert!(matches!(
            err,
            Error::Engine(orion_matrix::Error::StoreConflict { attempts: 1 })
        ));
        assert!(err.is_retryable());

        // Only the outside write landed.
        assert_eq!(storage.get_json::<u32>(keys::slots(MemberId::ROOT)).unwrap(), Some(7));
        assert!(storage.db.get(keys::child(MemberId::ROOT, 1)).unwrap().is_none());
    }

    #[test]
    fn conflicts_retry_against_fresh_state() {
        let (_dir, storage) = open_with_attempts(3);

        let (result, calls) = contended_claim(&storage, &[1, 2]);
        result.unwrap();
        assert_eq!(calls, 3);
        assert_eq!(storage.get_json::<u32>(keys::slots(MemberId::ROOT)).unwrap(), Some(8));
        assert!(storage.db.get(keys::child(MemberId::ROOT, 8)).unwrap().is_some());
    }

    #[test]
    fn bootstrap_is_idempotent() {
        let (_dir, storage) = open();
        let first = storage.bootstrap_root().unwrap();
        let second = storage.bootstrap_root().unwrap();
        assert_eq!(first, second);
        assert_eq!(first.code.as_str(), "BO000001");
        assert!(first.is_admin());
        assert_eq!(storage.snapshot().unwrap(), SettingsSnapshot::default());
    }

    #[test]
    fn snapshot_requires_bootstrap() {
        let (_dir, storage) = open();
        let err = storage.snapshot().unwrap_err();
        assert!(matches!(err, orion_matrix::Error::SettingsUnavailable(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn enroll_assigns_sequential_codes() {
        let (_dir, storage) = open();
        storage.bootstrap_root().unwrap();

        let a = storage.enroll_member(MemberId::ROOT, None).unwrap();
        let b = storage.enroll_member(a.id, Some(MemberId::ROOT)).unwrap();

        assert_eq!(a.code.as_str(), "BO000002");
        assert_eq!(b.code.as_str(), "BO000003");
        assert_eq!(b.sponsor_id, Some(a.id));
        assert_eq!(b.upline_id, Some(MemberId::ROOT));
        assert!(!b.is_active());

        let loaded = storage.member_by_code(&b.code).unwrap().unwrap();
        assert_eq!(loaded, b);
        assert_eq!(storage.resolve_member("bo000003").unwrap(), b);
        assert_eq!(storage.resolve_member("3").unwrap(), b);
        assert_eq!(storage.referrals(a.id).unwrap(), vec![b.id]);
    }

    #[test]
    fn enroll_rejects_unknown_sponsor() {
        let (_dir, storage) = open();
        storage.bootstrap_root().unwrap();
        let err = storage.enroll_member(MemberId(42), None).unwrap_err();
        assert!(matches!(
            err,
            Error::Engine(orion_matrix::Error::UnknownMember(MemberId(42)))
        ));
    }

    #[test]
    fn resolve_member_errors() {
        let (_dir, storage) = open();
        storage.bootstrap_root().unwrap();
        assert!(matches!(
            storage.resolve_member("BO000099"),
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            storage.resolve_member("alice"),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn set_setting_validates() {
        let (_dir, storage) = open();
        storage.bootstrap_root().unwrap();

        let snapshot = storage.set_setting("level_2_commission", "2500").unwrap();
        assert_eq!(snapshot.level_commission(2), 2_500);
        assert_eq!(storage.snapshot().unwrap().level_commission(2), 2_500);

        assert!(matches!(
            storage.set_setting("favourite_colour", "blue"),
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            storage.set_setting("referrals_per_level", "0"),
            Err(Error::Engine(orion_matrix::Error::InvalidSettings(_)))
        ));
        // The rejected edit left the stored value alone.
        assert_eq!(storage.snapshot().unwrap().referrals_per_level(), 5);
    }

    #[test]
    fn unreadable_earning_index_is_not_retryable() {
        let (_dir, storage) = open();
        storage.bootstrap_root().unwrap();
        let key = format!("{}bogus:{:020}:{:03}", keys::earning_prefix(MemberId::ROOT), 2, 1);
        storage.db.put(key, b"100").unwrap();

        let err = storage.balance(MemberId::ROOT).unwrap_err();
        assert!(matches!(err, Error::Corrupt(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn balance_of_unknown_member() {
        let (_dir, storage) = open();
        storage.bootstrap_root().unwrap();
        assert!(storage.balance(MemberId(77)).is_err());
        assert_eq!(storage.balance(MemberId::ROOT).unwrap(), Balance::default());
    }
}
