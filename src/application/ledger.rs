//! Ledger service: Accumulation and aggregation over encrypted costs.
//!
//! This service coordinates:
//! - Input verification through the arithmetic provider
//! - Same-day accumulation by homomorphic addition
//! - Weekly rollups over seven consecutive days
//! - Decrypt grants for the project manager and submitters
//! - Persistence of records and notifications
//!
//! Every mutating operation performs all provider calls first, checkpoints
//! the provider, and only then makes a single store commit. A rejected call
//! leaves the stored records as they were, and a committed handle is always
//! backed by durable provider state.
//!
//! A failure after verification can leave provider-side residue: imported
//! inputs, intermediate sums and their grants. No stored record points at
//! them. A submitter granted such an orphan sum learns nothing a successful
//! recording would not have disclosed to them.

use std::sync::Arc;

use crate::adapters::StorageError;
use crate::domain::{
    week_window, CostHandles, DailyEntry, DailyExpense, DayIndex, Handle, LedgerEvent, LedgerId,
    LedgerMetadata, Principal, WeeklyAggregate,
};
use crate::ports::{ConfidentialArithmetic, DisclosureRequest, LedgerStore};
use crate::{LedgerError, Result};

/// The accumulation and aggregation engine for one ledger.
pub struct ExpenseLedger<A, S>
where
    A: ConfidentialArithmetic,
    S: LedgerStore,
{
    arithmetic: Arc<A>,
    store: Arc<S>,
    metadata: LedgerMetadata,
}

impl<A, S> ExpenseLedger<A, S>
where
    A: ConfidentialArithmetic,
    S: LedgerStore,
    S::Error: Into<StorageError>,
{
    /// Create a new ledger in an empty store, naming its project manager.
    ///
    /// # Errors
    /// Returns `LedgerError::AlreadyInitialized` if the store already holds a
    /// ledger.
    pub fn create(arithmetic: Arc<A>, store: Arc<S>, administrator: Principal) -> Result<Self> {
        if store.load_metadata().map_err(storage)?.is_some() {
            return Err(LedgerError::AlreadyInitialized);
        }

        let metadata = LedgerMetadata {
            ledger_id: LedgerId::generate(),
            administrator,
            created_at: chrono::Utc::now(),
        };
        arithmetic.checkpoint()?;
        store.init_metadata(&metadata).map_err(|e| {
            let err: StorageError = e.into();
            match err {
                StorageError::AlreadyInitialized => LedgerError::AlreadyInitialized,
                other => LedgerError::Storage(other),
            }
        })?;

        tracing::info!(
            "Created ledger {} (project manager: {})",
            metadata.ledger_id.short(),
            administrator.short()
        );
        Ok(Self {
            arithmetic,
            store,
            metadata,
        })
    }

    /// Attach to the ledger already recorded in `store`.
    ///
    /// # Errors
    /// Returns `LedgerError::NotInitialized` if the store holds no ledger.
    pub fn open(arithmetic: Arc<A>, store: Arc<S>) -> Result<Self> {
        let metadata = store
            .load_metadata()
            .map_err(storage)?
            .ok_or(LedgerError::NotInitialized)?;

        tracing::debug!("Opened ledger {}", metadata.ledger_id.short());
        Ok(Self {
            arithmetic,
            store,
            metadata,
        })
    }

    /// Identity that encrypted inputs must be bound to.
    #[must_use]
    pub fn ledger_id(&self) -> LedgerId {
        self.metadata.ledger_id
    }

    /// The ledger administrator.
    #[must_use]
    pub fn project_manager(&self) -> Principal {
        self.metadata.administrator
    }

    /// Accumulate one recording into the entry for `day`.
    ///
    /// All three inputs are verified against `proof` before any of them is
    /// imported. On success the entry holds the running sums, and both the project
    /// manager and `submitter` may decrypt them.
    ///
    /// # Errors
    /// Returns `LedgerError::ProofVerification` if an input is not bound to
    /// this ledger and `submitter`, `LedgerError::ArithmeticRejection` if the
    /// provider refuses an addition, `LedgerError::Io` if the provider state
    /// cannot be checkpointed, or a storage error. Stored records are
    /// unchanged in every error case.
    pub fn record_daily_expense(
        &self,
        day: DayIndex,
        material: &Handle,
        labor: &Handle,
        rental: &Handle,
        proof: &A::InputProof,
        submitter: &Principal,
    ) -> Result<()> {
        let ledger = self.metadata.ledger_id;

        let verified = self
            .arithmetic
            .verify_inputs(&ledger, submitter, &[*material, *labor, *rental], proof)
            .map_err(|e| {
                tracing::warn!(
                    "Rejected recording for day {day} from {}: {e}",
                    submitter.short()
                );
                LedgerError::from(e)
            })?;
        let [material, labor, rental] = verified.as_slice() else {
            return Err(LedgerError::ProofVerification(format!(
                "provider verified {} of 3 inputs",
                verified.len()
            )));
        };
        let incoming = CostHandles {
            material: *material,
            labor: *labor,
            rental: *rental,
        };

        let previous = self.current_costs(day)?;
        let updated = CostHandles {
            material: self.arithmetic.add(&ledger, &previous.material, &incoming.material)?,
            labor: self.arithmetic.add(&ledger, &previous.labor, &incoming.labor)?,
            rental: self.arithmetic.add(&ledger, &previous.rental, &incoming.rental)?,
        };

        for handle in updated.to_array() {
            self.arithmetic.grant_decrypt(&handle, &self.metadata.administrator)?;
            self.arithmetic.grant_decrypt(&handle, submitter)?;
        }
        self.arithmetic.checkpoint()?;

        let event = LedgerEvent::ExpenseRecorded {
            submitter: *submitter,
            day,
            timestamp: chrono::Utc::now(),
        };
        self.store
            .commit_daily(day, &DailyEntry::recorded(updated), &event)
            .map_err(storage)?;

        tracing::info!("Recorded expense for day {day} from {}", submitter.short());
        Ok(())
    }

    /// Handles for `day`, or the encrypted zero with `exists = false`.
    ///
    /// # Errors
    /// Returns error if the store read fails.
    pub fn get_daily_expense(&self, day: DayIndex) -> Result<DailyExpense> {
        let entry = self.entry_or_zero(day)?;
        Ok(DailyExpense {
            material: entry.material_cost,
            labor: entry.labor_cost,
            rental: entry.rental_cost,
            exists: entry.initialized,
        })
    }

    /// Sum the seven days starting at `week_start` and persist the result.
    ///
    /// Days are folded in ascending order onto the encrypted zero, so an
    /// unchanged week reproduces the same handles. Only the project manager
    /// is granted the totals.
    ///
    /// # Errors
    /// Returns `LedgerError::InvalidWindow` if the window runs past the last
    /// representable day, `LedgerError::ArithmeticRejection` if the provider
    /// refuses an addition, `LedgerError::Io` if the provider state cannot be
    /// checkpointed, or a storage error. No aggregate is written on failure.
    pub fn calculate_weekly_total(&self, week_start: DayIndex) -> Result<CostHandles> {
        let window = week_window(week_start).ok_or(LedgerError::InvalidWindow(week_start))?;
        let ledger = self.metadata.ledger_id;

        let mut totals = CostHandles::splat(self.arithmetic.encrypted_zero());
        for day in window {
            let costs = self.entry_or_zero(day)?.costs();
            totals = CostHandles {
                material: self.arithmetic.add(&ledger, &totals.material, &costs.material)?,
                labor: self.arithmetic.add(&ledger, &totals.labor, &costs.labor)?,
                rental: self.arithmetic.add(&ledger, &totals.rental, &costs.rental)?,
            };
        }

        for handle in totals.to_array() {
            self.arithmetic.grant_decrypt(&handle, &self.metadata.administrator)?;
        }
        self.arithmetic.checkpoint()?;

        let event = LedgerEvent::WeeklyTotalCalculated {
            week_start,
            timestamp: chrono::Utc::now(),
        };
        self.store
            .commit_weekly(week_start, &WeeklyAggregate::computed(totals), &event)
            .map_err(storage)?;

        tracing::info!("Calculated weekly total for week starting day {week_start}");
        Ok(totals)
    }

    /// Last persisted aggregate for `week_start`, without recomputing.
    ///
    /// # Errors
    /// Returns error if the store read fails.
    pub fn weekly_total(&self, week_start: DayIndex) -> Result<Option<CostHandles>> {
        Ok(self
            .store
            .get_weekly(week_start)
            .map_err(storage)?
            .filter(|aggregate| aggregate.initialized)
            .map(|aggregate| aggregate.totals()))
    }

    /// Whether any recording exists for `day`.
    ///
    /// # Errors
    /// Returns error if the store read fails.
    pub fn has_date_initialized(&self, day: DayIndex) -> Result<bool> {
        self.store.is_initialized(day).map_err(storage)
    }

    /// Most recent notifications, newest first.
    ///
    /// # Errors
    /// Returns error if the store read fails.
    pub fn events(&self, limit: usize) -> Result<Vec<LedgerEvent>> {
        self.store.recent_events(limit).map_err(storage)
    }

    /// Ask the provider to disclose a handle of this ledger.
    ///
    /// # Errors
    /// Returns `LedgerError::UnauthorizedDisclosure` if the requester holds no
    /// grant, or `LedgerError::Crypto` if the request is not properly signed
    /// for this ledger.
    pub fn disclose(&self, request: &DisclosureRequest) -> Result<u32> {
        if request.ledger != self.metadata.ledger_id {
            return Err(LedgerError::UnauthorizedDisclosure {
                handle: request.handle,
                principal: request.requester,
            });
        }
        Ok(self.arithmetic.decrypt(request)?)
    }

    fn entry_or_zero(&self, day: DayIndex) -> Result<DailyEntry> {
        Ok(self
            .store
            .get_daily(day)
            .map_err(storage)?
            .filter(|entry| entry.initialized)
            .unwrap_or_else(|| DailyEntry::zeroed(self.arithmetic.encrypted_zero())))
    }

    fn current_costs(&self, day: DayIndex) -> Result<CostHandles> {
        Ok(self.entry_or_zero(day)?.costs())
    }
}

fn storage<E: Into<StorageError>>(err: E) -> LedgerError {
    LedgerError::Storage(err.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::elgamal::{ElGamalProvider, InputBuilder, InputProof};
    use crate::adapters::sqlite::SqliteLedgerStore;
    use ed25519_dalek::SigningKey;
    use proptest::prelude::*;
    use zeroize::Zeroizing;

    type TestLedger = ExpenseLedger<ElGamalProvider, SqliteLedgerStore>;

    struct Harness {
        ledger: TestLedger,
        provider: Arc<ElGamalProvider>,
        store: Arc<SqliteLedgerStore>,
        manager: SigningKey,
    }

    fn principal(key: &SigningKey) -> Principal {
        Principal::from_verifying_key(&key.verifying_key())
    }

    impl Harness {
        fn new() -> Self {
            let provider = Arc::new(ElGamalProvider::generate());
            let store = Arc::new(SqliteLedgerStore::in_memory().expect("Should create db"));
            let manager = SigningKey::from_bytes(&[1; 32]);
            let ledger = ExpenseLedger::create(Arc::clone(&provider), Arc::clone(&store), principal(&manager))
                .expect("Should create ledger");
            Self {
                ledger,
                provider,
                store,
                manager,
            }
        }

        /// The same ledger and store, served by another provider.
        fn reopen_with(&self, provider: &Arc<ElGamalProvider>) -> TestLedger {
            ExpenseLedger::open(Arc::clone(provider), Arc::clone(&self.store)).expect("Should open")
        }

        /// Provider restored from a snapshot of the current state.
        fn snapshot(&self) -> ElGamalProvider {
            let sealed = self.provider.seal("snapshot-password").expect("Should seal");
            ElGamalProvider::unseal(&sealed, "snapshot-password").expect("Should unseal")
        }

        fn encrypt(&self, submitter: &SigningKey, costs: (u32, u32, u32)) -> (Vec<Handle>, InputProof) {
            let input = InputBuilder::new(self.ledger.ledger_id(), self.provider.encryption_key())
                .add32(costs.0)
                .add32(costs.1)
                .add32(costs.2)
                .encrypt(submitter)
                .expect("Should encrypt");
            (input.handles, input.proof)
        }

        fn record(&self, submitter: &SigningKey, day: DayIndex, costs: (u32, u32, u32)) {
            let (handles, proof) = self.encrypt(submitter, costs);
            self.ledger
                .record_daily_expense(day, &handles[0], &handles[1], &handles[2], &proof, &principal(submitter))
                .expect("Should record");
        }

        fn reveal(&self, key: &SigningKey, handle: Handle) -> Result<u32> {
            let request = DisclosureRequest::sign(self.ledger.ledger_id(), handle, key);
            self.ledger.disclose(&request)
        }

        fn reveal_all(&self, key: &SigningKey, costs: CostHandles) -> (u32, u32, u32) {
            (
                self.reveal(key, costs.material).expect("material"),
                self.reveal(key, costs.labor).expect("labor"),
                self.reveal(key, costs.rental).expect("rental"),
            )
        }

        fn daily(&self, day: DayIndex) -> CostHandles {
            let expense = self.ledger.get_daily_expense(day).expect("Should read");
            CostHandles {
                material: expense.material,
                labor: expense.labor,
                rental: expense.rental,
            }
        }
    }

    const DAY: DayIndex = 20_000;

    #[test]
    fn test_same_day_recordings_accumulate() {
        let h = Harness::new();
        let site = SigningKey::from_bytes(&[2; 32]);

        h.record(&site, DAY, (1000, 2000, 500));
        h.record(&site, DAY, (500, 1000, 250));

        assert_eq!(h.reveal_all(&h.manager, h.daily(DAY)), (1500, 3000, 750));
        assert!(h.ledger.has_date_initialized(DAY).expect("Should check"));
        assert!(!h.ledger.has_date_initialized(DAY + 1).expect("Should check"));
    }

    #[test]
    fn test_weekly_total_over_partial_week() {
        let h = Harness::new();
        let site = SigningKey::from_bytes(&[2; 32]);

        h.record(&site, DAY, (1000, 2000, 500));
        h.record(&site, DAY + 1, (2000, 4000, 1000));
        h.record(&site, DAY + 2, (3000, 6000, 1500));

        let totals = h.ledger.calculate_weekly_total(DAY).expect("Should calculate");
        assert_eq!(h.reveal_all(&h.manager, totals), (6000, 12000, 3000));
        assert_eq!(h.ledger.weekly_total(DAY).expect("Should read"), Some(totals));
    }

    #[test]
    fn test_weekly_window_excludes_eighth_day() {
        let h = Harness::new();
        let site = SigningKey::from_bytes(&[2; 32]);

        h.record(&site, DAY + 6, (10, 20, 30));
        h.record(&site, DAY + 7, (1, 1, 1));
        h.record(&site, DAY - 1, (1, 1, 1));

        let totals = h.ledger.calculate_weekly_total(DAY).expect("Should calculate");
        assert_eq!(h.reveal_all(&h.manager, totals), (10, 20, 30));
    }

    #[test]
    fn test_empty_week_totals_zero() {
        let h = Harness::new();
        let totals = h.ledger.calculate_weekly_total(DAY).expect("Should calculate");
        assert_eq!(h.reveal_all(&h.manager, totals), (0, 0, 0));
    }

    #[test]
    fn test_missing_day_reads_as_encrypted_zero() {
        let h = Harness::new();
        let expense = h.ledger.get_daily_expense(DAY).expect("Should read");

        assert!(!expense.exists);
        let zero = h.provider.encrypted_zero();
        assert_eq!(h.daily(DAY), CostHandles::splat(zero));

        let stranger = SigningKey::from_bytes(&[9; 32]);
        assert_eq!(h.reveal_all(&stranger, h.daily(DAY)), (0, 0, 0));
    }

    #[test]
    fn test_exists_flag_is_monotonic() {
        let h = Harness::new();
        let site = SigningKey::from_bytes(&[2; 32]);

        assert!(!h.ledger.has_date_initialized(DAY).expect("Should check"));
        h.record(&site, DAY, (1, 2, 3));
        assert!(h.ledger.has_date_initialized(DAY).expect("Should check"));
        h.record(&site, DAY, (4, 5, 6));
        assert!(h.ledger.has_date_initialized(DAY).expect("Should check"));
        assert!(h.ledger.get_daily_expense(DAY).expect("Should read").exists);
    }

    #[test]
    fn test_grants_follow_recordings() {
        let h = Harness::new();
        let first = SigningKey::from_bytes(&[2; 32]);
        let second = SigningKey::from_bytes(&[3; 32]);
        let outsider = SigningKey::from_bytes(&[4; 32]);

        h.record(&first, DAY, (100, 200, 300));
        let after_first = h.daily(DAY);
        h.record(&second, DAY, (1, 2, 3));
        let after_second = h.daily(DAY);

        for handle in after_first.to_array() {
            assert!(h.provider.is_allowed(&handle, &principal(&h.manager)));
            assert!(h.provider.is_allowed(&handle, &principal(&first)));
        }
        for handle in after_second.to_array() {
            assert!(h.provider.is_allowed(&handle, &principal(&h.manager)));
            assert!(h.provider.is_allowed(&handle, &principal(&second)));
            assert!(!h.provider.is_allowed(&handle, &principal(&first)));
            assert!(!h.provider.is_allowed(&handle, &principal(&outsider)));
        }

        assert_eq!(h.reveal_all(&second, after_second), (101, 202, 303));
        assert!(matches!(
            h.reveal(&outsider, after_second.material),
            Err(LedgerError::UnauthorizedDisclosure { .. })
        ));
    }

    #[test]
    fn test_weekly_totals_granted_to_manager_only() {
        let h = Harness::new();
        let site = SigningKey::from_bytes(&[2; 32]);
        h.record(&site, DAY, (5, 5, 5));

        let totals = h.ledger.calculate_weekly_total(DAY).expect("Should calculate");
        for handle in totals.to_array() {
            assert!(h.provider.is_allowed(&handle, &principal(&h.manager)));
            assert!(!h.provider.is_allowed(&handle, &principal(&site)));
        }
    }

    #[test]
    fn test_invalid_proof_leaves_no_trace() {
        let h = Harness::new();
        let site = SigningKey::from_bytes(&[2; 32]);
        let mallory = SigningKey::from_bytes(&[5; 32]);

        h.record(&site, DAY, (1000, 2000, 500));
        let before = h.ledger.get_daily_expense(DAY).expect("Should read");
        let events_before = h.ledger.events(100).expect("Should list").len();

        let (handles, proof) = h.encrypt(&mallory, (9, 9, 9));
        let err = h
            .ledger
            .record_daily_expense(DAY, &handles[0], &handles[1], &handles[2], &proof, &principal(&site))
            .expect_err("Should reject");
        assert!(matches!(err, LedgerError::ProofVerification(_)));

        assert_eq!(h.ledger.get_daily_expense(DAY).expect("Should read"), before);
        assert_eq!(h.ledger.events(100).expect("Should list").len(), events_before);

        let (handles, proof) = h.encrypt(&mallory, (9, 9, 9));
        let err = h
            .ledger
            .record_daily_expense(DAY + 1, &handles[0], &handles[1], &handles[2], &proof, &principal(&site))
            .expect_err("Should reject");
        assert!(matches!(err, LedgerError::ProofVerification(_)));
        assert!(!h.ledger.has_date_initialized(DAY + 1).expect("Should check"));
    }

    #[test]
    fn test_inputs_checked_before_any_import() {
        let h = Harness::new();
        let site = SigningKey::from_bytes(&[2; 32]);
        let (handles, proof) = h.encrypt(&site, (1, 2, 3));
        let before = h.provider.ciphertext_count();

        let bogus = Handle::from_bytes([0xee; 32]);
        let err = h
            .ledger
            .record_daily_expense(DAY, &handles[0], &bogus, &handles[2], &proof, &principal(&site))
            .expect_err("Should reject");
        assert!(matches!(err, LedgerError::ProofVerification(_)));
        assert_eq!(h.provider.ciphertext_count(), before);
        assert!(!h.ledger.has_date_initialized(DAY).expect("Should check"));
    }

    #[test]
    fn test_stale_provider_recording_changes_nothing() {
        let h = Harness::new();
        let site = SigningKey::from_bytes(&[2; 32]);
        let stale = Arc::new(h.snapshot());
        h.record(&site, DAY, (1000, 2000, 500));

        let reopened = h.reopen_with(&stale);
        let daily_before = reopened.get_daily_expense(DAY).expect("Should read");
        let events_before = reopened.events(100).expect("Should list");

        let input = InputBuilder::new(reopened.ledger_id(), stale.encryption_key())
            .add32(1)
            .add32(1)
            .add32(1)
            .encrypt(&site)
            .expect("Should encrypt");
        let err = reopened
            .record_daily_expense(
                DAY,
                &input.handles[0],
                &input.handles[1],
                &input.handles[2],
                &input.proof,
                &principal(&site),
            )
            .expect_err("Should reject");
        assert!(matches!(err, LedgerError::ArithmeticRejection(_)));

        assert!(reopened.has_date_initialized(DAY).expect("Should check"));
        assert_eq!(reopened.get_daily_expense(DAY).expect("Should read"), daily_before);
        assert_eq!(reopened.events(100).expect("Should list"), events_before);
        assert!(reopened.weekly_total(DAY).expect("Should read").is_none());
        assert_eq!(h.reveal_all(&h.manager, h.daily(DAY)), (1000, 2000, 500));
    }

    #[test]
    fn test_stale_provider_weekly_total_changes_nothing() {
        let h = Harness::new();
        let site = SigningKey::from_bytes(&[2; 32]);
        h.record(&site, DAY, (1, 2, 3));
        let first = h.ledger.calculate_weekly_total(DAY).expect("Should calculate");

        let stale = Arc::new(h.snapshot());
        h.record(&site, DAY + 1, (10, 20, 30));

        let reopened = h.reopen_with(&stale);
        let daily_before = reopened.get_daily_expense(DAY + 1).expect("Should read");
        let events_before = reopened.events(100).expect("Should list");

        let err = reopened
            .calculate_weekly_total(DAY)
            .expect_err("Should reject");
        assert!(matches!(err, LedgerError::ArithmeticRejection(_)));

        assert_eq!(reopened.weekly_total(DAY).expect("Should read"), Some(first));
        assert_eq!(reopened.get_daily_expense(DAY + 1).expect("Should read"), daily_before);
        assert_eq!(reopened.events(100).expect("Should list"), events_before);
    }

    #[test]
    fn test_failed_checkpoint_commits_nothing() {
        let h = Harness::new();
        let site = SigningKey::from_bytes(&[2; 32]);
        let dir = tempfile::tempdir().expect("Should create temp dir");
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"file").expect("Should write");

        let unwritable = Arc::new(
            h.snapshot()
                .persist_to(blocker.join("provider.sealed"), Zeroizing::new("pw".into())),
        );
        let reopened = h.reopen_with(&unwritable);
        let input = InputBuilder::new(reopened.ledger_id(), unwritable.encryption_key())
            .add32(5)
            .add32(6)
            .add32(7)
            .encrypt(&site)
            .expect("Should encrypt");
        let err = reopened
            .record_daily_expense(
                DAY,
                &input.handles[0],
                &input.handles[1],
                &input.handles[2],
                &input.proof,
                &principal(&site),
            )
            .expect_err("Should fail");
        assert!(matches!(err, LedgerError::Io(_)));
        assert!(!reopened.has_date_initialized(DAY).expect("Should check"));
        assert!(reopened.events(100).expect("Should list").is_empty());

        assert!(matches!(
            reopened.calculate_weekly_total(DAY),
            Err(LedgerError::Io(_))
        ));
        assert!(reopened.weekly_total(DAY).expect("Should read").is_none());
    }

    #[test]
    fn test_committed_handles_are_in_checkpointed_state() {
        let h = Harness::new();
        let site = SigningKey::from_bytes(&[2; 32]);
        let dir = tempfile::tempdir().expect("Should create temp dir");
        let path = dir.path().join("provider.sealed");

        let durable = Arc::new(h.snapshot().persist_to(&path, Zeroizing::new("pw".into())));
        let reopened = h.reopen_with(&durable);
        let input = InputBuilder::new(reopened.ledger_id(), durable.encryption_key())
            .add32(11)
            .add32(22)
            .add32(33)
            .encrypt(&site)
            .expect("Should encrypt");
        reopened
            .record_daily_expense(
                DAY,
                &input.handles[0],
                &input.handles[1],
                &input.handles[2],
                &input.proof,
                &principal(&site),
            )
            .expect("Should record");
        let totals = reopened.calculate_weekly_total(DAY).expect("Should calculate");

        let restored = Arc::new(
            ElGamalProvider::load(&path, Zeroizing::new("pw".into())).expect("Should load"),
        );
        let after_restart = h.reopen_with(&restored);
        let daily = after_restart.get_daily_expense(DAY).expect("Should read");
        for (handle, expected) in [(daily.material, 11), (daily.labor, 22), (daily.rental, 33)] {
            let request = DisclosureRequest::sign(after_restart.ledger_id(), handle, &site);
            assert_eq!(after_restart.disclose(&request).expect("Should disclose"), expected);
        }
        let request = DisclosureRequest::sign(after_restart.ledger_id(), totals.rental, &h.manager);
        assert_eq!(after_restart.disclose(&request).expect("Should disclose"), 33);
    }

    #[test]
    fn test_totals_wrap_modulo_2_32_past_recovery_range() {
        let h = Harness::new();
        let site = SigningKey::from_bytes(&[2; 32]);
        for day in DAY..DAY + 7 {
            for _ in 0..3 {
                h.record(&site, day, (4_000_000_000, 1, 2));
            }
        }

        // 3 * 4e9 and 21 * 4e9, reduced modulo 2^32.
        assert_eq!(h.reveal_all(&h.manager, h.daily(DAY)), (3_410_065_408, 3, 6));
        let totals = h.ledger.calculate_weekly_total(DAY).expect("Should calculate");
        assert_eq!(h.reveal_all(&h.manager, totals), (2_395_621_376, 21, 42));
    }

    #[test]
    fn test_input_bound_to_other_ledger_rejected() {
        let h = Harness::new();
        let other_store = Arc::new(SqliteLedgerStore::in_memory().expect("Should create db"));
        let other = ExpenseLedger::create(Arc::clone(&h.provider), other_store, principal(&h.manager))
            .expect("Should create ledger");
        let site = SigningKey::from_bytes(&[2; 32]);

        let input = InputBuilder::new(other.ledger_id(), h.provider.encryption_key())
            .add32(1)
            .add32(2)
            .add32(3)
            .encrypt(&site)
            .expect("Should encrypt");
        let err = h
            .ledger
            .record_daily_expense(
                DAY,
                &input.handles[0],
                &input.handles[1],
                &input.handles[2],
                &input.proof,
                &principal(&site),
            )
            .expect_err("Should reject");
        assert!(matches!(err, LedgerError::ProofVerification(_)));
        assert!(!h.ledger.has_date_initialized(DAY).expect("Should check"));
    }

    #[test]
    fn test_recomputation_reproduces_handles_and_overwrites() {
        let h = Harness::new();
        let site = SigningKey::from_bytes(&[2; 32]);
        h.record(&site, DAY + 3, (7, 8, 9));

        let first = h.ledger.calculate_weekly_total(DAY).expect("Should calculate");
        let second = h.ledger.calculate_weekly_total(DAY).expect("Should calculate");
        assert_eq!(first, second);

        h.record(&site, DAY + 4, (1, 1, 1));
        let third = h.ledger.calculate_weekly_total(DAY).expect("Should calculate");
        assert_ne!(third, first);
        assert_eq!(h.ledger.weekly_total(DAY).expect("Should read"), Some(third));
        assert_eq!(h.reveal_all(&h.manager, third), (8, 9, 10));
    }

    #[test]
    fn test_window_past_last_day_rejected() {
        let h = Harness::new();
        assert!(matches!(
            h.ledger.calculate_weekly_total(DayIndex::MAX - 3),
            Err(LedgerError::InvalidWindow(_))
        ));
        assert!(h.ledger.weekly_total(DayIndex::MAX - 3).expect("Should read").is_none());
        assert!(h.ledger.calculate_weekly_total(DayIndex::MAX - 6).is_ok());
    }

    #[test]
    fn test_events_emitted_on_success() {
        let h = Harness::new();
        let site = SigningKey::from_bytes(&[2; 32]);
        h.record(&site, DAY, (1, 1, 1));
        h.ledger.calculate_weekly_total(DAY).expect("Should calculate");

        let events = h.ledger.events(10).expect("Should list");
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], LedgerEvent::WeeklyTotalCalculated { week_start: DAY, .. }));
        assert!(matches!(
            events[1],
            LedgerEvent::ExpenseRecorded { day: DAY, submitter, .. } if submitter == principal(&site)
        ));
    }

    #[test]
    fn test_open_and_create_guard_metadata() {
        let provider = Arc::new(ElGamalProvider::generate());
        let store = Arc::new(SqliteLedgerStore::in_memory().expect("Should create db"));
        let manager = principal(&SigningKey::from_bytes(&[1; 32]));

        assert!(matches!(
            ExpenseLedger::open(Arc::clone(&provider), Arc::clone(&store)),
            Err(LedgerError::NotInitialized)
        ));

        let created = ExpenseLedger::create(Arc::clone(&provider), Arc::clone(&store), manager)
            .expect("Should create");
        let opened = ExpenseLedger::open(Arc::clone(&provider), Arc::clone(&store)).expect("Should open");
        assert_eq!(opened.ledger_id(), created.ledger_id());
        assert_eq!(opened.project_manager(), manager);

        let usurper = principal(&SigningKey::from_bytes(&[6; 32]));
        assert!(matches!(
            ExpenseLedger::create(provider, store, usurper),
            Err(LedgerError::AlreadyInitialized)
        ));
    }

    #[test]
    fn test_disclosure_for_other_ledger_refused() {
        let h = Harness::new();
        let site = SigningKey::from_bytes(&[2; 32]);
        h.record(&site, DAY, (1, 1, 1));

        let request = DisclosureRequest::sign(LedgerId::from_bytes([0xcc; 32]), h.daily(DAY).material, &h.manager);
        assert!(matches!(
            h.ledger.disclose(&request),
            Err(LedgerError::UnauthorizedDisclosure { .. })
        ));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(12))]

        #[test]
        fn prop_accumulation_matches_plaintext_sum(
            recordings in prop::collection::vec((0u32..50_000, 0u32..50_000, 0u32..50_000), 1..5)
        ) {
            let h = Harness::new();
            let site = SigningKey::from_bytes(&[2; 32]);

            let mut expected = (0u32, 0u32, 0u32);
            for costs in &recordings {
                h.record(&site, DAY, *costs);
                expected.0 += costs.0;
                expected.1 += costs.1;
                expected.2 += costs.2;
            }

            prop_assert_eq!(h.reveal_all(&site, h.daily(DAY)), expected);
        }
    }
}
