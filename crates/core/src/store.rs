//! Record storage and transactions.
//!
//! All clinic data lives in a single [`Dataset`] guarded by a [`Store`]. Reads share the lock;
//! writes go through [`Store::transaction`], which:
//!
//! 1. takes the exclusive write lock,
//! 2. runs the caller's closure against a working copy of the dataset,
//! 3. on success persists the copy (when a data directory is configured) and swaps it in,
//! 4. on any error discards the copy, leaving the committed dataset untouched.
//!
//! Because the write lock is held from the first read inside the closure to the final swap,
//! check-then-act sequences such as "is this slot free? then book it" cannot interleave with
//! another request's writes.
//!
//! ## Storage layout
//!
//! ```text
//! <data_dir>/
//!   store.yaml        # full dataset snapshot
//! ```
//!
//! The snapshot is written to `store.yaml.tmp` first and renamed into place so a crash mid-write
//! never leaves a truncated snapshot behind.

use crate::constants::STORE_SNAPSHOT_FILENAME;
use crate::models::{
    Branch, Clinic, ClinicSubscription, Doctor, DoctorAvailability, DoctorTimeSlot, Hospital,
    Patient, PatientBooking, Plan, Prescription, Referral, ReminderLog, ReportSummary,
    Specialization, User,
};
use crate::{ClinicError, ClinicResult};
use chrono::{DateTime, Utc};
use clinic_uuid::RecordId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use utoipa::ToSchema;

// ============================================================================
// RECORDS
// ============================================================================

/// Lifecycle timestamps shared by every record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct RecordMeta {
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub is_deleted: bool,
    #[serde(default)]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl RecordMeta {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            created_at: now,
            updated_at: now,
            is_deleted: false,
            deleted_at: None,
        }
    }
}

/// A stored record with an id and lifecycle metadata.
pub trait Record: Clone {
    /// Human-readable entity name used in `NotFound` errors.
    const ENTITY: &'static str;

    fn id(&self) -> RecordId;
    fn meta(&self) -> &RecordMeta;
    fn meta_mut(&mut self) -> &mut RecordMeta;

    fn is_live(&self) -> bool {
        !self.meta().is_deleted
    }
}

// ============================================================================
// TABLES
// ============================================================================

/// Records of one entity type, ordered by id.
///
/// Lookups only ever see live records; soft-deleted rows stay in the table (and the snapshot)
/// but behave as missing.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Table<T> {
    rows: BTreeMap<RecordId, T>,
}

impl<T> Default for Table<T> {
    fn default() -> Self {
        Self {
            rows: BTreeMap::new(),
        }
    }
}

impl<T: Record> Table<T> {
    pub fn insert(&mut self, record: T) -> &T {
        let id = record.id();
        self.rows.insert(id, record);
        &self.rows[&id]
    }

    pub fn get(&self, id: RecordId) -> Option<&T> {
        self.rows.get(&id).filter(|r| r.is_live())
    }

    pub fn get_mut(&mut self, id: RecordId) -> Option<&mut T> {
        self.rows.get_mut(&id).filter(|r| r.is_live())
    }

    /// Returns the live record or `NotFound`.
    pub fn require(&self, id: RecordId) -> ClinicResult<&T> {
        self.get(id).ok_or_else(|| ClinicError::not_found(T::ENTITY, id))
    }

    pub fn require_mut(&mut self, id: RecordId) -> ClinicResult<&mut T> {
        self.get_mut(id)
            .ok_or_else(|| ClinicError::not_found(T::ENTITY, id))
    }

    /// Resolves a foreign key from request input.
    ///
    /// Unlike [`Table::require`], a dangling reference is the caller's mistake, so it is reported
    /// as `InvalidInput` rather than `NotFound`.
    pub fn reference(&self, id: RecordId) -> ClinicResult<&T> {
        self.get(id)
            .ok_or_else(|| ClinicError::InvalidInput(format!("unknown {} {id}", T::ENTITY)))
    }

    pub fn live(&self) -> impl Iterator<Item = &T> {
        self.rows.values().filter(|r| r.is_live())
    }

    pub fn live_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.rows.values_mut().filter(|r| r.is_live())
    }

    /// Marks a live record deleted. Deleting twice is `NotFound`.
    pub fn soft_delete(&mut self, id: RecordId, now: DateTime<Utc>) -> ClinicResult<()> {
        let record = self.require_mut(id)?;
        let meta = record.meta_mut();
        meta.is_deleted = true;
        meta.deleted_at = Some(now);
        meta.updated_at = now;
        Ok(())
    }
}

// ============================================================================
// DATASET
// ============================================================================

/// Every table the service stores.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Dataset {
    pub clinics: Table<Clinic>,
    pub branches: Table<Branch>,
    pub hospitals: Table<Hospital>,
    pub specializations: Table<Specialization>,
    pub doctors: Table<Doctor>,
    pub patients: Table<Patient>,
    pub availabilities: Table<DoctorAvailability>,
    pub slots: Table<DoctorTimeSlot>,
    pub bookings: Table<PatientBooking>,
    pub plans: Table<Plan>,
    pub subscriptions: Table<ClinicSubscription>,
    pub prescriptions: Table<Prescription>,
    pub reminder_logs: Table<ReminderLog>,
    pub report_summaries: Table<ReportSummary>,
    pub referrals: Table<Referral>,
    pub users: Table<User>,
}

// ============================================================================
// STORE
// ============================================================================

/// Lock-guarded dataset with optional on-disk snapshot.
#[derive(Debug)]
pub struct Store {
    data: RwLock<Dataset>,
    snapshot_path: Option<PathBuf>,
}

impl Store {
    /// A store that lives only in memory.
    pub fn in_memory() -> Self {
        Self {
            data: RwLock::new(Dataset::default()),
            snapshot_path: None,
        }
    }

    /// Opens the store persisted under `data_dir`, creating the directory if needed.
    ///
    /// A missing snapshot starts an empty dataset.
    pub fn open(data_dir: &Path) -> ClinicResult<Self> {
        fs::create_dir_all(data_dir).map_err(ClinicError::DataDirCreation)?;
        let snapshot_path = data_dir.join(STORE_SNAPSHOT_FILENAME);

        let dataset = if snapshot_path.is_file() {
            let raw = fs::read_to_string(&snapshot_path).map_err(ClinicError::SnapshotRead)?;
            serde_yaml::from_str(&raw).map_err(ClinicError::YamlDeserialization)?
        } else {
            Dataset::default()
        };

        tracing::info!("opened clinic store at {}", snapshot_path.display());

        Ok(Self {
            data: RwLock::new(dataset),
            snapshot_path: Some(snapshot_path),
        })
    }

    /// Runs `f` against the committed dataset under a shared lock.
    pub fn read<T>(&self, f: impl FnOnce(&Dataset) -> T) -> ClinicResult<T> {
        let guard = self.data.read().map_err(|_| ClinicError::StorePoisoned)?;
        Ok(f(&guard))
    }

    /// Runs `f` atomically against a working copy of the dataset.
    ///
    /// The copy is committed only if `f` returns `Ok` and the snapshot (if any) is written.
    pub fn transaction<T>(
        &self,
        f: impl FnOnce(&mut Dataset) -> ClinicResult<T>,
    ) -> ClinicResult<T> {
        let mut guard = self.data.write().map_err(|_| ClinicError::StorePoisoned)?;
        let mut working = guard.clone();

        let out = f(&mut working)?;

        if let Some(path) = &self.snapshot_path {
            write_snapshot(path, &working)?;
        }
        *guard = working;

        Ok(out)
    }
}

fn write_snapshot(path: &Path, dataset: &Dataset) -> ClinicResult<()> {
    let yaml = serde_yaml::to_string(dataset).map_err(ClinicError::YamlSerialization)?;
    let tmp = path.with_extension("yaml.tmp");
    fs::write(&tmp, yaml).map_err(ClinicError::SnapshotWrite)?;
    fs::rename(&tmp, path).map_err(ClinicError::SnapshotWrite)?;
    Ok(())
}
