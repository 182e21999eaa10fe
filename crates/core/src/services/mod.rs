//! Multi-step operations that span several tables.
//!
//! Each mutating operation runs inside a single [`crate::Store::transaction`], so a failure at
//! any step leaves the dataset exactly as it was.

pub mod booking;
pub mod clinics;
pub mod reminders;
pub mod scheduling;
pub mod subscriptions;

use crate::crud::Scope;
use crate::store::{Record, Table};
use crate::{ClinicError, ClinicResult};
use clinic_uuid::RecordId;

/// Returns a live record the caller may see, or `NotFound`.
pub(crate) fn visible_record<T: Record>(
    table: &Table<T>,
    id: RecordId,
    scope_of: impl Fn(&T) -> Scope,
    access: &impl Fn(&Scope) -> bool,
) -> ClinicResult<T> {
    table
        .get(id)
        .filter(|r| access(&scope_of(r)))
        .cloned()
        .ok_or_else(|| ClinicError::not_found(T::ENTITY, id))
}
