//! Generic create/read/update/delete over plain entities.
//!
//! Most records need nothing beyond validated CRUD. An [`Entity`] describes how to build a
//! record from its create input, how to apply a partial update, and which tenant it belongs to;
//! [`CrudService`] runs those steps inside store transactions.
//!
//! Tenancy is enforced through an `access` predicate over [`Scope`]. A record the caller cannot
//! see behaves as missing (`NotFound`); writing a record into a scope the caller does not own is
//! `Forbidden`.

use crate::store::{Dataset, Record, Table};
use crate::{ClinicError, ClinicResult, Store};
use chrono::{DateTime, Utc};
use clinic_uuid::RecordId;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;
use std::sync::Arc;

/// The tenant a record belongs to.
///
/// `None` fields are unconstrained: a global record (plans, specializations) has an empty scope.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Scope {
    pub clinic_id: Option<RecordId>,
    pub branch_id: Option<RecordId>,
    pub doctor_id: Option<RecordId>,
}

impl Scope {
    pub fn global() -> Self {
        Self::default()
    }

    pub fn clinic(clinic_id: RecordId) -> Self {
        Self {
            clinic_id: Some(clinic_id),
            ..Self::default()
        }
    }

    pub fn branch(clinic_id: RecordId, branch_id: RecordId) -> Self {
        Self {
            clinic_id: Some(clinic_id),
            branch_id: Some(branch_id),
            doctor_id: None,
        }
    }

    pub fn with_doctor(mut self, doctor_id: Option<RecordId>) -> Self {
        self.doctor_id = doctor_id;
        self
    }
}

/// A record managed through generic CRUD.
pub trait Entity: Record + PartialEq + Serialize + Send + Sync + 'static {
    type Create: DeserializeOwned + Send + 'static;
    type Patch: DeserializeOwned + Send + 'static;

    fn table(ds: &Dataset) -> &Table<Self>;
    fn table_mut(ds: &mut Dataset) -> &mut Table<Self>;

    /// Validates `input` (including foreign keys) and builds a new record.
    fn build(ds: &Dataset, input: Self::Create, now: DateTime<Utc>) -> ClinicResult<Self>;

    /// Applies a partial update. `None` fields leave the record unchanged.
    fn apply(&mut self, ds: &Dataset, patch: Self::Patch) -> ClinicResult<()>;

    fn scope(&self) -> Scope;
}

/// Transactional CRUD for one entity type.
pub struct CrudService<E> {
    store: Arc<Store>,
    _entity: PhantomData<fn() -> E>,
}

impl<E> Clone for CrudService<E> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            _entity: PhantomData,
        }
    }
}

impl<E: Entity> CrudService<E> {
    pub fn new(store: Arc<Store>) -> Self {
        Self {
            store,
            _entity: PhantomData,
        }
    }

    /// Builds a record from `input` and stores it.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` when the input or its references are invalid, and `Forbidden` when
    /// the new record would land outside the caller's scope.
    pub fn create(
        &self,
        input: E::Create,
        now: DateTime<Utc>,
        access: impl Fn(&Scope) -> bool,
    ) -> ClinicResult<E> {
        self.store.transaction(|ds| {
            let record = E::build(ds, input, now)?;
            if !access(&record.scope()) {
                return Err(ClinicError::Forbidden);
            }
            tracing::info!("created {} {}", E::ENTITY, record.id());
            Ok(E::table_mut(ds).insert(record).clone())
        })
    }

    /// A live record the caller may see, or `NotFound`.
    pub fn get(&self, id: RecordId, access: impl Fn(&Scope) -> bool) -> ClinicResult<E> {
        self.store.read(|ds| {
            E::table(ds)
                .get(id)
                .filter(|r| access(&r.scope()))
                .cloned()
                .ok_or_else(|| ClinicError::not_found(E::ENTITY, id))
        })?
    }

    /// Every live record the caller may see.
    pub fn list(&self, access: impl Fn(&Scope) -> bool) -> ClinicResult<Vec<E>> {
        self.store.read(|ds| {
            E::table(ds)
                .live()
                .filter(|r| access(&r.scope()))
                .cloned()
                .collect()
        })
    }

    /// Applies `patch`; `updated_at` only moves when the record actually changed.
    pub fn patch(
        &self,
        id: RecordId,
        patch: E::Patch,
        now: DateTime<Utc>,
        access: impl Fn(&Scope) -> bool,
    ) -> ClinicResult<E> {
        self.store.transaction(|ds| {
            let current = visible::<E>(ds, id, &access)?;

            let mut updated = current.clone();
            updated.apply(ds, patch)?;
            if !access(&updated.scope()) {
                return Err(ClinicError::Forbidden);
            }
            if updated == current {
                return Ok(current);
            }

            updated.meta_mut().updated_at = now;
            *E::table_mut(ds).require_mut(id)? = updated.clone();
            tracing::info!("updated {} {}", E::ENTITY, id);
            Ok(updated)
        })
    }

    /// Soft-deletes a record. Deleting it again is `NotFound`.
    ///
    /// Dependent rows are left in place; slots of a removed doctor, branch or clinic stop being
    /// bookable.
    pub fn delete(
        &self,
        id: RecordId,
        now: DateTime<Utc>,
        access: impl Fn(&Scope) -> bool,
    ) -> ClinicResult<()> {
        self.store.transaction(|ds| {
            visible::<E>(ds, id, &access)?;
            E::table_mut(ds).soft_delete(id, now)?;
            tracing::info!("deleted {} {}", E::ENTITY, id);
            Ok(())
        })
    }
}

fn visible<E: Entity>(
    ds: &Dataset,
    id: RecordId,
    access: &impl Fn(&Scope) -> bool,
) -> ClinicResult<E> {
    E::table(ds)
        .get(id)
        .filter(|r| access(&r.scope()))
        .cloned()
        .ok_or_else(|| ClinicError::not_found(E::ENTITY, id))
}
