//! Clinics, their branches, and affiliated hospitals.

use super::{optional_text, patch_field, validate_coordinates};
use crate::crud::{Entity, Scope};
use crate::store::{Dataset, RecordMeta, Table};
use crate::{ClinicError, ClinicResult};
use chrono::{DateTime, Utc};
use clinic_types::{EmailAddress, NonEmptyText, PhoneNumber, PostalCode};
use clinic_uuid::RecordId;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

// ============================================================================
// CLINIC
// ============================================================================

/// A tenant: every branch, doctor, patient and booking belongs to exactly one clinic.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Clinic {
    pub id: RecordId,
    #[serde(flatten)]
    pub meta: RecordMeta,
    pub name: NonEmptyText,
    pub email: EmailAddress,
    pub phone: PhoneNumber,
    pub address: Option<String>,
    pub postal_code: Option<PostalCode>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// Set once the clinic has started its one free trial.
    #[serde(default)]
    pub free_trial_used: bool,
}

#[derive(Clone, Debug, Deserialize, ToSchema)]
pub struct ClinicCreate {
    pub name: NonEmptyText,
    pub email: EmailAddress,
    pub phone: PhoneNumber,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub postal_code: Option<PostalCode>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    /// The branch created together with the clinic.
    pub first_branch: BranchDraft,
}

#[derive(Clone, Debug, Default, Deserialize, ToSchema)]
pub struct ClinicPatch {
    pub name: Option<NonEmptyText>,
    pub email: Option<EmailAddress>,
    pub phone: Option<PhoneNumber>,
    pub address: Option<String>,
    pub postal_code: Option<PostalCode>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl Entity for Clinic {
    type Create = ClinicCreate;
    type Patch = ClinicPatch;

    fn table(ds: &Dataset) -> &Table<Self> {
        &ds.clinics
    }

    fn table_mut(ds: &mut Dataset) -> &mut Table<Self> {
        &mut ds.clinics
    }

    fn build(_ds: &Dataset, input: ClinicCreate, now: DateTime<Utc>) -> ClinicResult<Self> {
        validate_coordinates(input.latitude, input.longitude)?;
        Ok(Self {
            id: RecordId::new(),
            meta: RecordMeta::new(now),
            name: input.name,
            email: input.email,
            phone: input.phone,
            address: optional_text(input.address),
            postal_code: input.postal_code,
            latitude: input.latitude,
            longitude: input.longitude,
            free_trial_used: false,
        })
    }

    fn apply(&mut self, _ds: &Dataset, patch: ClinicPatch) -> ClinicResult<()> {
        patch_field(&mut self.name, patch.name);
        patch_field(&mut self.email, patch.email);
        patch_field(&mut self.phone, patch.phone);
        if patch.address.is_some() {
            self.address = optional_text(patch.address);
        }
        if patch.postal_code.is_some() {
            self.postal_code = patch.postal_code;
        }
        if patch.latitude.is_some() || patch.longitude.is_some() {
            let latitude = patch.latitude.or(self.latitude);
            let longitude = patch.longitude.or(self.longitude);
            validate_coordinates(latitude, longitude)?;
            self.latitude = latitude;
            self.longitude = longitude;
        }
        Ok(())
    }

    fn scope(&self) -> Scope {
        Scope::clinic(self.id)
    }
}

// ============================================================================
// BRANCH
// ============================================================================

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Branch {
    pub id: RecordId,
    #[serde(flatten)]
    pub meta: RecordMeta,
    pub clinic_id: RecordId,
    pub name: NonEmptyText,
    pub phone: Option<PhoneNumber>,
    pub address: Option<String>,
    pub postal_code: Option<PostalCode>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

/// Branch fields without an owning clinic, used when the clinic is created in the same request.
#[derive(Clone, Debug, Deserialize, ToSchema)]
pub struct BranchDraft {
    pub name: NonEmptyText,
    #[serde(default)]
    pub phone: Option<PhoneNumber>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub postal_code: Option<PostalCode>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
}

impl BranchDraft {
    pub fn into_branch(self, clinic_id: RecordId, now: DateTime<Utc>) -> ClinicResult<Branch> {
        validate_coordinates(self.latitude, self.longitude)?;
        Ok(Branch {
            id: RecordId::new(),
            meta: RecordMeta::new(now),
            clinic_id,
            name: self.name,
            phone: self.phone,
            address: optional_text(self.address),
            postal_code: self.postal_code,
            latitude: self.latitude,
            longitude: self.longitude,
        })
    }
}

#[derive(Clone, Debug, Deserialize, ToSchema)]
pub struct BranchCreate {
    pub clinic_id: RecordId,
    #[serde(flatten)]
    pub branch: BranchDraft,
}

#[derive(Clone, Debug, Default, Deserialize, ToSchema)]
pub struct BranchPatch {
    pub name: Option<NonEmptyText>,
    pub phone: Option<PhoneNumber>,
    pub address: Option<String>,
    pub postal_code: Option<PostalCode>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl Entity for Branch {
    type Create = BranchCreate;
    type Patch = BranchPatch;

    fn table(ds: &Dataset) -> &Table<Self> {
        &ds.branches
    }

    fn table_mut(ds: &mut Dataset) -> &mut Table<Self> {
        &mut ds.branches
    }

    fn build(ds: &Dataset, input: BranchCreate, now: DateTime<Utc>) -> ClinicResult<Self> {
        ds.clinics.reference(input.clinic_id)?;
        input.branch.into_branch(input.clinic_id, now)
    }

    fn apply(&mut self, _ds: &Dataset, patch: BranchPatch) -> ClinicResult<()> {
        patch_field(&mut self.name, patch.name);
        if patch.phone.is_some() {
            self.phone = patch.phone;
        }
        if patch.address.is_some() {
            self.address = optional_text(patch.address);
        }
        if patch.postal_code.is_some() {
            self.postal_code = patch.postal_code;
        }
        if patch.latitude.is_some() || patch.longitude.is_some() {
            let latitude = patch.latitude.or(self.latitude);
            let longitude = patch.longitude.or(self.longitude);
            validate_coordinates(latitude, longitude)?;
            self.latitude = latitude;
            self.longitude = longitude;
        }
        Ok(())
    }

    fn scope(&self) -> Scope {
        Scope::branch(self.clinic_id, self.id)
    }
}

// ============================================================================
// HOSPITAL
// ============================================================================

/// A hospital a clinic refers patients to.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Hospital {
    pub id: RecordId,
    #[serde(flatten)]
    pub meta: RecordMeta,
    pub clinic_id: RecordId,
    pub name: NonEmptyText,
    pub phone: Option<PhoneNumber>,
    pub address: Option<String>,
    pub postal_code: Option<PostalCode>,
    #[serde(default)]
    pub bed_count: u32,
}

#[derive(Clone, Debug, Deserialize, ToSchema)]
pub struct HospitalCreate {
    pub clinic_id: RecordId,
    pub name: NonEmptyText,
    #[serde(default)]
    pub phone: Option<PhoneNumber>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub postal_code: Option<PostalCode>,
    #[serde(default)]
    pub bed_count: u32,
}

#[derive(Clone, Debug, Default, Deserialize, ToSchema)]
pub struct HospitalPatch {
    pub name: Option<NonEmptyText>,
    pub phone: Option<PhoneNumber>,
    pub address: Option<String>,
    pub postal_code: Option<PostalCode>,
    pub bed_count: Option<u32>,
}

impl Entity for Hospital {
    type Create = HospitalCreate;
    type Patch = HospitalPatch;

    fn table(ds: &Dataset) -> &Table<Self> {
        &ds.hospitals
    }

    fn table_mut(ds: &mut Dataset) -> &mut Table<Self> {
        &mut ds.hospitals
    }

    fn build(ds: &Dataset, input: HospitalCreate, now: DateTime<Utc>) -> ClinicResult<Self> {
        ds.clinics.reference(input.clinic_id)?;
        Ok(Self {
            id: RecordId::new(),
            meta: RecordMeta::new(now),
            clinic_id: input.clinic_id,
            name: input.name,
            phone: input.phone,
            address: optional_text(input.address),
            postal_code: input.postal_code,
            bed_count: input.bed_count,
        })
    }

    fn apply(&mut self, _ds: &Dataset, patch: HospitalPatch) -> ClinicResult<()> {
        patch_field(&mut self.name, patch.name);
        patch_field(&mut self.bed_count, patch.bed_count);
        if patch.phone.is_some() {
            self.phone = patch.phone;
        }
        if patch.address.is_some() {
            self.address = optional_text(patch.address);
        }
        if patch.postal_code.is_some() {
            self.postal_code = patch.postal_code;
        }
        Ok(())
    }

    fn scope(&self) -> Scope {
        Scope::clinic(self.clinic_id)
    }
}

/// Ensures `branch_id` is a live branch of `clinic_id`.
pub(crate) fn require_branch_of(
    ds: &Dataset,
    clinic_id: RecordId,
    branch_id: RecordId,
) -> ClinicResult<&Branch> {
    let branch = ds.branches.reference(branch_id)?;
    if branch.clinic_id != clinic_id {
        return Err(ClinicError::InvalidInput(format!(
            "branch {branch_id} does not belong to clinic {clinic_id}"
        )));
    }
    Ok(branch)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clinic_input() -> ClinicCreate {
        ClinicCreate {
            name: NonEmptyText::new("Sunrise Clinic").unwrap(),
            email: EmailAddress::parse("desk@sunrise.example").unwrap(),
            phone: PhoneNumber::parse("+919876543210").unwrap(),
            address: Some("  ".into()),
            postal_code: None,
            latitude: Some(12.97),
            longitude: None,
            first_branch: BranchDraft {
                name: NonEmptyText::new("Main").unwrap(),
                phone: None,
                address: None,
                postal_code: None,
                latitude: None,
                longitude: None,
            },
        }
    }

    #[test]
    fn test_build_rejects_half_coordinates() {
        let err = Clinic::build(&Dataset::default(), clinic_input(), Utc::now())
            .expect_err("latitude without longitude should be rejected");
        assert!(matches!(err, ClinicError::InvalidInput(_)));
    }

    #[test]
    fn test_build_drops_blank_address() {
        let mut input = clinic_input();
        input.longitude = Some(77.59);
        let clinic = Clinic::build(&Dataset::default(), input, Utc::now()).unwrap();
        assert_eq!(clinic.address, None);
        assert!(!clinic.free_trial_used);
    }

    #[test]
    fn test_branch_requires_existing_clinic() {
        let input = BranchCreate {
            clinic_id: RecordId::new(),
            branch: clinic_input().first_branch,
        };
        let err = Branch::build(&Dataset::default(), input, Utc::now())
            .expect_err("dangling clinic should be rejected");
        assert!(matches!(err, ClinicError::InvalidInput(_)));
    }
}
