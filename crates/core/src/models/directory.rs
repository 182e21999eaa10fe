//! People and reference data: specializations, doctors, patients, and staff users.

use super::organisation::require_branch_of;
use super::{optional_text, patch_field};
use crate::crud::{Entity, Scope};
use crate::store::{Dataset, RecordMeta, Table};
use crate::{ClinicError, ClinicResult};
use chrono::{DateTime, NaiveDate, Utc};
use clinic_types::{EmailAddress, NonEmptyText, PhoneNumber};
use clinic_uuid::RecordId;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

// ============================================================================
// SPECIALIZATION
// ============================================================================

/// A medical specialty. Global reference data shared by every clinic.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Specialization {
    pub id: RecordId,
    #[serde(flatten)]
    pub meta: RecordMeta,
    pub name: NonEmptyText,
    pub description: Option<String>,
}

#[derive(Clone, Debug, Deserialize, ToSchema)]
pub struct SpecializationCreate {
    pub name: NonEmptyText,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, ToSchema)]
pub struct SpecializationPatch {
    pub name: Option<NonEmptyText>,
    pub description: Option<String>,
}

fn ensure_unique_specialization(
    ds: &Dataset,
    name: &NonEmptyText,
    except: Option<RecordId>,
) -> ClinicResult<()> {
    let taken = ds.specializations.live().any(|s| {
        Some(s.id) != except && s.name.as_str().eq_ignore_ascii_case(name.as_str())
    });
    if taken {
        return Err(ClinicError::InvalidInput(format!(
            "specialization '{name}' already exists"
        )));
    }
    Ok(())
}

impl Entity for Specialization {
    type Create = SpecializationCreate;
    type Patch = SpecializationPatch;

    fn table(ds: &Dataset) -> &Table<Self> {
        &ds.specializations
    }

    fn table_mut(ds: &mut Dataset) -> &mut Table<Self> {
        &mut ds.specializations
    }

    fn build(ds: &Dataset, input: SpecializationCreate, now: DateTime<Utc>) -> ClinicResult<Self> {
        ensure_unique_specialization(ds, &input.name, None)?;
        Ok(Self {
            id: RecordId::new(),
            meta: RecordMeta::new(now),
            name: input.name,
            description: optional_text(input.description),
        })
    }

    fn apply(&mut self, ds: &Dataset, patch: SpecializationPatch) -> ClinicResult<()> {
        if let Some(name) = patch.name {
            ensure_unique_specialization(ds, &name, Some(self.id))?;
            self.name = name;
        }
        if patch.description.is_some() {
            self.description = optional_text(patch.description);
        }
        Ok(())
    }

    fn scope(&self) -> Scope {
        Scope::global()
    }
}

// ============================================================================
// DOCTOR
// ============================================================================

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Doctor {
    pub id: RecordId,
    #[serde(flatten)]
    pub meta: RecordMeta,
    pub clinic_id: RecordId,
    pub branch_id: RecordId,
    pub name: NonEmptyText,
    pub email: Option<EmailAddress>,
    pub phone: Option<PhoneNumber>,
    #[serde(default)]
    pub specialization_ids: Vec<RecordId>,
    /// Fee in minor currency units.
    #[serde(default)]
    pub consultation_fee: u64,
    pub qualification: Option<String>,
}

#[derive(Clone, Debug, Deserialize, ToSchema)]
pub struct DoctorCreate {
    pub clinic_id: RecordId,
    pub branch_id: RecordId,
    pub name: NonEmptyText,
    #[serde(default)]
    pub email: Option<EmailAddress>,
    #[serde(default)]
    pub phone: Option<PhoneNumber>,
    #[serde(default)]
    pub specialization_ids: Vec<RecordId>,
    #[serde(default)]
    pub consultation_fee: u64,
    #[serde(default)]
    pub qualification: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, ToSchema)]
pub struct DoctorPatch {
    pub branch_id: Option<RecordId>,
    pub name: Option<NonEmptyText>,
    pub email: Option<EmailAddress>,
    pub phone: Option<PhoneNumber>,
    pub specialization_ids: Option<Vec<RecordId>>,
    pub consultation_fee: Option<u64>,
    pub qualification: Option<String>,
}

fn validate_specializations(ds: &Dataset, ids: &[RecordId]) -> ClinicResult<Vec<RecordId>> {
    let mut unique = Vec::with_capacity(ids.len());
    for id in ids {
        ds.specializations.reference(*id)?;
        if !unique.contains(id) {
            unique.push(*id);
        }
    }
    Ok(unique)
}

impl Entity for Doctor {
    type Create = DoctorCreate;
    type Patch = DoctorPatch;

    fn table(ds: &Dataset) -> &Table<Self> {
        &ds.doctors
    }

    fn table_mut(ds: &mut Dataset) -> &mut Table<Self> {
        &mut ds.doctors
    }

    fn build(ds: &Dataset, input: DoctorCreate, now: DateTime<Utc>) -> ClinicResult<Self> {
        ds.clinics.reference(input.clinic_id)?;
        require_branch_of(ds, input.clinic_id, input.branch_id)?;
        let specialization_ids = validate_specializations(ds, &input.specialization_ids)?;

        Ok(Self {
            id: RecordId::new(),
            meta: RecordMeta::new(now),
            clinic_id: input.clinic_id,
            branch_id: input.branch_id,
            name: input.name,
            email: input.email,
            phone: input.phone,
            specialization_ids,
            consultation_fee: input.consultation_fee,
            qualification: optional_text(input.qualification),
        })
    }

    fn apply(&mut self, ds: &Dataset, patch: DoctorPatch) -> ClinicResult<()> {
        if let Some(branch_id) = patch.branch_id {
            require_branch_of(ds, self.clinic_id, branch_id)?;
            self.branch_id = branch_id;
        }
        if let Some(ids) = patch.specialization_ids {
            self.specialization_ids = validate_specializations(ds, &ids)?;
        }
        patch_field(&mut self.name, patch.name);
        patch_field(&mut self.consultation_fee, patch.consultation_fee);
        if patch.email.is_some() {
            self.email = patch.email;
        }
        if patch.phone.is_some() {
            self.phone = patch.phone;
        }
        if patch.qualification.is_some() {
            self.qualification = optional_text(patch.qualification);
        }
        Ok(())
    }

    fn scope(&self) -> Scope {
        Scope::branch(self.clinic_id, self.branch_id).with_doctor(Some(self.id))
    }
}

// ============================================================================
// PATIENT
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Male,
    Female,
    Other,
}

/// A patient registered with a clinic. Unique per `(clinic_id, phone)`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Patient {
    pub id: RecordId,
    #[serde(flatten)]
    pub meta: RecordMeta,
    pub clinic_id: RecordId,
    pub name: NonEmptyText,
    pub phone: PhoneNumber,
    pub email: Option<EmailAddress>,
    pub gender: Option<Gender>,
    pub date_of_birth: Option<NaiveDate>,
    pub address: Option<String>,
}

/// Patient details as supplied by a caller; also used for booking-time upserts.
#[derive(Clone, Debug, Deserialize, ToSchema)]
pub struct PatientDetails {
    pub name: NonEmptyText,
    pub phone: PhoneNumber,
    #[serde(default)]
    pub email: Option<EmailAddress>,
    #[serde(default)]
    pub gender: Option<Gender>,
    #[serde(default)]
    pub date_of_birth: Option<NaiveDate>,
    #[serde(default)]
    pub address: Option<String>,
}

#[derive(Clone, Debug, Deserialize, ToSchema)]
pub struct PatientCreate {
    pub clinic_id: RecordId,
    #[serde(flatten)]
    pub details: PatientDetails,
}

#[derive(Clone, Debug, Default, Deserialize, ToSchema)]
pub struct PatientPatch {
    pub name: Option<NonEmptyText>,
    pub phone: Option<PhoneNumber>,
    pub email: Option<EmailAddress>,
    pub gender: Option<Gender>,
    pub date_of_birth: Option<NaiveDate>,
    pub address: Option<String>,
}

impl Patient {
    /// Builds a patient after checking the clinic has no live patient with the same phone.
    pub(crate) fn register(
        ds: &Dataset,
        clinic_id: RecordId,
        details: PatientDetails,
        now: DateTime<Utc>,
    ) -> ClinicResult<Self> {
        ds.clinics.reference(clinic_id)?;
        if find_patient_by_phone(ds, clinic_id, &details.phone).is_some() {
            return Err(ClinicError::InvalidInput(format!(
                "a patient with phone {} already exists in this clinic",
                details.phone
            )));
        }
        validate_birth_date(details.date_of_birth, now)?;

        Ok(Self {
            id: RecordId::new(),
            meta: RecordMeta::new(now),
            clinic_id,
            name: details.name,
            phone: details.phone,
            email: details.email,
            gender: details.gender,
            date_of_birth: details.date_of_birth,
            address: optional_text(details.address),
        })
    }
}

/// Live patient of `clinic_id` with the given phone number, if any.
pub fn find_patient_by_phone<'a>(
    ds: &'a Dataset,
    clinic_id: RecordId,
    phone: &PhoneNumber,
) -> Option<&'a Patient> {
    ds.patients
        .live()
        .find(|p| p.clinic_id == clinic_id && &p.phone == phone)
}

fn validate_birth_date(date_of_birth: Option<NaiveDate>, now: DateTime<Utc>) -> ClinicResult<()> {
    if let Some(dob) = date_of_birth {
        if dob > now.date_naive() {
            return Err(ClinicError::InvalidInput(
                "date_of_birth cannot be in the future".into(),
            ));
        }
    }
    Ok(())
}

impl Entity for Patient {
    type Create = PatientCreate;
    type Patch = PatientPatch;

    fn table(ds: &Dataset) -> &Table<Self> {
        &ds.patients
    }

    fn table_mut(ds: &mut Dataset) -> &mut Table<Self> {
        &mut ds.patients
    }

    fn build(ds: &Dataset, input: PatientCreate, now: DateTime<Utc>) -> ClinicResult<Self> {
        Self::register(ds, input.clinic_id, input.details, now)
    }

    fn apply(&mut self, ds: &Dataset, patch: PatientPatch) -> ClinicResult<()> {
        if let Some(phone) = patch.phone {
            if let Some(other) = find_patient_by_phone(ds, self.clinic_id, &phone) {
                if other.id != self.id {
                    return Err(ClinicError::InvalidInput(format!(
                        "a patient with phone {phone} already exists in this clinic"
                    )));
                }
            }
            self.phone = phone;
        }
        if patch.date_of_birth.is_some() {
            validate_birth_date(patch.date_of_birth, Utc::now())?;
            self.date_of_birth = patch.date_of_birth;
        }
        patch_field(&mut self.name, patch.name);
        if patch.email.is_some() {
            self.email = patch.email;
        }
        if patch.gender.is_some() {
            self.gender = patch.gender;
        }
        if patch.address.is_some() {
            self.address = optional_text(patch.address);
        }
        Ok(())
    }

    fn scope(&self) -> Scope {
        Scope::clinic(self.clinic_id)
    }
}

// ============================================================================
// USER
// ============================================================================

/// Access role carried by a user and by the bearer tokens minted for them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    SuperAdmin,
    Clinic,
    Branch,
    Doctor,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::SuperAdmin => "super-admin",
            Role::Clinic => "clinic",
            Role::Branch => "branch",
            Role::Doctor => "doctor",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = ClinicError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "super-admin" => Ok(Role::SuperAdmin),
            "clinic" => Ok(Role::Clinic),
            "branch" => Ok(Role::Branch),
            "doctor" => Ok(Role::Doctor),
            other => Err(ClinicError::InvalidInput(format!("unknown role '{other}'"))),
        }
    }
}

/// A staff account (admins, clinic agents, branch desks, doctors).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct User {
    pub id: RecordId,
    #[serde(flatten)]
    pub meta: RecordMeta,
    pub name: NonEmptyText,
    pub email: EmailAddress,
    pub role: Role,
    pub clinic_id: Option<RecordId>,
    pub branch_id: Option<RecordId>,
    pub doctor_id: Option<RecordId>,
}

#[derive(Clone, Debug, Deserialize, ToSchema)]
pub struct UserCreate {
    pub name: NonEmptyText,
    pub email: EmailAddress,
    pub role: Role,
    #[serde(default)]
    pub clinic_id: Option<RecordId>,
    #[serde(default)]
    pub branch_id: Option<RecordId>,
    #[serde(default)]
    pub doctor_id: Option<RecordId>,
}

#[derive(Clone, Debug, Default, Deserialize, ToSchema)]
pub struct UserPatch {
    pub name: Option<NonEmptyText>,
    pub email: Option<EmailAddress>,
}

impl User {
    /// Checks the tenancy links a role needs and that they point at live, consistent records.
    fn validate_links(&self, ds: &Dataset) -> ClinicResult<()> {
        let missing = |field: &str| {
            ClinicError::InvalidInput(format!("{field} is required for role {}", self.role))
        };

        match self.role {
            Role::SuperAdmin => {
                let bound = self.clinic_id.is_some()
                    || self.branch_id.is_some()
                    || self.doctor_id.is_some();
                if bound {
                    return Err(ClinicError::InvalidInput(
                        "super-admin users cannot be bound to a clinic".into(),
                    ));
                }
            }
            Role::Clinic => {
                let clinic_id = self.clinic_id.ok_or_else(|| missing("clinic_id"))?;
                ds.clinics.reference(clinic_id)?;
            }
            Role::Branch => {
                let clinic_id = self.clinic_id.ok_or_else(|| missing("clinic_id"))?;
                let branch_id = self.branch_id.ok_or_else(|| missing("branch_id"))?;
                require_branch_of(ds, clinic_id, branch_id)?;
            }
            Role::Doctor => {
                let clinic_id = self.clinic_id.ok_or_else(|| missing("clinic_id"))?;
                let doctor_id = self.doctor_id.ok_or_else(|| missing("doctor_id"))?;
                let doctor = ds.doctors.reference(doctor_id)?;
                if doctor.clinic_id != clinic_id {
                    return Err(ClinicError::InvalidInput(format!(
                        "doctor {doctor_id} does not belong to clinic {clinic_id}"
                    )));
                }
            }
        }
        Ok(())
    }
}

fn ensure_unique_email(
    ds: &Dataset,
    email: &EmailAddress,
    except: Option<RecordId>,
) -> ClinicResult<()> {
    if ds
        .users
        .live()
        .any(|u| Some(u.id) != except && &u.email == email)
    {
        return Err(ClinicError::InvalidInput(format!(
            "a user with email {email} already exists"
        )));
    }
    Ok(())
}

impl Entity for User {
    type Create = UserCreate;
    type Patch = UserPatch;

    fn table(ds: &Dataset) -> &Table<Self> {
        &ds.users
    }

    fn table_mut(ds: &mut Dataset) -> &mut Table<Self> {
        &mut ds.users
    }

    fn build(ds: &Dataset, input: UserCreate, now: DateTime<Utc>) -> ClinicResult<Self> {
        ensure_unique_email(ds, &input.email, None)?;
        let user = Self {
            id: RecordId::new(),
            meta: RecordMeta::new(now),
            name: input.name,
            email: input.email,
            role: input.role,
            clinic_id: input.clinic_id,
            branch_id: input.branch_id,
            doctor_id: input.doctor_id,
        };
        user.validate_links(ds)?;
        Ok(user)
    }

    fn apply(&mut self, ds: &Dataset, patch: UserPatch) -> ClinicResult<()> {
        if let Some(email) = patch.email {
            ensure_unique_email(ds, &email, Some(self.id))?;
            self.email = email;
        }
        patch_field(&mut self.name, patch.name);
        Ok(())
    }

    fn scope(&self) -> Scope {
        Scope {
            clinic_id: self.clinic_id,
            branch_id: self.branch_id,
            doctor_id: self.doctor_id,
        }
    }
}
