//! Clinical paperwork: prescriptions (and their reminder log), report summaries and referrals.

use super::{optional_text, patch_field};
use crate::crud::{Entity, Scope};
use crate::store::{Dataset, RecordMeta, Table};
use crate::{ClinicError, ClinicResult};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use clinic_types::NonEmptyText;
use clinic_uuid::RecordId;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Checks a patient and doctor are live members of `clinic_id`.
fn require_patient_and_doctor(
    ds: &Dataset,
    clinic_id: RecordId,
    patient_id: RecordId,
    doctor_id: Option<RecordId>,
) -> ClinicResult<()> {
    ds.clinics.reference(clinic_id)?;
    if ds.patients.reference(patient_id)?.clinic_id != clinic_id {
        return Err(ClinicError::InvalidInput(format!(
            "patient {patient_id} does not belong to clinic {clinic_id}"
        )));
    }
    if let Some(doctor_id) = doctor_id {
        if ds.doctors.reference(doctor_id)?.clinic_id != clinic_id {
            return Err(ClinicError::InvalidInput(format!(
                "doctor {doctor_id} does not belong to clinic {clinic_id}"
            )));
        }
    }
    Ok(())
}

fn require_booking_of(
    ds: &Dataset,
    booking_id: Option<RecordId>,
    patient_id: RecordId,
) -> ClinicResult<()> {
    if let Some(booking_id) = booking_id {
        if ds.bookings.reference(booking_id)?.patient_id != patient_id {
            return Err(ClinicError::InvalidInput(format!(
                "booking {booking_id} is not for patient {patient_id}"
            )));
        }
    }
    Ok(())
}

// ============================================================================
// PRESCRIPTION
// ============================================================================

/// One medication line with its daily intake schedule.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Medication {
    pub name: NonEmptyText,
    pub dosage: NonEmptyText,
    /// Daily intake times.
    pub times: Vec<NaiveTime>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

impl Medication {
    pub fn is_active_on(&self, date: NaiveDate) -> bool {
        self.start_date <= date && date <= self.end_date
    }

    fn validate(&self) -> ClinicResult<()> {
        if self.times.is_empty() {
            return Err(ClinicError::InvalidInput(format!(
                "medication '{}' needs at least one intake time",
                self.name
            )));
        }
        if self.start_date > self.end_date {
            return Err(ClinicError::InvalidInput(format!(
                "medication '{}' ends before it starts",
                self.name
            )));
        }
        Ok(())
    }
}

fn validate_medications(medications: &mut [Medication]) -> ClinicResult<()> {
    for medication in medications.iter_mut() {
        medication.validate()?;
        medication.times.sort();
        medication.times.dedup();
    }
    Ok(())
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Prescription {
    pub id: RecordId,
    #[serde(flatten)]
    pub meta: RecordMeta,
    pub clinic_id: RecordId,
    pub patient_id: RecordId,
    pub doctor_id: RecordId,
    pub booking_id: Option<RecordId>,
    pub diagnosis: Option<String>,
    pub medications: Vec<Medication>,
    pub notes: Option<String>,
}

#[derive(Clone, Debug, Deserialize, ToSchema)]
pub struct PrescriptionCreate {
    pub clinic_id: RecordId,
    pub patient_id: RecordId,
    pub doctor_id: RecordId,
    #[serde(default)]
    pub booking_id: Option<RecordId>,
    #[serde(default)]
    pub diagnosis: Option<String>,
    #[serde(default)]
    pub medications: Vec<Medication>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, ToSchema)]
pub struct PrescriptionPatch {
    pub diagnosis: Option<String>,
    pub medications: Option<Vec<Medication>>,
    pub notes: Option<String>,
}

impl Entity for Prescription {
    type Create = PrescriptionCreate;
    type Patch = PrescriptionPatch;

    fn table(ds: &Dataset) -> &Table<Self> {
        &ds.prescriptions
    }

    fn table_mut(ds: &mut Dataset) -> &mut Table<Self> {
        &mut ds.prescriptions
    }

    fn build(
        ds: &Dataset,
        mut input: PrescriptionCreate,
        now: DateTime<Utc>,
    ) -> ClinicResult<Self> {
        require_patient_and_doctor(ds, input.clinic_id, input.patient_id, Some(input.doctor_id))?;
        require_booking_of(ds, input.booking_id, input.patient_id)?;
        validate_medications(&mut input.medications)?;

        Ok(Self {
            id: RecordId::new(),
            meta: RecordMeta::new(now),
            clinic_id: input.clinic_id,
            patient_id: input.patient_id,
            doctor_id: input.doctor_id,
            booking_id: input.booking_id,
            diagnosis: optional_text(input.diagnosis),
            medications: input.medications,
            notes: optional_text(input.notes),
        })
    }

    fn apply(&mut self, _ds: &Dataset, patch: PrescriptionPatch) -> ClinicResult<()> {
        if let Some(mut medications) = patch.medications {
            validate_medications(&mut medications)?;
            self.medications = medications;
        }
        if patch.diagnosis.is_some() {
            self.diagnosis = optional_text(patch.diagnosis);
        }
        if patch.notes.is_some() {
            self.notes = optional_text(patch.notes);
        }
        Ok(())
    }

    fn scope(&self) -> Scope {
        Scope::clinic(self.clinic_id).with_doctor(Some(self.doctor_id))
    }
}

// ============================================================================
// REMINDER LOG
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ReminderStatus {
    /// Claimed by a poll that has not finished delivering it.
    Sending,
    Sent,
    Failed,
}

/// One delivery attempt for one scheduled dose. A dose is attempted at most once.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ReminderLog {
    pub id: RecordId,
    #[serde(flatten)]
    pub meta: RecordMeta,
    pub prescription_id: RecordId,
    pub patient_id: RecordId,
    pub clinic_id: RecordId,
    pub medication_index: u32,
    pub medication_name: String,
    pub scheduled_for: NaiveDateTime,
    pub status: ReminderStatus,
    pub error: Option<String>,
    pub attempted_at: DateTime<Utc>,
}

// ============================================================================
// REPORT SUMMARY
// ============================================================================

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ReportSummary {
    pub id: RecordId,
    #[serde(flatten)]
    pub meta: RecordMeta,
    pub clinic_id: RecordId,
    pub patient_id: RecordId,
    pub doctor_id: Option<RecordId>,
    pub booking_id: Option<RecordId>,
    pub title: NonEmptyText,
    pub summary: NonEmptyText,
    pub report_date: NaiveDate,
}

#[derive(Clone, Debug, Deserialize, ToSchema)]
pub struct ReportSummaryCreate {
    pub clinic_id: RecordId,
    pub patient_id: RecordId,
    #[serde(default)]
    pub doctor_id: Option<RecordId>,
    #[serde(default)]
    pub booking_id: Option<RecordId>,
    pub title: NonEmptyText,
    pub summary: NonEmptyText,
    pub report_date: NaiveDate,
}

#[derive(Clone, Debug, Default, Deserialize, ToSchema)]
pub struct ReportSummaryPatch {
    pub title: Option<NonEmptyText>,
    pub summary: Option<NonEmptyText>,
    pub report_date: Option<NaiveDate>,
}

impl Entity for ReportSummary {
    type Create = ReportSummaryCreate;
    type Patch = ReportSummaryPatch;

    fn table(ds: &Dataset) -> &Table<Self> {
        &ds.report_summaries
    }

    fn table_mut(ds: &mut Dataset) -> &mut Table<Self> {
        &mut ds.report_summaries
    }

    fn build(ds: &Dataset, input: ReportSummaryCreate, now: DateTime<Utc>) -> ClinicResult<Self> {
        require_patient_and_doctor(ds, input.clinic_id, input.patient_id, input.doctor_id)?;
        require_booking_of(ds, input.booking_id, input.patient_id)?;

        Ok(Self {
            id: RecordId::new(),
            meta: RecordMeta::new(now),
            clinic_id: input.clinic_id,
            patient_id: input.patient_id,
            doctor_id: input.doctor_id,
            booking_id: input.booking_id,
            title: input.title,
            summary: input.summary,
            report_date: input.report_date,
        })
    }

    fn apply(&mut self, _ds: &Dataset, patch: ReportSummaryPatch) -> ClinicResult<()> {
        patch_field(&mut self.title, patch.title);
        patch_field(&mut self.summary, patch.summary);
        patch_field(&mut self.report_date, patch.report_date);
        Ok(())
    }

    fn scope(&self) -> Scope {
        Scope::clinic(self.clinic_id).with_doctor(self.doctor_id)
    }
}

// ============================================================================
// REFERRAL
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ReferralStatus {
    Pending,
    Accepted,
    Rejected,
    Completed,
}

/// A referral of a patient to another doctor or to a hospital.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Referral {
    pub id: RecordId,
    #[serde(flatten)]
    pub meta: RecordMeta,
    pub clinic_id: RecordId,
    pub patient_id: RecordId,
    pub from_doctor_id: RecordId,
    pub to_doctor_id: Option<RecordId>,
    pub to_hospital_id: Option<RecordId>,
    pub reason: NonEmptyText,
    pub status: ReferralStatus,
}

#[derive(Clone, Debug, Deserialize, ToSchema)]
pub struct ReferralCreate {
    pub clinic_id: RecordId,
    pub patient_id: RecordId,
    pub from_doctor_id: RecordId,
    #[serde(default)]
    pub to_doctor_id: Option<RecordId>,
    #[serde(default)]
    pub to_hospital_id: Option<RecordId>,
    pub reason: NonEmptyText,
}

#[derive(Clone, Debug, Default, Deserialize, ToSchema)]
pub struct ReferralPatch {
    pub reason: Option<NonEmptyText>,
    pub status: Option<ReferralStatus>,
}

impl Entity for Referral {
    type Create = ReferralCreate;
    type Patch = ReferralPatch;

    fn table(ds: &Dataset) -> &Table<Self> {
        &ds.referrals
    }

    fn table_mut(ds: &mut Dataset) -> &mut Table<Self> {
        &mut ds.referrals
    }

    fn build(ds: &Dataset, input: ReferralCreate, now: DateTime<Utc>) -> ClinicResult<Self> {
        require_patient_and_doctor(
            ds,
            input.clinic_id,
            input.patient_id,
            Some(input.from_doctor_id),
        )?;

        match (input.to_doctor_id, input.to_hospital_id) {
            (None, None) => {
                return Err(ClinicError::InvalidInput(
                    "a referral needs to_doctor_id or to_hospital_id".into(),
                ))
            }
            (to_doctor, to_hospital) => {
                if let Some(to_doctor) = to_doctor {
                    if to_doctor == input.from_doctor_id {
                        return Err(ClinicError::InvalidInput(
                            "a doctor cannot refer a patient to themselves".into(),
                        ));
                    }
                    ds.doctors.reference(to_doctor)?;
                }
                if let Some(to_hospital) = to_hospital {
                    ds.hospitals.reference(to_hospital)?;
                }
            }
        }

        Ok(Self {
            id: RecordId::new(),
            meta: RecordMeta::new(now),
            clinic_id: input.clinic_id,
            patient_id: input.patient_id,
            from_doctor_id: input.from_doctor_id,
            to_doctor_id: input.to_doctor_id,
            to_hospital_id: input.to_hospital_id,
            reason: input.reason,
            status: ReferralStatus::Pending,
        })
    }

    fn apply(&mut self, _ds: &Dataset, patch: ReferralPatch) -> ClinicResult<()> {
        patch_field(&mut self.reason, patch.reason);
        patch_field(&mut self.status, patch.status);
        Ok(())
    }

    fn scope(&self) -> Scope {
        Scope::clinic(self.clinic_id).with_doctor(Some(self.from_doctor_id))
    }
}
