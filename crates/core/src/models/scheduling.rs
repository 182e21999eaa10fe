//! Doctor availability windows, the slots generated from them, and patient bookings.

use super::directory::PatientDetails;
use crate::crud::Scope;
use crate::store::RecordMeta;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use clinic_uuid::RecordId;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// A window in which a doctor sees patients at one branch on one date.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DoctorAvailability {
    pub id: RecordId,
    #[serde(flatten)]
    pub meta: RecordMeta,
    pub doctor_id: RecordId,
    pub clinic_id: RecordId,
    pub branch_id: RecordId,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub slot_minutes: u32,
}

impl DoctorAvailability {
    pub fn scope(&self) -> Scope {
        Scope::branch(self.clinic_id, self.branch_id).with_doctor(Some(self.doctor_id))
    }
}

#[derive(Clone, Debug, Deserialize, ToSchema)]
pub struct AvailabilityCreate {
    pub doctor_id: RecordId,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub slot_minutes: u32,
}

/// One bookable interval carved out of an availability window.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DoctorTimeSlot {
    pub id: RecordId,
    #[serde(flatten)]
    pub meta: RecordMeta,
    pub availability_id: RecordId,
    pub doctor_id: RecordId,
    pub clinic_id: RecordId,
    pub branch_id: RecordId,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    #[serde(default)]
    pub is_booked: bool,
    #[serde(default)]
    pub booking_id: Option<RecordId>,
}

impl DoctorTimeSlot {
    pub fn starts_at(&self) -> NaiveDateTime {
        self.date.and_time(self.start_time)
    }

    pub fn scope(&self) -> Scope {
        Scope::branch(self.clinic_id, self.branch_id).with_doctor(Some(self.doctor_id))
    }
}

/// Query filter for slot listings.
#[derive(Clone, Debug, Default, Deserialize, ToSchema)]
pub struct SlotFilter {
    pub doctor_id: Option<RecordId>,
    pub date: Option<NaiveDate>,
    /// When true, only unbooked slots are returned.
    #[serde(default)]
    pub available: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Booked,
    Cancelled,
    Completed,
    NoShow,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PatientBooking {
    pub id: RecordId,
    #[serde(flatten)]
    pub meta: RecordMeta,
    pub clinic_id: RecordId,
    pub branch_id: RecordId,
    pub doctor_id: RecordId,
    pub slot_id: RecordId,
    pub patient_id: RecordId,
    pub status: BookingStatus,
    pub reason: Option<String>,
    pub notes: Option<String>,
}

impl PatientBooking {
    pub fn scope(&self) -> Scope {
        Scope::branch(self.clinic_id, self.branch_id).with_doctor(Some(self.doctor_id))
    }
}

/// Booking request: either an existing `patient_id` or `patient` details to find-or-create.
#[derive(Clone, Debug, Deserialize, ToSchema)]
pub struct BookingCreate {
    pub slot_id: RecordId,
    #[serde(default)]
    pub patient_id: Option<RecordId>,
    #[serde(default)]
    pub patient: Option<PatientDetails>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize, ToSchema)]
pub struct BookingPatch {
    /// Reschedule onto another slot of the same clinic.
    pub slot_id: Option<RecordId>,
    pub status: Option<BookingStatus>,
    pub reason: Option<String>,
    pub notes: Option<String>,
}

/// Query filter for booking listings.
#[derive(Clone, Debug, Default, Deserialize, ToSchema)]
pub struct BookingFilter {
    pub doctor_id: Option<RecordId>,
    pub patient_id: Option<RecordId>,
    pub status: Option<BookingStatus>,
}
