//! Clinic domain records.
//!
//! Every record carries a [`RecordId`] and a flattened [`RecordMeta`]. Records that are managed
//! through generic CRUD also implement [`crate::crud::Entity`] next to their definition.

mod billing;
mod clinical;
mod directory;
mod organisation;
mod scheduling;

pub use billing::*;
pub use clinical::*;
pub use directory::*;
pub use organisation::*;
pub use scheduling::*;

use crate::{ClinicError, ClinicResult};

macro_rules! impl_record {
    ($($ty:ty => $entity:literal),+ $(,)?) => {
        $(
            impl crate::store::Record for $ty {
                const ENTITY: &'static str = $entity;

                fn id(&self) -> clinic_uuid::RecordId {
                    self.id
                }

                fn meta(&self) -> &crate::store::RecordMeta {
                    &self.meta
                }

                fn meta_mut(&mut self) -> &mut crate::store::RecordMeta {
                    &mut self.meta
                }
            }
        )+
    };
}

impl_record! {
    Clinic => "clinic",
    Branch => "branch",
    Hospital => "hospital",
    Specialization => "specialization",
    Doctor => "doctor",
    Patient => "patient",
    User => "user",
    DoctorAvailability => "doctor availability",
    DoctorTimeSlot => "doctor time slot",
    PatientBooking => "patient booking",
    Plan => "plan",
    ClinicSubscription => "subscription",
    Prescription => "prescription",
    ReminderLog => "reminder log",
    ReportSummary => "report summary",
    Referral => "referral",
}

/// Trims optional free text, treating blank input as absent.
pub(crate) fn optional_text(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub(crate) fn validate_coordinates(
    latitude: Option<f64>,
    longitude: Option<f64>,
) -> ClinicResult<()> {
    match (latitude, longitude) {
        (None, None) => Ok(()),
        (Some(lat), Some(lng)) => {
            if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lng) {
                return Err(ClinicError::InvalidInput(
                    "coordinates are out of range".into(),
                ));
            }
            Ok(())
        }
        _ => Err(ClinicError::InvalidInput(
            "latitude and longitude must be given together".into(),
        )),
    }
}

/// Overwrites `slot` when the patch carries a value.
pub(crate) fn patch_field<T>(slot: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *slot = value;
    }
}
