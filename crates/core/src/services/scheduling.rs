//! Doctor availability and slot generation.

use super::visible_record;
use crate::constants::{MAX_SLOT_MINUTES, MIN_SLOT_MINUTES};
use crate::crud::Scope;
use crate::models::{AvailabilityCreate, DoctorAvailability, DoctorTimeSlot, SlotFilter};
use crate::store::{Dataset, RecordMeta};
use crate::{ClinicError, ClinicResult, Store};
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use clinic_uuid::RecordId;
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Clone, Debug, Serialize, ToSchema)]
pub struct AvailabilityWithSlots {
    pub availability: DoctorAvailability,
    pub slots: Vec<DoctorTimeSlot>,
}

/// Consecutive `(start, end)` intervals of `slot_minutes` inside `[start, end)`.
///
/// A trailing interval shorter than `slot_minutes` is dropped.
pub fn slot_bounds(
    date: NaiveDate,
    start: NaiveTime,
    end: NaiveTime,
    slot_minutes: u32,
) -> Vec<(NaiveTime, NaiveTime)> {
    let step = Duration::minutes(i64::from(slot_minutes));
    let end_at = date.and_time(end);
    let mut cursor = date.and_time(start);
    let mut bounds = Vec::new();

    while cursor + step <= end_at {
        bounds.push((cursor.time(), (cursor + step).time()));
        cursor += step;
    }
    bounds
}

/// A slot stays bookable only while its availability, doctor, branch and clinic are live.
pub(crate) fn slot_is_offered(ds: &Dataset, slot: &DoctorTimeSlot) -> bool {
    ds.availabilities.get(slot.availability_id).is_some()
        && ds.doctors.get(slot.doctor_id).is_some()
        && ds.branches.get(slot.branch_id).is_some()
        && ds.clinics.get(slot.clinic_id).is_some()
}

fn validate_window(input: &AvailabilityCreate) -> ClinicResult<()> {
    if input.start_time >= input.end_time {
        return Err(ClinicError::InvalidInput(
            "start_time must be before end_time".into(),
        ));
    }
    if !(MIN_SLOT_MINUTES..=MAX_SLOT_MINUTES).contains(&input.slot_minutes) {
        return Err(ClinicError::InvalidInput(format!(
            "slot_minutes must be between {MIN_SLOT_MINUTES} and {MAX_SLOT_MINUTES}"
        )));
    }
    Ok(())
}

/// Creates an availability window for a doctor and generates its slots.
///
/// # Arguments
///
/// * `store` - Store holding doctors, availabilities and slots
/// * `input` - Doctor, date, start and end time, and slot length in minutes
/// * `now` - Creation time recorded on the window and its slots
/// * `access` - Tenancy predicate of the caller
///
/// # Returns
///
/// The stored window together with its slots in start order.
///
/// # Errors
///
/// Returns `ClinicError` if:
/// - the window or slot length is invalid, or shorter than one slot (`InvalidInput`)
/// - the doctor does not exist (`InvalidInput`)
/// - the doctor is outside the caller's scope (`Forbidden`)
/// - the window overlaps another of the doctor's windows on that date (`InvalidState`)
pub fn create_availability(
    store: &Store,
    input: AvailabilityCreate,
    now: DateTime<Utc>,
    access: impl Fn(&Scope) -> bool,
) -> ClinicResult<AvailabilityWithSlots> {
    validate_window(&input)?;

    store.transaction(|ds| {
        let doctor = ds.doctors.reference(input.doctor_id)?.clone();

        let availability = DoctorAvailability {
            id: RecordId::new(),
            meta: RecordMeta::new(now),
            doctor_id: doctor.id,
            clinic_id: doctor.clinic_id,
            branch_id: doctor.branch_id,
            date: input.date,
            start_time: input.start_time,
            end_time: input.end_time,
            slot_minutes: input.slot_minutes,
        };
        if !access(&availability.scope()) {
            return Err(ClinicError::Forbidden);
        }

        let overlapping = ds.availabilities.live().find(|a| {
            a.doctor_id == doctor.id
                && a.date == input.date
                && a.start_time < input.end_time
                && input.start_time < a.end_time
        });
        if let Some(existing) = overlapping {
            return Err(ClinicError::InvalidState(format!(
                "doctor already has availability {} from {} to {} on {}",
                existing.id, existing.start_time, existing.end_time, existing.date
            )));
        }

        let bounds = slot_bounds(
            input.date,
            input.start_time,
            input.end_time,
            input.slot_minutes,
        );
        if bounds.is_empty() {
            return Err(ClinicError::InvalidInput(
                "availability window is shorter than one slot".into(),
            ));
        }

        let slots: Vec<DoctorTimeSlot> = bounds
            .into_iter()
            .map(|(start_time, end_time)| DoctorTimeSlot {
                id: RecordId::new(),
                meta: RecordMeta::new(now),
                availability_id: availability.id,
                doctor_id: availability.doctor_id,
                clinic_id: availability.clinic_id,
                branch_id: availability.branch_id,
                date: availability.date,
                start_time,
                end_time,
                is_booked: false,
                booking_id: None,
            })
            .collect();

        for slot in &slots {
            ds.slots.insert(slot.clone());
        }
        let availability = ds.availabilities.insert(availability).clone();
        tracing::info!(
            "created availability {} with {} slots for doctor {}",
            availability.id,
            slots.len(),
            availability.doctor_id
        );

        Ok(AvailabilityWithSlots {
            availability,
            slots,
        })
    })
}

/// A live availability window visible to the caller, or `NotFound`.
pub fn get_availability(
    store: &Store,
    id: RecordId,
    access: impl Fn(&Scope) -> bool,
) -> ClinicResult<DoctorAvailability> {
    store.read(|ds| visible_record(&ds.availabilities, id, DoctorAvailability::scope, &access))?
}

/// Availability windows visible to the caller, ordered by date then start time.
pub fn list_availabilities(
    store: &Store,
    doctor_id: Option<RecordId>,
    access: impl Fn(&Scope) -> bool,
) -> ClinicResult<Vec<DoctorAvailability>> {
    store.read(|ds| {
        let mut items: Vec<DoctorAvailability> = ds
            .availabilities
            .live()
            .filter(|a| doctor_id.is_none_or(|d| a.doctor_id == d))
            .filter(|a| access(&a.scope()))
            .cloned()
            .collect();
        items.sort_by_key(|a| (a.date, a.start_time));
        items
    })
}

/// Slots matching `filter`, ordered by date then start time.
pub fn list_slots(
    store: &Store,
    filter: &SlotFilter,
    access: impl Fn(&Scope) -> bool,
) -> ClinicResult<Vec<DoctorTimeSlot>> {
    store.read(|ds| {
        let mut items: Vec<DoctorTimeSlot> = ds
            .slots
            .live()
            .filter(|s| filter.doctor_id.is_none_or(|d| s.doctor_id == d))
            .filter(|s| filter.date.is_none_or(|d| s.date == d))
            .filter(|s| !filter.available || (!s.is_booked && slot_is_offered(ds, s)))
            .filter(|s| access(&s.scope()))
            .cloned()
            .collect();
        items.sort_by_key(|s| (s.date, s.start_time));
        items
    })
}

/// Soft-deletes an availability and its slots. Refused while any slot is booked.
pub fn delete_availability(
    store: &Store,
    id: RecordId,
    now: DateTime<Utc>,
    access: impl Fn(&Scope) -> bool,
) -> ClinicResult<()> {
    store.transaction(|ds| {
        visible_record(&ds.availabilities, id, DoctorAvailability::scope, &access)?;

        let slot_ids: Vec<RecordId> = ds
            .slots
            .live()
            .filter(|s| s.availability_id == id)
            .map(|s| s.id)
            .collect();
        if let Some(booked) = ds
            .slots
            .live()
            .find(|s| s.availability_id == id && s.is_booked)
        {
            return Err(ClinicError::InvalidState(format!(
                "time slot {} of availability {id} is booked",
                booked.id
            )));
        }

        for slot_id in slot_ids {
            ds.slots.soft_delete(slot_id, now)?;
        }
        ds.availabilities.soft_delete(id, now)?;
        tracing::info!("deleted availability {id}");
        Ok(())
    })
}
