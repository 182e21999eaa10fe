//! Patient bookings against doctor time slots.
//!
//! Every operation here runs in one store transaction. Because the transaction holds the write
//! lock, checking `is_booked` and setting it are a single atomic step and two requests can never
//! book the same slot.

use super::scheduling::slot_is_offered;
use super::subscriptions::current_subscription;
use super::visible_record;
use crate::crud::Scope;
use crate::models::{
    find_patient_by_phone, BookingCreate, BookingFilter, BookingPatch, BookingStatus,
    DoctorTimeSlot, Patient, PatientBooking, PatientDetails,
};
use crate::store::{Dataset, RecordMeta};
use crate::{ClinicError, ClinicResult, Store};
use chrono::{DateTime, Utc};
use clinic_uuid::RecordId;

/// Books a slot for a patient, creating the patient when only details are given.
///
/// The slot check, the quota check and the slot lock all happen in one transaction, so two
/// requests for the same slot cannot both succeed.
///
/// # Arguments
///
/// * `store` - Store holding slots, subscriptions and patients
/// * `input` - Slot plus either an existing `patient_id` or patient details to find-or-create
/// * `now` - Request time, used for the slot start check and the active subscription
/// * `access` - Tenancy predicate of the caller
///
/// # Returns
///
/// The stored booking with status `booked`.
///
/// # Errors
///
/// Returns `ClinicError` if:
/// - the slot is missing or outside the caller's scope (`NotFound`)
/// - the slot is already booked (`SlotAlreadyBooked`)
/// - the slot's doctor, branch or clinic has been removed (`InvalidState`)
/// - the slot has already started, or the patient belongs to another clinic (`InvalidInput`)
/// - the clinic has no active subscription or no bookings left
pub fn create_booking(
    store: &Store,
    input: BookingCreate,
    now: DateTime<Utc>,
    access: impl Fn(&Scope) -> bool,
) -> ClinicResult<PatientBooking> {
    store.transaction(|ds| {
        let slot = visible_record(&ds.slots, input.slot_id, DoctorTimeSlot::scope, &access)?;
        ensure_bookable(ds, &slot, now)?;

        let subscription_id = {
            let subscription = current_subscription(ds, slot.clinic_id, now)
                .ok_or(ClinicError::NoActiveSubscription(slot.clinic_id))?;
            if subscription.remaining_bookings == 0 {
                return Err(ClinicError::BookingQuotaExhausted(slot.clinic_id));
            }
            subscription.id
        };

        let patient_id = resolve_patient(ds, slot.clinic_id, input.patient_id, input.patient, now)?;

        let booking = PatientBooking {
            id: RecordId::new(),
            meta: RecordMeta::new(now),
            clinic_id: slot.clinic_id,
            branch_id: slot.branch_id,
            doctor_id: slot.doctor_id,
            slot_id: slot.id,
            patient_id,
            status: BookingStatus::Booked,
            reason: input.reason.filter(|r| !r.trim().is_empty()),
            notes: input.notes.filter(|n| !n.trim().is_empty()),
        };
        let booking = ds.bookings.insert(booking).clone();

        lock_slot(ds, slot.id, booking.id, now)?;

        let subscription = ds.subscriptions.require_mut(subscription_id)?;
        subscription.remaining_bookings -= 1;
        subscription.meta.updated_at = now;

        tracing::info!(
            "booked slot {} for patient {} (booking {})",
            slot.id,
            patient_id,
            booking.id
        );
        Ok(booking)
    })
}

/// Reschedules, changes status, or edits the free-text fields of a booking.
///
/// An identical repeat changes nothing, including `updated_at`.
///
/// # Arguments
///
/// * `id` - Booking to change
/// * `patch` - New slot, status, reason or notes; absent fields are left alone
/// * `now` - Request time
/// * `access` - Tenancy predicate of the caller
///
/// # Errors
///
/// Returns `InvalidState` for changes to a cancelled booking or a move onto a slot that is no
/// longer offered, and the same slot errors as [`create_booking`] for a move.
pub fn update_booking(
    store: &Store,
    id: RecordId,
    patch: BookingPatch,
    now: DateTime<Utc>,
    access: impl Fn(&Scope) -> bool,
) -> ClinicResult<PatientBooking> {
    store.transaction(|ds| {
        let current = visible_record(&ds.bookings, id, PatientBooking::scope, &access)?;
        let mut updated = current.clone();

        if current.status == BookingStatus::Cancelled {
            let changes_something = patch.slot_id.is_some_and(|s| s != current.slot_id)
                || patch.status.is_some_and(|s| s != BookingStatus::Cancelled)
                || patch.reason.is_some_and(|r| Some(r) != current.reason)
                || patch.notes.is_some_and(|n| Some(n) != current.notes);
            if changes_something {
                return Err(ClinicError::InvalidState(format!(
                    "booking {id} is cancelled and cannot be changed"
                )));
            }
            return Ok(current);
        }

        if let Some(reason) = patch.reason {
            updated.reason = Some(reason).filter(|r| !r.trim().is_empty());
        }
        if let Some(notes) = patch.notes {
            updated.notes = Some(notes).filter(|n| !n.trim().is_empty());
        }

        if let Some(slot_id) = patch.slot_id.filter(|s| *s != current.slot_id) {
            let slot = visible_record(&ds.slots, slot_id, DoctorTimeSlot::scope, &access)?;
            if slot.clinic_id != current.clinic_id {
                return Err(ClinicError::InvalidInput(format!(
                    "time slot {slot_id} belongs to another clinic"
                )));
            }
            ensure_bookable(ds, &slot, now)?;

            release_slot(ds, current.slot_id, id, now);
            lock_slot(ds, slot.id, id, now)?;
            updated.slot_id = slot.id;
            updated.doctor_id = slot.doctor_id;
            updated.branch_id = slot.branch_id;
            tracing::info!("moved booking {id} to slot {slot_id}");
        }

        if let Some(status) = patch.status {
            if status == BookingStatus::Cancelled {
                release_slot(ds, updated.slot_id, id, now);
            }
            updated.status = status;
        }

        if updated == current {
            return Ok(current);
        }
        if !access(&updated.scope()) {
            return Err(ClinicError::Forbidden);
        }

        updated.meta.updated_at = now;
        *ds.bookings.require_mut(id)? = updated.clone();
        tracing::info!("updated booking {id}");
        Ok(updated)
    })
}

/// Cancels a booking, frees its slot and soft-deletes it.
///
/// The booking quota is not refunded.
pub fn cancel_booking(
    store: &Store,
    id: RecordId,
    now: DateTime<Utc>,
    access: impl Fn(&Scope) -> bool,
) -> ClinicResult<()> {
    store.transaction(|ds| {
        let booking = visible_record(&ds.bookings, id, PatientBooking::scope, &access)?;
        release_slot(ds, booking.slot_id, id, now);

        let stored = ds.bookings.require_mut(id)?;
        stored.status = BookingStatus::Cancelled;
        ds.bookings.soft_delete(id, now)?;
        tracing::info!("cancelled booking {id}");
        Ok(())
    })
}

/// A live booking visible to the caller, or `NotFound`.
pub fn get_booking(
    store: &Store,
    id: RecordId,
    access: impl Fn(&Scope) -> bool,
) -> ClinicResult<PatientBooking> {
    store.read(|ds| visible_record(&ds.bookings, id, PatientBooking::scope, &access))?
}

/// Live bookings visible to the caller, narrowed by `filter`.
///
/// Results are in id order.
pub fn list_bookings(
    store: &Store,
    filter: &BookingFilter,
    access: impl Fn(&Scope) -> bool,
) -> ClinicResult<Vec<PatientBooking>> {
    store.read(|ds| {
        ds.bookings
            .live()
            .filter(|b| filter.doctor_id.is_none_or(|d| b.doctor_id == d))
            .filter(|b| filter.patient_id.is_none_or(|p| b.patient_id == p))
            .filter(|b| filter.status.is_none_or(|s| b.status == s))
            .filter(|b| access(&b.scope()))
            .cloned()
            .collect()
    })
}

fn ensure_bookable(ds: &Dataset, slot: &DoctorTimeSlot, now: DateTime<Utc>) -> ClinicResult<()> {
    if slot.is_booked {
        return Err(ClinicError::SlotAlreadyBooked(slot.id));
    }
    if !slot_is_offered(ds, slot) {
        return Err(ClinicError::InvalidState(format!(
            "time slot {} is no longer offered",
            slot.id
        )));
    }
    if slot.starts_at() <= now.naive_utc() {
        return Err(ClinicError::InvalidInput(format!(
            "time slot {} has already started",
            slot.id
        )));
    }
    Ok(())
}

fn lock_slot(
    ds: &mut Dataset,
    slot_id: RecordId,
    booking_id: RecordId,
    now: DateTime<Utc>,
) -> ClinicResult<()> {
    let slot = ds.slots.require_mut(slot_id)?;
    slot.is_booked = true;
    slot.booking_id = Some(booking_id);
    slot.meta.updated_at = now;
    Ok(())
}

/// Frees a slot held by `booking_id`. A slot since taken by someone else is left alone.
fn release_slot(ds: &mut Dataset, slot_id: RecordId, booking_id: RecordId, now: DateTime<Utc>) {
    if let Some(slot) = ds.slots.get_mut(slot_id) {
        if slot.booking_id == Some(booking_id) {
            slot.is_booked = false;
            slot.booking_id = None;
            slot.meta.updated_at = now;
        }
    }
}

/// Returns the id of the booking's patient, registering a new one if needed.
///
/// A patient matched by phone only has blank optional fields filled in; existing values are
/// never overwritten by booking input.
fn resolve_patient(
    ds: &mut Dataset,
    clinic_id: RecordId,
    patient_id: Option<RecordId>,
    details: Option<PatientDetails>,
    now: DateTime<Utc>,
) -> ClinicResult<RecordId> {
    match (patient_id, details) {
        (Some(patient_id), _) => {
            let patient = ds.patients.reference(patient_id)?;
            if patient.clinic_id != clinic_id {
                return Err(ClinicError::InvalidInput(format!(
                    "patient {patient_id} does not belong to clinic {clinic_id}"
                )));
            }
            Ok(patient_id)
        }
        (None, Some(details)) => {
            let existing = find_patient_by_phone(ds, clinic_id, &details.phone).map(|p| p.id);
            match existing {
                Some(existing_id) => {
                    let patient = ds.patients.require_mut(existing_id)?;
                    let before = patient.clone();
                    if patient.email.is_none() {
                        patient.email = details.email;
                    }
                    if patient.gender.is_none() {
                        patient.gender = details.gender;
                    }
                    if patient.date_of_birth.is_none() {
                        patient.date_of_birth = details.date_of_birth;
                    }
                    if patient.address.is_none() {
                        patient.address = details.address.filter(|a| !a.trim().is_empty());
                    }
                    if *patient != before {
                        patient.meta.updated_at = now;
                    }
                    Ok(existing_id)
                }
                None => {
                    let patient = Patient::register(ds, clinic_id, details, now)?;
                    tracing::info!("registered patient {} while booking", patient.id);
                    Ok(ds.patients.insert(patient).id)
                }
            }
        }
        (None, None) => Err(ClinicError::InvalidInput(
            "either patient_id or patient details are required".into(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::fixtures::{
        allow_all, seed_patient, seed_slot, seed_subscription, seed_world,
    };
    use crate::crud::CrudService;
    use crate::models::{Branch, Doctor, SlotFilter};
    use crate::services::scheduling::list_slots;
    use chrono::{Duration, NaiveDate};
    use clinic_types::{EmailAddress, NonEmptyText, PhoneNumber};
    use std::sync::Arc;

    fn tomorrow() -> NaiveDate {
        (Utc::now() + Duration::days(1)).date_naive()
    }

    fn details(phone: &str) -> PatientDetails {
        PatientDetails {
            name: NonEmptyText::new("Ravi Kumar").unwrap(),
            phone: PhoneNumber::parse(phone).unwrap(),
            email: Some(EmailAddress::parse("ravi@example.com").unwrap()),
            gender: None,
            date_of_birth: None,
            address: None,
        }
    }

    fn request(
        slot_id: RecordId,
        patient_id: Option<RecordId>,
        patient: Option<PatientDetails>,
    ) -> BookingCreate {
        BookingCreate {
            slot_id,
            patient_id,
            patient,
            reason: Some("Fever".into()),
            notes: None,
        }
    }

    #[test]
    fn test_booking_locks_slot_and_consumes_quota() {
        let store = Store::in_memory();
        let now = Utc::now();
        let world = seed_world(&store, now);
        let sub_id = seed_subscription(&store, world.clinic_id, now, 3);
        let slot_id = seed_slot(&store, &world, tomorrow(), 10);

        let booking = create_booking(
            &store,
            request(slot_id, None, Some(details("9000000001"))),
            now,
            allow_all,
        )
        .expect("booking should succeed");

        let (slot, remaining, patients) = store
            .read(|ds| {
                (
                    ds.slots.get(slot_id).cloned().unwrap(),
                    ds.subscriptions.get(sub_id).unwrap().remaining_bookings,
                    ds.patients.live().count(),
                )
            })
            .unwrap();
        assert!(slot.is_booked);
        assert_eq!(slot.booking_id, Some(booking.id));
        assert_eq!(remaining, 2);
        assert_eq!(patients, 1);
        assert_eq!(booking.status, BookingStatus::Booked);
    }

    #[test]
    fn test_booked_slot_is_rejected_and_nothing_changes() {
        let store = Store::in_memory();
        let now = Utc::now();
        let world = seed_world(&store, now);
        let sub_id = seed_subscription(&store, world.clinic_id, now, 5);
        let slot_id = seed_slot(&store, &world, tomorrow(), 11);

        create_booking(
            &store,
            request(slot_id, None, Some(details("9000000002"))),
            now,
            allow_all,
        )
        .unwrap();
        let err = create_booking(
            &store,
            request(slot_id, None, Some(details("9000000003"))),
            now,
            allow_all,
        )
        .expect_err("second booking of the same slot must fail");

        assert!(matches!(err, ClinicError::SlotAlreadyBooked(id) if id == slot_id));
        let (remaining, patients, bookings) = store
            .read(|ds| {
                (
                    ds.subscriptions.get(sub_id).unwrap().remaining_bookings,
                    ds.patients.live().count(),
                    ds.bookings.live().count(),
                )
            })
            .unwrap();
        assert_eq!((remaining, patients, bookings), (4, 1, 1));
    }

    #[test]
    fn test_concurrent_bookings_never_double_book() {
        let store = std::sync::Arc::new(Store::in_memory());
        let now = Utc::now();
        let world = seed_world(&store, now);
        seed_subscription(&store, world.clinic_id, now, 100);
        let slot_id = seed_slot(&store, &world, tomorrow(), 12);

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = store.clone();
                std::thread::spawn(move || {
                    create_booking(
                        &store,
                        request(slot_id, None, Some(details(&format!("900000010{i}")))),
                        now,
                        allow_all,
                    )
                })
            })
            .collect();

        let successes = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|r| r.is_ok())
            .count();
        assert_eq!(successes, 1);
        assert_eq!(store.read(|ds| ds.bookings.live().count()).unwrap(), 1);
    }

    #[test]
    fn test_booking_requires_active_subscription_with_quota() {
        let store = Store::in_memory();
        let now = Utc::now();
        let world = seed_world(&store, now);
        let slot_id = seed_slot(&store, &world, tomorrow(), 9);

        let err = create_booking(
            &store,
            request(slot_id, None, Some(details("9000000004"))),
            now,
            allow_all,
        )
        .expect_err("no subscription");
        assert!(matches!(err, ClinicError::NoActiveSubscription(_)));

        seed_subscription(&store, world.clinic_id, now, 0);
        let err = create_booking(
            &store,
            request(slot_id, None, Some(details("9000000004"))),
            now,
            allow_all,
        )
        .expect_err("no quota");
        assert!(matches!(err, ClinicError::BookingQuotaExhausted(_)));
        assert_eq!(store.read(|ds| ds.patients.live().count()).unwrap(), 0);
    }

    #[test]
    fn test_past_slot_is_rejected() {
        let store = Store::in_memory();
        let now = Utc::now();
        let world = seed_world(&store, now);
        seed_subscription(&store, world.clinic_id, now, 5);
        let yesterday = (now - Duration::days(1)).date_naive();
        let slot_id = seed_slot(&store, &world, yesterday, 10);

        let err = create_booking(
            &store,
            request(slot_id, None, Some(details("9000000005"))),
            now,
            allow_all,
        )
        .expect_err("past slot");
        assert!(matches!(err, ClinicError::InvalidInput(_)));
    }

    #[test]
    fn test_existing_patient_is_matched_by_phone() {
        let store = Store::in_memory();
        let now = Utc::now();
        let world = seed_world(&store, now);
        seed_subscription(&store, world.clinic_id, now, 5);
        let patient_id = seed_patient(&store, world.clinic_id, "9000000006");
        let slot_id = seed_slot(&store, &world, tomorrow(), 14);

        let booking = create_booking(
            &store,
            request(slot_id, None, Some(details("9000000006"))),
            now,
            allow_all,
        )
        .unwrap();

        assert_eq!(booking.patient_id, patient_id);
        let patient = store.read(|ds| ds.patients.get(patient_id).cloned().unwrap()).unwrap();
        assert_eq!(patient.name.as_str(), "Asha Verma", "existing name is kept");
        assert_eq!(patient.email.map(|e| e.to_string()).as_deref(), Some("ravi@example.com"));
    }

    #[test]
    fn test_patient_from_another_clinic_is_rejected() {
        let store = Store::in_memory();
        let now = Utc::now();
        let world = seed_world(&store, now);
        let other = seed_world(&store, now);
        seed_subscription(&store, world.clinic_id, now, 5);
        let foreign = seed_patient(&store, other.clinic_id, "9000000007");
        let slot_id = seed_slot(&store, &world, tomorrow(), 15);

        let err = create_booking(
            &store,
            request(slot_id, Some(foreign), None),
            now,
            allow_all,
        )
        .expect_err("foreign patient");
        assert!(matches!(err, ClinicError::InvalidInput(_)));
    }

    #[test]
    fn test_reschedule_moves_the_slot_lock() {
        let store = Store::in_memory();
        let now = Utc::now();
        let world = seed_world(&store, now);
        seed_subscription(&store, world.clinic_id, now, 5);
        let first = seed_slot(&store, &world, tomorrow(), 10);
        let second = seed_slot(&store, &world, tomorrow(), 16);

        let booking = create_booking(
            &store,
            request(first, None, Some(details("9000000008"))),
            now,
            allow_all,
        )
        .unwrap();
        let patch = || BookingPatch {
            slot_id: Some(second),
            ..BookingPatch::default()
        };
        let moved = update_booking(&store, booking.id, patch(), now, allow_all).unwrap();
        let repeated = update_booking(&store, booking.id, patch(), Utc::now(), allow_all).unwrap();

        assert_eq!(moved.slot_id, second);
        assert_eq!(moved, repeated);
        let (a, b) = store
            .read(|ds| {
                (
                    ds.slots.get(first).unwrap().is_booked,
                    ds.slots.get(second).unwrap().is_booked,
                )
            })
            .unwrap();
        assert!(!a);
        assert!(b);
    }

    #[test]
    fn test_cancelled_booking_frees_slot_and_is_frozen() {
        let store = Store::in_memory();
        let now = Utc::now();
        let world = seed_world(&store, now);
        seed_subscription(&store, world.clinic_id, now, 5);
        let slot_id = seed_slot(&store, &world, tomorrow(), 10);

        let booking = create_booking(
            &store,
            request(slot_id, None, Some(details("9000000009"))),
            now,
            allow_all,
        )
        .unwrap();
        let cancel = BookingPatch {
            status: Some(BookingStatus::Cancelled),
            ..BookingPatch::default()
        };
        update_booking(&store, booking.id, cancel, now, allow_all).unwrap();
        assert!(!store.read(|ds| ds.slots.get(slot_id).unwrap().is_booked).unwrap());

        let reopen = BookingPatch {
            status: Some(BookingStatus::Booked),
            ..BookingPatch::default()
        };
        assert!(matches!(
            update_booking(&store, booking.id, reopen, now, allow_all),
            Err(ClinicError::InvalidState(_))
        ));
    }

    #[test]
    fn test_cancel_booking_soft_deletes_and_releases() {
        let store = Store::in_memory();
        let now = Utc::now();
        let world = seed_world(&store, now);
        seed_subscription(&store, world.clinic_id, now, 5);
        let slot_id = seed_slot(&store, &world, tomorrow(), 10);

        let booking = create_booking(
            &store,
            request(slot_id, None, Some(details("9000000010"))),
            now,
            allow_all,
        )
        .unwrap();
        cancel_booking(&store, booking.id, now, allow_all).unwrap();

        assert!(matches!(
            get_booking(&store, booking.id, allow_all),
            Err(ClinicError::NotFound { .. })
        ));
        let slot = store.read(|ds| ds.slots.get(slot_id).cloned().unwrap()).unwrap();
        assert!(!slot.is_booked);
        assert_eq!(slot.booking_id, None);
    }

    #[test]
    fn test_deleted_doctor_slots_cannot_be_booked() {
        let store = Arc::new(Store::in_memory());
        let now = Utc::now();
        let world = seed_world(&store, now);
        let sub_id = seed_subscription(&store, world.clinic_id, now, 5);
        let slot_id = seed_slot(&store, &world, tomorrow(), 10);

        CrudService::<Doctor>::new(store.clone())
            .delete(world.doctor_id, now, allow_all)
            .unwrap();
        let err = create_booking(
            &store,
            request(slot_id, None, Some(details("9000000011"))),
            now,
            allow_all,
        )
        .expect_err("doctor is gone");

        assert!(matches!(err, ClinicError::InvalidState(_)));
        let remaining = store
            .read(|ds| ds.subscriptions.get(sub_id).unwrap().remaining_bookings)
            .unwrap();
        assert_eq!(remaining, 5);
        let open = SlotFilter {
            available: true,
            ..SlotFilter::default()
        };
        assert!(list_slots(&store, &open, allow_all).unwrap().is_empty());
    }

    #[test]
    fn test_reschedule_onto_deleted_branch_is_rejected() {
        let store = Arc::new(Store::in_memory());
        let now = Utc::now();
        let world = seed_world(&store, now);
        seed_subscription(&store, world.clinic_id, now, 5);
        let first = seed_slot(&store, &world, tomorrow(), 10);
        let second = seed_slot(&store, &world, tomorrow(), 16);

        let booking = create_booking(
            &store,
            request(first, None, Some(details("9000000012"))),
            now,
            allow_all,
        )
        .unwrap();
        CrudService::<Branch>::new(store.clone())
            .delete(world.branch_id, now, allow_all)
            .unwrap();
        let patch = BookingPatch {
            slot_id: Some(second),
            ..BookingPatch::default()
        };

        assert!(matches!(
            update_booking(&store, booking.id, patch, now, allow_all),
            Err(ClinicError::InvalidState(_))
        ));
        let still_booked = store.read(|ds| ds.slots.get(first).unwrap().is_booked).unwrap();
        assert!(still_booked);
    }
}
