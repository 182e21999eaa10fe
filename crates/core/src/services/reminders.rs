//! Medication reminders.
//!
//! A poll looks at every live prescription and finds the doses scheduled between now and the end
//! of the reminder window. Each dose is attempted once: it is claimed in the reminder log before
//! delivery, the outcome (sent or failed) is written over the claim, and a logged dose is never
//! picked up again.

use crate::integrations::{MessageSender, ReminderMessage};
use crate::models::{ReminderLog, ReminderStatus};
use crate::store::{Dataset, RecordMeta};
use crate::{ClinicResult, Store};
use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use clinic_uuid::RecordId;
use serde::Serialize;

/// A dose that should be announced in the current window.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DueDose {
    pub prescription_id: RecordId,
    pub clinic_id: RecordId,
    pub patient_id: RecordId,
    pub patient_name: String,
    pub phone: String,
    pub medication_index: u32,
    pub medication: String,
    pub dosage: String,
    pub scheduled_for: NaiveDateTime,
}

impl DueDose {
    pub fn message(&self) -> ReminderMessage {
        ReminderMessage {
            prescription_id: self.prescription_id,
            patient_id: self.patient_id,
            patient_name: self.patient_name.clone(),
            phone: self.phone.clone(),
            medication: self.medication.clone(),
            dosage: self.dosage.clone(),
            scheduled_for: self.scheduled_for,
        }
    }
}

fn already_logged(ds: &Dataset, prescription_id: RecordId, index: u32, at: NaiveDateTime) -> bool {
    ds.reminder_logs.live().any(|log| {
        log.prescription_id == prescription_id
            && log.medication_index == index
            && log.scheduled_for == at
    })
}

/// Doses scheduled in `[now, now + window_minutes)` on today's date that have not been attempted.
///
/// Times are compared in UTC. The window does not wrap past midnight.
pub fn due_doses(ds: &Dataset, now: DateTime<Utc>, window_minutes: u32) -> Vec<DueDose> {
    let now = now.naive_utc();
    let window_end = now + Duration::minutes(i64::from(window_minutes));
    let today = now.date();

    let mut due = Vec::new();
    for prescription in ds.prescriptions.live() {
        let Some(patient) = ds.patients.get(prescription.patient_id) else {
            continue;
        };

        for (index, medication) in prescription.medications.iter().enumerate() {
            if !medication.is_active_on(today) {
                continue;
            }
            let index = index as u32;
            for time in &medication.times {
                let scheduled_for = today.and_time(*time);
                if scheduled_for < now || scheduled_for >= window_end {
                    continue;
                }
                if already_logged(ds, prescription.id, index, scheduled_for) {
                    continue;
                }
                due.push(DueDose {
                    prescription_id: prescription.id,
                    clinic_id: prescription.clinic_id,
                    patient_id: patient.id,
                    patient_name: patient.name.to_string(),
                    phone: patient.phone.to_string(),
                    medication_index: index,
                    medication: medication.name.to_string(),
                    dosage: medication.dosage.to_string(),
                    scheduled_for,
                });
            }
        }
    }
    due.sort_by_key(|d| d.scheduled_for);
    due
}

/// Sends every due dose and records the outcome.
///
/// Due doses are claimed first: a `sending` log is written for each one in the same transaction
/// that finds them, so a poll running at the same time sees them as taken. The claims are then
/// settled as `sent` or `failed` once delivery has been attempted.
///
/// # Arguments
///
/// * `store` - Store holding prescriptions and reminder logs
/// * `sender` - Delivery channel for reminder messages
/// * `now` - Start of the reminder window
/// * `window_minutes` - Length of the reminder window
///
/// # Returns
///
/// The settled logs for the doses this poll claimed. Empty when nothing was due.
///
/// # Errors
///
/// Returns a store error if claiming or settling fails. Delivery failures are recorded in the
/// logs, not returned.
pub async fn run_reminder_poll(
    store: &Store,
    sender: &dyn MessageSender,
    now: DateTime<Utc>,
    window_minutes: u32,
) -> ClinicResult<Vec<ReminderLog>> {
    let claimed = store.transaction(|ds| {
        let due = due_doses(ds, now, window_minutes);
        let mut claimed = Vec::with_capacity(due.len());
        for dose in due {
            let log = ReminderLog {
                id: RecordId::new(),
                meta: RecordMeta::new(now),
                prescription_id: dose.prescription_id,
                patient_id: dose.patient_id,
                clinic_id: dose.clinic_id,
                medication_index: dose.medication_index,
                medication_name: dose.medication.clone(),
                scheduled_for: dose.scheduled_for,
                status: ReminderStatus::Sending,
                error: None,
                attempted_at: now,
            };
            claimed.push((ds.reminder_logs.insert(log).id, dose));
        }
        Ok(claimed)
    })?;
    if claimed.is_empty() {
        tracing::debug!("no reminders due");
        return Ok(Vec::new());
    }

    let mut outcomes = Vec::with_capacity(claimed.len());
    for (log_id, dose) in claimed {
        let outcome = match sender.send(&dose.message()).await {
            Ok(()) => {
                tracing::info!(
                    "sent reminder for prescription {} at {}",
                    dose.prescription_id,
                    dose.scheduled_for
                );
                (ReminderStatus::Sent, None)
            }
            Err(e) => {
                tracing::warn!(
                    "reminder for prescription {} at {} failed: {e}",
                    dose.prescription_id,
                    dose.scheduled_for
                );
                (ReminderStatus::Failed, Some(e.to_string()))
            }
        };
        outcomes.push((log_id, outcome, Utc::now()));
    }

    store.transaction(|ds| {
        let mut settled = Vec::with_capacity(outcomes.len());
        for (log_id, (status, error), attempted_at) in outcomes {
            let log = ds.reminder_logs.require_mut(log_id)?;
            log.status = status;
            log.error = error;
            log.attempted_at = attempted_at;
            log.meta.updated_at = attempted_at;
            settled.push(log.clone());
        }
        Ok(settled)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Medication, Prescription};
    use crate::services::fixtures::{seed_patient, seed_world};
    use crate::ClinicError;
    use async_trait::async_trait;
    use chrono::{NaiveDate, NaiveTime, TimeZone};
    use clinic_types::NonEmptyText;
    use std::sync::Mutex;

    struct RecordingSender {
        fail: bool,
        sent: Mutex<Vec<ReminderMessage>>,
    }

    #[async_trait]
    impl MessageSender for RecordingSender {
        async fn send(&self, message: &ReminderMessage) -> ClinicResult<()> {
            tokio::task::yield_now().await;
            if self.fail {
                return Err(ClinicError::Gateway("webhook returned 500".into()));
            }
            self.sent.lock().unwrap().push(message.clone());
            Ok(())
        }
    }

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2030, 5, 10, h, m, 0).unwrap()
    }

    fn seed_prescription(store: &Store, times: &[(u32, u32)]) -> RecordId {
        let world = seed_world(store, at(0, 0));
        let patient_id = seed_patient(store, world.clinic_id, "9812345678");
        store
            .transaction(|ds| {
                let prescription = Prescription {
                    id: RecordId::new(),
                    meta: RecordMeta::new(at(0, 0)),
                    clinic_id: world.clinic_id,
                    patient_id,
                    doctor_id: world.doctor_id,
                    booking_id: None,
                    diagnosis: None,
                    medications: vec![Medication {
                        name: NonEmptyText::new("Metformin").unwrap(),
                        dosage: NonEmptyText::new("500mg").unwrap(),
                        times: times
                            .iter()
                            .map(|(h, m)| NaiveTime::from_hms_opt(*h, *m, 0).unwrap())
                            .collect(),
                        start_date: NaiveDate::from_ymd_opt(2030, 5, 1).unwrap(),
                        end_date: NaiveDate::from_ymd_opt(2030, 5, 31).unwrap(),
                    }],
                    notes: None,
                };
                Ok(ds.prescriptions.insert(prescription).id)
            })
            .unwrap()
    }

    #[test]
    fn test_due_doses_match_only_the_window() {
        let store = Store::in_memory();
        seed_prescription(&store, &[(8, 0), (8, 14), (8, 15), (20, 0)]);

        let due = store.read(|ds| due_doses(ds, at(8, 0), 15)).unwrap();

        let times: Vec<_> = due.iter().map(|d| d.scheduled_for.time()).collect();
        assert_eq!(
            times,
            vec![
                NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
                NaiveTime::from_hms_opt(8, 14, 0).unwrap()
            ]
        );
        assert_eq!(due[0].medication, "Metformin");
        assert_eq!(due[0].patient_name, "Asha Verma");
    }

    #[test]
    fn test_due_doses_skip_inactive_medication() {
        let store = Store::in_memory();
        seed_prescription(&store, &[(8, 0)]);
        let june = Utc.with_ymd_and_hms(2030, 6, 1, 8, 0, 0).unwrap();
        assert!(store.read(|ds| due_doses(ds, june, 15)).unwrap().is_empty());
    }

    #[test]
    fn test_window_does_not_wrap_past_midnight() {
        let store = Store::in_memory();
        seed_prescription(&store, &[(0, 5)]);
        let late = Utc.with_ymd_and_hms(2030, 5, 10, 23, 55, 0).unwrap();
        assert!(store.read(|ds| due_doses(ds, late, 15)).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_poll_sends_once_per_dose() {
        let store = Store::in_memory();
        seed_prescription(&store, &[(9, 0)]);
        let sender = RecordingSender {
            fail: false,
            sent: Mutex::new(Vec::new()),
        };

        let first = run_reminder_poll(&store, &sender, at(8, 50), 15).await.unwrap();
        let second = run_reminder_poll(&store, &sender, at(8, 55), 15).await.unwrap();

        assert_eq!(first.len(), 1);
        assert_eq!(first[0].status, ReminderStatus::Sent);
        assert!(second.is_empty());
        assert_eq!(sender.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_overlapping_polls_send_each_dose_once() {
        let store = Store::in_memory();
        seed_prescription(&store, &[(9, 0)]);
        let sender = RecordingSender {
            fail: false,
            sent: Mutex::new(Vec::new()),
        };

        let (a, b) = tokio::join!(
            run_reminder_poll(&store, &sender, at(8, 50), 15),
            run_reminder_poll(&store, &sender, at(8, 51), 15)
        );
        let (a, b) = (a.unwrap(), b.unwrap());

        assert_eq!(sender.sent.lock().unwrap().len(), 1);
        assert_eq!(a.len() + b.len(), 1);
        let logs = store
            .read(|ds| ds.reminder_logs.live().cloned().collect::<Vec<_>>())
            .unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].status, ReminderStatus::Sent);
    }

    #[tokio::test]
    async fn test_delivery_failure_is_logged_not_raised() {
        let store = Store::in_memory();
        seed_prescription(&store, &[(9, 0), (9, 5)]);
        let sender = RecordingSender {
            fail: true,
            sent: Mutex::new(Vec::new()),
        };

        let logs = run_reminder_poll(&store, &sender, at(8, 55), 15).await.unwrap();

        assert_eq!(logs.len(), 2);
        assert!(logs.iter().all(|l| l.status == ReminderStatus::Failed));
        assert!(logs[0].error.as_deref().unwrap_or_default().contains("500"));
        let retried = run_reminder_poll(&store, &sender, at(8, 56), 15).await.unwrap();
        assert!(retried.is_empty(), "failed doses are not retried");
    }
}
