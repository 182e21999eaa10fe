use crate::crud::{Entity, Scope};
use crate::models::{Branch, Clinic, ClinicCreate};
use crate::{ClinicError, ClinicResult, Store};
use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Clone, Debug, Serialize, ToSchema)]
pub struct ClinicWithBranch {
    pub clinic: Clinic,
    pub branch: Branch,
}

/// Creates a clinic together with its first branch. Neither is stored unless both are valid.
pub fn create_clinic_with_branch(
    store: &Store,
    input: ClinicCreate,
    now: DateTime<Utc>,
    access: impl Fn(&Scope) -> bool,
) -> ClinicResult<ClinicWithBranch> {
    store.transaction(|ds| {
        let draft = input.first_branch.clone();
        let clinic = Clinic::build(ds, input, now)?;
        if !access(&clinic.scope()) {
            return Err(ClinicError::Forbidden);
        }
        let branch = draft.into_branch(clinic.id, now)?;

        let clinic = ds.clinics.insert(clinic).clone();
        let branch = ds.branches.insert(branch).clone();
        tracing::info!("created clinic {} with branch {}", clinic.id, branch.id);

        Ok(ClinicWithBranch { clinic, branch })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BranchDraft;
    use crate::services::fixtures::allow_all;
    use clinic_types::{EmailAddress, NonEmptyText, PhoneNumber};

    fn input(branch_latitude: Option<f64>) -> ClinicCreate {
        ClinicCreate {
            name: NonEmptyText::new("Lotus Care").unwrap(),
            email: EmailAddress::parse("hello@lotus.example").unwrap(),
            phone: PhoneNumber::parse("0801234567").unwrap(),
            address: None,
            postal_code: None,
            latitude: None,
            longitude: None,
            first_branch: BranchDraft {
                name: NonEmptyText::new("Indiranagar").unwrap(),
                phone: None,
                address: None,
                postal_code: None,
                latitude: branch_latitude,
                longitude: None,
            },
        }
    }

    #[test]
    fn test_creates_clinic_and_first_branch_together() {
        let store = Store::in_memory();
        let created = create_clinic_with_branch(&store, input(None), Utc::now(), allow_all)
            .expect("clinic should be created");

        assert_eq!(created.branch.clinic_id, created.clinic.id);
        let counts = store
            .read(|ds| (ds.clinics.live().count(), ds.branches.live().count()))
            .unwrap();
        assert_eq!(counts, (1, 1));
    }

    #[test]
    fn test_invalid_branch_leaves_no_clinic_behind() {
        let store = Store::in_memory();
        let err = create_clinic_with_branch(&store, input(Some(12.9)), Utc::now(), allow_all)
            .expect_err("half coordinates on the branch should fail");

        assert!(matches!(err, ClinicError::InvalidInput(_)));
        assert_eq!(store.read(|ds| ds.clinics.live().count()).unwrap(), 0);
    }
}
