use anyhow::Context;
use api_shared::auth::{Claims, Role, TokenConfig, DEFAULT_TOKEN_TTL_HOURS};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use clinic_core::config::u32_from_env_value;
use clinic_core::constants::{DEFAULT_DATA_DIR, DEFAULT_REMINDER_WINDOW_MINUTES};
use clinic_core::crud::{CrudService, Scope};
use clinic_core::models::{Plan, PlanCreate};
use clinic_core::services::reminders::due_doses;
use clinic_core::services::subscriptions::current_subscription;
use clinic_core::Store;
use clinic_types::NonEmptyText;
use clinic_uuid::RecordId;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "clinic")]
#[command(about = "Clinic management service CLI")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print a bearer token signed with AUTH_TOKEN_SECRET
    IssueToken {
        /// super-admin, clinic, branch or doctor
        #[arg(long)]
        role: Role,
        #[arg(long)]
        clinic_id: Option<RecordId>,
        #[arg(long)]
        branch_id: Option<RecordId>,
        #[arg(long)]
        doctor_id: Option<RecordId>,
        /// Token subject (default: "cli")
        #[arg(long, default_value = "cli")]
        subject: String,
        /// Lifetime in hours (default: AUTH_TOKEN_TTL_HOURS)
        #[arg(long)]
        ttl_hours: Option<u32>,
    },
    /// Add a subscription plan to the store
    SeedPlan {
        #[arg(long)]
        name: String,
        /// Price in minor currency units
        #[arg(long)]
        price: u64,
        #[arg(long, default_value_t = 0)]
        tax_percent: u32,
        #[arg(long)]
        duration_days: u32,
        #[arg(long)]
        booking_limit: u32,
        #[arg(long)]
        description: Option<String>,
    },
    /// List clinics with their current subscription
    ListClinics,
    /// Show medication doses due now without sending anything
    DueReminders {
        /// Window in minutes (default: REMINDER_WINDOW_MINUTES)
        #[arg(long)]
        window_minutes: Option<u32>,
    },
}

fn env_u32(name: &str, default: u32) -> anyhow::Result<u32> {
    Ok(u32_from_env_value(name, std::env::var(name).ok(), default)?)
}

fn data_dir() -> PathBuf {
    std::env::var("CLINIC_DATA_DIR")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR))
}

fn open_store(dir: &Path) -> anyhow::Result<Store> {
    Store::open(dir).with_context(|| format!("opening store in {}", dir.display()))
}

/// Tenant ids each role's token must carry.
fn token_scope(
    role: Role,
    clinic_id: Option<RecordId>,
    branch_id: Option<RecordId>,
    doctor_id: Option<RecordId>,
) -> anyhow::Result<Scope> {
    match role {
        Role::SuperAdmin => {}
        Role::Clinic => anyhow::ensure!(
            clinic_id.is_some(),
            "--clinic-id is required for clinic tokens"
        ),
        Role::Branch => anyhow::ensure!(
            clinic_id.is_some() && branch_id.is_some(),
            "--clinic-id and --branch-id are required for branch tokens"
        ),
        Role::Doctor => anyhow::ensure!(
            clinic_id.is_some() && doctor_id.is_some(),
            "--clinic-id and --doctor-id are required for doctor tokens"
        ),
    }
    Ok(Scope {
        clinic_id,
        branch_id,
        doctor_id,
    })
}

fn seed_plan(store: Store, input: PlanCreate, now: DateTime<Utc>) -> anyhow::Result<Plan> {
    let plans = CrudService::<Plan>::new(Arc::new(store));
    Ok(plans.create(input, now, |_| true)?)
}

fn clinic_lines(store: &Store, now: DateTime<Utc>) -> anyhow::Result<Vec<String>> {
    let lines: Vec<String> = store.read(|ds| {
        ds.clinics
            .live()
            .map(|clinic| {
                let subscription = match current_subscription(ds, clinic.id, now) {
                    Some(s) => format!(
                        "{:?} until {}, {} bookings left",
                        s.kind,
                        s.expires_at.map(|e| e.to_rfc3339()).unwrap_or_default(),
                        s.remaining_bookings
                    ),
                    None => "no active subscription".to_string(),
                };
                format!("ID: {}, Name: {}, Subscription: {}", clinic.id, clinic.name, subscription)
            })
            .collect()
    })?;
    Ok(lines)
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let now = Utc::now();

    match cli.command {
        Some(Commands::IssueToken {
            role,
            clinic_id,
            branch_id,
            doctor_id,
            subject,
            ttl_hours,
        }) => {
            let secret =
                std::env::var("AUTH_TOKEN_SECRET").context("AUTH_TOKEN_SECRET must be set")?;
            let ttl_hours = match ttl_hours {
                Some(hours) => hours,
                None => env_u32("AUTH_TOKEN_TTL_HOURS", DEFAULT_TOKEN_TTL_HOURS)?,
            };
            let tokens = TokenConfig::new(&secret, ttl_hours)?;
            let scope = token_scope(role, clinic_id, branch_id, doctor_id)?;
            let claims = Claims::new(subject, role, scope, now, tokens.ttl_hours());
            println!("{}", tokens.codec().issue(&claims)?);
        }
        Some(Commands::SeedPlan {
            name,
            price,
            tax_percent,
            duration_days,
            booking_limit,
            description,
        }) => {
            let input = PlanCreate {
                name: NonEmptyText::new(name)?,
                description,
                price,
                tax_percent,
                duration_days,
                booking_limit,
            };
            let plan = seed_plan(open_store(&data_dir())?, input, now)?;
            println!("Created plan {} ({})", plan.name, plan.id);
        }
        Some(Commands::ListClinics) => {
            let lines = clinic_lines(&open_store(&data_dir())?, now)?;
            if lines.is_empty() {
                println!("No clinics found.");
            }
            for line in lines {
                println!("{line}");
            }
        }
        Some(Commands::DueReminders { window_minutes }) => {
            let window = match window_minutes {
                Some(minutes) => minutes,
                None => env_u32("REMINDER_WINDOW_MINUTES", DEFAULT_REMINDER_WINDOW_MINUTES)?,
            };
            let store = open_store(&data_dir())?;
            let due = store.read(|ds| due_doses(ds, now, window))?;
            if due.is_empty() {
                println!("No reminders due in the next {window} minutes.");
            }
            for dose in due {
                println!(
                    "{} {} {} ({}) for {} <{}>",
                    dose.scheduled_for, dose.prescription_id, dose.medication, dose.dosage,
                    dose.patient_name, dose.phone
                );
            }
        }
        None => {
            println!("Use --help for usage");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_clinic_token_requires_clinic_id() {
        assert!(token_scope(Role::Clinic, None, None, None).is_err());
        let clinic_id = RecordId::new();
        let scope = token_scope(Role::Clinic, Some(clinic_id), None, None).unwrap();
        assert_eq!(scope, Scope::clinic(clinic_id));
        assert_eq!(token_scope(Role::SuperAdmin, None, None, None).unwrap(), Scope::global());
    }

    #[test]
    fn test_seeded_plan_persists_in_data_dir() {
        let dir = TempDir::new().unwrap();
        let input = PlanCreate {
            name: NonEmptyText::new("Clinic Pro").unwrap(),
            description: None,
            price: 249900,
            tax_percent: 18,
            duration_days: 90,
            booking_limit: 500,
        };

        let plan = seed_plan(open_store(dir.path()).unwrap(), input, Utc::now()).unwrap();

        let reopened = open_store(dir.path()).unwrap();
        let stored = reopened.read(|ds| ds.plans.get(plan.id).cloned()).unwrap();
        assert_eq!(stored, Some(plan));
        assert!(clinic_lines(&reopened, Utc::now()).unwrap().is_empty());
    }
}
