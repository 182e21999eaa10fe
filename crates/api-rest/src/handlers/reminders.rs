use crate::error::ApiError;
use crate::extract::Caller;
use crate::state::AppState;
use api_shared::ListResponse;
use axum::extract::State;
use axum::Json;
use chrono::Utc;
use clinic_core::models::ReminderLog;
use clinic_core::services::reminders::run_reminder_poll;

#[utoipa::path(
    post,
    path = "/prescriptions/reminders/poll",
    responses(
        (status = 200, description = "`{ items, total }` of reminder logs from this poll"),
        (status = 403, description = "Caller is not an operator"),
        (status = 502, description = "Reminder webhook is not configured")
    ),
    security(("bearer" = []))
)]
/// Run one reminder poll now instead of waiting for the background interval.
#[axum::debug_handler]
pub async fn poll_reminders(
    State(state): State<AppState>,
    caller: Caller,
) -> Result<Json<ListResponse<ReminderLog>>, ApiError> {
    caller.require_all()?;
    let logs = run_reminder_poll(
        &state.store,
        state.reminders()?,
        Utc::now(),
        state.cfg.reminder_window_minutes(),
    )
    .await?;
    Ok(Json(logs.into()))
}
