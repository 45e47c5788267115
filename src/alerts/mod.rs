//! Daily alert sweep.
//!
//! Once per day the sweep re-derives every bag's status through the status
//! engine, then mails the configured recipients: red and purple bags go to
//! `mail_red` with the red template, orange bags to `mail_orange` with the
//! orange template. A bag without a recipient is silently skipped, and a
//! transport failure on one bag never aborts the rest of the batch.

use chrono::{Local, NaiveTime, Utc};
use serde::Serialize;

use crate::errors::AppError;
use crate::mailer::{render_body, render_subject};
use crate::models::{BagState, BagStatus};
use crate::AppState;

/// Outcome of one sweep.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertSweepReport {
    pub sent: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Run the sweep now. Statuses are recomputed first so the mails reflect
/// today's classification, and the snapshot cache is invalidated on the
/// way out.
pub async fn run_sweep(state: &AppState) -> Result<AlertSweepReport, AppError> {
    let today = Utc::now().date_naive();
    let changed = state.repo.recompute_statuses(today).await?;
    if changed > 0 {
        tracing::info!("Alert sweep reclassified {} bags", changed);
    }

    let bags = state.repo.list_bags().await?;
    let templates = state.repo.mail_templates().await?;
    let mut report = AlertSweepReport::default();

    for bag in &bags {
        if bag.state == BagState::Hs {
            continue;
        }

        let (recipient, subject, body) = match bag.status {
            BagStatus::Red | BagStatus::Purple => {
                (&bag.mail_red, &templates.red_subject, &templates.red_body)
            }
            BagStatus::Orange => (
                &bag.mail_orange,
                &templates.orange_subject,
                &templates.orange_body,
            ),
            BagStatus::Green => continue,
        };

        if recipient.trim().is_empty() {
            report.skipped += 1;
            continue;
        }

        let subject = render_subject(subject, bag);
        let body = render_body(body, bag);
        match state.mailer.send(recipient, &subject, &body) {
            Ok(()) => report.sent += 1,
            Err(e) => {
                tracing::warn!("Alert mail for {} failed: {}", bag.name, e);
                report.failed += 1;
            }
        }
    }

    if let Err(e) = state.cache.invalidate().await {
        tracing::warn!("Snapshot rebuild after alert sweep failed: {}", e);
    }

    tracing::info!(
        "Alert sweep done: {} sent, {} skipped, {} failed",
        report.sent,
        report.skipped,
        report.failed
    );
    Ok(report)
}

/// Install the daily background task firing at the configured local hour.
pub fn spawn_daily(state: AppState, hour: u32) {
    tokio::spawn(async move {
        loop {
            let delay = until_next_occurrence(hour);
            tokio::time::sleep(delay).await;
            if let Err(e) = run_sweep(&state).await {
                tracing::error!("Daily alert sweep failed: {}", e);
            }
        }
    });
}

/// Duration until the next local occurrence of `hour`:00.
fn until_next_occurrence(hour: u32) -> std::time::Duration {
    let now = Local::now();
    let fire_at = NaiveTime::from_hms_opt(hour, 0, 0).unwrap_or(NaiveTime::MIN);
    let mut next = now.date_naive().and_time(fire_at);
    if next <= now.naive_local() {
        next += chrono::Duration::days(1);
    }
    (next - now.naive_local())
        .to_std()
        .unwrap_or(std::time::Duration::from_secs(60))
}
