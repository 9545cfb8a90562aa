use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use cron::Schedule;
use tracing::{error, info};

use crate::app::App;
use crate::messages;
use crate::telegram::Notifier;

/// Pause between the steps of one job.
const STEP_DELAY: Duration = Duration::from_secs(5);
/// Pause between consecutive alert messages.
const ALERT_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Job {
    /// sync, alerts, weekly rollups
    Morning,
    /// sync, alerts including the nutrition check
    Evening,
    /// sync, weekly rollups
    Midnight,
    WeeklySummary,
}

impl Job {
    pub const ALL: [Job; 4] = [Job::Morning, Job::Evening, Job::Midnight, Job::WeeklySummary];

    /// Six-field cron expression (seconds first), in the configured timezone.
    pub fn cron(self) -> &'static str {
        match self {
            Job::Morning => "0 0 10 * * *",
            Job::Evening => "0 0 18 * * *",
            Job::Midnight => "0 0 0 * * *",
            Job::WeeklySummary => "0 0 10 * * Sun",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Job::Morning => "Morning sync",
            Job::Evening => "Evening sync",
            Job::Midnight => "Midnight sync",
            Job::WeeklySummary => "Weekly AI summary",
        }
    }
}

pub fn parse_schedules() -> Result<Vec<(Job, Schedule)>> {
    Job::ALL
        .iter()
        .map(|job| {
            let schedule = Schedule::from_str(job.cron())
                .with_context(|| format!("Invalid cron expression '{}'", job.cron()))?;
            Ok((*job, schedule))
        })
        .collect()
}

/// Earliest fire time strictly after `after`, with every job due at that instant.
pub fn next_due(
    schedules: &[(Job, Schedule)],
    after: &DateTime<Tz>,
) -> Option<(DateTime<Tz>, Vec<Job>)> {
    let upcoming: Vec<(Job, DateTime<Tz>)> = schedules
        .iter()
        .filter_map(|(job, s)| s.after(after).next().map(|at| (*job, at)))
        .collect();
    let earliest = upcoming.iter().map(|(_, at)| *at).min()?;
    let jobs = upcoming
        .into_iter()
        .filter(|(_, at)| *at == earliest)
        .map(|(job, _)| job)
        .collect();
    Some((earliest, jobs))
}

pub struct Scheduler {
    app: App,
    notifier: Notifier,
    schedules: Vec<(Job, Schedule)>,
}

impl Scheduler {
    pub fn new(app: App, notifier: Notifier) -> Result<Self> {
        Ok(Self {
            app,
            notifier,
            schedules: parse_schedules()?,
        })
    }

    pub async fn run(self) -> Result<()> {
        let tz = self.app.tz;
        for (job, schedule) in &self.schedules {
            if let Some(next) = schedule.upcoming(tz).next() {
                info!(job = job.name(), %next, "scheduled");
            }
        }

        let mut cursor = Utc::now().with_timezone(&tz);
        loop {
            let (at, jobs) =
                next_due(&self.schedules, &cursor).context("No upcoming scheduled run")?;
            let wait = (at.with_timezone(&Utc) - Utc::now())
                .to_std()
                .unwrap_or(Duration::ZERO);
            info!(next = %at, ?jobs, wait_secs = wait.as_secs(), "waiting for next job");
            tokio::time::sleep(wait).await;

            for job in jobs {
                self.run_job(job).await;
            }
            cursor = at;
        }
    }

    /// Run one job; failures are logged and reported in chat, never propagated.
    pub async fn run_job(&self, job: Job) {
        info!(job = job.name(), "job started");
        match self.execute(job).await {
            Ok(()) => info!(job = job.name(), "job finished"),
            Err(e) => {
                error!(job = job.name(), error = %format!("{e:#}"), "job failed");
                self.notifier
                    .send(&format!("⚠️ {} failed: {e:#}", job.name()))
                    .await;
            }
        }
    }

    async fn execute(&self, job: Job) -> Result<()> {
        match job {
            Job::Morning => {
                self.sync().await?;
                tokio::time::sleep(STEP_DELAY).await;
                self.alerts(false).await?;
                tokio::time::sleep(STEP_DELAY).await;
                self.weekly().await
            }
            Job::Evening => {
                self.sync().await?;
                tokio::time::sleep(STEP_DELAY).await;
                self.alerts(true).await
            }
            Job::Midnight => {
                self.sync().await?;
                tokio::time::sleep(STEP_DELAY).await;
                self.weekly().await
            }
            Job::WeeklySummary => {
                let record = self.app.generate_summary().await?;
                self.notifier.send(&messages::format_summary(&record)).await;
                Ok(())
            }
        }
    }

    async fn sync(&self) -> Result<()> {
        let report = self.app.sync(self.app.lookback_days).await?;
        info!(
            days_updated = report.days_updated,
            start = %report.start_date,
            end = %report.end_date,
            "scheduled sync done"
        );
        Ok(())
    }

    async fn alerts(&self, check_nutrition: bool) -> Result<()> {
        let today = self.app.today();
        let alerts = self
            .app
            .call(move |svc| svc.check_alerts(today, check_nutrition))
            .await?;
        for alert in alerts {
            self.notifier.send(&alert.message).await;
            tokio::time::sleep(ALERT_DELAY).await;
        }
        Ok(())
    }

    async fn weekly(&self) -> Result<()> {
        let today = self.app.today();
        let updated = self.app.call(move |svc| svc.update_weekly(today)).await?;
        info!(weeks = updated.len(), "weekly rollups updated");
        Ok(())
    }
}
