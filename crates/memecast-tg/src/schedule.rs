//! Periodic jobs driven by cron expressions.
//!
//! Every job runs in its own loop, so a job never overlaps with itself. The
//! global broadcast is additionally guarded by the broadcaster itself, because
//! it may also be triggered manually by an admin.

use crate::broadcast::{Audience, BatchOutcome, Broadcaster, PostSelector};
use crate::error::fatal;
use crate::ingest::Ingestor;
use crate::prelude::*;
use crate::Result;
use chrono::prelude::*;
use chrono_tz::Tz;
use futures::future::BoxFuture;
use futures::prelude::*;
use serde::Deserialize;
use std::str::FromStr;
use std::sync::Arc;

#[derive(Deserialize, Clone)]
pub(crate) struct Config {
    /// Cron expression with seconds: `sec min hour day month weekday [year]`
    #[serde(default = "default_broadcast_cron")]
    pub(crate) broadcast_cron: String,

    #[serde(default = "default_ingest_cron")]
    pub(crate) ingest_cron: String,

    /// IANA name of the time zone the cron expressions are evaluated in
    #[serde(default = "default_schedule_timezone")]
    pub(crate) schedule_timezone: String,
}

fn default_broadcast_cron() -> String {
    // Every hour from 8:00 to 23:00
    "0 0 8-23 * * *".to_owned()
}

fn default_ingest_cron() -> String {
    "0 0 6 * * *".to_owned()
}

fn default_schedule_timezone() -> String {
    "UTC".to_owned()
}

type JobAction = Arc<dyn Fn() -> BoxFuture<'static, Result> + Send + Sync>;

struct Job {
    name: &'static str,
    schedule: cron::Schedule,
    action: JobAction,
}

pub(crate) struct Scheduler {
    timezone: Tz,
    jobs: Vec<Job>,
}

fn parse_schedule(expr: &str) -> Result<cron::Schedule> {
    cron::Schedule::from_str(expr).map_err(|err| fatal!("Invalid cron expression `{expr}`: {err}"))
}

fn parse_timezone(name: &str) -> Result<Tz> {
    name.parse::<Tz>()
        .map_err(|err| fatal!("Invalid time zone `{name}`: {err}"))
}

/// The closest moment strictly after `now` that matches the schedule in the
/// given time zone.
fn next_run(schedule: &cron::Schedule, timezone: Tz, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    schedule
        .after(&now.with_timezone(&timezone))
        .next()
        .map(|next| next.with_timezone(&Utc))
}

impl Scheduler {
    pub(crate) fn new(
        config: &Config,
        broadcaster: Arc<Broadcaster>,
        ingestor: Arc<Ingestor>,
    ) -> Result<Self> {
        let broadcast: JobAction = Arc::new(move || {
            let broadcaster = broadcaster.clone();
            async move { scheduled_broadcast(&broadcaster).await }.boxed()
        });

        let ingest: JobAction = Arc::new(move || {
            let ingestor = ingestor.clone();
            async move { ingestor.incremental().await.map(drop) }.boxed()
        });

        let jobs = vec![
            Job {
                name: "broadcast",
                schedule: parse_schedule(&config.broadcast_cron)?,
                action: broadcast,
            },
            Job {
                name: "ingest",
                schedule: parse_schedule(&config.ingest_cron)?,
                action: ingest,
            },
        ];

        Ok(Self {
            timezone: parse_timezone(&config.schedule_timezone)?,
            jobs,
        })
    }

    /// Runs the jobs forever
    pub(crate) async fn run(self) {
        let timezone = self.timezone;

        info!(%timezone, jobs = self.jobs.len(), "Starting the scheduler");

        future::join_all(self.jobs.into_iter().map(|job| run_job(job, timezone))).await;
    }
}

async fn run_job(job: Job, timezone: Tz) {
    let span = info_span!("job", name = job.name);

    async move {
        loop {
            let now = Utc::now();

            let Some(next) = next_run(&job.schedule, timezone, now) else {
                warn!("The schedule has no upcoming runs, stopping the job");
                return;
            };

            debug!(%next, "Waiting for the next run");

            let delay = (next - now).to_std().unwrap_or_default();
            tokio::time::sleep(delay).await;

            let result = (job.action)().with_duration_log("Scheduled job finished").await;

            if let Err(err) = result {
                error!(err = tracing_err(&err), "Scheduled job failed");
            }
        }
    }
    .instrument(span)
    .await
}

async fn scheduled_broadcast(broadcaster: &Broadcaster) -> Result {
    let outcome = broadcaster
        .broadcast(PostSelector::Random, Audience::Subscribers)
        .await?;

    match outcome {
        BatchOutcome::Completed(report) => {
            debug!(?report, "Scheduled broadcast completed");
        }
        BatchOutcome::NoContent | BatchOutcome::NoRecipients | BatchOutcome::AlreadyRunning => {
            info!(?outcome, "Scheduled broadcast didn't deliver anything");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use expect_test::{expect, Expect};

    #[track_caller]
    fn assert_next_runs(expr: &str, timezone: &str, now: &str, expected: Expect) {
        let schedule = parse_schedule(expr).unwrap();
        let timezone = parse_timezone(timezone).unwrap();
        let mut now: DateTime<Utc> = now.parse().unwrap();

        let runs: Vec<_> = (0..3)
            .map(|_| {
                now = next_run(&schedule, timezone, now).unwrap();
                now.to_rfc3339()
            })
            .collect();

        expected.assert_eq(&runs.join("\n"));
    }

    #[test]
    fn default_broadcast_schedule_skips_the_night() {
        assert_next_runs(
            &default_broadcast_cron(),
            "UTC",
            "2026-10-16T22:30:00Z",
            expect![[r#"
                2026-10-16T23:00:00+00:00
                2026-10-17T08:00:00+00:00
                2026-10-17T09:00:00+00:00"#]],
        );
    }

    #[test]
    fn schedule_is_evaluated_in_the_configured_timezone() {
        // Berlin is UTC+2 in the middle of October
        assert_next_runs(
            &default_ingest_cron(),
            "Europe/Berlin",
            "2026-10-16T03:59:59Z",
            expect![[r#"
                2026-10-16T04:00:00+00:00
                2026-10-17T04:00:00+00:00
                2026-10-18T04:00:00+00:00"#]],
        );
    }

    #[test]
    fn invalid_config_is_rejected() {
        let err = parse_schedule("every hour").unwrap_err();
        assert!(err.to_string().contains("Invalid cron expression `every hour`"));

        let err = parse_timezone("Mars/Olympus").unwrap_err();
        assert!(err.to_string().contains("Invalid time zone `Mars/Olympus`"));
    }
}
