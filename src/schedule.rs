//! Repeated work for plugins.
//!
//! A scheduled plugin runs its unit of work, then waits either a fixed duration or until the next
//! occurrence of a cron expression, and repeats until stopped. Stopping is cooperative: the flag
//! is checked after each run and after each wait, so a plugin always runs at least once and never
//! runs again once the wait it was in has completed.

use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, error};

use crate::Error;
use crate::consts;
use crate::context::Ready;

/// Schedule settings as written in a plugin's configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScheduleConfig {
    /// A crontab expression, with either 5 fields or 6-7 fields including seconds.
    pub cron_config: Option<String>,
    /// The fixed time to wait between runs when no cron expression is set.
    #[serde(default, with = "humantime_serde")]
    pub wait: Option<Duration>,
}

impl ScheduleConfig {
    /// Builds the schedule. See [`Schedule::from_config`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSchedule`] if the cron expression can't be parsed.
    pub fn schedule(&self) -> Result<Schedule, Error> {
        Schedule::from_config(self.cron_config.as_deref(), self.wait)
    }
}

/// When a scheduled plugin runs next.
#[derive(Debug, Clone)]
pub enum Schedule {
    /// Wait a fixed duration after each run.
    Every(Duration),
    /// Wait until the next occurrence of a cron expression.
    Cron(Box<cron::Schedule>),
}

impl Default for Schedule {
    fn default() -> Self {
        Schedule::Every(consts::DEFAULT_LOOP_WAIT)
    }
}

impl Schedule {
    /// Builds a schedule from a cron expression, falling back to a fixed wait.
    ///
    /// Five-field expressions are read as standard crontab entries firing at second zero. With
    /// neither a cron expression nor a wait, the schedule runs every 30 seconds.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSchedule`] if the cron expression can't be parsed.
    pub fn from_config(cron: Option<&str>, wait: Option<Duration>) -> Result<Schedule, Error> {
        let Some(expression) = cron.map(str::trim).filter(|e| !e.is_empty()) else {
            return Ok(Schedule::Every(wait.unwrap_or(consts::DEFAULT_LOOP_WAIT)));
        };

        let normalized = if expression.split_whitespace().count() == 5 {
            format!("0 {expression}")
        } else {
            expression.to_string()
        };

        let schedule =
            cron::Schedule::from_str(&normalized).map_err(|source| Error::InvalidSchedule {
                expression: expression.to_string(),
                source,
            })?;

        Ok(Schedule::Cron(Box::new(schedule)))
    }

    /// Returns how long to wait from `now` until the next run.
    ///
    /// A cron expression with no upcoming occurrence falls back to the default wait.
    #[must_use]
    pub fn until_next(&self, now: DateTime<Utc>) -> Duration {
        match self {
            Schedule::Every(wait) => *wait,
            Schedule::Cron(schedule) => schedule
                .after(&now)
                .next()
                .and_then(|next| (next - now).to_std().ok())
                .unwrap_or(consts::DEFAULT_LOOP_WAIT),
        }
    }
}

/// The running flag of a scheduled plugin.
#[derive(Debug)]
pub struct LoopState {
    running: AtomicBool,
}

impl Default for LoopState {
    fn default() -> Self {
        LoopState::new()
    }
}

impl LoopState {
    /// Creates a state that is running.
    #[must_use]
    pub const fn new() -> Self {
        LoopState {
            running: AtomicBool::new(true),
        }
    }

    /// Asks the loop to exit at its next check.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Returns true until [`LoopState::stop`] is called.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// Capability for plugins that repeat work on a schedule.
#[async_trait]
pub trait Scheduled: Send + Sync {
    /// Returns the plugin's schedule.
    fn schedule(&self) -> &Schedule;

    /// Returns the plugin's running flag.
    fn state(&self) -> &LoopState;

    /// Runs once, after the host is ready and before the first run.
    async fn loop_preconfig(&self) -> Result<(), Error> {
        Ok(())
    }

    /// Runs one unit of work.
    async fn execute(&self) -> Result<(), Error> {
        Err(Error::NotImplemented { hook: "execute" })
    }
}

/// Drives `plugin` until its state is stopped.
///
/// Errors from [`Scheduled::execute`] are logged and the loop continues.
pub async fn run(name: &str, plugin: &dyn Scheduled, mut ready: Ready) {
    ready.wait().await;

    if let Err(err) = plugin.loop_preconfig().await {
        error!(plugin = %name, %err, "loop preconfig failed");
    }

    loop {
        if let Err(err) = plugin.execute().await {
            error!(plugin = %name, %err, "loop execution failed");
        }

        if !plugin.state().is_running() {
            break;
        }

        let wait = plugin.schedule().until_next(Utc::now());

        debug!(plugin = %name, ?wait, "waiting for next run");
        tokio::time::sleep(wait).await;

        if !plugin.state().is_running() {
            break;
        }
    }

    debug!(plugin = %name, "loop stopped");
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;

    use chrono::TimeZone;

    use super::*;

    struct Counter {
        schedule: Schedule,
        state: LoopState,
        runs: AtomicUsize,
        fail: bool,
    }

    impl Counter {
        fn new(wait: Duration) -> Self {
            Counter {
                schedule: Schedule::Every(wait),
                state: LoopState::new(),
                runs: AtomicUsize::new(0),
                fail: false,
            }
        }

        fn runs(&self) -> usize {
            self.runs.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Scheduled for Counter {
        fn schedule(&self) -> &Schedule {
            &self.schedule
        }

        fn state(&self) -> &LoopState {
            &self.state
        }

        async fn execute(&self) -> Result<(), Error> {
            self.runs.fetch_add(1, Ordering::SeqCst);

            if self.fail {
                Err(Error::NoStorage)
            } else {
                Ok(())
            }
        }
    }

    struct Unimplemented(Schedule, LoopState);

    impl Scheduled for Unimplemented {
        fn schedule(&self) -> &Schedule {
            &self.0
        }

        fn state(&self) -> &LoopState {
            &self.1
        }
    }

    fn ready() -> Ready {
        let (tx, ready) = Ready::channel();
        tx.send(true).unwrap();

        ready
    }

    #[test]
    fn defaults_to_fixed_wait() {
        assert!(matches!(
            Schedule::from_config(None, None).unwrap(),
            Schedule::Every(wait) if wait == Duration::from_secs(30)
        ));
        assert!(matches!(
            Schedule::from_config(Some(" "), Some(Duration::from_secs(5))).unwrap(),
            Schedule::Every(wait) if wait == Duration::from_secs(5)
        ));
    }

    #[test]
    fn five_field_cron_fires_on_the_minute() {
        let schedule = Schedule::from_config(Some("*/5 * * * *"), None).unwrap();
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 1, 30).unwrap();

        assert_eq!(schedule.until_next(now), Duration::from_secs(210));
    }

    #[test]
    fn cron_with_seconds_is_accepted() {
        let schedule = Schedule::from_config(Some("15 * * * * *"), None).unwrap();
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();

        assert_eq!(schedule.until_next(now), Duration::from_secs(15));
    }

    #[test]
    fn invalid_cron_is_an_error() {
        assert!(matches!(
            Schedule::from_config(Some("every tuesday"), None),
            Err(Error::InvalidSchedule { expression, .. }) if expression == "every tuesday"
        ));
    }

    #[tokio::test]
    async fn runs_once_even_when_already_stopped() {
        let counter = Counter::new(Duration::from_secs(3600));
        counter.state.stop();

        run("counter", &counter, ready()).await;

        assert_eq!(counter.runs(), 1);
    }

    #[tokio::test]
    async fn stops_after_the_current_wait() {
        let counter = Arc::new(Counter::new(Duration::from_millis(20)));
        let task = {
            let counter = counter.clone();
            tokio::spawn(async move { run("counter", counter.as_ref(), ready()).await })
        };

        tokio::time::sleep(Duration::from_millis(70)).await;
        counter.state.stop();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();

        let runs = counter.runs();
        assert!(runs >= 2);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(counter.runs(), runs);
    }

    #[tokio::test]
    async fn errors_do_not_stop_the_loop() {
        let mut counter = Counter::new(Duration::from_millis(5));
        counter.fail = true;
        let counter = Arc::new(counter);
        let task = {
            let counter = counter.clone();
            tokio::spawn(async move { run("counter", counter.as_ref(), ready()).await })
        };

        tokio::time::sleep(Duration::from_millis(60)).await;
        counter.state.stop();
        task.await.unwrap();

        assert!(counter.runs() >= 2);
    }

    #[tokio::test]
    async fn waits_for_the_host_to_be_ready() {
        let counter = Arc::new(Counter::new(Duration::from_secs(3600)));
        let (tx, ready) = Ready::channel();
        let task = {
            let counter = counter.clone();
            tokio::spawn(async move { run("counter", counter.as_ref(), ready).await })
        };

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(counter.runs(), 0);

        counter.state.stop();
        tx.send(true).unwrap();
        task.await.unwrap();

        assert_eq!(counter.runs(), 1);
    }

    #[tokio::test]
    async fn execute_must_be_implemented() {
        let plugin = Unimplemented(Schedule::default(), LoopState::new());

        assert!(matches!(
            plugin.execute().await,
            Err(Error::NotImplemented { hook: "execute" })
        ));
    }
}
