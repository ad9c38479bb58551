use tokio::sync::broadcast;
use tokio::time::{sleep, Duration};
use tracing::{error, info};

/// Target attached to every record the emitter produces, so a subscriber can
/// separate demo records from the process's own diagnostics.
pub const RECORD_TARGET: &str = "logdemo::records";

pub const DEFAULT_APP: &str = "logdemo";
pub const INFO_MESSAGE: &str = "Regular application log";
pub const ERROR_MESSAGE: &str = "Something went wrong";

#[derive(Clone, Debug)]
pub struct EmitterConfig {
    /// Value of the `app` field on every record.
    pub app: String,
    /// Pause between the end of one iteration and the start of the next.
    pub interval: Duration,
    /// An error record follows the info record on every `error_every`-th
    /// iteration. Zero disables error records.
    pub error_every: u64,
    pub info_message: String,
    pub error_message: String,
}

impl Default for EmitterConfig {
    fn default() -> Self {
        Self {
            app: DEFAULT_APP.to_string(),
            interval: Duration::from_secs(2),
            error_every: 3,
            info_message: INFO_MESSAGE.to_string(),
            error_message: ERROR_MESSAGE.to_string(),
        }
    }
}

/// Outcome of a single iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    pub count: u64,
    pub errored: bool,
}

/// Fixed-cadence record producer.
///
/// Owns the iteration counter exclusively. Records go out through the
/// `tracing` macros, so whichever subscriber is in scope receives them.
pub struct Emitter {
    config: EmitterConfig,
    counter: u64,
}

impl Emitter {
    pub fn new(config: EmitterConfig) -> Self {
        Emitter { config, counter: 0 }
    }

    pub fn count(&self) -> u64 {
        self.counter
    }

    /// Run one iteration: always an info record, plus an error record with
    /// the same `count` on every `error_every`-th iteration.
    pub fn tick(&mut self) -> Tick {
        self.counter += 1;
        let count = self.counter;
        let app = self.config.app.as_str();

        info!(target: RECORD_TARGET, count, app, "{}", self.config.info_message);

        let errored = self.config.error_every > 0 && count % self.config.error_every == 0;
        if errored {
            error!(target: RECORD_TARGET, count, app, "{}", self.config.error_message);
        }

        Tick { count, errored }
    }

    /// Emit until `shutdown` fires, sleeping `interval` between iterations.
    ///
    /// Returns the number of completed iterations. A closed or lagged
    /// shutdown channel also stops the loop.
    pub async fn run(&mut self, mut shutdown: broadcast::Receiver<()>) -> u64 {
        loop {
            self.tick();
            tokio::select! {
                _ = shutdown.recv() => break,
                _ = sleep(self.config.interval) => {}
            }
        }
        self.counter
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shutdown::Shutdown;

    #[test]
    fn counter_starts_at_one() {
        let mut emitter = Emitter::new(EmitterConfig::default());
        assert_eq!(emitter.count(), 0);
        assert_eq!(emitter.tick(), Tick { count: 1, errored: false });
    }

    #[test]
    fn every_third_tick_errors() {
        let mut emitter = Emitter::new(EmitterConfig::default());
        let errored: Vec<u64> = (0..9)
            .map(|_| emitter.tick())
            .filter(|t| t.errored)
            .map(|t| t.count)
            .collect();
        assert_eq!(errored, vec![3, 6, 9]);
    }

    #[test]
    fn zero_disables_error_records() {
        let mut emitter = Emitter::new(EmitterConfig {
            error_every: 0,
            ..EmitterConfig::default()
        });
        assert!((0..6).all(|_| !emitter.tick().errored));
    }

    #[tokio::test(start_paused = true)]
    async fn run_sleeps_the_interval_between_iterations() {
        let shutdown = Shutdown::new();
        let rx = shutdown.subscribe();
        let task = tokio::spawn(async move {
            let mut emitter = Emitter::new(EmitterConfig::default());
            emitter.run(rx).await
        });

        // Iterations start at t=0s, 2s and 4s; the next would be at 6s.
        sleep(Duration::from_secs(5)).await;
        shutdown.trigger();
        assert_eq!(task.await.unwrap(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_coordinator_stops_the_loop() {
        let shutdown = Shutdown::new();
        let rx = shutdown.subscribe();
        drop(shutdown);
        let mut emitter = Emitter::new(EmitterConfig::default());
        assert_eq!(emitter.run(rx).await, 1);
    }
}
