use crate::Error;
use cron::Schedule;
use std::{
    str::FromStr,
    sync::{atomic::AtomicBool, Arc},
    thread::JoinHandle,
    time::Duration,
};

/// Periodically invokes a callback until stopped.
///
/// The engine only relies on this contract, so any trigger source can stand
/// in for the cron-driven implementation below.
pub trait Scheduler {
    /// Stops the trigger and waits for an in-flight callback to finish
    fn stop(&mut self);
}

#[derive(Clone, Debug, Default)]
struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    fn send(&self) {
        self.0.store(true, std::sync::atomic::Ordering::Release);
    }

    fn is_stopped(&self) -> bool {
        self.0.load(std::sync::atomic::Ordering::Acquire)
    }
}

/// Parses a cron expression; the seconds field is optional
pub fn parse_schedule(expression: &str) -> crate::Result<Schedule> {
    match Schedule::from_str(expression) {
        Ok(schedule) => Ok(schedule),
        Err(_) => Schedule::from_str(&format!("0 {expression}"))
            .map_err(Error::InvalidMergeSchedule),
    }
}

/// Fires a callback on a background thread at every occurrence of a cron
/// schedule
pub struct CronScheduler {
    stop_signal: StopSignal,
    thread: Option<JoinHandle<()>>,
}

impl CronScheduler {
    /// Spawns the trigger thread
    pub fn start<F: Fn() + Send + 'static>(schedule: Schedule, callback: F) -> Self {
        let stop_signal = StopSignal::default();
        let thread_stop_signal = stop_signal.clone();

        let thread = std::thread::spawn(move || run(&schedule, &thread_stop_signal, &callback));

        Self {
            stop_signal,
            thread: Some(thread),
        }
    }
}

impl Scheduler for CronScheduler {
    fn stop(&mut self) {
        self.stop_signal.send();

        if let Some(thread) = self.thread.take() {
            // The trigger thread may be the one tearing the engine down (it
            // held the last handle); it exits once the callback returns, so
            // it must not join itself
            if thread.thread().id() == std::thread::current().id() {
                return;
            }

            if thread.join().is_err() {
                log::error!("merge trigger thread panicked");
            }
        }
    }
}

fn run<F: Fn()>(schedule: &Schedule, stop_signal: &StopSignal, callback: &F) {
    loop {
        let Some(next) = schedule.upcoming(chrono::Utc).next() else {
            log::debug!("merge trigger: schedule has no upcoming occurrence");
            return;
        };

        // Sleep in small slices so a stop request is honored promptly
        loop {
            if stop_signal.is_stopped() {
                return;
            }

            let now = chrono::Utc::now();
            if now >= next {
                break;
            }

            let remaining = (next - now)
                .to_std()
                .unwrap_or(Duration::ZERO)
                .min(Duration::from_millis(250));
            std::thread::sleep(remaining);
        }

        log::trace!("merge trigger: firing");
        callback();
    }
}
