use std::thread;
use std::time::{Duration, Instant};

/// What is left of `period` after `elapsed`; zero once the tick overran.
pub fn remaining(period: Duration, elapsed: Duration) -> Duration {
    period.saturating_sub(elapsed)
}

/// Holds a loop to a fixed rate. Each tick sleeps for whatever the work left
/// of the period; an overrun tick is followed immediately by the next one.
pub struct IntervalTimer {
    interval: Duration,
    tick_start: Instant,
    thread_name: String,
    last_fps_print: Instant,
    frames: u32,
}

impl IntervalTimer {
    pub fn new(freq_hz: u32) -> IntervalTimer {
        let cur_thread = thread::current();
        let thread_name = if let Some(name) = cur_thread.name() {
            name
        } else {
            "unnamed"
        };

        IntervalTimer {
            interval: Duration::from_secs(1) / freq_hz.max(1),
            tick_start: Instant::now(),
            thread_name: thread_name.to_string(),
            last_fps_print: Instant::now(),
            frames: 0,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn start_tick(&mut self) {
        self.tick_start = Instant::now();
    }

    /// Sleeps out the rest of the current tick and returns how long it slept.
    pub fn sleep_until_next_tick(&mut self) -> Duration {
        self.update_fps();

        let pause = remaining(self.interval, self.tick_start.elapsed());
        if pause.is_zero() {
            log::debug!("{} overran its frame period", self.thread_name);
        } else {
            thread::sleep(pause);
        }
        pause
    }

    fn update_fps(&mut self) {
        self.frames += 1;

        if self.last_fps_print.elapsed() > Duration::from_secs(1) {
            log::debug!("{} FPS: {}", self.thread_name, self.frames);
            self.frames = 0;
            self.last_fps_print = Instant::now();
        }
    }
}
