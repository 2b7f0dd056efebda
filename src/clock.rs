/*!
    Time sources and drift correction of the master clock against the distributed clock.

    When distributed clocks (DC) are used, the first DC-capable slave (the *reference*) provides the bus time and every other slave is synchronized to it by the master. The master itself must follow the reference clock too, otherwise its frames drift relatively to the slaves sync pulses. This is the purpose of [DriftFilter]: it disciplines a local time base so that the master notion of *now* tracks the reference clock.

    ## control loop

    Each cycle provides a raw sample: the difference between the master application time and the reference clock time (32 bits, the native width of the slaves clocks). The filter

    - normalizes the sample in `[-period/2, period/2)` so that differences wrapping at period boundaries are not ambiguous
    - waits for the first non-zero sample before starting
    - averages samples over a window of `N` cycles and adds the rounded average delta plus the sign of the average difference to a cumulative adjustment, clamped to ±[ADJUST_LIMIT] ns
    - every cycle shifts the time base by the cumulative adjustment plus a small proportional step toward the reference

    Raw samples are noisy (frame jitter, scheduling latency), averaging before applying the bulk of the correction avoids chasing noise while the proportional step keeps the convergence responsive. The clamp bounds the slew rate so that no single sample produces a visible jump.
*/

use core::sync::atomic::{AtomicI64, Ordering::*};

/// default number of samples averaged before adjusting the time base
pub const DEFAULT_FILTER_WINDOW: u32 = 1000;
/// bound of the cumulative adjustment (ns), 0.1% of a 1ms cycle
pub const ADJUST_LIMIT: i64 = 1000;
/// proportional step applied every cycle toward the reference (ns)
pub const PROPORTIONAL_STEP: i64 = 5;

pub const NANOSECONDS_PER_SECOND: i64 = 1_000_000_000;


/// source of wall clock time in nanoseconds
pub trait Clock {
    fn now(&self) -> i64;
}

/// `CLOCK_REALTIME` of the operating system
#[derive(Copy, Clone, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    #[cfg(target_os = "linux")]
    fn now(&self) -> i64 {
        let mut time = libc::timespec {tv_sec: 0, tv_nsec: 0};
        // cannot fail with a valid clock id and pointer
        unsafe { libc::clock_gettime(libc::CLOCK_REALTIME, &mut time) };
        time.tv_sec as i64 * NANOSECONDS_PER_SECOND + time.tv_nsec as i64
    }
    #[cfg(not(target_os = "linux"))]
    fn now(&self) -> i64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|elapsed| elapsed.as_nanos() as i64)
            .unwrap_or(0)
    }
}

/**
    clock advancing by a fixed step at each reading

    Useful to drive the timers deterministically, a busy-polling loop on this clock always terminates.
*/
#[derive(Debug, Default)]
pub struct ManualClock {
    time: AtomicI64,
    step: AtomicI64,
}
impl ManualClock {
    pub fn new(start: i64, step: i64) -> Self {
        Self {time: AtomicI64::new(start), step: AtomicI64::new(step)}
    }
    pub fn set(&self, time: i64)  {self.time.store(time, SeqCst)}
    pub fn advance(&self, duration: i64)  {self.time.fetch_add(duration, SeqCst);}
    pub fn set_step(&self, step: i64)  {self.step.store(step, SeqCst)}
    /// time without advancing
    pub fn peek(&self) -> i64  {self.time.load(SeqCst)}
}
impl Clock for ManualClock {
    fn now(&self) -> i64 {
        self.time.fetch_add(self.step.load(SeqCst), SeqCst)
    }
}
impl<C: Clock + ?Sized> Clock for std::sync::Arc<C> {
    fn now(&self) -> i64  {(**self).now()}
}


/// bring a clock difference back in `[-period/2, period/2)`
pub fn normalize_diff(diff: i64, period: i64) -> i64 {
    let half = period / 2;
    (diff + half).rem_euclid(period) - half
}

fn sign(value: i64) -> i64  {value.signum()}


/**
    state of the master clock drift correction, see the [module documentation](self)

    This is the only per-cycle mutable state of the clock synchronization. It is explicitly initialized by [Self::new] and never reset afterward.
*/
#[derive(Clone, Debug)]
pub struct DriftFilter {
    window: u32,
    /// last raw sample
    sample: i32,
    /// raw sample of the previous cycle
    previous: i32,
    /// last normalized difference
    diff: i64,
    diff_total: i64,
    delta_total: i64,
    samples: u32,
    /// cumulative adjustment, in `[-ADJUST_LIMIT, ADJUST_LIMIT]`
    adjust: i64,
    started: bool,
    start_time: u64,
    /// offset subtracted from the raw clock to get the disciplined time
    time_base: i64,
}

impl Default for DriftFilter {
    fn default() -> Self  {Self::new(DEFAULT_FILTER_WINDOW)}
}

impl DriftFilter {
    /// new filter averaging over `window` cycles (at least 1)
    pub fn new(window: u32) -> Self {
        Self {
            window: window.max(1),
            sample: 0,
            previous: 0,
            diff: 0,
            diff_total: 0,
            delta_total: 0,
            samples: 0,
            adjust: 0,
            started: false,
            start_time: 0,
            time_base: 0,
        }
    }

    /// record the raw difference `application time - reference time` of this cycle
    pub fn push(&mut self, sample: i32) {
        self.sample = sample;
    }

    /// run one step of the control loop with the last pushed sample
    pub fn update(&mut self, period: i64, application_time: u64) {
        let delta = i64::from(self.sample.wrapping_sub(self.previous));
        self.previous = self.sample;
        self.diff = normalize_diff(self.sample.into(), period);

        if ! self.started {
            self.started = self.diff != 0;
            if self.started
                {self.start_time = application_time}
            return;
        }

        self.diff_total += self.diff;
        self.delta_total += delta;
        self.samples += 1;

        if self.samples >= self.window {
            let window = i64::from(self.window);
            // rounded average of the deltas
            self.adjust += (self.delta_total + window / 2) / window;
            // pull in the steady drift
            self.adjust += sign(self.diff_total / window);
            self.adjust = self.adjust.clamp(-ADJUST_LIMIT, ADJUST_LIMIT);

            self.diff_total = 0;
            self.delta_total = 0;
            self.samples = 0;
        }
        self.time_base += self.adjust + PROPORTIONAL_STEP * sign(self.diff);
    }

    pub fn window(&self) -> u32  {self.window}
    /// last normalized difference
    pub fn diff(&self) -> i64  {self.diff}
    pub fn adjust(&self) -> i64  {self.adjust}
    /// number of samples accumulated in the current window
    pub fn samples(&self) -> u32  {self.samples}
    pub fn started(&self) -> bool  {self.started}
    /// application time of the first non-zero sample
    pub fn start_time(&self) -> u64  {self.start_time}
    pub fn time_base(&self) -> i64  {self.time_base}
}


#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng, rngs::StdRng};

    const PERIOD: i64 = 1_000_000;

    #[rstest::rstest]
    #[case(0, 0)]
    #[case(2000, 2000)]
    #[case(-2000, -2000)]
    #[case(PERIOD / 2, -PERIOD / 2)]
    #[case(-PERIOD / 2, -PERIOD / 2)]
    #[case(PERIOD + 3, 3)]
    #[case(-3 * PERIOD - 7, -7)]
    fn normalization(#[case] diff: i64, #[case] expected: i64) {
        assert_eq!(normalize_diff(diff, PERIOD), expected);
    }

    #[test]
    fn normalization_range_and_fixed_point() {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        for _ in 0 .. 10_000 {
            let period = rng.gen_range(1 .. 10_000_000i64) * 2;
            let diff = rng.gen_range(i64::from(i32::MIN) .. i64::from(i32::MAX));
            let normalized = normalize_diff(diff, period);
            assert!(normalized >= -period/2 && normalized < period/2, "{} -> {} for {}", diff, normalized, period);
            assert_eq!(normalize_diff(normalized, period), normalized);
        }
    }

    #[test]
    fn waits_for_first_nonzero_sample() {
        let mut filter = DriftFilter::new(1000);
        for cycle in 0 .. 1000 {
            filter.push(0);
            filter.update(PERIOD, cycle);
        }
        assert!(! filter.started());
        assert_eq!(filter.adjust(), 0);
        assert_eq!(filter.time_base(), 0);

        // the starting sample is not accumulated, the window closes on the 1001st sample
        for cycle in 0 .. 1000 {
            filter.push(2000);
            filter.update(PERIOD, 5000 + cycle);
            assert!(filter.started());
            assert_eq!(filter.adjust(), 0);
        }
        assert_eq!(filter.start_time(), 5000);
        assert_eq!(filter.samples(), 999);

        filter.push(2000);
        filter.update(PERIOD, 6000);
        // null average delta, positive average difference
        assert_eq!(filter.adjust(), 1);
        assert_eq!(filter.samples(), 0);
        assert!(filter.adjust() <= ADJUST_LIMIT);
    }

    #[test]
    fn proportional_step_every_started_cycle() {
        let mut filter = DriftFilter::new(10);
        filter.push(-300);
        filter.update(PERIOD, 0);
        assert_eq!(filter.time_base(), 0);
        for _ in 0 .. 5 {
            filter.push(-300);
            filter.update(PERIOD, 0);
        }
        assert_eq!(filter.adjust(), 0);
        assert_eq!(filter.time_base(), -5 * PROPORTIONAL_STEP);
    }

    #[test]
    fn rounded_delta_average() {
        let mut filter = DriftFilter::new(4);
        filter.push(1);
        filter.update(PERIOD, 0);
        // deltas 100, 0, 0, 0 average to 25, plus the sign of the differences
        for sample in [101, 101, 101, 101] {
            filter.push(sample);
            filter.update(PERIOD, 0);
        }
        assert_eq!(filter.adjust(), 26);
    }

    #[test]
    fn adjustment_is_clamped() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut filter = DriftFilter::new(8);
        for _ in 0 .. 100_000 {
            let sample = if rng.gen_bool(0.5)  {rng.gen::<i32>()}
                         else  {rng.gen_range(-2_000_000 .. 2_000_000)};
            filter.push(sample);
            filter.update(PERIOD, 0);
            assert!(filter.adjust().abs() <= ADJUST_LIMIT);
        }
        // monotonic ramp drives the adjustment to its bound
        let mut filter = DriftFilter::new(8);
        for i in 0 .. 10_000i32 {
            filter.push(i.wrapping_mul(400_000));
            filter.update(PERIOD, 0);
            assert!(filter.adjust().abs() <= ADJUST_LIMIT);
        }
    }

    #[test]
    fn manual_clock_advances_per_reading() {
        let clock = ManualClock::new(100, 10);
        assert_eq!(clock.now(), 100);
        assert_eq!(clock.now(), 110);
        clock.advance(1000);
        assert_eq!(clock.peek(), 1120);
        assert!(SystemClock.now() > 0);
    }
}
