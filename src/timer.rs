/*!
    Pacing of the realtime loop and synchronization of the master clock with the bus distributed clock.

    Two timers are provided:

    - [SimpleTimer] simply sleeps one period per cycle, it fits buses without distributed clocks
    - [DcTimer] configures the slaves sync0 signals, busy-polls a disciplined clock to wake exactly at the period boundaries, and corrects that clock every cycle using the bus reference clock (see [crate::clock])

    Both are used through [Timer] and its [EthercatTimer] implementation. A cycle calls, in that order

    1. [EthercatTimer::sleep]
    2. [EthercatTimer::sync_distributed_clocks]
    3. [EthercatTimer::update_master_clock]

    after [EthercatTimer::configure_clocks] has been called once during bring-up.
*/

use crate::{
    clock::{Clock, SystemClock, DriftFilter, DEFAULT_FILTER_WINDOW},
    master::{Master, SlaveClockConfig},
    slaves::SlavesContainer,
    error::{EthercatError, EthercatResult},
    };
use core::time::Duration;
use log::{debug, info, warn, error};


pub const MICROSECONDS_PER_SECOND: u32 = 1_000_000;
/// highest cycle frequency accepted (Hz)
pub const MAX_FREQUENCY: u32 = MICROSECONDS_PER_SECOND;
/// longest cycle period accepted (µs)
pub const MAX_PERIOD: u32 = MICROSECONDS_PER_SECOND;
pub const DEFAULT_FREQUENCY: u32 = 1000;


/**
    cycle frequency and period, two views of the same quantity

    `frequency * period_microseconds == 1_000_000` within integer division. Setting one recomputes the other, an invalid value is rejected and the previous setting is kept.
*/
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Period {
    frequency: u32,
    period_us: u32,
}

impl Default for Period {
    fn default() -> Self {
        Self {frequency: DEFAULT_FREQUENCY, period_us: MICROSECONDS_PER_SECOND / DEFAULT_FREQUENCY}
    }
}

impl Period {
    pub fn from_frequency(frequency: u32) -> EthercatResult<Self> {
        let mut period = Self::default();
        period.set_frequency(frequency)?;
        Ok(period)
    }
    pub fn from_microseconds(period_us: u32) -> EthercatResult<Self> {
        let mut period = Self::default();
        period.set_period_microseconds(period_us)?;
        Ok(period)
    }

    /// set the cycle frequency in Hz
    pub fn set_frequency(&mut self, frequency: u32) -> EthercatResult {
        if frequency == 0
            {return Err(EthercatError::InvalidArgument("frequency must be positive"))}
        if frequency > MAX_FREQUENCY
            {return Err(EthercatError::InvalidArgument("frequency cannot exceed 1 MHz"))}
        self.frequency = frequency;
        self.period_us = MICROSECONDS_PER_SECOND / frequency;
        Ok(())
    }
    /// set the cycle period in microseconds
    pub fn set_period_microseconds(&mut self, period_us: u32) -> EthercatResult {
        if period_us == 0
            {return Err(EthercatError::InvalidArgument("period must be positive"))}
        if period_us > MAX_PERIOD
            {return Err(EthercatError::InvalidArgument("period cannot exceed 1 s"))}
        self.period_us = period_us;
        self.frequency = MICROSECONDS_PER_SECOND / period_us;
        Ok(())
    }

    pub fn frequency(&self) -> u32  {self.frequency}
    pub fn period_microseconds(&self) -> u32  {self.period_us}
    pub fn period_nanoseconds(&self) -> i64  {i64::from(self.period_us) * 1000}
    pub fn as_duration(&self) -> Duration  {Duration::from_micros(self.period_us.into())}
}


/// operations of a cycle timer, see the [module documentation](self)
pub trait EthercatTimer {
    fn period(&self) -> &Period;
    fn period_mut(&mut self) -> &mut Period;

    /// block until the start of the next cycle
    fn sleep(&mut self);
    /// setup the slaves clocks, once before the realtime loop
    fn configure_clocks<M: Master + ?Sized>(&mut self, master: &mut M, slaves: &SlavesContainer) -> EthercatResult;
    /// exchange the application time and the reference clock time with the master
    fn sync_distributed_clocks<M: Master + ?Sized>(&mut self, master: &mut M);
    /// correct the master clock after [Self::sync_distributed_clocks]
    fn update_master_clock(&mut self);
    /// current time in nanoseconds
    fn current_time(&self) -> i64;

    fn set_frequency(&mut self, frequency: u32) -> EthercatResult {
        self.period_mut().set_frequency(frequency)
    }
    fn set_period_microseconds(&mut self, period_us: u32) -> EthercatResult {
        self.period_mut().set_period_microseconds(period_us)
    }
    fn frequency(&self) -> u32  {self.period().frequency()}
    fn period_microseconds(&self) -> u32  {self.period().period_microseconds()}
}


/// timer sleeping one period per cycle, without clock synchronization
#[derive(Debug, Default)]
pub struct SimpleTimer<C: Clock = SystemClock> {
    period: Period,
    clock: C,
}

impl<C: Clock> SimpleTimer<C> {
    pub fn new(period: Period, clock: C) -> Self {
        Self {period, clock}
    }
}

impl<C: Clock> EthercatTimer for SimpleTimer<C> {
    fn period(&self) -> &Period  {&self.period}
    fn period_mut(&mut self) -> &mut Period  {&mut self.period}

    fn sleep(&mut self) {
        std::thread::sleep(self.period.as_duration());
    }
    fn configure_clocks<M: Master + ?Sized>(&mut self, _master: &mut M, _slaves: &SlavesContainer) -> EthercatResult {
        Ok(())
    }
    fn sync_distributed_clocks<M: Master + ?Sized>(&mut self, _master: &mut M) {}
    fn update_master_clock(&mut self) {}
    fn current_time(&self) -> i64  {self.clock.now()}
}


/**
    timer following the bus distributed clock

    The master clock used by this timer is the raw clock minus a time base corrected every cycle by a [DriftFilter], so that the application time sent to the bus tracks the reference slave clock.

    Reference clock selection and per-slave clock configuration are done once in [Self::configure_clocks]. Their failures do not stop the bus but leave the timer [degraded](Self::degraded) for the whole session.
*/
#[derive(Debug)]
pub struct DcTimer<C: Clock = SystemClock> {
    period: Period,
    clock: C,
    /// sync0 shift time (ns)
    shift: i32,
    /// name of the slave providing the reference clock
    reference: Option<String>,
    configured: bool,

    launched: bool,
    /// wake time of the next sleep, in disciplined time
    deadline: i64,
    /// application time sent at the last cycle
    application_time: u64,
    filter: DriftFilter,

    overruns: u64,
    sync_errors: u64,
    degraded: bool,
}

impl<C: Clock> DcTimer<C> {
    pub fn new(period: Period, clock: C) -> Self {
        Self {
            period,
            clock,
            shift: 0,
            reference: None,
            configured: false,
            launched: false,
            deadline: 0,
            application_time: 0,
            filter: DriftFilter::new(DEFAULT_FILTER_WINDOW),
            overruns: 0,
            sync_errors: 0,
            degraded: false,
        }
    }

    /// set the sync0 shift time in nanoseconds, used at clock configuration
    pub fn set_shift(&mut self, shift: i32)  {self.shift = shift}
    /// designate the slave whose clock is used as bus reference
    pub fn set_reference(&mut self, name: &str)  {self.reference = Some(name.into())}
    /// replace the drift filter, only meaningful before the first cycle
    pub fn set_filter_window(&mut self, window: u32)  {self.filter = DriftFilter::new(window)}

    pub fn shift(&self) -> i32  {self.shift}
    pub fn reference(&self) -> Option<&str>  {self.reference.as_deref()}
    pub fn filter(&self) -> &DriftFilter  {&self.filter}
    pub fn clock(&self) -> &C  {&self.clock}
    /// disciplined time of the next wake, meaningful after the first sleep
    pub fn deadline(&self) -> i64  {self.deadline}
    pub fn application_time(&self) -> u64  {self.application_time}
    /// number of wakes later than one whole period after their deadline
    pub fn overruns(&self) -> u64  {self.overruns}
    /// number of failed reference clock readings
    pub fn sync_errors(&self) -> u64  {self.sync_errors}
    /// whether a slave clock or the reference clock could not be configured
    pub fn degraded(&self) -> bool  {self.degraded}
}

impl<C: Clock> EthercatTimer for DcTimer<C> {
    fn period(&self) -> &Period  {&self.period}
    fn period_mut(&mut self) -> &mut Period  {&mut self.period}

    fn sleep(&mut self) {
        let period = self.period.period_nanoseconds();
        if ! self.launched {
            self.deadline = self.clock.now() + period;
            self.launched = true;
        }
        let mut now = self.current_time();
        while now < self.deadline {
            core::hint::spin_loop();
            now = self.current_time();
        }
        if now - self.deadline > period
            {self.overruns += 1}
        self.deadline += period;
    }

    fn configure_clocks<M: Master + ?Sized>(&mut self, master: &mut M, slaves: &SlavesContainer) -> EthercatResult {
        if self.configured
            {return Err(EthercatError::Config("clocks already configured"))}
        let cycle = u32::try_from(self.period.period_nanoseconds())
            .map_err(|_| EthercatError::InvalidArgument("period too long for sync0"))?;

        for slave in slaves.iter() {
            let config = slave.config().ok_or_else(|| EthercatError::Slave {
                slave: slave.name().into(),
                message: "slave must be configured before its clock",
                })?;
            let activation = slave.assign_activation();
            if activation.is_active()
                {debug!("slave {:?}: {:?}", slave.name(), activation)}
            else
                {info!("slave {:?} has no distributed clock activation, it will run free", slave.name())}
            let clock = SlaveClockConfig::sync0(u16::from(activation), cycle, self.shift);
            if let Err(err) = master.config_dc(config, clock) {
                error!("slave {:?}: failed to configure distributed clock: {}", slave.name(), err);
                self.degraded = true;
            }
        }
        if let Some(name) = self.reference.as_deref() {
            let slave = slaves.get(name)?;
            let config = slave.config().ok_or_else(|| EthercatError::Slave {
                slave: name.into(),
                message: "reference slave must be configured before its clock",
                })?;
            match master.select_reference_clock(config) {
                Ok(()) => info!("slave {:?} selected as reference clock", name),
                Err(err) => {
                    error!("slave {:?}: failed to select reference clock: {}", name, err);
                    self.degraded = true;
                },
            }
        }
        self.configured = true;
        Ok(())
    }

    fn sync_distributed_clocks<M: Master + ?Sized>(&mut self, master: &mut M) {
        let previous = self.application_time;
        self.application_time = self.current_time() as u64;
        master.application_time(self.application_time);

        match master.reference_clock_time() {
            Ok(reference) => self.filter.push((previous as u32).wrapping_sub(reference) as i32),
            Err(err) => {
                self.sync_errors += 1;
                if self.sync_errors == 1
                    {warn!("failed to read reference clock, keeping previous sample: {}", err)}
            },
        }
        master.sync_slave_clocks();
    }

    fn update_master_clock(&mut self) {
        self.filter.update(self.period.period_nanoseconds(), self.application_time);
    }

    fn current_time(&self) -> i64 {
        self.clock.now() - self.filter.time_base()
    }
}


/// settings of a [Timer]
#[derive(Clone, Debug)]
pub struct TimerConfig {
    /// cycle frequency (Hz)
    pub frequency: u32,
    /// use a [DcTimer] instead of a [SimpleTimer]
    pub distributed_clocks: bool,
    /// sync0 shift (ns)
    pub shift: i32,
    /// name of the reference clock slave
    pub reference: Option<String>,
    /// drift filter averaging window (cycles)
    pub filter_window: u32,
}
impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            frequency: DEFAULT_FREQUENCY,
            distributed_clocks: false,
            shift: 0,
            reference: None,
            filter_window: DEFAULT_FILTER_WINDOW,
        }
    }
}


/// cycle timer of a bus, with or without distributed clocks
#[derive(Debug)]
pub enum Timer<C: Clock = SystemClock> {
    Simple(SimpleTimer<C>),
    Dc(DcTimer<C>),
}

impl Timer<SystemClock> {
    pub fn from_config(config: &TimerConfig) -> EthercatResult<Self> {
        Self::with_clock(config, SystemClock)
    }
}

impl<C: Clock> Timer<C> {
    pub fn with_clock(config: &TimerConfig, clock: C) -> EthercatResult<Self> {
        let period = Period::from_frequency(config.frequency)?;
        Ok(if config.distributed_clocks {
            let mut timer = DcTimer::new(period, clock);
            timer.set_shift(config.shift);
            timer.set_filter_window(config.filter_window);
            if let Some(name) = config.reference.as_deref()
                {timer.set_reference(name)}
            Self::Dc(timer)
        }
        else {
            Self::Simple(SimpleTimer::new(period, clock))
        })
    }

    pub fn as_dc(&self) -> Option<&DcTimer<C>> {
        match self {
            Self::Dc(timer) => Some(timer),
            Self::Simple(_) => None,
        }
    }
    pub fn as_dc_mut(&mut self) -> Option<&mut DcTimer<C>> {
        match self {
            Self::Dc(timer) => Some(timer),
            Self::Simple(_) => None,
        }
    }
}

impl<C: Clock> From<SimpleTimer<C>> for Timer<C> {
    fn from(timer: SimpleTimer<C>) -> Self  {Self::Simple(timer)}
}
impl<C: Clock> From<DcTimer<C>> for Timer<C> {
    fn from(timer: DcTimer<C>) -> Self  {Self::Dc(timer)}
}

impl<C: Clock> EthercatTimer for Timer<C> {
    fn period(&self) -> &Period {
        match self {
            Self::Simple(timer) => timer.period(),
            Self::Dc(timer) => timer.period(),
        }
    }
    fn period_mut(&mut self) -> &mut Period {
        match self {
            Self::Simple(timer) => timer.period_mut(),
            Self::Dc(timer) => timer.period_mut(),
        }
    }
    fn sleep(&mut self) {
        match self {
            Self::Simple(timer) => timer.sleep(),
            Self::Dc(timer) => timer.sleep(),
        }
    }
    fn configure_clocks<M: Master + ?Sized>(&mut self, master: &mut M, slaves: &SlavesContainer) -> EthercatResult {
        match self {
            Self::Simple(timer) => timer.configure_clocks(master, slaves),
            Self::Dc(timer) => timer.configure_clocks(master, slaves),
        }
    }
    fn sync_distributed_clocks<M: Master + ?Sized>(&mut self, master: &mut M) {
        match self {
            Self::Simple(timer) => timer.sync_distributed_clocks(master),
            Self::Dc(timer) => timer.sync_distributed_clocks(master),
        }
    }
    fn update_master_clock(&mut self) {
        match self {
            Self::Simple(timer) => timer.update_master_clock(),
            Self::Dc(timer) => timer.update_master_clock(),
        }
    }
    fn current_time(&self) -> i64 {
        match self {
            Self::Simple(timer) => timer.current_time(),
            Self::Dc(timer) => timer.current_time(),
        }
    }
}
