/*!
    The realtime loop driving the bus.

    A [Cycle] owns everything needed by the loop: the master, the timer, the mailbox scheduler, and the slaves shared with the rest of the application. Each cycle runs

    1. timer sleep until the cycle start
    2. reception of the frames sent last cycle
    3. distributed clock synchronization and master clock correction
    4. mailbox transfers progress
    5. the application callback
    6. emission of this cycle frames

    It can be run step by step with [Cycle::cycle_once] or on a dedicated realtime thread with [Cycle::spawn].
*/

use crate::{
    clock::{Clock, SystemClock},
    timer::{Timer, EthercatTimer},
    mailbox::MailboxManager,
    slaves::SlavesContainer,
    master::Master,
    error::{EthercatError, EthercatResult},
    };
use std::{
    sync::Arc,
    thread::JoinHandle,
    };
use core::sync::atomic::{AtomicBool, Ordering::*};
use log::{info, warn, error};


/// settings of the realtime thread
#[derive(Clone, Debug)]
pub struct CycleConfig {
    /// raise the loop thread to realtime FIFO scheduling and realtime IO priority
    pub realtime: bool,
    /// name of the loop thread
    pub name: String,
}
impl Default for CycleConfig {
    fn default() -> Self {
        Self {realtime: true, name: "ethercat-cycle".into()}
    }
}

/// realtime loop of a bus, see the [module documentation](self)
pub struct Cycle<M, C: Clock = SystemClock> {
    master: M,
    timer: Timer<C>,
    mailbox: MailboxManager,
    slaves: Arc<SlavesContainer>,
    cycles: u64,
    transport_errors: u64,
}

impl<M: Master, C: Clock> Cycle<M, C> {
    /**
        configure the bus and build its loop.

        Every slave is configured and gets its PDOs and SDOs created, then the slaves clocks are configured and the mailbox schedule is built. The slaves cannot be modified anymore afterward, except for their objects values.
    */
    pub fn bring_up(mut master: M, mut slaves: SlavesContainer, mut timer: Timer<C>) -> EthercatResult<Self> {
        slaves.configure(&mut master)?;
        timer.configure_clocks(&mut master, &slaves)?;
        let mailbox = MailboxManager::new(&slaves)?;
        info!("bus up with {} slaves at {} Hz", slaves.len(), timer.frequency());
        Ok(Self {
            master,
            timer,
            mailbox,
            slaves: Arc::new(slaves),
            cycles: 0,
            transport_errors: 0,
        })
    }

    /// run one cycle, `app` is called between reception and emission
    pub fn cycle_once<F>(&mut self, mut app: F)
    where F: FnMut(&SlavesContainer, &mut MailboxManager)
    {
        self.timer.sleep();
        if let Err(err) = self.master.receive()
            {self.transport_error("receive", err)}
        self.timer.sync_distributed_clocks(&mut self.master);
        self.timer.update_master_clock();
        self.mailbox.process(&mut self.master, &self.slaves);
        app(&*self.slaves, &mut self.mailbox);
        if let Err(err) = self.master.send()
            {self.transport_error("send", err)}
        self.cycles += 1;
    }

    fn transport_error(&mut self, operation: &str, err: EthercatError) {
        self.transport_errors += 1;
        if self.transport_errors == 1
            {warn!("failed to {} frames: {}", operation, err)}
    }

    pub fn master(&self) -> &M  {&self.master}
    pub fn master_mut(&mut self) -> &mut M  {&mut self.master}
    pub fn timer(&self) -> &Timer<C>  {&self.timer}
    pub fn timer_mut(&mut self) -> &mut Timer<C>  {&mut self.timer}
    pub fn mailbox(&self) -> &MailboxManager  {&self.mailbox}
    pub fn mailbox_mut(&mut self) -> &mut MailboxManager  {&mut self.mailbox}
    /// slaves of the bus, their objects values can be read from any thread
    pub fn slaves(&self) -> &Arc<SlavesContainer>  {&self.slaves}
    /// number of cycles run
    pub fn cycles(&self) -> u64  {self.cycles}
    /// number of failed frames receptions and emissions
    pub fn transport_errors(&self) -> u64  {self.transport_errors}
}

impl<M, C> Cycle<M, C>
where
    M: Master + Send + 'static,
    C: Clock + Send + 'static,
{
    /**
        run the loop on a dedicated thread until stopped through the returned handle.

        The stop request is checked between cycles, so the loop always finishes the cycle in progress.
    */
    pub fn spawn<F>(mut self, config: CycleConfig, mut app: F) -> EthercatResult<CycleHandle<M, C>>
    where F: FnMut(&SlavesContainer, &mut MailboxManager) + Send + 'static
    {
        let stop = Arc::new(AtomicBool::new(false));
        let slaves = self.slaves.clone();
        let thread = std::thread::Builder::new()
            .name(config.name.clone())
            .spawn({
                let stop = stop.clone();
                move || {
                    if config.realtime
                        {raise_priority()}
                    info!("realtime loop started");
                    while ! stop.load(Relaxed) {
                        self.cycle_once(&mut app);
                    }
                    info!("realtime loop stopped after {} cycles", self.cycles);
                    self
                }})?;
        Ok(CycleHandle {stop, slaves, thread})
    }
}

/// give the current thread the highest realtime priorities, failures are only logged
#[cfg(target_os = "linux")]
fn raise_priority() {
    use thread_priority::*;

    if let Err(err) = set_thread_priority_and_policy(
            thread_native_id(),
            ThreadPriority::Max,
            ThreadSchedulePolicy::Realtime(RealtimeThreadSchedulePolicy::Fifo),
            )
        {error!("cannot set realtime scheduling: {:?}", err)}
    if let Err(err) = ioprio::set_priority(
            ioprio::Target::Process(ioprio::Pid::this()),
            ioprio::Priority::new(ioprio::Class::Realtime(ioprio::RtPriorityLevel::highest())),
            )
        {error!("cannot set realtime io priority: {:?}", err)}
}
#[cfg(not(target_os = "linux"))]
fn raise_priority() {
    warn!("realtime priority is only supported on linux");
}

/// control of a loop running on its own thread
pub struct CycleHandle<M, C: Clock = SystemClock> {
    stop: Arc<AtomicBool>,
    slaves: Arc<SlavesContainer>,
    thread: JoinHandle<Cycle<M, C>>,
}

impl<M, C: Clock> CycleHandle<M, C> {
    /// slaves of the running bus
    pub fn slaves(&self) -> &Arc<SlavesContainer>  {&self.slaves}
    pub fn is_running(&self) -> bool  {! self.thread.is_finished()}

    /**
        request the loop to stop after its current cycle, and give it back

        If the loop thread panicked, [EthercatError::Thread] is returned and the loop is lost.
    */
    pub fn stop(self) -> EthercatResult<Cycle<M, C>> {
        self.stop.store(true, Relaxed);
        self.thread.join()
            .map_err(|_| EthercatError::Thread("realtime loop panicked"))
    }
}
