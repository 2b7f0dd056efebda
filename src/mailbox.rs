/*!
    Cyclic scheduling of the SDO transfers through the slaves mailboxes.

    A mailbox carries one transaction at a time, so the [MailboxManager] serializes all the SDO transfers of the bus and progresses them a bit every cycle without ever waiting for the slaves. It runs in two phases:

    - **writing**: every parameter object having a value is written once, in registration order. A failed write is reported and never retried.
    - **reading**: telemetry objects are read round-robin and their values stored in their [CoeObject]. Transactions queued by the application preempt this polling.

    Failures never stop the cycle, they are counted and the last one is kept for the application to inspect. Only the first one is logged.
*/

use crate::{
    coe::CoeObject,
    sdo::SdoUsage,
    slaves::SlavesContainer,
    master::{Master, RequestState, SdoRequest},
    error::{EthercatError, EthercatResult},
    };
use heapless::Deque;
use log::{info, warn};


/// capacity of the application transactions queue
pub const MAILBOX_QUEUE: usize = 16;

/// address of one SDO object of the bus
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct MailboxTarget {
    /// slave index in the [SlavesContainer]
    pub slave: usize,
    /// object position in the slave SDO list
    pub entry: usize,
    pub usage: SdoUsage,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum MailboxTask {
    /// send the current value of the object
    Write(MailboxTarget),
    /// read the slave value into the object
    Read(MailboxTarget),
}
impl MailboxTask {
    pub fn target(&self) -> MailboxTarget {
        match *self {
            Self::Write(target) | Self::Read(target) => target,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum MailboxState {
    /// initial parameters writing
    Writing,
    /// telemetry polling and application transactions
    Reading,
}

/// SDO transfers scheduler, see the [module documentation](self)
#[derive(Debug)]
pub struct MailboxManager {
    parameters: Vec<MailboxTarget>,
    telemetry: Vec<MailboxTarget>,
    state: MailboxState,
    next_parameter: usize,
    next_telemetry: usize,
    queue: Deque<MailboxTask, MAILBOX_QUEUE>,
    /// transaction in progress
    current: Option<MailboxTask>,

    completed: u64,
    failures: u64,
    last_failure: Option<MailboxTarget>,
}

impl MailboxManager {
    /**
        build the transfers schedule of all the slaves.

        Every SDO entry must already have its request created, which is done by [crate::slave::EthercatSlave::create_sdo]
    */
    pub fn new(slaves: &SlavesContainer) -> EthercatResult<Self> {
        let mut parameters = Vec::new();
        let mut telemetry = Vec::new();
        for (slave_index, slave) in slaves.iter().enumerate() {
            for (usage, targets) in [
                    (SdoUsage::Parameter, &mut parameters),
                    (SdoUsage::Telemetry, &mut telemetry),
                    ] {
                let Some(sdos) = slave.sdo(usage)
                    else {continue};
                for (entry, sdo) in sdos.entries().iter().enumerate() {
                    if sdo.request().is_none()
                        {return Err(EthercatError::Slave {
                            slave: slave.name().into(),
                            message: "sdos must be created before scheduling their transfers",
                            })}
                    if usage == SdoUsage::Parameter && ! sdo.object().is_defined()
                        {continue}
                    targets.push(MailboxTarget {slave: slave_index, entry, usage});
                }
            }
        }
        info!("mailbox schedule: {} parameters to write, {} telemetry objects", parameters.len(), telemetry.len());
        Ok(Self {
            parameters,
            telemetry,
            state: MailboxState::Writing,
            next_parameter: 0,
            next_telemetry: 0,
            queue: Deque::new(),
            current: None,
            completed: 0,
            failures: 0,
            last_failure: None,
        })
    }

    pub fn state(&self) -> MailboxState  {self.state}
    /// transaction in progress, if any
    pub fn current(&self) -> Option<MailboxTask>  {self.current}
    /// number of successful transfers
    pub fn completed(&self) -> u64  {self.completed}
    /// number of failed transfers, timed out or aborted
    pub fn failures(&self) -> u64  {self.failures}
    pub fn last_failure(&self) -> Option<MailboxTarget>  {self.last_failure}
    /// number of application transactions waiting
    pub fn pending(&self) -> usize  {self.queue.len()}

    /// queue a write of the current value of a slave object
    pub fn queue_write(&mut self, slaves: &SlavesContainer, slave: &str, entry: &str) -> EthercatResult {
        let target = Self::find(slaves, slave, entry)?;
        self.queue(MailboxTask::Write(target))
    }
    /// queue a read of a slave object, its value is updated when completed
    pub fn queue_read(&mut self, slaves: &SlavesContainer, slave: &str, entry: &str) -> EthercatResult {
        let target = Self::find(slaves, slave, entry)?;
        self.queue(MailboxTask::Read(target))
    }
    pub fn queue(&mut self, task: MailboxTask) -> EthercatResult {
        self.queue.push_back(task)
            .map_err(|_| EthercatError::Capacity("mailbox queue is full"))
    }

    /// progress the mailbox transfers, to be called once per cycle after the frames reception
    pub fn process<M: Master + ?Sized>(&mut self, master: &mut M, slaves: &SlavesContainer) {
        if let Some(task) = self.current {
            let Some((object, request)) = Self::resolve(slaves, task.target())
                else {
                    self.current = None;
                    return;
                };
            match master.sdo_request_state(request) {
                RequestState::Busy => return,
                RequestState::Success => {
                    if let MailboxTask::Read(_) = task {
                        let mut data = [0; 8];
                        let size = master.sdo_request_data(request, &mut data);
                        object.unpack(&data[.. size]);
                    }
                    self.completed += 1;
                },
                RequestState::Error | RequestState::Unused => self.fail(slaves, task.target(), object),
            }
            self.current = None;
        }

        while let Some(task) = self.next() {
            let Some((object, request)) = Self::resolve(slaves, task.target())
                else {continue};
            match task {
                MailboxTask::Write(target) => {
                    let mut data = [0; 8];
                    let Some(size) = object.pack(&mut data)
                        else {
                            // nothing to write
                            self.fail(slaves, target, object);
                            continue;
                        };
                    master.sdo_request_write(request, &data[.. size]);
                },
                MailboxTask::Read(_) => master.sdo_request_read(request),
            }
            self.current = Some(task);
            break;
        }
    }

    /// next transaction to start
    fn next(&mut self) -> Option<MailboxTask> {
        if self.state == MailboxState::Writing {
            if let Some(&target) = self.parameters.get(self.next_parameter) {
                self.next_parameter += 1;
                return Some(MailboxTask::Write(target));
            }
            self.state = MailboxState::Reading;
            info!("mailbox: {} parameters written, {} failed", self.completed, self.failures);
        }
        if let Some(task) = self.queue.pop_front()
            {return Some(task)}
        if self.telemetry.is_empty()
            {return None}
        let target = self.telemetry[self.next_telemetry];
        self.next_telemetry = (self.next_telemetry + 1) % self.telemetry.len();
        Some(MailboxTask::Read(target))
    }

    fn fail(&mut self, slaves: &SlavesContainer, target: MailboxTarget, object: &CoeObject) {
        self.failures += 1;
        self.last_failure = Some(target);
        if self.failures > 1  {return}
        let slave = slaves.slave(target.slave).map(|slave| slave.name()).unwrap_or_default();
        warn!("slave {:?}: sdo {:?} ({:#06x}:{:02x}) transfer failed, further failures are only counted", slave, object.name(), object.index(), object.subindex());
    }

    fn resolve(slaves: &SlavesContainer, target: MailboxTarget) -> Option<(&CoeObject, SdoRequest)> {
        let entry = slaves.slave(target.slave)?
            .sdo(target.usage)?
            .entry(target.entry)?;
        Some((entry.object(), entry.request()?))
    }

    fn find(slaves: &SlavesContainer, slave: &str, entry: &str) -> EthercatResult<MailboxTarget> {
        let index = slaves.index_of(slave)
            .ok_or_else(|| EthercatError::NotFound {slave: slave.into(), list: "slaves container", entry: slave.into()})?;
        let description = slaves.get(slave)?;
        for usage in [SdoUsage::Parameter, SdoUsage::Telemetry] {
            if let Some(position) = description.sdo(usage).and_then(|sdos| sdos.position(entry))
                {return Ok(MailboxTarget {slave: index, entry: position, usage})}
        }
        Err(EthercatError::NotFound {slave: slave.into(), list: "sdo lists", entry: entry.into()})
    }
}
