/*!
    In-memory implementation of [Master], standing for a bus when no hardware is available.

    The emulated bus is a list of [EmulatedDevice], each with an identity and an object dictionary. It behaves as follows:

    - slave configuration succeeds only for a device with matching identity at the requested address
    - PDO assignments and distributed clock settings are recorded and can be inspected
    - the reference clock is the last application time shifted by a configurable offset
    - SDO requests stay busy until the next [Master::receive], then complete against the object dictionary. Objects marked unresponsive never answer and their requests time out after the request timeout elapsed in cycles.
*/

use crate::{
    registers::SyncDirection,
    sync::PdoAssignment,
    master::*,
    error::{EthercatError, EthercatResult},
    };
use core::time::Duration;
use std::collections::{HashMap, HashSet};


/// PDO mapping of a sync manager as recorded: `(pdo index, [(entry index, subindex, bit length)])`
pub type RecordedMapping = Vec<(u16, Vec<(u16, u8, u32)>)>;

/// device on an emulated bus
#[derive(Clone, Debug)]
pub struct EmulatedDevice {
    identity: SlaveIdentity,
    objects: HashMap<(u16, u8), i64>,
    unresponsive: HashSet<(u16, u8)>,
}

impl EmulatedDevice {
    pub fn new(alias: u16, position: u16, vendor_id: u32, product_code: u32) -> Self {
        Self {
            identity: SlaveIdentity {alias, position, vendor_id, product_code},
            objects: HashMap::new(),
            unresponsive: HashSet::new(),
        }
    }
    /// add an object to the dictionary, values are raw bits
    pub fn with_object(mut self, index: u16, subindex: u8, value: i64) -> Self {
        self.objects.insert((index, subindex), value);
        self
    }
    /// make transfers of an object never complete
    pub fn unresponsive(mut self, index: u16, subindex: u8) -> Self {
        self.unresponsive.insert((index, subindex));
        self
    }
    pub fn identity(&self) -> SlaveIdentity  {self.identity}
}

#[derive(Debug, Default)]
struct DeviceConfig {
    mappings: HashMap<u8, RecordedMapping>,
    clock: Option<SlaveClockConfig>,
}

#[derive(Copy, Clone, Debug)]
enum Transfer {
    Write,
    Read,
}

#[derive(Debug)]
struct Request {
    device: usize,
    index: u16,
    subindex: u8,
    size: usize,
    timeout: Duration,
    state: RequestState,
    pending: Option<Transfer>,
    elapsed: Duration,
    data: [u8; 8],
}

/// in-memory bus, see the [module documentation](self)
#[derive(Debug)]
pub struct EmulatedMaster {
    devices: Vec<EmulatedDevice>,
    configs: HashMap<usize, DeviceConfig>,
    requests: Vec<Request>,
    /// number of completed writes per device object
    writes: HashMap<(usize, u16, u8), usize>,

    cycle_time: Duration,
    application_time: u64,
    clock_offset: i64,
    reference: Option<SlaveConfig>,
    syncs: usize,
    exchanges: usize,

    fail_selection: bool,
    fail_read: bool,
    fail_dc: bool,
}

impl EmulatedMaster {
    pub fn new(devices: Vec<EmulatedDevice>) -> Self {
        Self {
            devices,
            configs: HashMap::new(),
            requests: Vec::new(),
            writes: HashMap::new(),
            cycle_time: Duration::from_millis(1),
            application_time: 0,
            clock_offset: 0,
            reference: None,
            syncs: 0,
            exchanges: 0,
            fail_selection: false,
            fail_read: false,
            fail_dc: false,
        }
    }

    /// time elapsed between two receptions, used for request timeouts
    pub fn set_cycle_time(&mut self, cycle: Duration)  {self.cycle_time = cycle}
    /// offset of the reference clock relatively to the application time (ns)
    pub fn set_clock_offset(&mut self, offset: i64)  {self.clock_offset = offset}
    pub fn fail_reference_selection(&mut self, fail: bool)  {self.fail_selection = fail}
    pub fn fail_reference_read(&mut self, fail: bool)  {self.fail_read = fail}
    pub fn fail_dc_config(&mut self, fail: bool)  {self.fail_dc = fail}

    /// PDOs assigned to a sync manager of a configured slave
    pub fn pdo_mapping(&self, config: SlaveConfig, sync_manager: u8) -> Option<&RecordedMapping> {
        self.configs.get(&(config.index() as usize))?
            .mappings.get(&sync_manager)
    }
    pub fn dc_config(&self, config: SlaveConfig) -> Option<SlaveClockConfig> {
        self.configs.get(&(config.index() as usize))?.clock
    }
    /// slave selected as reference clock
    pub fn reference(&self) -> Option<SlaveConfig>  {self.reference}
    /// number of clock propagations to the slaves
    pub fn sync_count(&self) -> usize  {self.syncs}
    /// number of frames exchanges (send calls)
    pub fn exchange_count(&self) -> usize  {self.exchanges}
    pub fn application_time_sent(&self) -> u64  {self.application_time}

    /// number of completed writes to an object of a configured slave
    pub fn writes(&self, config: SlaveConfig, index: u16, subindex: u8) -> usize {
        self.writes.get(&(config.index() as usize, index, subindex)).copied().unwrap_or(0)
    }
    /// raw value of an object in the dictionary of a configured slave
    pub fn value(&self, config: SlaveConfig, index: u16, subindex: u8) -> Option<i64> {
        self.devices.get(config.index() as usize)?
            .objects.get(&(index, subindex)).copied()
    }
    /// change an object in the dictionary of a configured slave, as the device would
    pub fn set_value(&mut self, config: SlaveConfig, index: u16, subindex: u8, value: i64) {
        if let Some(device) = self.devices.get_mut(config.index() as usize)
            {device.objects.insert((index, subindex), value);}
    }

    fn device(&self, config: SlaveConfig) -> EthercatResult<usize> {
        let device = config.index() as usize;
        if self.configs.contains_key(&device)
            {Ok(device)}
        else
            {Err(EthercatError::Master("unknown slave configuration"))}
    }

    fn complete(&mut self, request: usize) {
        let current = &self.requests[request];
        let (device, index, subindex, size) = (current.device, current.index, current.subindex, current.size);
        let Some(transfer) = current.pending
            else {return};
        let device_state = &mut self.devices[device];

        if device_state.unresponsive.contains(&(index, subindex)) {
            let request = &mut self.requests[request];
            request.elapsed += self.cycle_time;
            if request.elapsed >= request.timeout {
                request.state = RequestState::Error;
                request.pending = None;
            }
            return;
        }
        let request = &mut self.requests[request];
        match transfer {
            Transfer::Write => {
                let mut raw = [0; 8];
                raw[.. size].copy_from_slice(&request.data[.. size]);
                device_state.objects.insert((index, subindex), u64::from_le_bytes(raw) as i64);
                *self.writes.entry((device, index, subindex)).or_default() += 1;
                request.state = RequestState::Success;
            },
            Transfer::Read => match device_state.objects.get(&(index, subindex)) {
                Some(&value) => {
                    request.data = (value as u64).to_le_bytes();
                    request.state = RequestState::Success;
                },
                // abort: object does not exist
                None => request.state = RequestState::Error,
            },
        }
        request.pending = None;
    }
}

impl Master for EmulatedMaster {
    fn configure_slave(&mut self, identity: SlaveIdentity) -> EthercatResult<SlaveConfig> {
        let device = self.devices.iter()
            .position(|device| device.identity == identity)
            .ok_or(EthercatError::SlaveNotFound {
                name: String::new(),
                alias: identity.alias,
                position: identity.position,
                })?;
        self.configs.entry(device).or_default();
        Ok(SlaveConfig::new(device as u32))
    }
    fn config_pdos(&mut self, config: SlaveConfig, sync_manager: u8, _direction: SyncDirection, pdos: &[PdoAssignment]) -> EthercatResult {
        let device = self.device(config)?;
        let mapping = pdos.iter()
            .map(|pdo| (pdo.index, pdo.entries.iter()
                .map(|entry| (entry.index(), entry.subindex(), entry.bit_length()))
                .collect()))
            .collect();
        if let Some(config) = self.configs.get_mut(&device)
            {config.mappings.insert(sync_manager, mapping);}
        Ok(())
    }
    fn config_dc(&mut self, slave: SlaveConfig, clock: SlaveClockConfig) -> EthercatResult {
        let device = self.device(slave)?;
        if self.fail_dc
            {return Err(EthercatError::Master("distributed clock not supported"))}
        if let Some(config) = self.configs.get_mut(&device)
            {config.clock = Some(clock);}
        Ok(())
    }
    fn select_reference_clock(&mut self, slave: SlaveConfig) -> EthercatResult {
        self.device(slave)?;
        if self.fail_selection
            {return Err(EthercatError::Master("reference clock selection refused"))}
        self.reference = Some(slave);
        Ok(())
    }
    fn create_sdo_request(&mut self, slave: SlaveConfig, index: u16, subindex: u8, size: usize, timeout: Duration) -> EthercatResult<SdoRequest> {
        let device = self.device(slave)?;
        if size == 0 || size > 8
            {return Err(EthercatError::InvalidArgument("sdo request size must be in 1..=8"))}
        self.requests.push(Request {
            device,
            index,
            subindex,
            size,
            timeout,
            state: RequestState::Unused,
            pending: None,
            elapsed: Duration::ZERO,
            data: [0; 8],
        });
        Ok(SdoRequest::new((self.requests.len() - 1) as u32))
    }

    fn receive(&mut self) -> EthercatResult {
        for request in 0 .. self.requests.len() {
            self.complete(request);
        }
        Ok(())
    }
    fn send(&mut self) -> EthercatResult {
        self.exchanges += 1;
        Ok(())
    }
    fn application_time(&mut self, time: u64) {
        self.application_time = time;
    }
    fn reference_clock_time(&mut self) -> EthercatResult<u32> {
        if self.fail_read
            {return Err(EthercatError::Timeout("reference clock datagram lost"))}
        Ok((self.application_time as i64).wrapping_add(self.clock_offset) as u32)
    }
    fn sync_slave_clocks(&mut self) {
        self.syncs += 1;
    }

    fn sdo_request_state(&mut self, request: SdoRequest) -> RequestState {
        self.requests.get(request.index() as usize)
            .map(|request| request.state)
            .unwrap_or(RequestState::Error)
    }
    fn sdo_request_write(&mut self, request: SdoRequest, data: &[u8]) {
        if let Some(request) = self.requests.get_mut(request.index() as usize) {
            let len = data.len().min(request.size);
            request.data = [0; 8];
            request.data[.. len].copy_from_slice(&data[.. len]);
            request.state = RequestState::Busy;
            request.pending = Some(Transfer::Write);
            request.elapsed = Duration::ZERO;
        }
    }
    fn sdo_request_read(&mut self, request: SdoRequest) {
        if let Some(request) = self.requests.get_mut(request.index() as usize) {
            request.state = RequestState::Busy;
            request.pending = Some(Transfer::Read);
            request.elapsed = Duration::ZERO;
        }
    }
    fn sdo_request_data(&self, request: SdoRequest, data: &mut [u8]) -> usize {
        let Some(request) = self.requests.get(request.index() as usize)
            else {return 0};
        let len = data.len().min(request.size);
        data[.. len].copy_from_slice(&request.data[.. len]);
        len
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    fn master() -> (EmulatedMaster, SlaveConfig) {
        let mut master = EmulatedMaster::new(vec![
            EmulatedDevice::new(0, 0, 2, 3)
                .with_object(0x2026, 0, 45)
                .unresponsive(0x8000, 1),
            ]);
        let config = master.configure_slave(SlaveIdentity {alias: 0, position: 0, vendor_id: 2, product_code: 3}).unwrap();
        (master, config)
    }

    #[test]
    fn requests_complete_on_receive() {
        let (mut master, config) = master();
        let read = master.create_sdo_request(config, 0x2026, 0, 2, Duration::from_millis(10)).unwrap();
        let write = master.create_sdo_request(config, 0x8000, 2, 1, Duration::from_millis(10)).unwrap();
        assert_eq!(master.sdo_request_state(read), RequestState::Unused);

        master.sdo_request_read(read);
        master.sdo_request_write(write, &[7]);
        assert_eq!(master.sdo_request_state(read), RequestState::Busy);
        master.receive().unwrap();
        assert_eq!(master.sdo_request_state(read), RequestState::Success);
        assert_eq!(master.sdo_request_state(write), RequestState::Success);

        let mut data = [0; 2];
        assert_eq!(master.sdo_request_data(read, &mut data), 2);
        assert_eq!(u16::from_le_bytes(data), 45);
        assert_eq!(master.value(config, 0x8000, 2), Some(7));
        assert_eq!(master.writes(config, 0x8000, 2), 1);
    }

    #[test]
    fn unresponsive_object_times_out() {
        let (mut master, config) = master();
        let request = master.create_sdo_request(config, 0x8000, 1, 1, Duration::from_millis(3)).unwrap();
        master.sdo_request_write(request, &[1]);
        for _ in 0 .. 2 {
            master.receive().unwrap();
            assert_eq!(master.sdo_request_state(request), RequestState::Busy);
        }
        master.receive().unwrap();
        assert_eq!(master.sdo_request_state(request), RequestState::Error);
        assert_eq!(master.writes(config, 0x8000, 1), 0);
    }

    #[test]
    fn identity_mismatch() {
        let mut master = EmulatedMaster::new(vec![EmulatedDevice::new(0, 0, 2, 3)]);
        assert!(matches!(
            master.configure_slave(SlaveIdentity {alias: 0, position: 0, vendor_id: 2, product_code: 4}),
            Err(EthercatError::SlaveNotFound {position: 0, ..}),
            ));
        assert!(master.configure_slave(SlaveIdentity {alias: 0, position: 1, vendor_id: 2, product_code: 3}).is_err());
    }

    #[test]
    fn reference_clock_offset() {
        let (mut master, config) = master();
        master.set_clock_offset(-100);
        master.application_time(u64::from(u32::MAX) + 50);
        assert_eq!(master.reference_clock_time().unwrap(), u32::MAX - 50);
        master.select_reference_clock(config).unwrap();
        assert_eq!(master.reference(), Some(config));
        master.fail_reference_read(true);
        assert!(master.reference_clock_time().is_err());
    }
}
