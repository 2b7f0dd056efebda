use std::sync::Arc;
use etherdc::{
    EthercatError, EthercatSlave, SlavesContainer, Cycle, CycleConfig, Timer, TimerConfig,
    clock::{ManualClock, ADJUST_LIMIT},
    pdo::PdoEntriesList,
    sync::SyncInfo,
    sdo::SdoList,
    mailbox::MailboxState,
    emulated::{EmulatedMaster, EmulatedDevice},
    };

const VENDOR: u32 = 0x0086_0816;
const PRODUCT: u32 = 0x2000_8033;

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// digital IO module with 4 outputs, 4 inputs, a filter parameter and a temperature telemetry
fn io_module(name: &str, position: u16) -> Result<EthercatSlave, EthercatError> {
    let mut rxpdo = PdoEntriesList::new();
    for channel in 0 .. 4 {
        rxpdo.add_entry(&format!("DO{}", channel), 0x7002, channel + 1, 1)?;
    }
    let mut txpdo = PdoEntriesList::new();
    for channel in 0 .. 4 {
        txpdo.add_entry(&format!("DI{}", channel), 0x6002, channel + 1, 1)?;
    }
    let mut sync = SyncInfo::new();
    sync.add_rx_pdo(0x1600, rxpdo)?;
    sync.add_tx_pdo(0x1a00, txpdo)?;
    sync.create()?;

    let mut parameters = SdoList::new();
    parameters.add_object("input_filter", 0x8000, 0x01, 8, Some(3))?;
    parameters.add_object("watchdog", 0x8000, 0x02, 16, Some(1500))?;
    parameters.set_timeout(500);
    let mut telemetry = SdoList::new();
    telemetry.add_object("temperature", 0x2026, 0x00, 16, None)?;
    telemetry.set_timeout(500);

    let mut slave = EthercatSlave::new();
    slave.set_slave_info(name, 0, position, VENDOR, PRODUCT)?;
    slave.register_sync(sync)?;
    slave.register_parameter_sdo(parameters)?;
    slave.register_telemetry_sdo(telemetry)?;
    slave.set_assign_activate(0x0300);
    Ok(slave)
}

fn emulated_bus(count: u16) -> EmulatedMaster {
    EmulatedMaster::new((0 .. count)
        .map(|position| EmulatedDevice::new(0, position, VENDOR, PRODUCT)
            .with_object(0x2026, 0x00, 40 + i64::from(position)))
        .collect())
}

fn dc_timer() -> Timer<Arc<ManualClock>> {
    Timer::with_clock(&TimerConfig {
            frequency: 1000,
            distributed_clocks: true,
            shift: 0,
            reference: Some("io0".into()),
            .. Default::default()
        }, Arc::new(ManualClock::new(1_700_000_000_000_000_000, 200_000))).unwrap()
}

#[test]
fn output_lookup() {
    let slave = io_module("io0", 0).unwrap();
    let output = slave.get_rx_pdo_entry("DO0").unwrap();
    assert_eq!(output.index(), 0x7002);
    assert_eq!(output.subindex(), 0x01);
    assert_eq!(output.bit_length(), 1);
    assert!(matches!(slave.get_rx_pdo_entry("DO9"), Err(EthercatError::NotFound {..})));
    assert!(matches!(slave.get_tx_pdo_entry("DO0"), Err(EthercatError::NotFound {..})));
}

#[test]
fn parameters_written_once() {
    init_logger();
    let mut slaves = SlavesContainer::new();
    slaves.register(io_module("io0", 0).unwrap()).unwrap();
    slaves.register(io_module("io1", 1).unwrap()).unwrap();
    let mut cycle = Cycle::bring_up(emulated_bus(2), slaves, dc_timer()).unwrap();

    for _ in 0 .. 5000 {
        cycle.cycle_once(|slaves, _| {
            let io = slaves.get("io1").unwrap();
            let input = io.get_tx_pdo_entry("DI0").unwrap().load().unwrap_or(0);
            io.get_rx_pdo_entry("DO0").unwrap().store(input ^ 1);
        });
    }
    assert_eq!(cycle.mailbox().state(), MailboxState::Reading);
    assert_eq!(cycle.mailbox().failures(), 0);

    let slaves = cycle.slaves().clone();
    for name in ["io0", "io1"] {
        let slave = slaves.get(name).unwrap();
        let config = slave.config().unwrap();
        for (subindex, parameter) in [(0x01, "input_filter"), (0x02, "watchdog")] {
            let default = slave.parameter_sdo().unwrap()
                .entry(slave.parameter_sdo().unwrap().position(parameter).unwrap()).unwrap()
                .default_value();
            assert_eq!(cycle.master().writes(config, 0x8000, subindex), 1);
            assert_eq!(cycle.master().value(config, 0x8000, subindex), default);
        }
    }
    assert_eq!(slaves.get("io1").unwrap().get_telemetry_sdo_entry("temperature").unwrap().load(), Some(41));
    assert_eq!(slaves.get("io1").unwrap().get_rx_pdo_entry("DO0").unwrap().load(), Some(1));
}

#[test]
fn clock_synchronization_is_bounded() {
    init_logger();
    let mut slaves = SlavesContainer::new();
    slaves.register(io_module("io0", 0).unwrap()).unwrap();
    let mut master = emulated_bus(1);
    master.set_clock_offset(-12_345);
    let mut cycle = Cycle::bring_up(master, slaves, dc_timer()).unwrap();

    let config = cycle.slaves().get("io0").unwrap().config().unwrap();
    assert_eq!(cycle.master().reference(), Some(config));
    assert_eq!(cycle.master().dc_config(config).unwrap().sync0_cycle, 1_000_000);

    for _ in 0 .. 3000 {
        cycle.cycle_once(|_, _| {});
        let dc = cycle.timer().as_dc().unwrap();
        assert!(dc.filter().adjust().abs() <= ADJUST_LIMIT);
    }
    let dc = cycle.timer().as_dc().unwrap();
    assert!(dc.filter().started());
    assert!(! dc.degraded());
    assert_eq!(dc.sync_errors(), 0);
    assert_eq!(cycle.master().sync_count(), 3000);
}

#[test]
fn degraded_synchronization_keeps_running() {
    init_logger();
    let mut slaves = SlavesContainer::new();
    slaves.register(io_module("io0", 0).unwrap()).unwrap();
    let mut master = emulated_bus(1);
    master.fail_dc_config(true);
    master.fail_reference_selection(true);
    let mut cycle = Cycle::bring_up(master, slaves, dc_timer()).unwrap();
    assert!(cycle.timer().as_dc().unwrap().degraded());

    cycle.master_mut().fail_reference_read(true);
    for _ in 0 .. 10 {
        cycle.cycle_once(|_, _| {});
    }
    assert_eq!(cycle.timer().as_dc().unwrap().sync_errors(), 10);
    assert_eq!(cycle.cycles(), 10);
}

#[test]
fn duplicate_slaves_rejected() {
    let mut slaves = SlavesContainer::new();
    slaves.register(io_module("io0", 0).unwrap()).unwrap();
    assert!(matches!(slaves.register(io_module("io0", 1).unwrap()), Err(EthercatError::Duplicate(_))));
    assert!(matches!(slaves.register(io_module("io1", 0).unwrap()), Err(EthercatError::Duplicate(_))));
}

#[test]
fn spawned_loop_with_simple_timer() {
    init_logger();
    let mut slaves = SlavesContainer::new();
    slaves.register(io_module("io0", 0).unwrap()).unwrap();
    let timer = Timer::from_config(&TimerConfig {frequency: 2000, .. Default::default()}).unwrap();
    let cycle = Cycle::bring_up(emulated_bus(1), slaves, timer).unwrap();
    let handle = cycle.spawn(CycleConfig {realtime: false, .. Default::default()}, |slaves, _| {
        slaves.get("io0").unwrap().get_rx_pdo_entry("DO1").unwrap().store(1);
    }).unwrap();

    let slaves = handle.slaves().clone();
    while slaves.get("io0").unwrap().get_telemetry_sdo_entry("temperature").unwrap().load().is_none() {
        std::thread::sleep(std::time::Duration::from_millis(1));
    }
    assert_eq!(slaves.get("io0").unwrap().get_rx_pdo_entry("DO1").unwrap().load(), Some(1));
    let cycle = handle.stop().unwrap();
    assert_eq!(cycle.mailbox().failures(), 0);
    assert!(cycle.master().writes(cycle.slaves().get("io0").unwrap().config().unwrap(), 0x8000, 0x01) == 1);
}
