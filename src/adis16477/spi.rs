// Copyright (c) 2022, Zachary D. Olkin.
// This code is provided under the MIT license.

use crate::adis16477::bits::{DiagStat, MscCtrl};
use crate::adis16477::burst::{self, BURST_LEN};
use crate::adis16477::interface::SensorInterface;
use crate::adis16477::{
    AdisError, DeviceState, DiagnosticCounters, MonotonicClock, PerfEvent, Register,
    SamplePublisher, SampleScheduler, SelfTest, BASE_SAMPLE_RATE_HZ, DEFAULT_SAMPLE_RATE_HZ,
    DIR_WRITE, FLASH_TEST_TIME_MS, GLOB_CMD_FLASH_TEST, GLOB_CMD_SELF_TEST, GLOB_CMD_SW_RESET,
    RESET_RECOVERY_MS, SELF_TEST_TIME_MS, T_STALL_US,
};
use embedded_hal::delay::DelayNs;

// Scratch patterns written and read back during the memory self test.
const SCRATCH_PATTERNS: [u16; 2] = [0xA55A, 0x5AA5];

/// ADIS16477 sampler.
///
/// Owns the bus session and its diagnostic counters exclusively; all sampling
/// work happens on whichever single execution context calls [`AdisImu::run`].
/// The four collaborators are injected at construction so the sampler can run
/// against fakes in tests and against any HAL on hardware.
pub struct AdisImu<BUS, SCH, PUB, CLK, DELAY> {
    bus: BUS,
    scheduler: SCH,
    publisher: PUB,
    clock: CLK,
    delay: DELAY,

    state: DeviceState,
    counters: DiagnosticCounters,

    sample_rate_hz: u32,
    interval_us: u32,
    last_cycle_start_us: Option<u64>,
    last_data_cntr: Option<u16>,
}

impl<BUS, E, SCH, PUB, CLK, DELAY> AdisImu<BUS, SCH, PUB, CLK, DELAY>
where
    BUS: SensorInterface<BusError = E>,
    SCH: SampleScheduler,
    PUB: SamplePublisher,
    CLK: MonotonicClock,
    DELAY: DelayNs,
{
    /// Create an uninitialized sampler. Nothing touches the bus until [`AdisImu::init`].
    pub fn new(bus: BUS, scheduler: SCH, publisher: PUB, clock: CLK, delay: DELAY) -> Self {
        AdisImu {
            bus,
            scheduler,
            publisher,
            clock,
            delay,
            state: DeviceState::Uninitialized,
            counters: DiagnosticCounters::default(),
            sample_rate_hz: DEFAULT_SAMPLE_RATE_HZ,
            interval_us: 1_000_000 / DEFAULT_SAMPLE_RATE_HZ,
            last_cycle_start_us: None,
            last_data_cntr: None,
        }
    }

    /// Reset the device, run both self tests and apply the base configuration.
    ///
    /// Ends in `Idle` on success. A failed self test lands in `Faulted`, which
    /// blocks `start` until a later `init` passes. A bus error aborts and
    /// returns the device to `Uninitialized` so the caller can retry.
    pub fn init(&mut self) -> Result<(), AdisError<E>> {
        if self.state == DeviceState::Sampling {
            return Err(AdisError::InvalidStateTransition(self.state));
        }

        self.state = DeviceState::Resetting;
        match self.init_sequence() {
            Ok(()) => {
                self.state = DeviceState::Idle;
                #[cfg(feature = "defmt")]
                defmt::trace!("Init complete");
                Ok(())
            }
            Err(e) => {
                self.state = match e {
                    AdisError::SelfTestFailure(_) => DeviceState::Faulted,
                    _ => DeviceState::Uninitialized,
                };
                Err(e)
            }
        }
    }

    fn init_sequence(&mut self) -> Result<(), AdisError<E>> {
        self.reset()?;
        self.state = DeviceState::SelfTesting;
        self.self_test_memory()?;
        self.self_test_sensor()?;
        self.configure()
    }

    /// Software reset through GLOB_CMD, then wait out the recovery time.
    fn reset(&mut self) -> Result<(), AdisError<E>> {
        self.write_reg16(Register::GlobCmd.addr(), GLOB_CMD_SW_RESET)?;
        self.delay.delay_ms(RESET_RECOVERY_MS);

        // Reading DIAG_STAT clears the power-on flags before the self tests look at it.
        self.read_reg16(Register::DiagStat.addr())?;

        #[cfg(feature = "defmt")]
        defmt::trace!("Reset complete");
        Ok(())
    }

    /// Scratch register readback with two complementary patterns, then the on-chip
    /// flash signature test.
    fn self_test_memory(&mut self) -> Result<(), AdisError<E>> {
        for &pattern in SCRATCH_PATTERNS.iter() {
            self.write_reg16(Register::UserScr1.addr(), pattern)?;
            if self.read_reg16(Register::UserScr1.addr())? != pattern {
                return Err(AdisError::SelfTestFailure(SelfTest::Memory));
            }
        }
        self.write_reg16(Register::UserScr1.addr(), 0)?;

        self.write_reg16(Register::GlobCmd.addr(), GLOB_CMD_FLASH_TEST)?;
        self.delay.delay_ms(FLASH_TEST_TIME_MS);
        let diag = DiagStat(self.read_reg16(Register::DiagStat.addr())?);
        if diag.memory_failure() {
            return Err(AdisError::SelfTestFailure(SelfTest::Memory));
        }

        #[cfg(feature = "defmt")]
        defmt::trace!("Memory self test: Pass");
        Ok(())
    }

    /// Built-in inertial sensor self test; DIAG_STAT reports the verdict once
    /// the documented test window has elapsed.
    fn self_test_sensor(&mut self) -> Result<(), AdisError<E>> {
        self.write_reg16(Register::GlobCmd.addr(), GLOB_CMD_SELF_TEST)?;
        self.delay.delay_ms(SELF_TEST_TIME_MS);

        let diag = DiagStat(self.read_reg16(Register::DiagStat.addr())?);
        if diag.sensor_failure() {
            return Err(AdisError::SelfTestFailure(SelfTest::Sensor));
        }

        #[cfg(feature = "defmt")]
        defmt::trace!("Sensor self test: Pass");
        Ok(())
    }

    fn configure(&mut self) -> Result<(), AdisError<E>> {
        let mut msc = MscCtrl(0);
        msc.set_dr_polarity(true);
        msc.set_pop_align(true);
        msc.set_linear_g_comp(true);
        self.write_reg16(Register::MscCtrl.addr(), msc.0)?;

        self.write_reg16(Register::FiltCtrl.addr(), 0)?;
        self.apply_sample_rate()
    }

    fn apply_sample_rate(&mut self) -> Result<(), AdisError<E>> {
        let div = BASE_SAMPLE_RATE_HZ / self.sample_rate_hz - 1;
        self.write_reg16(Register::DecRate.addr(), div as u16)?;
        self.interval_us = (1_000_000 / BASE_SAMPLE_RATE_HZ) * (div + 1);
        Ok(())
    }

    /// Set the output data rate in Hz, decimated down from the 2000 SPS internal rate.
    /// Rates outside 1..=2000 are rejected. Takes effect on the next `start`.
    pub fn set_sample_rate(&mut self, rate_hz: u32) -> Result<(), AdisError<E>> {
        self.ensure_configurable()?;
        if rate_hz == 0 || rate_hz > BASE_SAMPLE_RATE_HZ {
            return Err(AdisError::InvalidInput);
        }

        self.sample_rate_hz = rate_hz;
        self.apply_sample_rate()
    }

    /// Configure the Bartlett filter, 0 to 6 taps.
    pub fn set_filter_taps(&mut self, taps: u8) -> Result<(), AdisError<E>> {
        self.ensure_configurable()?;
        if taps > 6 {
            return Err(AdisError::InvalidInput);
        }

        self.write_reg(Register::FiltCtrl.addr(), taps)
    }

    /// Start automatic measurement.
    ///
    /// Arms the scheduling capability at the configured output data rate; the
    /// owning execution context then calls [`AdisImu::run`] on every tick.
    pub fn start(&mut self) -> Result<(), AdisError<E>> {
        match self.state {
            DeviceState::Idle | DeviceState::Stopped => {
                self.last_cycle_start_us = None;
                self.last_data_cntr = None;
                self.scheduler.schedule_periodic(self.interval_us);
                self.state = DeviceState::Sampling;

                #[cfg(feature = "defmt")]
                defmt::trace!("Sampling: On");
                Ok(())
            }
            s => Err(AdisError::InvalidStateTransition(s)),
        }
    }

    /// Stop automatic measurement. Safe to call at any time and idempotent; a
    /// cycle already in flight completes normally.
    pub fn stop(&mut self) {
        match self.state {
            DeviceState::Sampling | DeviceState::Idle | DeviceState::Stopped => {
                self.scheduler.cancel_periodic();
                self.state = DeviceState::Stopped;

                #[cfg(feature = "defmt")]
                defmt::trace!("Sampling: Off");
            }
            _ => {}
        }
    }

    /// One sampling cycle: burst read, validate, convert, publish.
    ///
    /// Called by the periodic execution context. A hardware data-ready line can
    /// pace it instead, as long as the interrupt handler only defers to the
    /// context that owns the sampler and never touches the bus itself.
    ///
    /// Outside `Sampling` this is a no-op, which is what makes `stop` safe
    /// against a still-armed scheduler. Transfer failures never escape: they
    /// bump the bad-transfer counter and skip publication for this cycle only.
    pub fn run(&mut self) {
        if self.state != DeviceState::Sampling {
            return;
        }

        let start = self.clock.now_us();
        if let Some(prev) = self.last_cycle_start_us {
            self.counters
                .record_duration(PerfEvent::SampleInterval, start.wrapping_sub(prev) as u32);
        }
        self.last_cycle_start_us = Some(start);
        self.counters.count(PerfEvent::Sample);

        if let Err(_e) = self.measure(start) {
            self.counters.count(PerfEvent::BadTransfer);
            #[cfg(feature = "defmt")]
            defmt::warn!(
                "{=str} #{=u32}: {}",
                PerfEvent::BadTransfer.name(),
                self.counters.bad_transfers(),
                _e
            );
        }

        let end = self.clock.now_us();
        self.counters
            .record_duration(PerfEvent::Sample, end.wrapping_sub(start) as u32);
    }

    /// Fetch one burst report and publish the converted sample.
    fn measure(&mut self, timestamp_us: u64) -> Result<(), AdisError<E>> {
        let tx = burst::command_frame();
        let mut rx = [0u8; BURST_LEN];

        let n = self.bus.exchange(&tx, &mut rx)?;
        if n != BURST_LEN {
            return Err(AdisError::MalformedTransfer);
        }
        let report = burst::parse(&rx)?;

        if let Some(prev) = self.last_data_cntr {
            let gap = report.data_cntr.wrapping_sub(prev);
            if gap > 1 {
                self.counters.add(PerfEvent::MissedSample, (gap - 1) as u32);
            }
        }
        self.last_data_cntr = Some(report.data_cntr);

        self.publisher.publish(report.to_sample(timestamp_us));
        Ok(())
    }

    /// Read a 16 bit register. Two address frames with the stall time between them.
    pub fn read_reg16(&mut self, reg: u8) -> Result<u16, AdisError<E>> {
        self.ensure_configurable()?;

        let mut rx = [0u8; 2];
        let n = self.bus.exchange(&[reg & !DIR_WRITE, 0x00], &mut rx)?;
        if n != 2 {
            return Err(AdisError::MalformedTransfer);
        }
        self.delay.delay_us(T_STALL_US);

        let n = self.bus.exchange(&[0x00, 0x00], &mut rx)?;
        if n != 2 {
            return Err(AdisError::MalformedTransfer);
        }
        self.delay.delay_us(T_STALL_US);

        Ok(u16::from_be_bytes(rx))
    }

    /// Write one byte to a register page address.
    pub fn write_reg(&mut self, reg: u8, value: u8) -> Result<(), AdisError<E>> {
        self.ensure_configurable()?;
        self.raw_write(reg, value)
    }

    /// Write a 16 bit register as two page-addressed byte writes, low byte first.
    pub fn write_reg16(&mut self, reg: u8, value: u16) -> Result<(), AdisError<E>> {
        self.ensure_configurable()?;
        let bytes = value.to_le_bytes();
        self.raw_write(reg, bytes[0])?;
        self.raw_write(reg + 1, bytes[1])
    }

    fn raw_write(&mut self, reg: u8, value: u8) -> Result<(), AdisError<E>> {
        let mut rx = [0u8; 2];
        let n = self.bus.exchange(&[reg | DIR_WRITE, value], &mut rx)?;
        if n != 2 {
            return Err(AdisError::MalformedTransfer);
        }
        self.delay.delay_us(T_STALL_US);
        Ok(())
    }

    // Register traffic is only allowed while the device is quiescent; the burst
    // cycle owns the bus in `Sampling`.
    fn ensure_configurable(&self) -> Result<(), AdisError<E>> {
        match self.state {
            DeviceState::Resetting
            | DeviceState::SelfTesting
            | DeviceState::Idle
            | DeviceState::Stopped => Ok(()),
            s => Err(AdisError::InvalidStateTransition(s)),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> DeviceState {
        self.state
    }

    /// Read-only view of the diagnostic counters.
    pub fn diagnostics(&self) -> &DiagnosticCounters {
        &self.counters
    }

    /// Configured output data rate in Hz.
    pub fn sample_rate_hz(&self) -> u32 {
        self.sample_rate_hz
    }

    /// Scheduling interval in microseconds matching the configured rate.
    pub fn sample_interval_us(&self) -> u32 {
        self.interval_us
    }
}
