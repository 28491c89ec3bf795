// Copyright (c) 2022, Zachary D. Olkin.
// This code is provided under the MIT license.

/// The bits module holds the bitfield views of the DIAG_STAT and MSC_CTRL registers
pub mod bits;

/// The burst module holds the burst-read wire protocol: frame layout, checksum and
/// conversion of raw counts to physical units
pub mod burst;

/// The interface module holds the transport capability trait and the embedded-hal SPI adapter
pub mod interface;

/// The spi module holds the sampler driver itself
pub mod spi;

#[cfg(test)]
pub(crate) mod testutil;

const DIR_WRITE: u8 = 0x80;

// Fixed scale factors from the data sheet. Counts per g / per deg/s / per deg C.
const ACCEL_SEN: f32 = 800.0;
const GYRO_SEN: f32 = 40.0;
const TEMP_SEN: f32 = 10.0;

// Recovery and test times from the data sheet, rounded up.
const RESET_RECOVERY_MS: u32 = 193;
const SELF_TEST_TIME_MS: u32 = 14;
const FLASH_TEST_TIME_MS: u32 = 32;

// Minimum idle time between two chip selects in normal register mode.
const T_STALL_US: u32 = 16;

// Internal sample rate that DEC_RATE decimates down from.
const BASE_SAMPLE_RATE_HZ: u32 = 2_000;
const DEFAULT_SAMPLE_RATE_HZ: u32 = 1_000;

const GLOB_CMD_SELF_TEST: u16 = 1 << 2;
const GLOB_CMD_FLASH_TEST: u16 = 1 << 4;
const GLOB_CMD_SW_RESET: u16 = 1 << 7;

/// Lifecycle states of the sampler.
///
/// `init` walks the device through `Resetting` and `SelfTesting` into `Idle`;
/// `start`/`stop` move between `Idle`/`Stopped` and `Sampling`. A failed self
/// test lands in `Faulted`, which only another `init` can leave.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DeviceState {
    /// No communication with the device has happened yet
    Uninitialized,
    /// Hardware reset issued, waiting out the recovery time
    Resetting,
    /// Memory and sensor self tests in progress
    SelfTesting,
    /// Initialized and configured, not sampling
    Idle,
    /// Periodic sampling is armed
    Sampling,
    /// Sampling cancelled; configuration registers are accessible again
    Stopped,
    /// A self test failed; the device must not be started
    Faulted,
}

/// The two on-chip self tests run during initialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SelfTest {
    /// Scratch register readback plus flash memory test
    Memory,
    /// Built-in inertial sensor self test
    Sensor,
}

/// The possible errors that the driver can return.
///
/// The `BusError` option is for when the underlying transport fails.
/// `MalformedTransfer` and `ChecksumMismatch` categorize a rejected burst cycle; during
/// sampling both are recovered locally by skipping publication for that cycle.
///
/// `InvalidInput` is for when an input to a driver function is unacceptable.
#[derive(Debug, PartialEq, Eq)]
pub enum AdisError<E> {
    /// An error occurred when using the bus
    BusError(E),
    /// A transfer returned a different number of bytes than requested
    MalformedTransfer,
    /// A burst report failed checksum validation
    ChecksumMismatch,
    /// An on-chip self test reported failure during initialization
    SelfTestFailure(SelfTest),
    /// The requested operation is not permitted in the current state
    InvalidStateTransition(DeviceState),
    /// An invalid input was passed to the function
    InvalidInput,
}

impl<E> From<E> for AdisError<E> {
    fn from(error: E) -> Self {
        AdisError::BusError(error)
    }
}

#[cfg(feature = "defmt")]
impl<E> defmt::Format for AdisError<E> {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            AdisError::BusError(_) => defmt::write!(fmt, "Bus Error!"),
            AdisError::MalformedTransfer => defmt::write!(fmt, "Malformed transfer!"),
            AdisError::ChecksumMismatch => defmt::write!(fmt, "Checksum mismatch!"),
            AdisError::SelfTestFailure(t) => defmt::write!(fmt, "Self test failed: {}", t),
            AdisError::InvalidStateTransition(s) => {
                defmt::write!(fmt, "Operation not permitted in state {}", s)
            }
            AdisError::InvalidInput => defmt::write!(fmt, "Invalid input in the function!"),
        }
    }
}

/// One converted measurement, produced from a checksum-validated burst report.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Sample {
    /// Acquisition time in microseconds, captured at the start of the burst transfer
    pub timestamp_us: u64,
    /// Acceleration in g, x/y/z
    pub accel_g: [f32; 3],
    /// Angular rate in degrees per second, x/y/z
    pub gyro_dps: [f32; 3],
    /// Internal temperature in degrees Celsius
    pub temperature_c: f32,
    /// False when DIAG_STAT carried a fault flag alongside otherwise valid data
    pub valid: bool,
}

/// Events tracked by [`DiagnosticCounters`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PerfEvent {
    /// One attempted sampling cycle; as a duration, the cycle's processing time
    Sample,
    /// Wall-clock time between successive cycle invocations
    SampleInterval,
    /// A cycle rejected for a length, checksum or bus failure
    BadTransfer,
    /// A sample the device produced but the host never saw (DATA_CNTR gap)
    MissedSample,
}

impl PerfEvent {
    /// Stable snake_case name of the event, for status output and log lines.
    pub fn name(self) -> &'static str {
        self.into()
    }
}

/// Per-device diagnostic state, updated only from the sampling execution context.
///
/// External callers read a snapshot through [`spi::AdisImu::diagnostics`].
#[derive(Debug, Default, Clone, Copy)]
pub struct DiagnosticCounters {
    samples: u32,
    bad_transfers: u32,
    missed_samples: u32,
    last_interval_us: u32,
    last_sample_us: u32,
}

impl DiagnosticCounters {
    /// Record one occurrence of `event`.
    pub fn count(&mut self, event: PerfEvent) {
        self.add(event, 1);
    }

    /// Record `n` occurrences of `event`. Duration-only events are ignored.
    pub fn add(&mut self, event: PerfEvent, n: u32) {
        match event {
            PerfEvent::Sample => self.samples = self.samples.wrapping_add(n),
            PerfEvent::BadTransfer => self.bad_transfers = self.bad_transfers.wrapping_add(n),
            PerfEvent::MissedSample => self.missed_samples = self.missed_samples.wrapping_add(n),
            PerfEvent::SampleInterval => {}
        }
    }

    /// Record the most recent duration of `event` in microseconds. Count-only events are ignored.
    pub fn record_duration(&mut self, event: PerfEvent, duration_us: u32) {
        match event {
            PerfEvent::Sample => self.last_sample_us = duration_us,
            PerfEvent::SampleInterval => self.last_interval_us = duration_us,
            PerfEvent::BadTransfer | PerfEvent::MissedSample => {}
        }
    }

    /// Total attempted sampling cycles.
    pub fn samples(&self) -> u32 {
        self.samples
    }

    /// Cycles rejected for a length, checksum or bus failure.
    pub fn bad_transfers(&self) -> u32 {
        self.bad_transfers
    }

    /// Samples dropped inside the device, detected through DATA_CNTR gaps.
    pub fn missed_samples(&self) -> u32 {
        self.missed_samples
    }

    /// Wall-clock microseconds between the two most recent cycle invocations.
    pub fn last_interval_us(&self) -> u32 {
        self.last_interval_us
    }

    /// Wall-clock microseconds the most recent cycle spent on transfer plus conversion.
    pub fn last_sample_us(&self) -> u32 {
        self.last_sample_us
    }
}

/// Periodic trigger capability that paces the sampling cycle.
///
/// `start` arms it at the configured output data rate; the execution context that owns
/// the sampler then calls [`spi::AdisImu::run`] on every tick.
pub trait SampleScheduler {
    /// Begin requesting periodic invocations every `interval_us` microseconds.
    fn schedule_periodic(&mut self, interval_us: u32);

    /// Stop requesting periodic invocations. Must tolerate being called while idle.
    fn cancel_periodic(&mut self);
}

/// Downstream sink for converted samples. Publication is fire and forget; the
/// sampler never observes a result.
pub trait SamplePublisher {
    /// Take ownership of one sample.
    fn publish(&mut self, sample: Sample);
}

/// Monotonic time source for acquisition timestamps and the diagnostic timers.
pub trait MonotonicClock {
    /// Microseconds since some fixed, arbitrary origin. Must never go backwards.
    fn now_us(&mut self) -> u64;
}

enum Register {
    DiagStat,
    FiltCtrl,
    MscCtrl,
    DecRate,
    GlobCmd,
    UserScr1,
}

impl Register {
    fn addr(&self) -> u8 {
        match *self {
            Register::DiagStat => 0x02,
            Register::FiltCtrl => 0x5C,
            Register::MscCtrl => 0x60,
            Register::DecRate => 0x64,
            Register::GlobCmd => 0x68,
            Register::UserScr1 => 0x76,
        }
    }
}
