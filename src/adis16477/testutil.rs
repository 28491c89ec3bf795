// Copyright (c) 2022, Zachary D. Olkin.
// This code is provided under the MIT license.

//! Shared-handle fakes for the capability traits, test builds only.
//! Each fake is a cheap clone over `Rc<RefCell<..>>` so a test can keep a
//! handle to state the sampler owns.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::vec::Vec;

use crate::adis16477::interface::SensorInterface;
use crate::adis16477::{MonotonicClock, Sample, SamplePublisher, SampleScheduler, DIR_WRITE};
use embedded_hal::delay::DelayNs;

/// Transport failure injected by [`FakeBus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FakeBusError;

/// Scripted reply for one `exchange` call.
pub(crate) enum Response {
    /// Copy these bytes into `rx` and report their length
    Frame(Vec<u8>),
    /// Fail the exchange outright
    Fail,
}

struct BusInner {
    /// Byte-addressed register file, low byte of each register at its page address
    mem: [u8; 128],
    /// Value clocked out during the frame after a read command
    pending_read: Option<[u8; 2]>,
    /// Register addresses whose writes are silently dropped
    poisoned: Vec<u8>,
    /// Replies consumed before the register model answers
    scripted: VecDeque<Response>,
    /// Every tx frame seen, in order
    frames: Vec<Vec<u8>>,
}

/// Register-level ADIS fake implementing [`SensorInterface`].
///
/// Unscripted 2-byte frames run against a little register file with the real
/// read-latency semantics (a read command answers on the following frame).
/// Unscripted burst frames answer all zeros, which is a checksum-valid report.
#[derive(Clone)]
pub(crate) struct FakeBus {
    inner: Rc<RefCell<BusInner>>,
}

impl FakeBus {
    pub(crate) fn new() -> Self {
        FakeBus {
            inner: Rc::new(RefCell::new(BusInner {
                mem: [0; 128],
                pending_read: None,
                poisoned: Vec::new(),
                scripted: VecDeque::new(),
                frames: Vec::new(),
            })),
        }
    }

    /// Queue a reply for the next exchange, ahead of the register model.
    pub(crate) fn push_response(&self, response: Response) {
        self.inner.borrow_mut().scripted.push_back(response);
    }

    /// Preload a 16 bit register value.
    pub(crate) fn set_reg16(&self, addr: u8, value: u16) {
        let mut inner = self.inner.borrow_mut();
        let bytes = value.to_le_bytes();
        inner.mem[addr as usize] = bytes[0];
        inner.mem[addr as usize + 1] = bytes[1];
    }

    /// Current 16 bit register value.
    pub(crate) fn reg16(&self, addr: u8) -> u16 {
        let inner = self.inner.borrow();
        u16::from_le_bytes([inner.mem[addr as usize], inner.mem[addr as usize + 1]])
    }

    /// Make writes to `addr` disappear, for readback-failure scenarios.
    pub(crate) fn poison_reg(&self, addr: u8) {
        self.inner.borrow_mut().poisoned.push(addr);
    }

    /// All tx frames seen so far.
    pub(crate) fn frames(&self) -> Vec<Vec<u8>> {
        self.inner.borrow().frames.clone()
    }

    pub(crate) fn frame_count(&self) -> usize {
        self.inner.borrow().frames.len()
    }
}

impl SensorInterface for FakeBus {
    type BusError = FakeBusError;

    fn exchange(&mut self, tx: &[u8], rx: &mut [u8]) -> Result<usize, Self::BusError> {
        let mut inner = self.inner.borrow_mut();
        inner.frames.push(tx.to_vec());

        if let Some(response) = inner.scripted.pop_front() {
            return match response {
                Response::Frame(data) => {
                    let n = data.len().min(rx.len());
                    rx[..n].copy_from_slice(&data[..n]);
                    Ok(data.len())
                }
                Response::Fail => Err(FakeBusError),
            };
        }

        for b in rx.iter_mut() {
            *b = 0;
        }

        if tx.len() == 2 {
            if let Some(out) = inner.pending_read.take() {
                rx.copy_from_slice(&out);
            }
            let addr = tx[0] & !DIR_WRITE;
            if tx[0] & DIR_WRITE != 0 {
                if !inner.poisoned.contains(&addr) {
                    inner.mem[addr as usize] = tx[1];
                }
            } else {
                let lo = inner.mem[addr as usize];
                let hi = inner.mem[addr as usize + 1];
                inner.pending_read = Some([hi, lo]);
            }
            Ok(2)
        } else {
            Ok(rx.len())
        }
    }
}

#[derive(Default)]
struct SchedulerInner {
    scheduled: Vec<u32>,
    cancels: usize,
}

/// Records scheduling requests.
#[derive(Clone, Default)]
pub(crate) struct FakeScheduler {
    inner: Rc<RefCell<SchedulerInner>>,
}

impl FakeScheduler {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Every interval passed to `schedule_periodic`, in order.
    pub(crate) fn scheduled(&self) -> Vec<u32> {
        self.inner.borrow().scheduled.clone()
    }

    pub(crate) fn cancels(&self) -> usize {
        self.inner.borrow().cancels
    }
}

impl SampleScheduler for FakeScheduler {
    fn schedule_periodic(&mut self, interval_us: u32) {
        self.inner.borrow_mut().scheduled.push(interval_us);
    }

    fn cancel_periodic(&mut self) {
        self.inner.borrow_mut().cancels += 1;
    }
}

/// Collects published samples.
#[derive(Clone, Default)]
pub(crate) struct FakePublisher {
    inner: Rc<RefCell<Vec<Sample>>>,
}

impl FakePublisher {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn samples(&self) -> Vec<Sample> {
        self.inner.borrow().clone()
    }
}

impl SamplePublisher for FakePublisher {
    fn publish(&mut self, sample: Sample) {
        self.inner.borrow_mut().push(sample);
    }
}

/// Monotonic clock advancing a fixed step on every reading.
#[derive(Clone)]
pub(crate) struct FakeClock {
    inner: Rc<RefCell<(u64, u64)>>,
}

impl FakeClock {
    pub(crate) fn new(step_us: u64) -> Self {
        FakeClock {
            inner: Rc::new(RefCell::new((0, step_us))),
        }
    }
}

impl MonotonicClock for FakeClock {
    fn now_us(&mut self) -> u64 {
        let mut inner = self.inner.borrow_mut();
        inner.0 += inner.1;
        inner.0
    }
}

/// Delay sink accumulating the total requested wait.
#[derive(Clone, Default)]
pub(crate) struct FakeDelay {
    total_ns: Rc<RefCell<u64>>,
}

impl FakeDelay {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn total_ms(&self) -> u64 {
        *self.total_ns.borrow() / 1_000_000
    }
}

impl DelayNs for FakeDelay {
    fn delay_ns(&mut self, ns: u32) {
        *self.total_ns.borrow_mut() += ns as u64;
    }
}
