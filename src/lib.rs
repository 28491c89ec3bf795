// Copyright (c) 2022, Zachary D. Olkin.
// This code is provided under the MIT license.

//! Device agnostic driver for the ADIS16477 IMU (inertial measurement unit).
//! The driver depends on embedded-hal, so as long as the HAL you use implements those traits, then
//! this driver should be compatible.
//!
//! The data sheet for this device can be found [here](https://www.analog.com/media/en/technical-documentation/data-sheets/adis16477.pdf).
//!
//! The ADIS16477 talks over SPI only. The sampler itself is written against a small transport
//! trait so it can be driven by any `embedded_hal::spi::SpiDevice` through the provided adapter,
//! or by a fake bus in tests.
//!
//! Sampling is periodic: `start` arms the injected scheduling capability and the owning
//! execution context calls `run` on every tick. Each cycle performs one burst read, validates
//! the checksum, converts raw counts to physical units and hands the sample to the injected
//! publisher. Per-cycle transfer failures only bump the diagnostic counters.
//!
//! The github repo can be found [here](https://github.com/Zolkin1/adis16477_driver).

#![deny(missing_docs)]
#![no_std]

#[cfg(test)]
extern crate std;

#[cfg(feature = "rtt")]
use defmt_rtt as _; // global logger
#[cfg(feature = "rtt")]
use panic_probe as _;

/// Main module that holds the sampler, the burst wire protocol and the bus interface.
/// Also holds the enums, constants and capability traits shared between them.
pub mod adis16477;
