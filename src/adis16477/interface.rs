// Copyright (c) 2022, Zachary D. Olkin.
// This code is provided under the MIT license.

use embedded_hal::spi::SpiDevice;

/// Full duplex exchange with the sensor.
///
/// One call corresponds to exactly one chip select assertion, which is what the
/// ADIS16477 register protocol is built around: register access uses one 16 bit
/// frame per call, the burst read holds chip select for the whole 22 byte frame.
///
/// Implementations report how many bytes were actually clocked into `rx`; the
/// driver treats any shortfall as a malformed transfer.
pub trait SensorInterface {
    /// Error produced by the underlying transport
    type BusError;

    /// Clock `tx` out while filling `rx`, returning the number of bytes received.
    fn exchange(&mut self, tx: &[u8], rx: &mut [u8]) -> Result<usize, Self::BusError>;
}

/// Adapter driving [`SensorInterface`] over any embedded-hal SPI device.
///
/// The `SpiDevice` contract already owns chip select framing, so every `exchange`
/// maps to a single transfer transaction.
pub struct SpiInterface<SPI> {
    spi: SPI,
}

impl<SPI> SpiInterface<SPI>
where
    SPI: SpiDevice,
{
    /// Wrap an embedded-hal SPI device. The device must be configured for SPI mode 3.
    pub fn new(spi: SPI) -> Self {
        SpiInterface { spi }
    }

    /// Give the SPI device back.
    pub fn release(self) -> SPI {
        self.spi
    }
}

impl<SPI> SensorInterface for SpiInterface<SPI>
where
    SPI: SpiDevice,
{
    type BusError = SPI::Error;

    fn exchange(&mut self, tx: &[u8], rx: &mut [u8]) -> Result<usize, Self::BusError> {
        self.spi.transfer(rx, tx)?;
        Ok(rx.len())
    }
}
