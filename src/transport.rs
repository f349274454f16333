//! Register transport: byte level full-duplex exchange framed by chip select.

use core::fmt;

use embedded_hal::digital::OutputPin;
#[cfg(not(feature = "async"))]
use embedded_hal::spi::SpiBus;
#[cfg(feature = "async")]
use embedded_hal_async::spi::SpiBus;

/// What the driver needs from the bus. Every register operation is bracketed by
/// one `select` / `deselect` pair, the driver releases the device on error paths too.
///
/// `select` stays blocking in the async build: it only drives a pin, while `deselect`
/// has to await the bus flush first.
#[maybe_async_cfg::maybe(keep_self, sync(not(feature = "async")), async(feature = "async"))]
#[allow(async_fn_in_trait)]
pub trait RegisterTransport {
    type Error;

    /// assert chip select
    fn select(&mut self) -> Result<(), Self::Error>;

    /// release chip select
    async fn deselect(&mut self) -> Result<(), Self::Error>;

    /// clock out `tx` and return the byte clocked in at the same time
    async fn exchange_byte(&mut self, tx: u8) -> Result<u8, Self::Error>;
}

/// SPI bus transport errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError<SpiE, PinE> {
    Spi(SpiE),
    ChipSelect(PinE),
}

impl<SpiE: fmt::Debug, PinE: fmt::Debug> fmt::Display for TransportError<SpiE, PinE> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Spi(e) => write!(f, "SPI bus error: {:?}", e),
            TransportError::ChipSelect(e) => write!(f, "chip select pin error: {:?}", e),
        }
    }
}

/// BMP280 on an exclusive SPI bus (mode 0 or mode 3) with a GPIO chip select, active low
pub struct SpiTransport<SPI, CS> {
    spi: SPI,
    cs: CS,
}

impl<SPI, CS> SpiTransport<SPI, CS> {
    pub fn new(spi: SPI, cs: CS) -> Self {
        SpiTransport { spi, cs }
    }

    /// give back the SPI bus and the chip select pin
    pub fn release(self) -> (SPI, CS) {
        (self.spi, self.cs)
    }
}

#[maybe_async_cfg::maybe(keep_self, sync(not(feature = "async")), async(feature = "async"))]
impl<SPI, CS> RegisterTransport for SpiTransport<SPI, CS>
where
    SPI: SpiBus<u8>,
    CS: OutputPin,
{
    type Error = TransportError<SPI::Error, CS::Error>;

    fn select(&mut self) -> Result<(), Self::Error> {
        self.cs.set_low().map_err(TransportError::ChipSelect)
    }

    async fn deselect(&mut self) -> Result<(), Self::Error> {
        // let the last byte leave the bus before chip select goes high
        let flushed = self.spi.flush().await.map_err(TransportError::Spi);
        self.cs.set_high().map_err(TransportError::ChipSelect)?;
        flushed
    }

    async fn exchange_byte(&mut self, tx: u8) -> Result<u8, Self::Error> {
        let mut buf = [tx];
        self.spi.transfer_in_place(&mut buf).await.map_err(TransportError::Spi)?;
        Ok(buf[0])
    }
}
