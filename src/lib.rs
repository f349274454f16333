#![no_std]

//! BMP280 barometric pressure and temperature sensor driver over SPI.
//!
//! `init_device` runs the whole bring-up: chip id check, soft reset, oversampling,
//! power mode, IIR filter and standby configuration, calibration load and a
//! reference pressure averaged over several readings. After that `measure`
//! returns temperature, pressure and altitude relative to the reference.

pub mod calibration;
pub mod constants;
pub mod data;
pub mod error;
pub mod transport;

use crate::calibration::CalibrationConstants;
use crate::error::Error;
use crate::transport::RegisterTransport;

use constants::{BAROMETRIC_EXPONENT, BAROMETRIC_SCALE_M, BMP280_CALIB_LEN, BMP280_CHIP_ID, BMP280_DATA_LEN,
                BMP280_REFERENCE_SETTLE_MS, BMP280_REG_CALIB, BMP280_REG_CONFIG, BMP280_REG_CTRL_MEAS,
                BMP280_REG_DATA, BMP280_REG_ID, BMP280_REG_RESET, BMP280_REG_STATUS, BMP280_RESET_SETTLE_MS,
                BMP280_RESET_VALUE, BMP280_SPI_DUMMY, BMP280_SPI_MASK_WRITE};

use data::{Bmp280Configuration, Config, CtrlMeas, DriverState, FilterCoef, InitOptions, Measurement, Oversampling,
           OversamplingTarget, PowerMode, RawSample, StandbyTime, Status};

#[cfg(not(feature = "async"))]
use embedded_hal::delay::DelayNs;
#[cfg(feature = "async")]
use embedded_hal_async::delay::DelayNs;

use log::{debug, info, warn};
use libm::{exp, pow};

/// Altitude in metres of `pressure_pa` relative to `reference_pa`.
///
/// Standard atmosphere approximation `(1 - (p / p_ref)^0.1903) * 44330.76`
/// without temperature correction, good for relative height changes only.
/// Returns 0.0 while no reference is set (`reference_pa` of 0).
pub fn compute_altitude(pressure_pa: f64, reference_pa: f64) -> f64 {
    if reference_pa > 0.0 {
        (1.0 - pow(pressure_pa / reference_pa, BAROMETRIC_EXPONENT)) * BAROMETRIC_SCALE_M
    } else {
        0.0
    }
}

/// get equivalent sealevel air pressure for given altitude (in metres)
pub fn sealevel_pressure(pressure_pa: f64, temperature_c: f64, altitude_m: f64) -> f64 {
    let exponent = -9.80665 * 0.028964 * altitude_m / (8.31432 * (temperature_c + 273.15));
    pressure_pa / exp(exponent)
}

/// the BMP280 device
pub struct Bmp280<T, D> {
    /// register transport (SPI bus and chip select)
    transport: T,
    delayer: D,
    config: Bmp280Configuration,
    state: DriverState,
    calibration: Option<CalibrationConstants>,
    /// 0.0 until `establish_reference` ran
    reference_pressure_pa: f64,
    measurement: Measurement,
}

impl<T, D> Bmp280<T, D> {
    /// create new BMP280 driver with the default configuration (pressure x16, temperature x2, normal mode,
    /// IIR filter 16, standby 0.5 ms)
    pub fn new(transport: T, delayer: D) -> Self {
        Self::new_with_config(transport, delayer, Bmp280Configuration::default())
    }

    /// create new BMP280 driver, `config` is written to the device by `init_device`
    pub fn new_with_config(transport: T, delayer: D, config: Bmp280Configuration) -> Self {
        debug!("new_with_config({:?})", config);
        Self {
            transport,
            delayer,
            config,
            state: DriverState::Uninitialized,
            calibration: None,
            reference_pressure_pa: 0.0,
            measurement: Measurement::default(),
        }
    }

    /// give back the register transport and the delay
    pub fn release(self) -> (T, D) {
        (self.transport, self.delayer)
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    /// calibration constants, `None` before `load_calibration`
    pub fn calibration(&self) -> Option<&CalibrationConstants> {
        self.calibration.as_ref()
    }

    /// reference pressure in Pa, 0.0 when not set
    pub fn reference_pressure(&self) -> f64 {
        self.reference_pressure_pa
    }

    /// result of the most recent measurement cycle
    pub fn last_measurement(&self) -> Measurement {
        self.measurement
    }
}

#[maybe_async_cfg::maybe(keep_self, sync(not(feature = "async")), async(feature = "async"))]
impl<T, D, E> Bmp280<T, D>
where
    T: RegisterTransport<Error = E>,
    D: DelayNs,
{
    // a device that failed identification gets no further bus traffic
    fn check_not_failed(&self) -> Result<(), Error<E>> {
        if self.state == DriverState::Failed {
            return Err(Error::NotReady(self.state));
        }
        Ok(())
    }

    // select, address, one dummy byte per value, deselect. Chip select is released on errors too
    async fn read_registers(&mut self, register_address: u8, buffer: &mut [u8]) -> Result<(), Error<E>> {
        self.check_not_failed()?;
        self.transport.select().map_err(Error::Transport)?;
        let result = self.clock_in(register_address, buffer).await;
        let released = self.transport.deselect().await.map_err(Error::Transport);
        result.and(released)
    }

    async fn clock_in(&mut self, register_address: u8, buffer: &mut [u8]) -> Result<(), Error<E>> {
        self.transport.exchange_byte(register_address).await.map_err(Error::Transport)?;
        for value in buffer.iter_mut() {
            *value = self.transport.exchange_byte(BMP280_SPI_DUMMY).await.map_err(Error::Transport)?;
        }
        Ok(())
    }

    async fn read_register(&mut self, register_address: u8) -> Result<u8, Error<E>> {
        let mut result_buf: [u8; 1] = [0; 1];
        self.read_registers(register_address, &mut result_buf).await?;
        Ok(result_buf[0])
    }

    async fn write_register(&mut self, register_address: u8, value: u8) -> Result<(), Error<E>> {
        self.check_not_failed()?;
        self.transport.select().map_err(Error::Transport)?;
        let result = self.clock_out(register_address & BMP280_SPI_MASK_WRITE, value).await;
        let released = self.transport.deselect().await.map_err(Error::Transport);
        result.and(released)
    }

    async fn clock_out(&mut self, register_address: u8, value: u8) -> Result<(), Error<E>> {
        self.transport.exchange_byte(register_address).await.map_err(Error::Transport)?;
        self.transport.exchange_byte(value).await.map_err(Error::Transport)?;
        Ok(())
    }

    /// read chip id, 0x58 for a BMP280
    pub async fn identify(&mut self) -> Result<u8, Error<E>> {
        let id = self.read_register(BMP280_REG_ID).await?;
        debug!("identify() = {:#04x}", id);
        Ok(id)
    }

    /// power-on reset, waits the 500 ms settle time before returning.
    /// The device is back in sleep mode with default configuration afterwards
    pub async fn reset_device(&mut self) -> Result<(), Error<E>> {
        debug!("in reset_device()");
        self.write_register(BMP280_REG_RESET, BMP280_RESET_VALUE).await?;
        self.state = DriverState::Resetting;
        self.delayer.delay_ms(BMP280_RESET_SETTLE_MS).await;
        self.state = DriverState::Configuring;
        Ok(())
    }

    /// get status
    pub async fn status(&mut self) -> Result<Status, Error<E>> {
        let status = Status(self.read_register(BMP280_REG_STATUS).await?);
        debug!("status() = {:?}", status);
        Ok(status)
    }

    async fn update_ctrl_meas(&mut self, update: impl FnOnce(&mut CtrlMeas)) -> Result<(), Error<E>> {
        let mut ctrl_meas = CtrlMeas(self.read_register(BMP280_REG_CTRL_MEAS).await?);
        update(&mut ctrl_meas);
        debug!("  writing ctrl_meas {:#010b}", ctrl_meas.0);
        self.write_register(BMP280_REG_CTRL_MEAS, ctrl_meas.0).await
    }

    async fn update_config(&mut self, update: impl FnOnce(&mut Config)) -> Result<(), Error<E>> {
        let mut config = Config(self.read_register(BMP280_REG_CONFIG).await?);
        update(&mut config);
        debug!("  writing config {:#010b}", config.0);
        self.write_register(BMP280_REG_CONFIG, config.0).await
    }

    /// set pressure or temperature oversampling, other ctrl_meas bits are kept
    pub async fn set_oversampling(&mut self, target: OversamplingTarget, level: Oversampling) -> Result<(), Error<E>> {
        debug!("in set_oversampling({:?}, {:?})", target, level);
        self.update_ctrl_meas(|reg| reg.set_oversampling(target, level)).await
    }

    /// set Power Mode
    pub async fn set_power_mode(&mut self, power_mode: PowerMode) -> Result<(), Error<E>> {
        debug!("in set_power_mode({:?})", power_mode);
        self.update_ctrl_meas(|reg| reg.set_power_mode(power_mode)).await
    }

    /// set IIR filter coefficient, other config bits are kept
    pub async fn set_filter_coefficient(&mut self, coef: FilterCoef) -> Result<(), Error<E>> {
        debug!("in set_filter_coefficient({:?})", coef);
        self.update_config(|reg| reg.set_filter_coef(coef)).await
    }

    /// set standby time used in normal mode
    pub async fn set_standby_time(&mut self, standby_time: StandbyTime) -> Result<(), Error<E>> {
        debug!("in set_standby_time({:?})", standby_time);
        self.update_config(|reg| reg.set_standby_time(standby_time)).await
    }

    /// get the power mode from ctrl_meas
    pub async fn power_mode(&mut self) -> Result<PowerMode, Error<E>> {
        Ok(CtrlMeas(self.read_register(BMP280_REG_CTRL_MEAS).await?).power_mode())
    }

    /// write oversampling and power mode, then filter and standby time
    pub async fn set_configuration(&mut self, config: Bmp280Configuration) -> Result<(), Error<E>> {
        debug!("in set_configuration({:?})", config);
        self.set_oversampling(OversamplingTarget::Pressure, config.over_sampling_press).await?;
        self.set_oversampling(OversamplingTarget::Temperature, config.over_sampling_temp).await?;
        self.set_power_mode(config.power_mode).await?;
        self.set_filter_coefficient(config.iir_filter_coef).await?;
        self.set_standby_time(config.standby_time).await?;
        self.config = config;
        Ok(())
    }

    /// read back ctrl_meas and config in one burst
    pub async fn configuration(&mut self) -> Result<Bmp280Configuration, Error<E>> {
        let mut result_buf: [u8; 2] = [0; 2];
        self.read_registers(BMP280_REG_CTRL_MEAS, &mut result_buf).await?;
        let config = Bmp280Configuration::from_registers(CtrlMeas(result_buf[0]), Config(result_buf[1]));
        debug!("configuration() = {:?}", config);
        Ok(config)
    }

    /// read the 24 calibration bytes and keep them for the rest of the session.
    /// Calibration is read once, a second call returns `NotReady`
    pub async fn load_calibration(&mut self) -> Result<CalibrationConstants, Error<E>> {
        debug!("in load_calibration()");
        if self.calibration.is_some() {
            return Err(Error::NotReady(self.state));
        }
        let mut result_buf: [u8; BMP280_CALIB_LEN] = [0; BMP280_CALIB_LEN];
        self.read_registers(BMP280_REG_CALIB, &mut result_buf).await?;
        let constants = CalibrationConstants::from_bytes(&result_buf);
        debug!("  calibration = {:?}", constants);
        self.calibration = Some(constants);
        self.state = DriverState::CalibrationLoaded;
        Ok(constants)
    }

    /// burst read of the pressure and temperature data registers
    pub async fn read_raw_sample(&mut self) -> Result<RawSample, Error<E>> {
        let mut result_buf: [u8; BMP280_DATA_LEN] = [0; BMP280_DATA_LEN];
        self.read_registers(BMP280_REG_DATA, &mut result_buf).await?;
        let raw = RawSample::from_bytes(&result_buf);
        debug!("read_raw_sample() = {:?}", raw);
        Ok(raw)
    }

    async fn measure_cycle(&mut self) -> Result<Measurement, Error<E>> {
        let calibration = self.calibration.ok_or(Error::NotReady(self.state))?;
        let raw = self.read_raw_sample().await?;
        let sample = calibration.compensate(raw);

        let pressure_pa = sample.pressure_pa();
        let altitude_m = if sample.pressure_q24_8 == 0 {
            warn!("pressure compensation returned 0, calibration divisor is zero");
            0.0
        } else {
            compute_altitude(pressure_pa, self.reference_pressure_pa)
        };

        self.measurement = Measurement {
            temperature_c: sample.temperature_c(),
            pressure_pa,
            altitude_m,
            temperature_centi_c: sample.temperature_centi_c,
            pressure_q24_8: sample.pressure_q24_8,
        };
        Ok(self.measurement)
    }

    /// read and compensate the latest sample, only valid once `init_device` finished
    pub async fn measure(&mut self) -> Result<Measurement, Error<E>> {
        if self.state != DriverState::Ready {
            return Err(Error::NotReady(self.state));
        }
        self.measure_cycle().await
    }

    /// Average `samples` pressure readings into the reference pressure for altitude.
    ///
    /// Waits the settle time first, then every reading is followed by `delay_ms`.
    /// Nothing is stored unless all readings succeed. Returns the new reference in Pa
    pub async fn establish_reference(&mut self, samples: u16, delay_ms: u32) -> Result<f64, Error<E>> {
        debug!("in establish_reference({}, {})", samples, delay_ms);
        if samples == 0 {
            return Err(Error::InvalidSampleCount);
        }
        if self.calibration.is_none() {
            return Err(Error::NotReady(self.state));
        }
        self.check_not_failed()?;

        self.delayer.delay_ms(BMP280_REFERENCE_SETTLE_MS).await;
        let mut sum: f64 = 0.0;
        for _ in 0..samples {
            let measurement = self.measure_cycle().await?;
            sum += measurement.pressure_pa;
            self.delayer.delay_ms(delay_ms).await;
        }

        self.reference_pressure_pa = sum / samples as f64;
        if self.state == DriverState::CalibrationLoaded {
            self.state = DriverState::ReferenceEstablished;
        }
        info!("reference pressure {} Pa from {} samples", self.reference_pressure_pa, samples);
        Ok(self.reference_pressure_pa)
    }

    /// initial BMP280 bring-up: identify, reset, configure, load calibration, establish the reference pressure.
    /// A wrong chip id leaves the driver `Failed`
    pub async fn init_device(&mut self, options: InitOptions) -> Result<(), Error<E>> {
        if self.state == DriverState::Failed {
            return Err(Error::NotReady(self.state));
        }

        self.state = DriverState::Identifying;
        let id = self.identify().await?;
        if id != BMP280_CHIP_ID {
            warn!("chip id {:#04x} is not a BMP280", id);
            self.state = DriverState::Failed;
            return Err(Error::UnsupportedChip(id));
        }

        self.reset_device().await?;
        self.set_configuration(self.config).await?;
        if self.calibration.is_some() {
            // kept from an earlier attempt that failed later on
            self.state = DriverState::CalibrationLoaded;
        } else {
            self.load_calibration().await?;
        }
        self.establish_reference(options.reference_samples, options.reference_delay_ms).await?;

        self.state = DriverState::Ready;
        info!("BMP280 ready, {:?}", self.config);
        Ok(())
    }
}

#[cfg(all(test, not(feature = "async")))]
mod tests {
    extern crate std;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::rc::Rc;
    use std::vec;
    use std::vec::Vec;

    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Event {
        Select,
        Deselect,
        Exchange(u8),
        Delay(u32),
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct BusFault;

    type Log = Rc<RefCell<Vec<Event>>>;

    // datasheet sample calibration
    const CALIB_BYTES: [u8; 24] = [
        112, 107, 67, 103, 24, 252, 125, 142, 67, 214, 208, 11, 39, 11, 140, 0, 249, 255, 140, 60, 248, 198, 112, 23,
    ];
    // pressure 415148, temperature 519888
    const SAMPLE: [u8; 6] = [0x65, 0x5a, 0xc0, 0x7e, 0xed, 0x00];

    /// register file behind a BMP280 style SPI interface: bit 7 of the first byte
    /// selects read (auto increment) or write (address/value pairs)
    struct FakeBmp280 {
        regs: [u8; 256],
        log: Log,
        first: bool,
        reading: bool,
        pointer: u8,
        write_address: Option<u8>,
        samples: VecDeque<[u8; 6]>,
        data_reads: usize,
        fail_after: Option<usize>,
        exchanges: usize,
    }

    impl FakeBmp280 {
        fn new(log: Log) -> Self {
            let mut regs = [0u8; 256];
            regs[BMP280_REG_ID as usize] = BMP280_CHIP_ID;
            regs[0x88..0xa0].copy_from_slice(&CALIB_BYTES);
            regs[0xf7..0xfd].copy_from_slice(&SAMPLE);
            FakeBmp280 {
                regs,
                log,
                first: false,
                reading: false,
                pointer: 0,
                write_address: None,
                samples: VecDeque::new(),
                data_reads: 0,
                fail_after: None,
                exchanges: 0,
            }
        }
    }

    impl RegisterTransport for FakeBmp280 {
        type Error = BusFault;

        fn select(&mut self) -> Result<(), BusFault> {
            self.log.borrow_mut().push(Event::Select);
            self.first = true;
            Ok(())
        }

        fn deselect(&mut self) -> Result<(), BusFault> {
            self.log.borrow_mut().push(Event::Deselect);
            Ok(())
        }

        fn exchange_byte(&mut self, tx: u8) -> Result<u8, BusFault> {
            self.log.borrow_mut().push(Event::Exchange(tx));
            self.exchanges += 1;
            if self.fail_after.is_some_and(|n| self.exchanges > n) {
                return Err(BusFault);
            }
            if self.first {
                self.first = false;
                self.reading = tx & 0x80 != 0;
                if self.reading {
                    self.pointer = tx;
                    if tx == BMP280_REG_DATA {
                        self.data_reads += 1;
                        if let Some(sample) = self.samples.pop_front() {
                            self.regs[0xf7..0xfd].copy_from_slice(&sample);
                        }
                    }
                } else {
                    self.write_address = Some(tx | 0x80);
                }
                return Ok(0xff);
            }
            if self.reading {
                let value = self.regs[self.pointer as usize];
                self.pointer = self.pointer.wrapping_add(1);
                Ok(value)
            } else {
                match self.write_address.take() {
                    Some(address) => {
                        if address == BMP280_REG_RESET && tx == BMP280_RESET_VALUE {
                            self.regs[BMP280_REG_CTRL_MEAS as usize] = 0;
                            self.regs[BMP280_REG_CONFIG as usize] = 0;
                        } else {
                            self.regs[address as usize] = tx;
                        }
                    }
                    None => self.write_address = Some(tx | 0x80),
                }
                Ok(0xff)
            }
        }
    }

    struct LogDelay {
        log: Log,
    }

    impl DelayNs for LogDelay {
        fn delay_ns(&mut self, _ns: u32) {}

        fn delay_ms(&mut self, ms: u32) {
            self.log.borrow_mut().push(Event::Delay(ms));
        }
    }

    fn sensor() -> (Bmp280<FakeBmp280, LogDelay>, Log) {
        let _ = env_logger::builder().is_test(true).try_init();
        let log: Log = Rc::new(RefCell::new(Vec::new()));
        let fake = FakeBmp280::new(log.clone());
        let delay = LogDelay { log: log.clone() };
        (Bmp280::new(fake, delay), log)
    }

    fn pressure_of(sample: [u8; 6]) -> f64 {
        CalibrationConstants::from_bytes(&CALIB_BYTES).compensate(RawSample::from_bytes(&sample)).pressure_pa()
    }

    fn frame_addresses(log: &[Event]) -> Vec<u8> {
        log.windows(2)
            .filter_map(|w| match w {
                [Event::Select, Event::Exchange(address)] => Some(*address),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn burst_read_is_one_address_and_dummy_bytes_in_one_frame() {
        let (mut sensor, log) = sensor();
        let raw = sensor.read_raw_sample().unwrap();
        assert_eq!(raw, RawSample { pressure: 415_148, temperature: 519_888 });

        let mut expected = vec![Event::Select, Event::Exchange(BMP280_REG_DATA)];
        expected.extend([Event::Exchange(BMP280_SPI_DUMMY); 6]);
        expected.push(Event::Deselect);
        assert_eq!(*log.borrow(), expected);
    }

    #[test]
    fn single_read_sends_address_unmodified() {
        let (mut sensor, log) = sensor();
        assert_eq!(sensor.identify().unwrap(), BMP280_CHIP_ID);
        assert_eq!(
            *log.borrow(),
            vec![Event::Select, Event::Exchange(0xd0), Event::Exchange(0x00), Event::Deselect]
        );
    }

    #[test]
    fn write_clears_address_bit_7() {
        let (mut sensor, log) = sensor();
        sensor.set_power_mode(PowerMode::Normal).unwrap();
        let writes: Vec<Event> = log.borrow()[4..].to_vec();
        assert_eq!(writes, vec![Event::Select, Event::Exchange(0x74), Event::Exchange(0b11), Event::Deselect]);
    }

    #[test]
    fn setters_keep_sibling_fields() {
        let levels = [
            Oversampling::Skipped,
            Oversampling::X1,
            Oversampling::X2,
            Oversampling::X4,
            Oversampling::X8,
            Oversampling::X16,
        ];
        let modes = [PowerMode::Sleep, PowerMode::Forced, PowerMode::Normal];
        let (mut sensor, _log) = sensor();
        for &level in levels.iter() {
            for &mode in modes.iter() {
                sensor.set_power_mode(mode).unwrap();
                sensor.set_oversampling(OversamplingTarget::Pressure, level).unwrap();
                sensor.set_oversampling(OversamplingTarget::Temperature, Oversampling::X2).unwrap();
                assert_eq!(sensor.power_mode().unwrap(), mode);

                sensor.set_oversampling(OversamplingTarget::Pressure, Oversampling::X4).unwrap();
                sensor.set_power_mode(mode).unwrap();
                sensor.set_oversampling(OversamplingTarget::Pressure, level).unwrap();
                let config = sensor.configuration().unwrap();
                assert_eq!(config.power_mode, mode);
                assert_eq!(config.over_sampling_press, level);
                assert_eq!(config.over_sampling_temp, Oversampling::X2);
            }
        }

        sensor.set_standby_time(StandbyTime::SB_2000_MS).unwrap();
        sensor.set_filter_coefficient(FilterCoef::COEF_4).unwrap();
        let config = sensor.configuration().unwrap();
        assert_eq!(config.standby_time, StandbyTime::SB_2000_MS);
        assert_eq!(config.iir_filter_coef, FilterCoef::COEF_4);
    }

    #[test]
    fn init_runs_the_bring_up_sequence() {
        let (mut sensor, log) = sensor();
        sensor.init_device(InitOptions { reference_samples: 3, reference_delay_ms: 5 }).unwrap();
        assert_eq!(sensor.state(), DriverState::Ready);
        assert_eq!(sensor.configuration().unwrap(), Bmp280Configuration::default());
        assert_eq!(sensor.reference_pressure(), pressure_of(SAMPLE));

        let log = log.borrow();
        let addresses = frame_addresses(&log);
        // id, reset, 3 x ctrl_meas rmw, 2 x config rmw, calibration, 3 samples, read back
        assert_eq!(
            addresses,
            vec![0xd0, 0x60, 0xf4, 0x74, 0xf4, 0x74, 0xf4, 0x74, 0xf5, 0x75, 0xf5, 0x75, 0x88, 0xf7, 0xf7, 0xf7, 0xf4]
        );

        // settle delay right after the reset frame, before any other access
        let reset_at = log.iter().position(|e| *e == Event::Exchange(0x60)).unwrap();
        assert_eq!(log[reset_at + 1], Event::Exchange(BMP280_RESET_VALUE));
        assert_eq!(log[reset_at + 2], Event::Deselect);
        assert_eq!(log[reset_at + 3], Event::Delay(BMP280_RESET_SETTLE_MS));

        let delays: Vec<u32> = log
            .iter()
            .filter_map(|e| match e {
                Event::Delay(ms) => Some(*ms),
                _ => None,
            })
            .collect();
        assert_eq!(delays, vec![BMP280_RESET_SETTLE_MS, BMP280_REFERENCE_SETTLE_MS, 5, 5, 5]);
    }

    #[test]
    fn measure_after_init() {
        let (mut sensor, _log) = sensor();
        sensor.init_device(InitOptions { reference_samples: 1, reference_delay_ms: 0 }).unwrap();
        let measurement = sensor.measure().unwrap();
        assert_eq!(measurement.temperature_centi_c, 2508);
        assert_eq!(measurement.pressure_q24_8, 25_767_233);
        assert!((measurement.temperature_c - 25.08).abs() < 1e-9);
        assert!((measurement.pressure_pa - 100_653.25).abs() < 0.01);
        assert_eq!(measurement.altitude_m, 0.0);
        assert_eq!(sensor.last_measurement(), measurement);
    }

    #[test]
    fn wrong_chip_id_fails_without_reset() {
        let (sensor, log) = sensor();
        let (mut fake, delay) = sensor.release();
        fake.regs[BMP280_REG_ID as usize] = 0x60;
        let mut sensor = Bmp280::new(fake, delay);

        assert_eq!(sensor.init_device(InitOptions::default()), Err(Error::UnsupportedChip(0x60)));
        assert_eq!(sensor.state(), DriverState::Failed);
        assert_eq!(frame_addresses(&log.borrow()), vec![0xd0]);

        assert_eq!(sensor.init_device(InitOptions::default()), Err(Error::NotReady(DriverState::Failed)));
        assert_eq!(sensor.measure(), Err(Error::NotReady(DriverState::Failed)));
    }

    #[test]
    fn failed_driver_sends_nothing_more() {
        let (sensor, log) = sensor();
        let (mut fake, delay) = sensor.release();
        fake.regs[BMP280_REG_ID as usize] = 0x60;
        let mut sensor = Bmp280::new(fake, delay);
        assert_eq!(sensor.init_device(InitOptions::default()), Err(Error::UnsupportedChip(0x60)));

        let failed = Err(Error::NotReady(DriverState::Failed));
        assert_eq!(sensor.reset_device(), failed);
        assert_eq!(sensor.load_calibration().map(|_| ()), failed);
        assert_eq!(sensor.set_power_mode(PowerMode::Normal), failed);
        assert_eq!(sensor.identify().map(|_| ()), failed);
        assert_eq!(sensor.state(), DriverState::Failed);
        assert!(sensor.calibration().is_none());

        let log = log.borrow();
        assert_eq!(frame_addresses(&log), vec![0xd0]);
        assert!(!log.iter().any(|e| matches!(e, Event::Delay(_))));
    }

    #[test]
    fn calibration_is_read_once() {
        let (mut sensor, log) = sensor();
        sensor.init_device(InitOptions { reference_samples: 1, reference_delay_ms: 0 }).unwrap();
        let constants = *sensor.calibration().unwrap();

        assert_eq!(sensor.load_calibration(), Err(Error::NotReady(DriverState::Ready)));
        assert_eq!(sensor.state(), DriverState::Ready);
        assert_eq!(sensor.calibration(), Some(&constants));
        assert!(sensor.measure().is_ok());

        let bursts = frame_addresses(&log.borrow()).iter().filter(|a| **a == BMP280_REG_CALIB).count();
        assert_eq!(bursts, 1);
    }

    #[test]
    fn init_reuses_loaded_calibration() {
        let (mut sensor, log) = sensor();
        sensor.load_calibration().unwrap();
        sensor.init_device(InitOptions { reference_samples: 1, reference_delay_ms: 0 }).unwrap();
        assert_eq!(sensor.state(), DriverState::Ready);

        let bursts = frame_addresses(&log.borrow()).iter().filter(|a| **a == BMP280_REG_CALIB).count();
        assert_eq!(bursts, 1);
    }

    #[test]
    fn measure_needs_init() {
        let (mut sensor, log) = sensor();
        assert_eq!(sensor.measure(), Err(Error::NotReady(DriverState::Uninitialized)));
        assert_eq!(sensor.establish_reference(4, 5), Err(Error::NotReady(DriverState::Uninitialized)));
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn reference_is_the_mean_of_n_cycles() {
        let samples = [
            [0x65, 0x5a, 0xc0, 0x7e, 0xed, 0x00],
            [0x64, 0x00, 0x00, 0x7e, 0xed, 0x00],
            [0x66, 0x10, 0x80, 0x7e, 0xed, 0x00],
            [0x65, 0x00, 0x40, 0x7e, 0xed, 0x00],
        ];
        let (sensor, _log) = sensor();
        let (mut fake, delay) = sensor.release();
        fake.samples.extend(samples.iter().copied());
        let mut sensor = Bmp280::new(fake, delay);
        sensor.load_calibration().unwrap();

        let reference = sensor.establish_reference(4, 5).unwrap();
        let expected = samples.iter().map(|s| pressure_of(*s)).sum::<f64>() / 4.0;
        assert!((reference - expected).abs() < 1e-6);
        assert_eq!(sensor.reference_pressure(), reference);
        assert_eq!(sensor.state(), DriverState::ReferenceEstablished);

        let (fake, _) = sensor.release();
        assert_eq!(fake.data_reads, 4);
    }

    #[test]
    fn reference_of_one_sample_is_that_sample() {
        let (mut sensor, _log) = sensor();
        sensor.load_calibration().unwrap();
        assert_eq!(sensor.establish_reference(1, 5).unwrap(), pressure_of(SAMPLE));
        assert_eq!(sensor.establish_reference(0, 5), Err(Error::InvalidSampleCount));
        assert_eq!(sensor.reference_pressure(), pressure_of(SAMPLE));
    }

    #[test]
    fn altitude_stays_zero_without_reference() {
        let (mut sensor, _log) = sensor();
        sensor.load_calibration().unwrap();
        let measurement = sensor.measure_cycle().unwrap();
        assert_eq!(sensor.reference_pressure(), 0.0);
        assert_eq!(measurement.altitude_m, 0.0);
        assert!(measurement.pressure_pa > 0.0);

        for &p in [0.0, 50_000.0, 101_325.0, 120_000.0].iter() {
            assert_eq!(compute_altitude(p, 0.0), 0.0);
        }
    }

    #[test]
    fn altitude_against_standard_sea_level() {
        assert_eq!(compute_altitude(101_325.0, 101_325.0), 0.0);
        assert!((compute_altitude(100_653.27, 101_325.0) - 56.0778).abs() < 1e-3);
        assert!(compute_altitude(102_000.0, 101_325.0) < 0.0);
    }

    #[test]
    fn sealevel_pressure_is_higher_above_sea_level() {
        assert_eq!(sealevel_pressure(100_000.0, 15.0, 0.0), 100_000.0);
        let p0 = sealevel_pressure(95_000.0, 15.0, 500.0);
        assert!(p0 > 100_000.0 && p0 < 101_500.0);
    }

    #[test]
    fn zero_divisor_reports_sentinel_pressure() {
        let (sensor, _log) = sensor();
        let (mut fake, delay) = sensor.release();
        fake.regs[0x8e] = 0; // dig_P1 low byte
        fake.regs[0x8f] = 0; // dig_P1 high byte
        let mut sensor = Bmp280::new(fake, delay);
        sensor.init_device(InitOptions { reference_samples: 1, reference_delay_ms: 0 }).unwrap();

        let measurement = sensor.measure().unwrap();
        assert_eq!(measurement.pressure_q24_8, 0);
        assert_eq!(measurement.pressure_pa, 0.0);
        assert_eq!(measurement.altitude_m, 0.0);
    }

    #[test]
    fn transport_fault_still_releases_chip_select() {
        let (sensor, log) = sensor();
        let (mut fake, delay) = sensor.release();
        fake.fail_after = Some(3);
        let mut sensor = Bmp280::new(fake, delay);

        assert_eq!(sensor.read_raw_sample(), Err(Error::Transport(BusFault)));
        let log = log.borrow();
        assert_eq!(log.first(), Some(&Event::Select));
        assert_eq!(log.last(), Some(&Event::Deselect));
        assert_eq!(log.iter().filter(|e| **e == Event::Deselect).count(), 1);
    }

    #[test]
    fn reset_drops_configuration() {
        let (mut sensor, _log) = sensor();
        sensor.set_configuration(Bmp280Configuration::default()).unwrap();
        sensor.reset_device().unwrap();
        assert_eq!(sensor.state(), DriverState::Configuring);
        assert_eq!(sensor.power_mode().unwrap(), PowerMode::Sleep);
        assert!(!sensor.status().unwrap().measuring());
    }
}
