use bitfield::bitfield;
use const_builder::ConstBuilder;

use crate::constants::{BMP280_REFERENCE_DELAY_MS, BMP280_REFERENCE_SAMPLES};

/// A measurement result from the sensor.
#[derive(Debug, PartialEq, Clone, Copy, Default)]
pub struct Measurement {
    /// temperature degrees C, 0.01 resolution
    pub temperature_c: f64,
    /// air pressure in Pa
    pub pressure_pa: f64,
    /// altitude in metres relative to the reference pressure, 0.0 while no reference is set
    pub altitude_m: f64,
    /// compensated temperature in 1/100 degrees C
    pub temperature_centi_c: i32,
    /// compensated pressure in Pa, Q24.8 fixed point. 0 means the calibration made compensation impossible
    pub pressure_q24_8: u32,
}

/// Raw 20 bit ADC codes from one burst read of the data registers
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub struct RawSample {
    pub pressure: u32,
    pub temperature: u32,
}

impl RawSample {
    /// decode press_msb, press_lsb, press_xlsb, temp_msb, temp_lsb, temp_xlsb.
    /// xlsb carries bits 3:0 in its top nibble, the low nibble is not used
    pub fn from_bytes(buf: &[u8; 6]) -> Self {
        RawSample {
            pressure: Self::adc_20bit(buf[0], buf[1], buf[2]),
            temperature: Self::adc_20bit(buf[3], buf[4], buf[5]),
        }
    }

    fn adc_20bit(msb: u8, lsb: u8, xlsb: u8) -> u32 {
        ((msb as u32) << 12) | ((lsb as u32) << 4) | ((xlsb as u32) >> 4)
    }
}

/// driver life cycle, `Ready` is the only state that allows `measure()`
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub enum DriverState {
    #[default]
    Uninitialized,
    Identifying,
    Resetting,
    Configuring,
    CalibrationLoaded,
    ReferenceEstablished,
    Ready,
    /// identity check failed, terminal
    Failed,
}

/// Oversampling setting, used for both pressure (osrs_p) and temperature (osrs_t)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Default)]
#[repr(u8)]
pub enum Oversampling {
    /// measurement skipped, output is 0x80000
    Skipped = 0b000,
    /// x1, 16 bit
    #[default]
    X1 = 0b001,
    /// x2, 17 bit
    X2 = 0b010,
    /// x4, 18 bit
    X4 = 0b011,
    /// x8, 19 bit
    X8 = 0b100,
    /// x16, 20 bit
    X16 = 0b101,
}

impl From<u8> for Oversampling {
    fn from(v: u8) -> Self {
        match v & 0b111 {
            0b000 => Self::Skipped,
            0b001 => Self::X1,
            0b010 => Self::X2,
            0b011 => Self::X4,
            0b100 => Self::X8,
            _ => Self::X16,  // 0b101 and up are all x16
        }
    }
}

impl From<Oversampling> for u8 {
    fn from(v: Oversampling) -> Self {
        v as u8
    }
}

/// which measurement an oversampling setting applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OversamplingTarget {
    Pressure,
    Temperature,
}

/// Power Mode
#[derive(Debug, Eq, PartialOrd, PartialEq, Clone, Copy, Default)]
#[repr(u8)]
pub enum PowerMode {
    #[default]
    Sleep = 0b00,
    Forced = 0b01,
    Normal = 0b11,
}

impl From<u8> for PowerMode {
    fn from(v: u8) -> PowerMode {
        match v & 0b11 {
            0b00 => Self::Sleep,
            0b11 => Self::Normal,
            _ => Self::Forced,  // 0b01 and 0b10
        }
    }
}

impl From<PowerMode> for u8 {
    fn from(v: PowerMode) -> Self {
        v as u8
    }
}

/// IIR Filter coefficients
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Default)]
#[allow(non_camel_case_types)]
#[repr(u8)]
pub enum FilterCoef {
    #[default]
    COEF_OFF = 0b000,
    COEF_2 = 0b001,
    COEF_4 = 0b010,
    COEF_8 = 0b011,
    COEF_16 = 0b100,
}

impl From<u8> for FilterCoef {
    fn from(v: u8) -> Self {
        match v & 0b111 {
            0b000 => Self::COEF_OFF,
            0b001 => Self::COEF_2,
            0b010 => Self::COEF_4,
            0b011 => Self::COEF_8,
            _ => Self::COEF_16,
        }
    }
}

impl From<FilterCoef> for u8 {
    fn from(v: FilterCoef) -> Self {
        v as u8
    }
}

/// Standby time between measurements in normal mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Default)]
#[allow(non_camel_case_types)]
#[repr(u8)]
pub enum StandbyTime {
    #[default]
    SB_0P5_MS = 0b000,  // 0.5 ms
    SB_62P5_MS = 0b001,  // 62.5 ms
    SB_125_MS = 0b010,
    SB_250_MS = 0b011,
    SB_500_MS = 0b100,
    SB_1000_MS = 0b101,
    SB_2000_MS = 0b110,
    SB_4000_MS = 0b111,
}

impl From<u8> for StandbyTime {
    fn from(v: u8) -> Self {
        match v & 0b111 {
            0b000 => Self::SB_0P5_MS,
            0b001 => Self::SB_62P5_MS,
            0b010 => Self::SB_125_MS,
            0b011 => Self::SB_250_MS,
            0b100 => Self::SB_500_MS,
            0b101 => Self::SB_1000_MS,
            0b110 => Self::SB_2000_MS,
            _ => Self::SB_4000_MS,
        }
    }
}

impl From<StandbyTime> for u8 {
    fn from(v: StandbyTime) -> Self {
        v as u8
    }
}

bitfield! {
    /// BMP280 ctrl_meas register (0xF4)
    #[derive(Clone, Copy, PartialEq, Eq, Default)]
    pub struct CtrlMeas(u8);
    impl Debug;

    pub u8, from into Oversampling, temperature_oversampling, set_temperature_oversampling: 7, 5;
    pub u8, from into Oversampling, pressure_oversampling, set_pressure_oversampling: 4, 2;
    pub u8, from into PowerMode, power_mode, set_power_mode: 1, 0;
}

impl CtrlMeas {
    pub fn set_oversampling(&mut self, target: OversamplingTarget, level: Oversampling) {
        match target {
            OversamplingTarget::Pressure => self.set_pressure_oversampling(level),
            OversamplingTarget::Temperature => self.set_temperature_oversampling(level),
        }
    }
}

bitfield! {
    /// BMP280 config register (0xF5)
    #[derive(Clone, Copy, PartialEq, Eq, Default)]
    pub struct Config(u8);
    impl Debug;

    pub u8, from into StandbyTime, standby_time, set_standby_time: 7, 5;
    pub u8, from into FilterCoef, filter_coef, set_filter_coef: 4, 2;
    pub bool, spi3w_en, set_spi3w_en: 0;  // 3-wire SPI, left alone by this driver
}

bitfield! {
    /// BMP280 status register (0xF3)
    #[derive(Clone, Copy, PartialEq, Eq)]
    pub struct Status(u8);
    impl Debug;

    pub bool, measuring, _: 3;  // conversion running
    pub bool, im_update, _: 0;  // NVM data being copied to image registers
}

/// BMP280 configuration: oversampling, power mode, IIR filter, standby time.
/// Built in const context with `Bmp280Configuration::builder()`, unset fields take the init defaults
#[derive(ConstBuilder, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bmp280Configuration {
    #[builder(default = PowerMode::Normal)]
    pub power_mode: PowerMode,
    #[builder(default = Oversampling::X16)]
    pub over_sampling_press: Oversampling,
    #[builder(default = Oversampling::X2)]
    pub over_sampling_temp: Oversampling,
    #[builder(default = FilterCoef::COEF_16)]
    pub iir_filter_coef: FilterCoef,
    #[builder(default = StandbyTime::SB_0P5_MS)]
    pub standby_time: StandbyTime,
}

impl Bmp280Configuration {
    /// decode from ctrl_meas and config register images
    pub fn from_registers(ctrl_meas: CtrlMeas, config: Config) -> Self {
        Self {
            power_mode: ctrl_meas.power_mode(),
            over_sampling_press: ctrl_meas.pressure_oversampling(),
            over_sampling_temp: ctrl_meas.temperature_oversampling(),
            iir_filter_coef: config.filter_coef(),
            standby_time: config.standby_time(),
        }
    }
}

/// pressure x16, temperature x2, normal mode, IIR filter 16, standby 0.5 ms
impl Default for Bmp280Configuration {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// reference pressure settings used by `init_device`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InitOptions {
    pub reference_samples: u16,
    pub reference_delay_ms: u32,
}

impl Default for InitOptions {
    fn default() -> Self {
        InitOptions {
            reference_samples: BMP280_REFERENCE_SAMPLES,
            reference_delay_ms: BMP280_REFERENCE_DELAY_MS,
        }
    }
}
