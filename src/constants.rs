// BMP280 registers

#![allow(nonstandard_style)]
pub const BMP280_CHIP_ID: u8 = 0x58;  // value expected in BMP280_REG_ID

pub const BMP280_REG_CALIB: u8 = 0x88;  // 24 bytes at 0x88 - 0x9f, dig_T1 .. dig_P9, little endian pairs
pub const BMP280_REG_ID: u8 = 0xd0;  // chip id
pub const BMP280_REG_RESET: u8 = 0xe0;  // write BMP280_RESET_VALUE for a power-on-reset
pub const BMP280_REG_STATUS: u8 = 0xf3;  // measuring and im_update flags
pub const BMP280_REG_CTRL_MEAS: u8 = 0xf4;  // osrs_t, osrs_p and power mode
pub const BMP280_REG_CONFIG: u8 = 0xf5;  // standby time, IIR filter, spi3w_en
pub const BMP280_REG_DATA: u8 = 0xf7;  // 6 bytes at 0xf7 - 0xfc, press msb/lsb/xlsb then temp msb/lsb/xlsb

pub const BMP280_RESET_VALUE: u8 = 0xb6;

pub const BMP280_CALIB_LEN: usize = 24;
pub const BMP280_DATA_LEN: usize = 6;

/// SPI write access clears bit 7 of the register address
pub const BMP280_SPI_MASK_WRITE: u8 = 0b0111_1111;
/// byte clocked out while reading
pub const BMP280_SPI_DUMMY: u8 = 0x00;

/// wait after a soft reset before the next register access
pub const BMP280_RESET_SETTLE_MS: u32 = 500;
/// wait before the first reference sample, covers one x16/x16 conversion (max 43.2 ms)
pub const BMP280_REFERENCE_SETTLE_MS: u32 = 50;

/// number of pressure samples averaged into the reference pressure during init
pub const BMP280_REFERENCE_SAMPLES: u16 = 100;
/// delay between reference samples, in ms
pub const BMP280_REFERENCE_DELAY_MS: u32 = 5;

/// barometric formula exponent and scale (metres)
pub const BAROMETRIC_EXPONENT: f64 = 0.1903;
pub const BAROMETRIC_SCALE_M: f64 = 44_330.76;
