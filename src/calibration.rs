//! Factory calibration constants and the BMP280 integer compensation.
//!
//! The arithmetic follows the Bosch reference code: 32 bit temperature and
//! 64 bit pressure compensation with arithmetic right shifts and a truncating
//! division. Results are bit-exact with that code, floating point versions of
//! the same formula are not.

use crate::data::RawSample;

/// calibration parameters, read once from NVM registers 0x88 - 0x9f
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub struct CalibrationConstants {
    pub dig_t1: u16,
    pub dig_t2: i16,
    pub dig_t3: i16,

    pub dig_p1: u16,
    pub dig_p2: i16,
    pub dig_p3: i16,
    pub dig_p4: i16,
    pub dig_p5: i16,
    pub dig_p6: i16,
    pub dig_p7: i16,
    pub dig_p8: i16,
    pub dig_p9: i16,
}

/// Temperature with full compensation precision, input to pressure compensation.
///
/// Only `CalibrationConstants::compensate_temperature` creates one, so pressure
/// can never be compensated against a missing or stale temperature.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct FineTemperature(i32);

impl FineTemperature {
    pub fn value(&self) -> i32 {
        self.0
    }
}

/// compensated temperature and pressure of one raw sample
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct CompensatedSample {
    /// 1/100 degrees C, 5123 is 51.23 C
    pub temperature_centi_c: i32,
    /// Pa in Q24.8, 24674867 is 24674867 / 256 = 96386.2 Pa. 0 is the degenerate calibration sentinel
    pub pressure_q24_8: u32,
}

impl CompensatedSample {
    pub fn temperature_c(&self) -> f64 {
        self.temperature_centi_c as f64 / 100.0
    }

    pub fn pressure_pa(&self) -> f64 {
        self.pressure_q24_8 as f64 / 256.0
    }
}

impl CalibrationConstants {
    /// dig_T1 .. dig_P9 as little endian pairs: buf[2i] low byte, buf[2i + 1] high byte
    pub fn from_bytes(buf: &[u8; 24]) -> Self {
        let u = |i: usize| u16::from_le_bytes([buf[2 * i], buf[2 * i + 1]]);
        let s = |i: usize| i16::from_le_bytes([buf[2 * i], buf[2 * i + 1]]);
        CalibrationConstants {
            dig_t1: u(0),
            dig_t2: s(1),
            dig_t3: s(2),
            dig_p1: u(3),
            dig_p2: s(4),
            dig_p3: s(5),
            dig_p4: s(6),
            dig_p5: s(7),
            dig_p6: s(8),
            dig_p7: s(9),
            dig_p8: s(10),
            dig_p9: s(11),
        }
    }

    /// temperature then pressure of the same sample
    pub fn compensate(&self, raw: RawSample) -> CompensatedSample {
        let (temperature_centi_c, t_fine) = self.compensate_temperature(raw.temperature);
        CompensatedSample {
            temperature_centi_c,
            pressure_q24_8: self.compensate_pressure(raw.pressure, t_fine),
        }
    }

    /// temperature in 1/100 degrees C and the fine temperature for pressure compensation
    pub fn compensate_temperature(&self, adc_t: u32) -> (i32, FineTemperature) {
        // i64 keeps out-of-range codes from overflowing, in range every value fits the reference's i32
        let adc_t = adc_t as i64;
        let t1 = self.dig_t1 as i64;
        let t2 = self.dig_t2 as i64;
        let t3 = self.dig_t3 as i64;

        let var1 = (((adc_t >> 3) - (t1 << 1)) * t2) >> 11;
        let var2 = (((((adc_t >> 4) - t1) * ((adc_t >> 4) - t1)) >> 12) * t3) >> 14;
        let t_fine = (var1 + var2) as i32;
        let temperature = ((t_fine as i64 * 5 + 128) >> 8) as i32;
        (temperature, FineTemperature(t_fine))
    }

    /// pressure in Pa as Q24.8, 0 when the calibration yields a zero divisor
    pub fn compensate_pressure(&self, adc_p: u32, t_fine: FineTemperature) -> u32 {
        let p1 = self.dig_p1 as i64;
        let p2 = self.dig_p2 as i64;
        let p3 = self.dig_p3 as i64;
        let p4 = self.dig_p4 as i64;
        let p5 = self.dig_p5 as i64;
        let p6 = self.dig_p6 as i64;
        let p7 = self.dig_p7 as i64;
        let p8 = self.dig_p8 as i64;
        let p9 = self.dig_p9 as i64;

        // two's complement wrapping like the reference int64 code, never a panic
        let mut var1 = (t_fine.0 as i64) - 128_000;
        let mut var2 = var1.wrapping_mul(var1).wrapping_mul(p6);
        var2 = var2.wrapping_add(var1.wrapping_mul(p5) << 17);
        var2 = var2.wrapping_add(p4 << 35);
        var1 = (var1.wrapping_mul(var1).wrapping_mul(p3) >> 8).wrapping_add(var1.wrapping_mul(p2) << 12);
        var1 = ((1i64 << 47).wrapping_add(var1)).wrapping_mul(p1) >> 33;
        if var1 == 0 {
            return 0;
        }

        let mut p: i64 = 1_048_576 - adc_p as i64;
        p = ((p << 31).wrapping_sub(var2)).wrapping_mul(3125).wrapping_div(var1);
        var1 = p9.wrapping_mul(p >> 13).wrapping_mul(p >> 13) >> 25;
        var2 = p8.wrapping_mul(p) >> 19;
        p = (p.wrapping_add(var1).wrapping_add(var2) >> 8).wrapping_add(p7 << 4);
        p as u32
    }
}
