// Licensed under the Apache-2.0 license

//! SCL timing calculation.
//!
//! The controller divides its input clock by `divider + 1` and counts SCL
//! high and low phases in the divided ticks. Every bit period also spends
//! [`FILTER_DELAY_CYCLES`] ticks in the input glitch filter.

use fugit::HertzU32;

use crate::i2c::common::FAST_MODE_MAX_HZ;
use crate::i2c::error::I2cError;

pub const FILTER_DELAY_CYCLES: u32 = 4;
pub const MAX_DIVIDER: u32 = 255;
/// Hardware limit for each SCL phase.
pub const MAX_PHASE_CYCLES: u32 = 512;

/// Byte sent between the start and the repeated start of a speed
/// negotiation. The controller expects this exact value and a NACK.
pub const MASTER_CODE: u8 = 0x0F;

/// Register values for one bus frequency.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TimingProfile {
    pub divider: u8,
    pub scl_high: u16,
    pub scl_low: u16,
    pub start_setup: u16,
    pub start_hold: u16,
    pub stop_setup: u16,
    pub data_setup: u16,
    pub data_hold: u16,
    /// Idle time between a stop and the next start.
    pub bus_release: u16,
    /// Frequency these values actually produce.
    pub actual: HertzU32,
}

/// Computes the profile closest to `target`. Ties go to the smaller divider.
pub fn compute(input: HertzU32, target: HertzU32) -> Result<TimingProfile, I2cError> {
    let input_hz = u64::from(input.raw());
    let target_hz = u64::from(target.raw());
    if input_hz == 0 || target_hz == 0 {
        return Err(I2cError::UnsupportedFrequency);
    }

    let mut best: Option<(u64, TimingProfile)> = None;
    for divider in 0..=MAX_DIVIDER {
        let scale = u64::from(divider + 1);
        let total = (input_hz + scale * target_hz / 2) / (scale * target_hz);
        let Some(cycles) = total.checked_sub(u64::from(FILTER_DELAY_CYCLES)) else {
            continue;
        };
        let Ok(cycles) = u32::try_from(cycles) else {
            continue;
        };
        let (high, low) = split_phases(cycles, target.raw());
        if !(1..=MAX_PHASE_CYCLES).contains(&high) || !(1..=MAX_PHASE_CYCLES).contains(&low) {
            continue;
        }

        let actual = input_hz / (scale * total);
        let error = actual.abs_diff(target_hz);
        if best.as_ref().is_some_and(|(best_error, _)| *best_error <= error) {
            continue;
        }
        best = Some((error, profile(divider, high, low, actual)));
    }

    best.map(|(_, profile)| profile)
        .ok_or(I2cError::UnsupportedFrequency)
}

/// Splits the non-filter part of a bit period into SCL high and low.
///
/// Above fast mode the high phase is narrowed so the low phase keeps the
/// minimum low-to-high ratio of the protocol.
fn split_phases(cycles: u32, target_hz: u32) -> (u32, u32) {
    let high = if target_hz <= FAST_MODE_MAX_HZ {
        cycles / 2
    } else {
        ((cycles + 10) / 3).saturating_sub(5)
    };
    (high, cycles - high)
}

fn profile(divider: u32, high: u32, low: u32, actual: u64) -> TimingProfile {
    let total = high + low + FILTER_DELAY_CYCLES;
    // Both phases are bounded by MAX_PHASE_CYCLES, so every field fits.
    let narrow = |value: u32| u16::try_from(value).unwrap_or(u16::MAX);
    TimingProfile {
        divider: u8::try_from(divider).unwrap_or(u8::MAX),
        scl_high: narrow(high),
        scl_low: narrow(low),
        start_setup: narrow(low),
        start_hold: narrow(low),
        stop_setup: narrow(low),
        data_setup: narrow(low),
        data_hold: narrow(low / 2),
        bus_release: narrow(total),
        actual: HertzU32::from_raw(u32::try_from(actual).unwrap_or(u32::MAX)),
    }
}

/// Timing to program for a bus, including any speed negotiation.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TimingPlan {
    /// Start transfers directly at the target rate.
    Direct(TimingProfile),
    /// Start at `ceiling`, send [`MASTER_CODE`], switch to `target`, then
    /// issue a repeated start.
    Negotiated {
        ceiling: TimingProfile,
        target: TimingProfile,
    },
}

impl TimingPlan {
    pub fn for_frequency(input: HertzU32, target: HertzU32) -> Result<Self, I2cError> {
        let profile = compute(input, target)?;
        if target.raw() <= FAST_MODE_MAX_HZ {
            return Ok(Self::Direct(profile));
        }
        let ceiling = compute(input, HertzU32::from_raw(FAST_MODE_MAX_HZ))?;
        Ok(Self::Negotiated {
            ceiling,
            target: profile,
        })
    }

    /// Profile the controller idles at between transfers.
    pub fn idle(&self) -> &TimingProfile {
        match self {
            Self::Direct(profile) => profile,
            Self::Negotiated { ceiling, .. } => ceiling,
        }
    }

    pub fn target(&self) -> &TimingProfile {
        match self {
            Self::Direct(profile) => profile,
            Self::Negotiated { target, .. } => target,
        }
    }

    pub fn is_negotiated(&self) -> bool {
        matches!(self, Self::Negotiated { .. })
    }
}
