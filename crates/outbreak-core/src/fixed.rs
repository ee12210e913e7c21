use fixed::types::I32F32;

/// Q32.32 fixed-point: 32 integer bits, 32 fractional bits.
///
/// Every stock, flow and parameter inside the engine uses this type so that
/// trajectories are bit-identical across platforms.
pub type Fixed64 = I32F32;

/// Simulation steps. One step is one simulated day.
pub type Steps = u64;

/// Convert an f64 to Fixed64. Use only for initialization, never in sim loop.
///
/// Returns `None` for NaN, infinities and values outside the Q32.32 range.
#[inline]
pub fn f64_to_fixed64(v: f64) -> Option<Fixed64> {
    Fixed64::checked_from_num(v)
}

/// Convert Fixed64 to f64. Use only for display and logging, never in sim loop.
#[inline]
pub fn fixed64_to_f64(v: Fixed64) -> f64 {
    v.to_num::<f64>()
}

/// Division that yields `Fixed64::MAX` instead of overflowing.
///
/// Callers guarantee a positive divisor.
#[inline]
pub fn saturating_div_64(a: Fixed64, b: Fixed64) -> Fixed64 {
    a.checked_div(b).unwrap_or(Fixed64::MAX)
}

/// Round half away from zero and convert to a whole count.
///
/// Negative inputs yield 0.
#[inline]
pub fn round_to_count(v: Fixed64) -> u64 {
    if v <= Fixed64::ZERO {
        return 0;
    }
    v.saturating_round().to_num::<u64>()
}

/// Truncate a non-negative quantity to a whole count, for status display.
#[inline]
pub fn truncate_to_count(v: Fixed64) -> u64 {
    if v <= Fixed64::ZERO {
        return 0;
    }
    v.to_num::<u64>()
}
