// In crates/strategies/src/rsi.rs

use crate::{Error, Result};
use core_types::Kline;
use num_traits::ToPrimitive;

pub const DEFAULT_RSI_PERIOD: usize = 14;

/// Relative Strength Index over the closes of `klines` (oldest first).
///
/// The first `period` deltas seed the averages with a simple mean; every delta after that is
/// folded in with Wilder's smoothing, `avg = (avg * (period - 1) + x) / period`. Needs at least
/// `period + 1` candles with strictly increasing `open_time`.
pub fn relative_strength_index(klines: &[Kline], period: usize) -> Result<f64> {
    if period == 0 {
        return Err(Error::InvalidParameters("RSI period must be greater than 0".into()));
    }
    let required = period + 1;
    if klines.len() < required {
        return Err(Error::InsufficientData { required, actual: klines.len() });
    }
    if let Some(index) = klines
        .windows(2)
        .position(|pair| pair[1].open_time <= pair[0].open_time)
    {
        return Err(Error::UnorderedCandles { index: index + 1 });
    }

    let closes: Vec<f64> = klines.iter().map(|k| k.close.to_f64().unwrap_or(0.0)).collect();
    let (gains, losses): (Vec<f64>, Vec<f64>) = closes
        .windows(2)
        .map(|pair| {
            let delta = pair[1] - pair[0];
            if delta > 0.0 { (delta, 0.0) } else { (0.0, -delta) }
        })
        .unzip();

    let n = period as f64;
    let mut avg_gain = gains[..period].iter().sum::<f64>() / n;
    let mut avg_loss = losses[..period].iter().sum::<f64>() / n;

    for i in period..gains.len() {
        avg_gain = (avg_gain * (n - 1.0) + gains[i]) / n;
        avg_loss = (avg_loss * (n - 1.0) + losses[i]) / n;
    }

    Ok(rsi_from_averages(avg_gain, avg_loss))
}

fn rsi_from_averages(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        return 100.0;
    }
    if avg_gain == 0.0 {
        return 0.0;
    }
    let rs = avg_gain / avg_loss;
    (100.0 - 100.0 / (1.0 + rs)).clamp(0.0, 100.0)
}
