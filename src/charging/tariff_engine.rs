//! Tariff engine — prices a completed charging session.
//!
//! Pure decimal arithmetic: components are computed at scale 4 and the
//! final figures are rounded half-up to scale 2. Repeated evaluation of
//! the same inputs yields the same output.

use rust_decimal::{Decimal, RoundingStrategy};

use crate::domain::{SessionCosts, Tariff};

/// Power bands for banded energy prices (kW).
const SLOW_BAND_UPPER_KW: f64 = 22.0;
const FAST_BAND_UPPER_KW: f64 = 50.0;

const INTERNAL_SCALE: u32 = 4;
const FINAL_SCALE: u32 = 2;

/// Built-in fallback used when neither the session nor the tenant names a
/// tariff: 0.30 EUR/kWh + 0.02 EUR/min, no fees.
pub fn built_in_default_tariff() -> Tariff {
    let mut tariff = Tariff::new("DEFAULT", "Built-in default", "EUR");
    tariff.price_per_kwh = Some(Decimal::new(30, 2));
    tariff.price_per_minute = Some(Decimal::new(2, 2));
    tariff
}

fn round_internal(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(INTERNAL_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

fn round_final(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(FINAL_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// Pick the energy price: when the session's peak power is known and the
/// tariff populates a price for that band, the band price wins; else the
/// flat per-kWh price; else zero.
fn energy_price(tariff: &Tariff, max_power_kw: Option<f64>) -> Decimal {
    let banded = max_power_kw.and_then(|power| {
        if power < SLOW_BAND_UPPER_KW {
            tariff.price_per_kwh_slow
        } else if power < FAST_BAND_UPPER_KW {
            tariff.price_per_kwh_fast
        } else {
            tariff.price_per_kwh_rapid
        }
    });
    banded.or(tariff.price_per_kwh).unwrap_or(Decimal::ZERO)
}

/// Compute the itemised cost of a completed session.
///
/// `energy_kwh` and `duration_minutes` come from the session's completion
/// figures; `max_power_kw` selects the power band when the tariff prices
/// by band.
pub fn compute_cost(
    tariff: &Tariff,
    energy_kwh: Decimal,
    duration_minutes: i64,
    max_power_kw: Option<f64>,
) -> SessionCosts {
    let fees = tariff.connection_fee.unwrap_or(Decimal::ZERO)
        + tariff.service_fee.unwrap_or(Decimal::ZERO);

    let energy_cost = round_internal(energy_kwh * energy_price(tariff, max_power_kw));

    let minutes = Decimal::from(duration_minutes);
    let time_cost = if let Some(per_hour) = tariff.price_per_hour {
        round_internal(minutes * per_hour / Decimal::from(60))
    } else if let Some(per_minute) = tariff.price_per_minute {
        round_internal(minutes * per_minute)
    } else {
        Decimal::ZERO
    };

    let mut cost = fees + energy_cost + time_cost;

    // Billing-increment rounding: ceil to the next multiple.
    if let Some(increment) = tariff.billing_increment_kwh.filter(|inc| *inc > Decimal::ZERO) {
        let steps = (cost / increment).ceil();
        cost = round_internal(steps * increment);
    }

    let session_cost = cost;

    if let Some(rate) = tariff.tax_rate {
        if !tariff.tax_included {
            cost += round_internal(session_cost * rate);
        }
    }

    SessionCosts {
        currency: tariff.currency.clone(),
        energy_cost: round_final(energy_cost),
        time_cost: round_final(time_cost),
        service_fee: round_final(fees),
        session_cost: round_final(session_cost),
        total_cost: round_final(cost),
    }
}
