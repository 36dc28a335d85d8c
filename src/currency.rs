use std::fmt::{self, Display};

use rust_decimal::{Decimal, RoundingStrategy};

use bgn2eur_core::{BASE_CURRENCY, TARGET_CURRENCY};

use crate::{error::ConvertError, storage::Connector};

const TOLERANCE_DP: u32 = 5;

/// Confirmed currency configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrencyCheck {
    pub rate: Decimal,
    pub target_value: Decimal,
    pub target_active: bool,
}

impl Display for CurrencyCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Currencies OK: {} is the default currency, {} value {} matches 1 / {}.",
            BASE_CURRENCY, TARGET_CURRENCY, self.target_value, self.rate
        )?;
        let state = if self.target_active { "active" } else { "inactive" };
        writeln!(f, "{} is currently {}.", TARGET_CURRENCY, state)?;
        writeln!(f, "After converting prices:")?;
        writeln!(f, "  1. activate {} if it is inactive", TARGET_CURRENCY)?;
        writeln!(f, "  2. set {} as the default currency with value 1", TARGET_CURRENCY)?;
        write!(f, "  3. deactivate {}", BASE_CURRENCY)
    }
}

fn round5(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(TOLERANCE_DP, RoundingStrategy::MidpointAwayFromZero)
}

/// Checks that BGN is the active default currency and EUR is priced at `1 / rate`.
pub fn validate_currency(connector: &dyn Connector, rate: Decimal) -> Result<CurrencyCheck, ConvertError> {
    if rate <= Decimal::ZERO {
        return Err(ConvertError::InvalidRate(rate));
    }
    let mut conn = connector.connect().map_err(ConvertError::Connection)?;

    let base = conn.currency(BASE_CURRENCY)?.ok_or_else(|| {
        ConvertError::CurrencyMismatch(format!("currency {} is not defined in the store", BASE_CURRENCY))
    })?;
    if base.value != Decimal::ONE {
        return Err(ConvertError::CurrencyMismatch(format!(
            "{} is not the default currency (value is {}, expected 1)",
            BASE_CURRENCY, base.value
        )));
    }
    if !base.status {
        return Err(ConvertError::CurrencyMismatch(format!("{} is not enabled", BASE_CURRENCY)));
    }

    let target = conn.currency(TARGET_CURRENCY)?.ok_or_else(|| {
        ConvertError::CurrencyMismatch(format!("currency {} is not defined in the store", TARGET_CURRENCY))
    })?;
    let expected = round5(Decimal::ONE / rate);
    if round5(target.value) != expected {
        return Err(ConvertError::CurrencyMismatch(format!(
            "{} value is {}, expected {} (1 / {})",
            TARGET_CURRENCY, target.value, expected, rate
        )));
    }

    tracing::debug!(target_value = %target.value, active = target.status, "Currency configuration confirmed");
    Ok(CurrencyCheck {
        rate,
        target_value: target.value,
        target_active: target.status,
    })
}
