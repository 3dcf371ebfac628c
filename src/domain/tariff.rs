//! Tariff domain entity

use chrono::{DateTime, NaiveTime, Utc, Weekday};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::audit::{AuditRecord, TenantScoped};
use crate::shared::errors::{DomainError, DomainResult};

/// Tariff pricing model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, utoipa::ToSchema)]
pub enum TariffType {
    #[default]
    Simple,
    TimeBased,
    Tiered,
    Dynamic,
}

/// Component priced by a tariff element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub enum PriceComponent {
    Energy,
    Time,
    Flat,
    ParkingTime,
    Reservation,
    Transaction,
}

/// One pricing element within a tariff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct TariffElement {
    pub component: PriceComponent,
    pub price: Decimal,
    /// Billing granularity: seconds for time components, kWh for energy
    pub step_size: Option<Decimal>,
    pub min_amount: Option<Decimal>,
    pub max_amount: Option<Decimal>,
    /// Days of week this element applies to; empty means every day
    #[schema(value_type = Vec<String>)]
    pub day_mask: Vec<Weekday>,
    pub time_from: Option<NaiveTime>,
    pub time_until: Option<NaiveTime>,
}

impl TariffElement {
    pub fn flat(component: PriceComponent, price: Decimal) -> Self {
        Self {
            component,
            price,
            step_size: None,
            min_amount: None,
            max_amount: None,
            day_mask: Vec::new(),
            time_from: None,
            time_until: None,
        }
    }
}

/// Weekly / time-of-day restriction on a tariff as a whole.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct TariffRestriction {
    #[schema(value_type = Vec<String>)]
    pub days: Vec<Weekday>,
    pub time_from: Option<NaiveTime>,
    pub time_until: Option<NaiveTime>,
}

/// Tariff aggregate
#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
pub struct Tariff {
    pub code: String,
    pub name: String,
    pub tariff_type: TariffType,
    /// ISO 4217, exactly three letters
    pub currency: String,
    pub price_per_kwh: Option<Decimal>,
    pub price_per_minute: Option<Decimal>,
    pub price_per_hour: Option<Decimal>,
    pub service_fee: Option<Decimal>,
    pub connection_fee: Option<Decimal>,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
    pub restriction: Option<TariffRestriction>,
    pub min_charge_amount: Option<Decimal>,
    pub max_charge_amount: Option<Decimal>,
    pub min_duration_minutes: Option<i64>,
    pub max_duration_minutes: Option<i64>,
    /// Power-banded energy prices: slow < 22 kW, fast 22-50 kW, rapid >= 50 kW
    pub price_per_kwh_slow: Option<Decimal>,
    pub price_per_kwh_fast: Option<Decimal>,
    pub price_per_kwh_rapid: Option<Decimal>,
    pub billing_increment_secs: Option<u32>,
    pub billing_increment_kwh: Option<Decimal>,
    pub tax_rate: Option<Decimal>,
    pub tax_included: bool,
    pub is_default: bool,
    pub is_public: bool,
    pub active: bool,
    /// Non-empty element sequence
    pub elements: Vec<TariffElement>,
    pub audit: AuditRecord,
}

impl Tariff {
    pub fn new(code: impl Into<String>, name: impl Into<String>, currency: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
            tariff_type: TariffType::Simple,
            currency: currency.into(),
            price_per_kwh: None,
            price_per_minute: None,
            price_per_hour: None,
            service_fee: None,
            connection_fee: None,
            valid_from: None,
            valid_until: None,
            restriction: None,
            min_charge_amount: None,
            max_charge_amount: None,
            min_duration_minutes: None,
            max_duration_minutes: None,
            price_per_kwh_slow: None,
            price_per_kwh_fast: None,
            price_per_kwh_rapid: None,
            billing_increment_secs: None,
            billing_increment_kwh: None,
            tax_rate: None,
            tax_included: false,
            is_default: false,
            is_public: true,
            active: true,
            elements: vec![TariffElement::flat(PriceComponent::Energy, Decimal::ZERO)],
            audit: AuditRecord::new(),
        }
    }

    pub fn validate(&self) -> DomainResult<()> {
        if self.code.is_empty() {
            return Err(DomainError::Validation("tariff code is required".into()));
        }
        if self.currency.len() != 3 || !self.currency.chars().all(|c| c.is_ascii_uppercase()) {
            return Err(DomainError::Validation(
                "currency must be a 3-letter ISO 4217 code".into(),
            ));
        }
        if self.elements.is_empty() {
            return Err(DomainError::Validation(
                "tariff needs at least one element".into(),
            ));
        }
        Ok(())
    }

    /// A tariff is currently valid iff active and `now` falls inside its
    /// validity window.
    pub fn is_currently_valid(&self, now: DateTime<Utc>) -> bool {
        if !self.active {
            return false;
        }
        if self.valid_from.is_some_and(|from| now < from) {
            return false;
        }
        if self.valid_until.is_some_and(|until| now > until) {
            return false;
        }
        true
    }
}

impl TenantScoped for Tariff {
    fn audit(&self) -> &AuditRecord {
        &self.audit
    }

    fn audit_mut(&mut self) -> &mut AuditRecord {
        &mut self.audit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::str::FromStr;

    fn tariff() -> Tariff {
        let mut t = Tariff::new("STD", "Standard", "EUR");
        t.price_per_kwh = Some(Decimal::from_str("0.30").unwrap());
        t
    }

    #[test]
    fn validate_accepts_sane_tariff() {
        assert!(tariff().validate().is_ok());
    }

    #[test]
    fn validate_rejects_bad_currency() {
        let mut t = tariff();
        t.currency = "EURO".into();
        assert!(t.validate().is_err());
        t.currency = "eur".into();
        assert!(t.validate().is_err());
    }

    #[test]
    fn validate_rejects_empty_elements() {
        let mut t = tariff();
        t.elements.clear();
        assert!(t.validate().is_err());
    }

    #[test]
    fn validity_window() {
        let now = Utc::now();
        let mut t = tariff();
        assert!(t.is_currently_valid(now));

        t.active = false;
        assert!(!t.is_currently_valid(now));
        t.active = true;

        t.valid_from = Some(now + Duration::hours(1));
        assert!(!t.is_currently_valid(now));
        t.valid_from = Some(now - Duration::hours(2));

        t.valid_until = Some(now - Duration::hours(1));
        assert!(!t.is_currently_valid(now));
        t.valid_until = Some(now + Duration::hours(1));
        assert!(t.is_currently_valid(now));
    }
}
