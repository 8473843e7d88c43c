//! Settlement Pricing
//!
//! CIRX owed for a deposit. The policy is pluggable; `TieredPricing` is the
//! configured default (fixed USD quotes plus OTC discount tiers).

use rust_decimal::{Decimal, RoundingStrategy};
use std::collections::HashMap;
use thiserror::Error;

use crate::config::{DiscountTier, PricingConfig};
use crate::swap::PaymentToken;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PricingError {
    #[error("No USD price configured for {0}")]
    MissingPrice(PaymentToken),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Settlement amount overflow")]
    Overflow,
}

pub trait SettlementPricing: Send + Sync {
    fn settlement_amount(
        &self,
        amount_paid: Decimal,
        token: PaymentToken,
    ) -> Result<Decimal, PricingError>;
}

pub struct TieredPricing {
    cirx_usd_price: Decimal,
    token_usd_prices: HashMap<PaymentToken, Decimal>,
    /// Highest threshold first
    tiers: Vec<DiscountTier>,
    scale: u32,
}

impl TieredPricing {
    pub fn new(config: &PricingConfig) -> Self {
        let mut tiers = config.discount_tiers.clone();
        tiers.sort_by(|a, b| b.min_usd.cmp(&a.min_usd));
        Self {
            cirx_usd_price: config.cirx_usd_price,
            token_usd_prices: config.token_usd_prices.clone(),
            tiers,
            scale: config.settlement_scale,
        }
    }

    pub fn discount_percent(&self, usd_value: Decimal) -> Decimal {
        self.tiers
            .iter()
            .find(|tier| usd_value >= tier.min_usd)
            .map(|tier| tier.percent)
            .unwrap_or(Decimal::ZERO)
    }
}

impl SettlementPricing for TieredPricing {
    fn settlement_amount(
        &self,
        amount_paid: Decimal,
        token: PaymentToken,
    ) -> Result<Decimal, PricingError> {
        if amount_paid <= Decimal::ZERO {
            return Err(PricingError::InvalidAmount(amount_paid.to_string()));
        }
        let token_price = self
            .token_usd_prices
            .get(&token)
            .copied()
            .ok_or(PricingError::MissingPrice(token))?;

        let usd_value = amount_paid
            .checked_mul(token_price)
            .ok_or(PricingError::Overflow)?;
        let base = usd_value
            .checked_div(self.cirx_usd_price)
            .ok_or(PricingError::Overflow)?;
        let multiplier = Decimal::ONE + self.discount_percent(usd_value) / Decimal::ONE_HUNDRED;
        let amount = base.checked_mul(multiplier).ok_or(PricingError::Overflow)?;

        Ok(amount
            .round_dp_with_strategy(self.scale, RoundingStrategy::ToZero)
            .normalize())
    }
}
