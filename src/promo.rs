use std::collections::HashMap;

use async_trait::async_trait;
use rust_decimal::Decimal;
use ulid::Ulid;

use crate::engine::DependencyError;

/// Result of asking the promo service whether a code applies to a basket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromoValidation {
    pub is_valid: bool,
    pub discount_amount: Decimal,
    pub final_amount: Decimal,
    pub message: String,
}

impl PromoValidation {
    fn rejected(total: Decimal, message: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            discount_amount: Decimal::ZERO,
            final_amount: total,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Discount {
    /// Percent off the basket total, e.g. `10` for 10%.
    Percentage(Decimal),
    Fixed(Decimal),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Promo {
    pub id: Ulid,
    pub code: String,
    pub discount: Discount,
    pub min_tickets: usize,
    pub max_discount: Option<Decimal>,
    /// Restrict to these movies; empty means any movie.
    pub movie_ids: Vec<Ulid>,
    pub active: bool,
}

#[async_trait]
pub trait PromoService: Send + Sync {
    async fn validate_promo(
        &self,
        owner_id: Ulid,
        code: &str,
        total_amount: Decimal,
        movie_ids: &[Ulid],
        seat_numbers: &[u32],
    ) -> Result<PromoValidation, DependencyError>;

    async fn promo_by_code(&self, code: &str) -> Result<Option<Promo>, DependencyError>;
}

/// Fixed in-process promo table. Codes match case-insensitively.
#[derive(Debug, Clone, Default)]
pub struct StaticPromos {
    by_code: HashMap<String, Promo>,
}

impl StaticPromos {
    pub fn new(promos: impl IntoIterator<Item = Promo>) -> Self {
        Self {
            by_code: promos
                .into_iter()
                .map(|p| (p.code.to_ascii_uppercase(), p))
                .collect(),
        }
    }

    fn lookup(&self, code: &str) -> Option<&Promo> {
        self.by_code.get(&code.trim().to_ascii_uppercase())
    }
}

fn discount_for(promo: &Promo, total: Decimal) -> Decimal {
    let raw = match promo.discount {
        Discount::Percentage(pct) => total * pct / Decimal::from(100),
        Discount::Fixed(amount) => amount,
    };
    let capped = promo.max_discount.map_or(raw, |cap| raw.min(cap));
    capped.min(total).max(Decimal::ZERO)
}

#[async_trait]
impl PromoService for StaticPromos {
    async fn validate_promo(
        &self,
        _owner_id: Ulid,
        code: &str,
        total_amount: Decimal,
        movie_ids: &[Ulid],
        seat_numbers: &[u32],
    ) -> Result<PromoValidation, DependencyError> {
        let Some(promo) = self.lookup(code) else {
            return Ok(PromoValidation::rejected(total_amount, "promo code not found"));
        };
        if !promo.active {
            return Ok(PromoValidation::rejected(total_amount, "promo is not active"));
        }
        if seat_numbers.len() < promo.min_tickets {
            return Ok(PromoValidation::rejected(
                total_amount,
                format!("promo requires at least {} tickets", promo.min_tickets),
            ));
        }
        if !promo.movie_ids.is_empty() && !movie_ids.iter().any(|m| promo.movie_ids.contains(m)) {
            return Ok(PromoValidation::rejected(total_amount, "promo does not apply to this movie"));
        }

        let discount = discount_for(promo, total_amount);
        Ok(PromoValidation {
            is_valid: true,
            discount_amount: discount,
            final_amount: total_amount - discount,
            message: format!("promo {} applied", promo.code),
        })
    }

    async fn promo_by_code(&self, code: &str) -> Result<Option<Promo>, DependencyError> {
        Ok(self.lookup(code).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn promo(code: &str, discount: Discount) -> Promo {
        Promo {
            id: Ulid::new(),
            code: code.into(),
            discount,
            min_tickets: 1,
            max_discount: None,
            movie_ids: Vec::new(),
            active: true,
        }
    }

    #[tokio::test]
    async fn percentage_discount_is_capped() {
        let promos = StaticPromos::new([Promo {
            max_discount: Some(Decimal::from(20_000)),
            ..promo("HALF", Discount::Percentage(Decimal::from(50)))
        }]);
        let v = promos
            .validate_promo(Ulid::new(), "half", Decimal::from(150_000), &[Ulid::new()], &[1, 2])
            .await
            .unwrap();
        assert!(v.is_valid);
        assert_eq!(v.discount_amount, Decimal::from(20_000));
        assert_eq!(v.final_amount, Decimal::from(130_000));
    }

    #[tokio::test]
    async fn fixed_discount_never_exceeds_total() {
        let promos = StaticPromos::new([promo("BIG", Discount::Fixed(Decimal::from(500_000)))]);
        let v = promos
            .validate_promo(Ulid::new(), "BIG", Decimal::from(75_000), &[], &[3])
            .await
            .unwrap();
        assert_eq!(v.discount_amount, Decimal::from(75_000));
        assert_eq!(v.final_amount, Decimal::ZERO);
    }

    #[tokio::test]
    async fn unknown_inactive_and_restricted_codes_are_rejected() {
        let movie = Ulid::new();
        let promos = StaticPromos::new([
            Promo {
                active: false,
                ..promo("OFF", Discount::Fixed(Decimal::ONE))
            },
            Promo {
                movie_ids: vec![movie],
                ..promo("ONLY", Discount::Fixed(Decimal::ONE))
            },
            Promo {
                min_tickets: 4,
                ..promo("GROUP", Discount::Fixed(Decimal::ONE))
            },
        ]);
        let total = Decimal::from(10);
        for code in ["NOPE", "OFF", "ONLY", "GROUP"] {
            let v = promos
                .validate_promo(Ulid::new(), code, total, &[Ulid::new()], &[1])
                .await
                .unwrap();
            assert!(!v.is_valid, "{code} should be rejected");
            assert_eq!(v.final_amount, total);
        }
        assert!(promos.promo_by_code("nope").await.unwrap().is_none());
        assert!(promos.promo_by_code(" only ").await.unwrap().is_some());
    }
}
