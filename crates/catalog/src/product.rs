use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use stocktrace_core::{Entity, ProductId};

/// Shelf-life offset applied at intake when no explicit expiry is given.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpiryPolicy {
    pub days: u32,
    pub hours: u32,
    pub minutes: u32,
}

impl ExpiryPolicy {
    pub fn new(days: u32, hours: u32, minutes: u32) -> Self {
        Self {
            days,
            hours,
            minutes,
        }
    }

    /// Total offset, or `None` for an all-zero policy (product does not expire).
    pub fn offset(&self) -> Option<Duration> {
        if self.days == 0 && self.hours == 0 && self.minutes == 0 {
            return None;
        }
        Some(
            Duration::days(i64::from(self.days))
                + Duration::hours(i64::from(self.hours))
                + Duration::minutes(i64::from(self.minutes)),
        )
    }

    /// `now + days + hours + minutes`.
    pub fn expires_at(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.offset().map(|offset| now + offset)
    }
}

/// Catalog product, as far as item tracking needs it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub expiry: ExpiryPolicy,
}

impl Product {
    pub fn new(name: impl Into<String>, expiry: ExpiryPolicy) -> Self {
        Self {
            id: ProductId::new(),
            name: name.into(),
            expiry,
        }
    }
}

impl Entity for Product {
    type Id = ProductId;

    fn id(&self) -> &ProductId {
        &self.id
    }
}
