use serde::Serialize;

use crate::error::ValidationError;
use crate::models::{Course, CourseStatus};

pub const DEFAULT_CURRENCY: &str = "usd";

/// Amount to charge for one course, computed from the catalog rather than
/// taken from the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckoutQuote {
    pub course_id: String,
    pub course_slug: String,
    pub course_title: String,
    pub amount_cents: i64,
    pub currency: String,
    pub display_price: String,
}

pub fn quote_for_course(course: &Course, currency: &str) -> Result<CheckoutQuote, ValidationError> {
    if course.status != CourseStatus::Published {
        return Err(ValidationError::CourseNotPurchasable(course.slug.clone()));
    }
    if course.price_cents <= 0 {
        return Err(ValidationError::MissingPrice(course.slug.clone()));
    }

    Ok(CheckoutQuote {
        course_id: course.id.clone(),
        course_slug: course.slug.clone(),
        course_title: course.title.clone(),
        amount_cents: course.price_cents,
        currency: currency.trim().to_lowercase(),
        display_price: format_price(course.price_cents),
    })
}

pub fn format_price(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let cents = cents.unsigned_abs();
    format!("{sign}${}.{:02}", cents / 100, cents % 100)
}
