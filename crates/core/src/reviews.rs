use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::models::{NewReview, Review};

pub const DEFAULT_REVIEW_LIMIT: usize = 10;
pub const MAX_REVIEW_LIMIT: usize = 100;
pub const MAX_REVIEW_COMMENT_LEN: usize = 2_000;
pub const MAX_REVIEW_NAME_LEN: usize = 120;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewSort {
    #[default]
    Newest,
    Oldest,
    Highest,
    Lowest,
}

impl ReviewSort {
    pub fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "oldest" => Self::Oldest,
            "highest" => Self::Highest,
            "lowest" => Self::Lowest,
            _ => Self::Newest,
        }
    }

    pub fn compare(self, a: &Review, b: &Review) -> Ordering {
        match self {
            Self::Newest => b.created_at.cmp(&a.created_at),
            Self::Oldest => a.created_at.cmp(&b.created_at),
            Self::Highest => b
                .rating
                .cmp(&a.rating)
                .then_with(|| b.created_at.cmp(&a.created_at)),
            Self::Lowest => a
                .rating
                .cmp(&b.rating)
                .then_with(|| b.created_at.cmp(&a.created_at)),
        }
    }

    pub fn order_by_sql(self) -> &'static str {
        match self {
            Self::Newest => "created_at DESC",
            Self::Oldest => "created_at ASC",
            Self::Highest => "rating DESC, created_at DESC",
            Self::Lowest => "rating ASC, created_at DESC",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReviewFilters {
    pub rating: Option<u8>,
    pub course_id: Option<String>,
    pub sort_by: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReviewQuery {
    pub rating: Option<u8>,
    pub course_id: Option<String>,
    pub sort: ReviewSort,
    pub limit: usize,
}

impl ReviewQuery {
    pub fn for_course(course_id: &str, limit: usize) -> Self {
        Self {
            rating: None,
            course_id: Some(course_id.to_string()),
            sort: ReviewSort::Newest,
            limit: limit.clamp(1, MAX_REVIEW_LIMIT),
        }
    }

    pub fn matches(&self, review: &Review) -> bool {
        let rating_ok = self.rating.map_or(true, |rating| review.rating == rating);
        let course_ok = self
            .course_id
            .as_deref()
            .map_or(true, |course_id| review.course_id.as_deref() == Some(course_id));
        rating_ok && course_ok
    }

    /// Filters, sorts and truncates an in-memory review set.
    pub fn apply<'a>(&self, reviews: impl IntoIterator<Item = &'a Review>) -> Vec<Review> {
        let mut selected = reviews
            .into_iter()
            .filter(|review| self.matches(review))
            .cloned()
            .collect::<Vec<_>>();
        selected.sort_by(|a, b| self.sort.compare(a, b));
        selected.truncate(self.limit);
        selected
    }
}

impl From<ReviewFilters> for ReviewQuery {
    fn from(filters: ReviewFilters) -> Self {
        Self {
            // A zero rating filter means "any rating".
            rating: filters.rating.filter(|rating| *rating > 0),
            course_id: filters
                .course_id
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty()),
            sort: filters
                .sort_by
                .as_deref()
                .map(ReviewSort::parse)
                .unwrap_or_default(),
            limit: filters
                .limit
                .unwrap_or(DEFAULT_REVIEW_LIMIT)
                .clamp(1, MAX_REVIEW_LIMIT),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RatingSummary {
    pub course_id: String,
    pub review_count: usize,
    pub average_rating: f64,
    pub distribution: BTreeMap<u8, u32>,
}

impl RatingSummary {
    pub fn from_ratings(course_id: &str, ratings: &[u8]) -> Self {
        Self {
            course_id: course_id.to_string(),
            review_count: ratings.len(),
            average_rating: average_rating(ratings),
            distribution: rating_distribution(ratings),
        }
    }
}

pub fn average_rating(ratings: &[u8]) -> f64 {
    if ratings.is_empty() {
        return 0.0;
    }

    let sum = ratings.iter().map(|rating| f64::from(*rating)).sum::<f64>();
    let mean = sum / ratings.len() as f64;
    (mean * 10.0).round() / 10.0
}

pub fn rating_distribution(ratings: &[u8]) -> BTreeMap<u8, u32> {
    let mut distribution = (1..=5).map(|star| (star, 0_u32)).collect::<BTreeMap<_, _>>();
    for rating in ratings {
        *distribution.entry(*rating).or_default() += 1;
    }
    distribution
}

pub fn validate_new_review(review: &NewReview) -> Result<(), ValidationError> {
    if !(1..=5).contains(&review.rating) {
        return Err(ValidationError::RatingOutOfRange(review.rating));
    }

    require_text("user_id", &review.user_id, MAX_REVIEW_NAME_LEN)?;
    require_text("user_name", &review.user_name, MAX_REVIEW_NAME_LEN)?;
    require_text("comment", &review.comment, MAX_REVIEW_COMMENT_LEN)?;
    Ok(())
}

pub fn build_review(id: String, input: NewReview, now: DateTime<Utc>) -> Result<Review, ValidationError> {
    validate_new_review(&input)?;

    Ok(Review {
        id,
        user_id: input.user_id.trim().to_string(),
        user_name: input.user_name.trim().to_string(),
        user_avatar: input
            .user_avatar
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty()),
        rating: input.rating,
        comment: input.comment.trim().to_string(),
        course_id: input
            .course_id
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty()),
        created_at: now,
    })
}

fn require_text(field: &'static str, value: &str, max: usize) -> Result<(), ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyField { field });
    }
    if trimmed.chars().count() > max {
        return Err(ValidationError::FieldTooLong { field, max });
    }
    Ok(())
}
