use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use club_core::reviews::validate_new_review;
use club_core::{slugify, Course, CourseStatus, Lesson, NewReview, Review};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{CourseRepository, LessonRepository, ReviewRepository};

/// Course entry in a catalog seed file. `slug` and `created_at` may be
/// omitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourseSeed {
    pub id: String,
    #[serde(default)]
    pub slug: Option<String>,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub category: String,
    #[serde(default)]
    pub status: CourseStatus,
    pub price_cents: i64,
    #[serde(default)]
    pub duration_weeks: Option<u8>,
    #[serde(default)]
    pub level: Option<String>,
    #[serde(default)]
    pub thumbnail_url: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl CourseSeed {
    /// `default_created_at` is used only when the seed carries no timestamp.
    pub fn into_course(self, default_created_at: DateTime<Utc>) -> Course {
        let slug = self
            .slug
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| slugify(&self.title));

        Course {
            id: self.id,
            slug,
            title: self.title,
            description: self.description,
            category: self.category,
            status: self.status,
            price_cents: self.price_cents,
            duration_weeks: self.duration_weeks,
            level: self.level,
            thumbnail_url: self.thumbnail_url,
            created_at: self.created_at.unwrap_or(default_created_at),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogSeed {
    #[serde(default)]
    pub courses: Vec<CourseSeed>,
    #[serde(default)]
    pub lessons: Vec<Lesson>,
    #[serde(default)]
    pub reviews: Vec<Review>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SeedReport {
    pub courses: usize,
    pub lessons: usize,
    pub reviews: usize,
}

pub fn load_catalog_seed(path: impl AsRef<Path>) -> Result<CatalogSeed> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed reading catalog seed {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("failed parsing catalog seed {}", path.display()))
}

/// Writes a seed into the store. Courses and lessons are upserted and reviews
/// are inserted once, so applying the same seed twice is harmless. A course
/// without `created_at` keeps the timestamp it was first stored with.
/// Reviews that fail validation are skipped.
pub async fn apply_seed<S>(store: &S, seed: CatalogSeed) -> Result<SeedReport>
where
    S: CourseRepository + LessonRepository + ReviewRepository,
{
    let now = Utc::now();
    let mut report = SeedReport {
        courses: seed.courses.len(),
        lessons: seed.lessons.len(),
        reviews: 0,
    };

    for course in seed.courses {
        let created_at = match course.created_at {
            Some(created_at) => created_at,
            None => store
                .find_course(&course.id)
                .await?
                .map_or(now, |existing| existing.created_at),
        };
        store.upsert_course(&course.into_course(created_at)).await?;
    }
    for lesson in &seed.lessons {
        store.upsert_lesson(lesson).await?;
    }
    for review in &seed.reviews {
        if let Err(error) = validate_seed_review(review) {
            warn!(review_id = %review.id, %error, "skipping invalid seed review");
            continue;
        }
        store.insert_review(review).await?;
        report.reviews += 1;
    }

    info!(
        courses = report.courses,
        lessons = report.lessons,
        reviews = report.reviews,
        "catalog seed applied"
    );
    Ok(report)
}

fn validate_seed_review(review: &Review) -> Result<(), club_core::ValidationError> {
    validate_new_review(&NewReview {
        user_id: review.user_id.clone(),
        user_name: review.user_name.clone(),
        user_avatar: review.user_avatar.clone(),
        rating: review.rating,
        comment: review.comment.clone(),
        course_id: review.course_id.clone(),
    })
}
