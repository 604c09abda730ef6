use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use chrono::Utc;
use club_core::checkout::DEFAULT_CURRENCY;
use club_core::reviews::build_review;
use club_core::{
    build_lesson_page, quote_for_course, ChatBackend, ChatInput, ChatReply, CheckoutQuote, Course,
    CourseFilters, CourseQuery, CourseStatus, FaqResponder, FaqTopic, Lesson, LessonPage,
    NewReview, RatingSummary, Review, ReviewFilters, ReviewQuery, ValidationError,
};
use club_observability::AppMetrics;
use club_storage::{
    apply_seed, CatalogSeed, CourseRepository, LessonRepository, ReviewRepository, SeedReport,
};
use thiserror::Error;
use tracing::{info, instrument};
use uuid::Uuid;

pub const PUBLISHED_COURSE_LIMIT: usize = 100;
pub const RECENT_REVIEW_LIMIT: usize = 3;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("{0} not found")]
    NotFound(String),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

pub trait ClubStore: CourseRepository + LessonRepository + ReviewRepository {}

impl<T> ClubStore for T where T: CourseRepository + LessonRepository + ReviewRepository {}

#[derive(Clone)]
pub struct ClubAgent<S>
where
    S: ClubStore,
{
    responder: FaqResponder,
    store: Arc<S>,
    metrics: Arc<AppMetrics>,
    currency: String,
}

impl<S> ClubAgent<S>
where
    S: ClubStore,
{
    pub fn new(store: Arc<S>, metrics: Arc<AppMetrics>) -> Self {
        Self {
            responder: FaqResponder::builtin(),
            store,
            metrics,
            currency: DEFAULT_CURRENCY.to_string(),
        }
    }

    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = currency.into();
        self
    }

    pub fn metrics(&self) -> &Arc<AppMetrics> {
        &self.metrics
    }

    pub async fn seed(&self, seed: CatalogSeed) -> Result<SeedReport> {
        apply_seed(self.store.as_ref(), seed).await
    }

    /// Answers a chat message from the FAQ table. Never fails.
    #[instrument(skip(self, input), fields(chars = input.text.chars().count()))]
    pub fn handle_chat(&self, input: ChatInput) -> ChatReply {
        let started = Instant::now();
        self.metrics.inc_request();

        let matched = self.responder.respond(&input.text);
        if matched.topic == FaqTopic::Fallback {
            self.metrics.inc_fallback();
        } else {
            self.metrics.inc_faq_match(matched.topic.as_code());
        }

        self.metrics.observe_latency(started.elapsed());
        info!(
            topic = matched.topic.as_code(),
            keyword = matched.keyword.unwrap_or_default(),
            "faq reply selected"
        );

        ChatReply {
            reply_text: matched.reply.to_string(),
            topic: matched.topic,
            matched_keyword: matched.keyword.map(ToString::to_string),
            backend: ChatBackend::Faq,
        }
    }

    pub async fn list_courses(&self, filters: CourseFilters) -> Result<Vec<Course>> {
        self.metrics.inc_request();
        let query = CourseQuery::from(filters);
        self.store.list_courses(&query).await
    }

    pub async fn published_courses(&self) -> Result<Vec<Course>> {
        self.metrics.inc_request();
        self.store
            .list_courses(&CourseQuery::published(PUBLISHED_COURSE_LIMIT))
            .await
    }

    pub async fn course_by_slug(&self, slug: &str) -> Result<Option<Course>> {
        self.metrics.inc_request();
        self.published_course(slug).await
    }

    pub async fn course_lessons(&self, slug: &str) -> Result<Option<Vec<Lesson>>> {
        self.metrics.inc_request();
        let Some(course) = self.published_course(slug).await? else {
            return Ok(None);
        };
        self.store.lessons_for_course(&course.id).await.map(Some)
    }

    #[instrument(skip(self))]
    pub async fn lesson_page(&self, slug: &str, lesson_id: &str) -> Result<Option<LessonPage>> {
        self.metrics.inc_request();
        let Some(course) = self.published_course(slug).await? else {
            return Ok(None);
        };

        let lessons = self.store.lessons_for_course(&course.id).await?;
        Ok(build_lesson_page(course, &lessons, lesson_id))
    }

    pub async fn reviews(&self, filters: ReviewFilters) -> Result<Vec<Review>> {
        self.metrics.inc_request();
        self.store.list_reviews(&ReviewQuery::from(filters)).await
    }

    /// Newest reviews for a course detail page.
    pub async fn recent_reviews(&self, course_id: &str) -> Result<Vec<Review>> {
        self.store
            .list_reviews(&ReviewQuery::for_course(course_id, RECENT_REVIEW_LIMIT))
            .await
    }

    #[instrument(skip(self, input), fields(course_id = ?input.course_id, rating = input.rating))]
    pub async fn add_review(&self, input: NewReview) -> Result<Review, ServiceError> {
        self.metrics.inc_request();
        let review = build_review(Uuid::new_v4().to_string(), input, Utc::now())?;

        if let Some(course_id) = review.course_id.as_deref() {
            if self.store.find_course(course_id).await?.is_none() {
                return Err(ServiceError::NotFound(format!("course {course_id}")));
            }
        }

        self.store.insert_review(&review).await?;
        self.metrics.inc_review_created();
        info!(review_id = %review.id, "review stored");
        Ok(review)
    }

    pub async fn rating_summary(&self, course_id: &str) -> Result<RatingSummary> {
        self.metrics.inc_request();
        let ratings = self.store.ratings_for_course(course_id).await?;
        Ok(RatingSummary::from_ratings(course_id, &ratings))
    }

    /// Prices a course for checkout. `course_ref` may be a course id or slug.
    pub async fn checkout_quote(&self, course_ref: &str) -> Result<CheckoutQuote, ServiceError> {
        self.metrics.inc_request();
        let course = match self.store.find_course(course_ref).await? {
            Some(course) => Some(course),
            None => self.store.find_course_by_slug(course_ref).await?,
        };
        let course = course.ok_or_else(|| ServiceError::NotFound(format!("course {course_ref}")))?;

        Ok(quote_for_course(&course, &self.currency)?)
    }

    async fn published_course(&self, slug: &str) -> Result<Option<Course>> {
        Ok(self
            .store
            .find_course_by_slug(slug)
            .await?
            .filter(|course| course.status == CourseStatus::Published))
    }
}
