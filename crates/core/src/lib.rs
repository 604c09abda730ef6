pub mod catalog;
pub mod checkout;
pub mod error;
pub mod faq;
pub mod lessons;
pub mod models;
pub mod reviews;
pub mod video;

pub use catalog::{category_name, slugify, CourseFilters, CourseQuery};
pub use checkout::{format_price, quote_for_course, CheckoutQuote};
pub use error::ValidationError;
pub use faq::{match_faq, FaqMatch, FaqResponder, FaqTopic, FALLBACK_REPLY, GREETING};
pub use lessons::{build_lesson_page, format_duration, LessonPage};
pub use models::*;
pub use reviews::{RatingSummary, ReviewFilters, ReviewQuery, ReviewSort};
pub use video::{resolve_lesson_video, youtube_embed_url, LessonVideo};
