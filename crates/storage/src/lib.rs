mod seed;

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use club_core::lessons::sort_lessons;
use club_core::{Course, CourseQuery, CourseStatus, Lesson, Review, ReviewQuery};
use parking_lot::RwLock;
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};

pub use seed::{apply_seed, load_catalog_seed, CatalogSeed, CourseSeed, SeedReport};

pub trait CourseRepository: Send + Sync {
    async fn list_courses(&self, query: &CourseQuery) -> Result<Vec<Course>>;
    async fn find_course(&self, course_id: &str) -> Result<Option<Course>>;
    async fn find_course_by_slug(&self, slug: &str) -> Result<Option<Course>>;
    async fn upsert_course(&self, course: &Course) -> Result<()>;
}

pub trait LessonRepository: Send + Sync {
    async fn lessons_for_course(&self, course_id: &str) -> Result<Vec<Lesson>>;
    async fn upsert_lesson(&self, lesson: &Lesson) -> Result<()>;
}

pub trait ReviewRepository: Send + Sync {
    async fn list_reviews(&self, query: &ReviewQuery) -> Result<Vec<Review>>;
    /// Inserting an id that already exists is a no-op.
    async fn insert_review(&self, review: &Review) -> Result<()>;
    async fn ratings_for_course(&self, course_id: &str) -> Result<Vec<u8>>;
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    courses: Arc<RwLock<HashMap<String, Course>>>,
    lessons: Arc<RwLock<HashMap<String, Lesson>>>,
    reviews: Arc<RwLock<HashMap<String, Review>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CourseRepository for MemoryStore {
    async fn list_courses(&self, query: &CourseQuery) -> Result<Vec<Course>> {
        let mut courses = self
            .courses
            .read()
            .values()
            .filter(|course| query.matches(course))
            .cloned()
            .collect::<Vec<_>>();

        courses.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        courses.truncate(query.limit);
        Ok(courses)
    }

    async fn find_course(&self, course_id: &str) -> Result<Option<Course>> {
        Ok(self.courses.read().get(course_id).cloned())
    }

    async fn find_course_by_slug(&self, slug: &str) -> Result<Option<Course>> {
        Ok(self
            .courses
            .read()
            .values()
            .find(|course| course.slug == slug)
            .cloned())
    }

    async fn upsert_course(&self, course: &Course) -> Result<()> {
        let mut courses = self.courses.write();
        if let Some(owner) = courses
            .values()
            .find(|existing| existing.slug == course.slug && existing.id != course.id)
        {
            anyhow::bail!(
                "failed upserting course {}: slug {} already belongs to {}",
                course.id,
                course.slug,
                owner.id
            );
        }
        courses.insert(course.id.clone(), course.clone());
        Ok(())
    }
}

impl LessonRepository for MemoryStore {
    async fn lessons_for_course(&self, course_id: &str) -> Result<Vec<Lesson>> {
        let mut lessons = self
            .lessons
            .read()
            .values()
            .filter(|lesson| lesson.course_id == course_id)
            .cloned()
            .collect::<Vec<_>>();
        sort_lessons(&mut lessons);
        Ok(lessons)
    }

    async fn upsert_lesson(&self, lesson: &Lesson) -> Result<()> {
        self.lessons
            .write()
            .insert(lesson.id.clone(), lesson.clone());
        Ok(())
    }
}

impl ReviewRepository for MemoryStore {
    async fn list_reviews(&self, query: &ReviewQuery) -> Result<Vec<Review>> {
        Ok(query.apply(self.reviews.read().values()))
    }

    async fn insert_review(&self, review: &Review) -> Result<()> {
        self.reviews
            .write()
            .entry(review.id.clone())
            .or_insert_with(|| review.clone());
        Ok(())
    }

    async fn ratings_for_course(&self, course_id: &str) -> Result<Vec<u8>> {
        Ok(self
            .reviews
            .read()
            .values()
            .filter(|review| review.course_id.as_deref() == Some(course_id))
            .map(|review| review.rating)
            .collect())
    }
}

#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn connect(database_url: &str) -> Result<Self> {
        // Every connection to an in-memory database gets its own copy, so
        // keep exactly one alive for the lifetime of the pool.
        let in_memory = database_url.contains(":memory:");
        let mut options = SqlitePoolOptions::new().max_connections(if in_memory { 1 } else { 5 });
        if in_memory {
            options = options.idle_timeout(None).max_lifetime(None);
        }
        let pool = options
            .connect(database_url)
            .await
            .with_context(|| format!("failed connecting to sqlite at {}", database_url))?;

        let store = Self { pool };
        store.ensure_schema().await?;
        Ok(store)
    }

    async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS courses (
              id TEXT PRIMARY KEY,
              slug TEXT NOT NULL UNIQUE,
              title TEXT NOT NULL,
              description TEXT NOT NULL,
              category TEXT NOT NULL,
              status TEXT NOT NULL,
              price_cents INTEGER NOT NULL,
              duration_weeks INTEGER,
              level TEXT,
              thumbnail_url TEXT,
              created_at TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS lessons (
              id TEXT PRIMARY KEY,
              course_id TEXT NOT NULL,
              title TEXT NOT NULL,
              description TEXT NOT NULL,
              video_url TEXT,
              youtube_url TEXT,
              duration_seconds INTEGER NOT NULL,
              lesson_order INTEGER NOT NULL,
              is_free INTEGER NOT NULL,
              resources_json TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS reviews (
              id TEXT PRIMARY KEY,
              user_id TEXT NOT NULL,
              user_name TEXT NOT NULL,
              user_avatar TEXT,
              rating INTEGER NOT NULL,
              comment TEXT NOT NULL,
              course_id TEXT,
              created_at TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_lessons_course ON lessons (course_id, lesson_order)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_reviews_course ON reviews (course_id, created_at)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

const COURSE_COLUMNS: &str = "id, slug, title, description, category, status, price_cents, \
     duration_weeks, level, thumbnail_url, created_at";
const LESSON_COLUMNS: &str = "id, course_id, title, description, video_url, youtube_url, \
     duration_seconds, lesson_order, is_free, resources_json";
const REVIEW_COLUMNS: &str =
    "id, user_id, user_name, user_avatar, rating, comment, course_id, created_at";

impl CourseRepository for SqliteStore {
    async fn list_courses(&self, query: &CourseQuery) -> Result<Vec<Course>> {
        let mut builder =
            QueryBuilder::<Sqlite>::new(format!("SELECT {COURSE_COLUMNS} FROM courses WHERE 1 = 1"));

        if query.published_only {
            builder
                .push(" AND status = ")
                .push_bind(CourseStatus::Published.as_code());
        }
        if let Some(category) = query.category.clone() {
            builder.push(" AND category = ").push_bind(category);
        }
        builder.push(" ORDER BY created_at DESC, id ASC");
        // SQLite's lower() only folds ASCII, so text search is applied to the
        // decoded rows with the same Unicode matching the memory store uses.
        if query.search.is_none() {
            builder.push(" LIMIT ").push_bind(query.limit as i64);
        }

        let rows = builder.build().fetch_all(&self.pool).await?;
        Ok(rows
            .iter()
            .map(course_from_row)
            .filter(|course| query.matches(course))
            .take(query.limit)
            .collect())
    }

    async fn find_course(&self, course_id: &str) -> Result<Option<Course>> {
        let row = sqlx::query(&format!("SELECT {COURSE_COLUMNS} FROM courses WHERE id = ?1"))
            .bind(course_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(course_from_row))
    }

    async fn find_course_by_slug(&self, slug: &str) -> Result<Option<Course>> {
        let row = sqlx::query(&format!("SELECT {COURSE_COLUMNS} FROM courses WHERE slug = ?1"))
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(course_from_row))
    }

    async fn upsert_course(&self, course: &Course) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO courses (id, slug, title, description, category, status, price_cents,
                                 duration_weeks, level, thumbnail_url, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            ON CONFLICT(id) DO UPDATE SET
              slug=excluded.slug,
              title=excluded.title,
              description=excluded.description,
              category=excluded.category,
              status=excluded.status,
              price_cents=excluded.price_cents,
              duration_weeks=excluded.duration_weeks,
              level=excluded.level,
              thumbnail_url=excluded.thumbnail_url,
              created_at=excluded.created_at
            "#,
        )
        .bind(&course.id)
        .bind(&course.slug)
        .bind(&course.title)
        .bind(&course.description)
        .bind(&course.category)
        .bind(course.status.as_code())
        .bind(course.price_cents)
        .bind(course.duration_weeks.map(i64::from))
        .bind(&course.level)
        .bind(&course.thumbnail_url)
        .bind(timestamp(course.created_at))
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed upserting course {}", course.id))?;

        Ok(())
    }
}

impl LessonRepository for SqliteStore {
    async fn lessons_for_course(&self, course_id: &str) -> Result<Vec<Lesson>> {
        let rows = sqlx::query(&format!(
            "SELECT {LESSON_COLUMNS} FROM lessons WHERE course_id = ?1 ORDER BY lesson_order ASC, id ASC"
        ))
        .bind(course_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(lesson_from_row).collect())
    }

    async fn upsert_lesson(&self, lesson: &Lesson) -> Result<()> {
        let resources_json = serde_json::to_string(&lesson.resources)?;

        sqlx::query(
            r#"
            INSERT INTO lessons (id, course_id, title, description, video_url, youtube_url,
                                 duration_seconds, lesson_order, is_free, resources_json)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ON CONFLICT(id) DO UPDATE SET
              course_id=excluded.course_id,
              title=excluded.title,
              description=excluded.description,
              video_url=excluded.video_url,
              youtube_url=excluded.youtube_url,
              duration_seconds=excluded.duration_seconds,
              lesson_order=excluded.lesson_order,
              is_free=excluded.is_free,
              resources_json=excluded.resources_json
            "#,
        )
        .bind(&lesson.id)
        .bind(&lesson.course_id)
        .bind(&lesson.title)
        .bind(&lesson.description)
        .bind(&lesson.video_url)
        .bind(&lesson.youtube_url)
        .bind(i64::from(lesson.duration_seconds))
        .bind(i64::from(lesson.order))
        .bind(i64::from(lesson.is_free))
        .bind(resources_json)
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed upserting lesson {}", lesson.id))?;

        Ok(())
    }
}

impl ReviewRepository for SqliteStore {
    async fn list_reviews(&self, query: &ReviewQuery) -> Result<Vec<Review>> {
        let mut builder =
            QueryBuilder::<Sqlite>::new(format!("SELECT {REVIEW_COLUMNS} FROM reviews WHERE 1 = 1"));

        if let Some(rating) = query.rating {
            builder.push(" AND rating = ").push_bind(i64::from(rating));
        }
        if let Some(course_id) = query.course_id.clone() {
            builder.push(" AND course_id = ").push_bind(course_id);
        }
        builder
            .push(" ORDER BY ")
            .push(query.sort.order_by_sql())
            .push(" LIMIT ")
            .push_bind(query.limit as i64);

        let rows = builder.build().fetch_all(&self.pool).await?;
        Ok(rows.iter().map(review_from_row).collect())
    }

    async fn insert_review(&self, review: &Review) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO reviews (id, user_id, user_name, user_avatar, rating, comment, course_id, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(id) DO NOTHING
            "#,
        )
        .bind(&review.id)
        .bind(&review.user_id)
        .bind(&review.user_name)
        .bind(&review.user_avatar)
        .bind(i64::from(review.rating))
        .bind(&review.comment)
        .bind(&review.course_id)
        .bind(timestamp(review.created_at))
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed inserting review {}", review.id))?;

        Ok(())
    }

    async fn ratings_for_course(&self, course_id: &str) -> Result<Vec<u8>> {
        let rows = sqlx::query("SELECT rating FROM reviews WHERE course_id = ?1")
            .bind(course_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .iter()
            .map(|row| small_int(row.get::<i64, _>("rating")))
            .collect())
    }
}

fn timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(row: &SqliteRow, column: &str) -> DateTime<Utc> {
    row.get::<String, _>(column)
        .parse()
        .unwrap_or_else(|_| Utc::now())
}

fn small_int<T: TryFrom<i64> + Default>(value: i64) -> T {
    T::try_from(value).unwrap_or_default()
}

fn course_from_row(row: &SqliteRow) -> Course {
    Course {
        id: row.get("id"),
        slug: row.get("slug"),
        title: row.get("title"),
        description: row.get("description"),
        category: row.get("category"),
        status: CourseStatus::parse(row.get::<String, _>("status").as_str()).unwrap_or_default(),
        price_cents: row.get("price_cents"),
        duration_weeks: row.get::<Option<i64>, _>("duration_weeks").map(small_int),
        level: row.get("level"),
        thumbnail_url: row.get("thumbnail_url"),
        created_at: parse_timestamp(row, "created_at"),
    }
}

fn lesson_from_row(row: &SqliteRow) -> Lesson {
    let resources_json: String = row.get("resources_json");

    Lesson {
        id: row.get("id"),
        course_id: row.get("course_id"),
        title: row.get("title"),
        description: row.get("description"),
        video_url: row.get("video_url"),
        youtube_url: row.get("youtube_url"),
        duration_seconds: small_int(row.get::<i64, _>("duration_seconds")),
        order: small_int(row.get::<i64, _>("lesson_order")),
        is_free: row.get::<i64, _>("is_free") != 0,
        resources: serde_json::from_str(&resources_json).unwrap_or_default(),
    }
}

fn review_from_row(row: &SqliteRow) -> Review {
    Review {
        id: row.get("id"),
        user_id: row.get("user_id"),
        user_name: row.get("user_name"),
        user_avatar: row.get("user_avatar"),
        rating: small_int(row.get::<i64, _>("rating")),
        comment: row.get("comment"),
        course_id: row.get("course_id"),
        created_at: parse_timestamp(row, "created_at"),
    }
}

#[derive(Clone)]
pub enum Store {
    Memory(MemoryStore),
    Sqlite(SqliteStore),
}

impl Store {
    pub fn memory() -> Self {
        Self::Memory(MemoryStore::new())
    }

    pub async fn sqlite(database_url: &str) -> Result<Self> {
        let sqlite = SqliteStore::connect(database_url).await?;
        Ok(Self::Sqlite(sqlite))
    }

    pub fn backend_name(&self) -> &'static str {
        match self {
            Store::Memory(_) => "memory",
            Store::Sqlite(_) => "sqlite",
        }
    }
}

impl CourseRepository for Store {
    async fn list_courses(&self, query: &CourseQuery) -> Result<Vec<Course>> {
        match self {
            Store::Memory(store) => store.list_courses(query).await,
            Store::Sqlite(store) => store.list_courses(query).await,
        }
    }

    async fn find_course(&self, course_id: &str) -> Result<Option<Course>> {
        match self {
            Store::Memory(store) => store.find_course(course_id).await,
            Store::Sqlite(store) => store.find_course(course_id).await,
        }
    }

    async fn find_course_by_slug(&self, slug: &str) -> Result<Option<Course>> {
        match self {
            Store::Memory(store) => store.find_course_by_slug(slug).await,
            Store::Sqlite(store) => store.find_course_by_slug(slug).await,
        }
    }

    async fn upsert_course(&self, course: &Course) -> Result<()> {
        match self {
            Store::Memory(store) => store.upsert_course(course).await,
            Store::Sqlite(store) => store.upsert_course(course).await,
        }
    }
}

impl LessonRepository for Store {
    async fn lessons_for_course(&self, course_id: &str) -> Result<Vec<Lesson>> {
        match self {
            Store::Memory(store) => store.lessons_for_course(course_id).await,
            Store::Sqlite(store) => store.lessons_for_course(course_id).await,
        }
    }

    async fn upsert_lesson(&self, lesson: &Lesson) -> Result<()> {
        match self {
            Store::Memory(store) => store.upsert_lesson(lesson).await,
            Store::Sqlite(store) => store.upsert_lesson(lesson).await,
        }
    }
}

impl ReviewRepository for Store {
    async fn list_reviews(&self, query: &ReviewQuery) -> Result<Vec<Review>> {
        match self {
            Store::Memory(store) => store.list_reviews(query).await,
            Store::Sqlite(store) => store.list_reviews(query).await,
        }
    }

    async fn insert_review(&self, review: &Review) -> Result<()> {
        match self {
            Store::Memory(store) => store.insert_review(review).await,
            Store::Sqlite(store) => store.insert_review(review).await,
        }
    }

    async fn ratings_for_course(&self, course_id: &str) -> Result<Vec<u8>> {
        match self {
            Store::Memory(store) => store.ratings_for_course(course_id).await,
            Store::Sqlite(store) => store.ratings_for_course(course_id).await,
        }
    }
}
