use serde::{Deserialize, Serialize};

use crate::models::{Course, CourseStatus, COURSE_CATEGORIES};

pub const DEFAULT_COURSE_LIMIT: usize = 12;
pub const MAX_COURSE_LIMIT: usize = 100;

/// Raw catalog filters as they arrive from a query string or CLI flags.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CourseFilters {
    pub category: Option<String>,
    #[serde(alias = "search")]
    pub search_query: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CourseQuery {
    pub category: Option<String>,
    pub search: Option<String>,
    pub published_only: bool,
    pub limit: usize,
}

impl CourseQuery {
    pub fn published(limit: usize) -> Self {
        Self {
            category: None,
            search: None,
            published_only: true,
            limit: limit.clamp(1, MAX_COURSE_LIMIT),
        }
    }

    pub fn matches(&self, course: &Course) -> bool {
        if self.published_only && course.status != CourseStatus::Published {
            return false;
        }

        if let Some(category) = self.category.as_deref() {
            if course.category != category {
                return false;
            }
        }

        match self.search.as_deref() {
            Some(term) => {
                course.title.to_lowercase().contains(term)
                    || course.description.to_lowercase().contains(term)
            }
            None => true,
        }
    }
}

impl From<CourseFilters> for CourseQuery {
    fn from(filters: CourseFilters) -> Self {
        let category = filters
            .category
            .map(|value| value.trim().to_lowercase())
            .filter(|value| !value.is_empty() && value != "all");
        let search = filters
            .search_query
            .map(|value| value.trim().to_lowercase())
            .filter(|value| !value.is_empty());

        Self {
            category,
            search,
            published_only: false,
            limit: filters
                .limit
                .unwrap_or(DEFAULT_COURSE_LIMIT)
                .clamp(1, MAX_COURSE_LIMIT),
        }
    }
}

pub fn category_name(id: &str) -> Option<&'static str> {
    COURSE_CATEGORIES
        .iter()
        .find(|category| category.id == id)
        .map(|category| category.name)
}

pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_dash = false;

    for ch in title.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(ch.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }

    slug
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn course(title: &str, description: &str, category: &str, status: CourseStatus) -> Course {
        Course {
            id: slugify(title),
            slug: slugify(title),
            title: title.to_string(),
            description: description.to_string(),
            category: category.to_string(),
            status,
            price_cents: 4_900,
            duration_weeks: Some(4),
            level: None,
            thumbnail_url: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn all_category_and_blank_search_are_dropped() {
        let query = CourseQuery::from(CourseFilters {
            category: Some("All".to_string()),
            search_query: Some("   ".to_string()),
            limit: None,
        });

        assert_eq!(query.category, None);
        assert_eq!(query.search, None);
        assert_eq!(query.limit, DEFAULT_COURSE_LIMIT);
    }

    #[test]
    fn limit_is_clamped() {
        let query = CourseQuery::from(CourseFilters {
            limit: Some(0),
            ..CourseFilters::default()
        });
        assert_eq!(query.limit, 1);

        let query = CourseQuery::from(CourseFilters {
            limit: Some(5_000),
            ..CourseFilters::default()
        });
        assert_eq!(query.limit, MAX_COURSE_LIMIT);
    }

    #[test]
    fn search_hits_title_or_description() {
        let query = CourseQuery::from(CourseFilters {
            search_query: Some("Keyframes".to_string()),
            ..CourseFilters::default()
        });

        let by_title = course("Keyframes 101", "basics", "after-effects", CourseStatus::Draft);
        let by_description = course(
            "Motion Basics",
            "Learn keyframes and easing",
            "after-effects",
            CourseStatus::Published,
        );
        let miss = course("Blender Intro", "modeling", "blender", CourseStatus::Published);

        assert!(query.matches(&by_title));
        assert!(query.matches(&by_description));
        assert!(!query.matches(&miss));
    }

    #[test]
    fn published_query_skips_drafts() {
        let query = CourseQuery::published(10);
        assert!(!query.matches(&course("A", "", "blender", CourseStatus::Draft)));
        assert!(!query.matches(&course("B", "", "blender", CourseStatus::Archived)));
        assert!(query.matches(&course("C", "", "blender", CourseStatus::Published)));
    }

    #[test]
    fn slugify_collapses_separators() {
        assert_eq!(slugify("After Effects: Kickstart!"), "after-effects-kickstart");
        assert_eq!(slugify("  Blender -- for 3D  "), "blender-for-3d");
        assert_eq!(slugify("***"), "");
    }

    #[test]
    fn known_categories_resolve() {
        assert_eq!(category_name("blender"), Some("Blender for 3D Artists"));
        assert_eq!(category_name("houdini"), None);
    }
}
