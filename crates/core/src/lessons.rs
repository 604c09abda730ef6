use serde::Serialize;

use crate::models::{Course, Lesson};
use crate::video::{resolve_lesson_video, LessonVideo};

#[derive(Debug, Clone, Serialize)]
pub struct LessonPage {
    pub course: Course,
    pub lesson: Lesson,
    pub video: LessonVideo,
    pub duration_label: String,
    pub previous_lesson_id: Option<String>,
    pub next_lesson_id: Option<String>,
    pub position: usize,
    pub total_lessons: usize,
}

pub fn sort_lessons(lessons: &mut [Lesson]) {
    lessons.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.id.cmp(&b.id)));
}

pub fn format_duration(seconds: u32) -> String {
    let hours = seconds / 3_600;
    let minutes = (seconds % 3_600) / 60;

    if hours > 0 {
        format!("{hours}h {minutes}m")
    } else {
        format!("{minutes} min")
    }
}

/// Builds the lesson page for `lesson_id` out of the course's ordered lesson
/// list. Returns `None` when the lesson is not part of the course.
pub fn build_lesson_page(course: Course, lessons: &[Lesson], lesson_id: &str) -> Option<LessonPage> {
    let index = lessons.iter().position(|lesson| lesson.id == lesson_id)?;
    let lesson = lessons[index].clone();

    let previous_lesson_id = index
        .checked_sub(1)
        .and_then(|prev| lessons.get(prev))
        .map(|prev| prev.id.clone());
    let next_lesson_id = lessons.get(index + 1).map(|next| next.id.clone());

    Some(LessonPage {
        video: resolve_lesson_video(lesson.video_url.as_deref(), lesson.youtube_url.as_deref()),
        duration_label: format_duration(lesson.duration_seconds),
        previous_lesson_id,
        next_lesson_id,
        position: index + 1,
        total_lessons: lessons.len(),
        course,
        lesson,
    })
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::models::CourseStatus;

    fn lesson(id: &str, order: u32) -> Lesson {
        Lesson {
            id: id.to_string(),
            course_id: "ae-kickstart".to_string(),
            title: format!("Lesson {id}"),
            description: String::new(),
            video_url: None,
            youtube_url: Some(format!("https://www.youtube.com/watch?v={id}")),
            duration_seconds: 600,
            order,
            is_free: order == 1,
            resources: Vec::new(),
        }
    }

    fn course() -> Course {
        Course {
            id: "ae-kickstart".to_string(),
            slug: "after-effects-kickstart".to_string(),
            title: "After Effects Kickstart".to_string(),
            description: String::new(),
            category: "after-effects".to_string(),
            status: CourseStatus::Published,
            price_cents: 9_900,
            duration_weeks: Some(6),
            level: None,
            thumbnail_url: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn formats_durations() {
        assert_eq!(format_duration(0), "0 min");
        assert_eq!(format_duration(59), "0 min");
        assert_eq!(format_duration(754), "12 min");
        assert_eq!(format_duration(3_600), "1h 0m");
        assert_eq!(format_duration(5_430), "1h 30m");
    }

    #[test]
    fn sorts_by_order() {
        let mut lessons = vec![lesson("c", 3), lesson("a", 1), lesson("b", 2)];
        sort_lessons(&mut lessons);
        let ids = lessons.iter().map(|l| l.id.as_str()).collect::<Vec<_>>();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn middle_lesson_has_both_neighbors() {
        let lessons = vec![lesson("a", 1), lesson("b", 2), lesson("c", 3)];
        let page = build_lesson_page(course(), &lessons, "b").unwrap();

        assert_eq!(page.previous_lesson_id.as_deref(), Some("a"));
        assert_eq!(page.next_lesson_id.as_deref(), Some("c"));
        assert_eq!(page.position, 2);
        assert_eq!(page.total_lessons, 3);
        assert_eq!(page.duration_label, "10 min");
        assert_eq!(
            page.video,
            LessonVideo::Youtube {
                embed_url: "https://www.youtube.com/embed/b".to_string()
            }
        );
    }

    #[test]
    fn edges_have_one_neighbor() {
        let lessons = vec![lesson("a", 1), lesson("b", 2)];

        let first = build_lesson_page(course(), &lessons, "a").unwrap();
        assert_eq!(first.previous_lesson_id, None);
        assert_eq!(first.next_lesson_id.as_deref(), Some("b"));

        let last = build_lesson_page(course(), &lessons, "b").unwrap();
        assert_eq!(last.previous_lesson_id.as_deref(), Some("a"));
        assert_eq!(last.next_lesson_id, None);
    }

    #[test]
    fn foreign_lesson_is_rejected() {
        let lessons = vec![lesson("a", 1)];
        assert!(build_lesson_page(course(), &lessons, "zzz").is_none());
    }
}
