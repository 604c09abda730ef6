use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

static WATCH_PARAM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[?&]v=([^&]+)").expect("valid watch-param regex"));
static SHORT_LINK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"youtu\.be/([^?&]+)").expect("valid short-link regex"));

const EMBED_PREFIX: &str = "https://www.youtube.com/embed/";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LessonVideo {
    Youtube { embed_url: String },
    Hosted { url: String },
    Unavailable,
}

/// Turns a watch page or short link into an embeddable URL. Embed links and
/// anything unrecognized are returned unchanged.
pub fn youtube_embed_url(url: &str) -> Option<String> {
    let url = url.trim();
    if url.is_empty() {
        return None;
    }

    if url.contains("youtube.com/embed/") {
        return Some(url.to_string());
    }

    let video_id = WATCH_PARAM
        .captures(url)
        .or_else(|| SHORT_LINK.captures(url))
        .and_then(|captures| captures.get(1))
        .map(|id| id.as_str());

    Some(match video_id {
        Some(id) => format!("{EMBED_PREFIX}{id}"),
        None => url.to_string(),
    })
}

pub fn resolve_lesson_video(video_url: Option<&str>, youtube_url: Option<&str>) -> LessonVideo {
    if let Some(embed_url) = youtube_url.and_then(youtube_embed_url) {
        return LessonVideo::Youtube { embed_url };
    }

    match video_url.map(str::trim).filter(|url| !url.is_empty()) {
        Some(url) => LessonVideo::Hosted {
            url: url.to_string(),
        },
        None => LessonVideo::Unavailable,
    }
}
