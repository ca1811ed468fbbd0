//! # Presentation
//! Stateless view models for the dashboard: feed cards with sentiment badges,
//! a distribution pie and a count bar chart. Pure functions of a snapshot.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::stream::{StreamSnapshot, StreamStatus};
use crate::types::{Post, Sentiment, SentimentStats};

pub const EMPTY_FEED_MESSAGE: &str = "Waiting for posts... Start streaming to see the live feed.";
pub const EMPTY_CHART_MESSAGE: &str = "No data to display yet.";

const COLOR_POSITIVE: &str = "#22c55e";
const COLOR_NEGATIVE: &str = "#ef4444";
const COLOR_NEUTRAL: &str = "#6b7280";
const COLOR_ANALYZING: &str = "#3b82f6";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Badge {
    pub label: &'static str,
    pub color: &'static str,
    pub pending: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct PostCard {
    pub id: String,
    pub author: String,
    pub content: String,
    pub age: String,
    pub badge: Badge,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartEntry {
    pub name: &'static str,
    pub value: u64,
    pub color: &'static str,
    /// Rounded share of the total, 0..=100.
    pub percent: u32,
    pub label: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChartsView {
    pub total: u64,
    pub pie: Vec<ChartEntry>,
    pub bar: Vec<ChartEntry>,
    pub placeholder: Option<&'static str>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FeedView {
    pub cards: Vec<PostCard>,
    pub placeholder: Option<&'static str>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardView {
    pub hashtag: String,
    pub streaming: bool,
    /// Hashtag input is read-only while streaming.
    pub hashtag_editable: bool,
    pub error_banner: Option<String>,
    pub feed: FeedView,
    pub charts: ChartsView,
}

pub fn badge(sentiment: Sentiment) -> Badge {
    match sentiment {
        Sentiment::Positive => Badge {
            label: "POSITIVE",
            color: COLOR_POSITIVE,
            pending: false,
        },
        Sentiment::Negative => Badge {
            label: "NEGATIVE",
            color: COLOR_NEGATIVE,
            pending: false,
        },
        Sentiment::Neutral => Badge {
            label: "NEUTRAL",
            color: COLOR_NEUTRAL,
            pending: false,
        },
        Sentiment::Analyzing => Badge {
            label: "Analyzing...",
            color: COLOR_ANALYZING,
            pending: true,
        },
    }
}

/// "just now" below 5 seconds, otherwise whole seconds.
pub fn time_ago(created_at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let secs = now.signed_duration_since(created_at).num_seconds().max(0);
    if secs < 5 {
        "just now".to_string()
    } else {
        format!("{secs}s ago")
    }
}

pub fn post_card(post: &Post, now: DateTime<Utc>) -> PostCard {
    PostCard {
        id: post.id.clone(),
        author: post.author.clone(),
        content: post.content.clone(),
        age: time_ago(post.created_at, now),
        badge: badge(post.sentiment),
    }
}

/// Non-zero entries only, in Positive/Negative/Neutral order.
pub fn chart_entries(stats: &SentimentStats) -> Vec<ChartEntry> {
    let total = stats.total();
    [
        ("Positive", stats.positive, COLOR_POSITIVE),
        ("Negative", stats.negative, COLOR_NEGATIVE),
        ("Neutral", stats.neutral, COLOR_NEUTRAL),
    ]
    .into_iter()
    .filter(|(_, v, _)| *v > 0)
    .map(|(name, value, color)| {
        let percent = ((value as f64 / total as f64) * 100.0).round() as u32;
        ChartEntry {
            name,
            value,
            color,
            percent,
            label: format!("{name} {percent}%"),
        }
    })
    .collect()
}

pub fn charts(stats: &SentimentStats) -> ChartsView {
    let total = stats.total();
    if total == 0 {
        return ChartsView {
            total,
            pie: Vec::new(),
            bar: Vec::new(),
            placeholder: Some(EMPTY_CHART_MESSAGE),
        };
    }
    let entries = chart_entries(stats);
    ChartsView {
        total,
        pie: entries.clone(),
        bar: entries,
        placeholder: None,
    }
}

pub fn render_dashboard(snap: &StreamSnapshot, now: DateTime<Utc>) -> DashboardView {
    let cards: Vec<PostCard> = snap.posts.iter().map(|p| post_card(p, now)).collect();
    let placeholder = cards.is_empty().then_some(EMPTY_FEED_MESSAGE);
    let streaming = snap.status == StreamStatus::Streaming;
    DashboardView {
        hashtag: snap.hashtag.clone(),
        streaming,
        hashtag_editable: !streaming,
        error_banner: snap.error.clone(),
        feed: FeedView { cards, placeholder },
        charts: charts(&snap.stats),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn time_ago_thresholds() {
        let now = Utc::now();
        assert_eq!(time_ago(now, now), "just now");
        assert_eq!(time_ago(now - Duration::seconds(4), now), "just now");
        assert_eq!(time_ago(now - Duration::seconds(12), now), "12s ago");
        // clock skew never yields negative ages
        assert_eq!(time_ago(now + Duration::seconds(3), now), "just now");
    }

    #[test]
    fn zero_slices_are_filtered_and_percent_rounded() {
        let s = SentimentStats {
            positive: 1,
            negative: 0,
            neutral: 2,
        };
        let e = chart_entries(&s);
        assert_eq!(e.len(), 2);
        assert_eq!(e[0].label, "Positive 33%");
        assert_eq!(e[1].label, "Neutral 67%");
        assert_eq!(e[1].color, "#6b7280");
    }

    #[test]
    fn empty_stats_show_placeholder() {
        let c = charts(&SentimentStats::default());
        assert!(c.pie.is_empty() && c.bar.is_empty());
        assert_eq!(c.placeholder, Some(EMPTY_CHART_MESSAGE));
    }

    #[test]
    fn analyzing_badge_is_pending() {
        let b = badge(Sentiment::Analyzing);
        assert!(b.pending);
        assert_eq!(b.label, "Analyzing...");
        assert!(!badge(Sentiment::Negative).pending);
    }

    #[test]
    fn dashboard_locks_hashtag_while_streaming() {
        let snap = StreamSnapshot {
            status: StreamStatus::Streaming,
            hashtag: "#rust".into(),
            session: 1,
            posts: Vec::new(),
            queue_depth: 0,
            in_flight: 0,
            stats: SentimentStats::default(),
            error: None,
        };
        let v = render_dashboard(&snap, Utc::now());
        assert!(v.streaming);
        assert!(!v.hashtag_editable);
        assert_eq!(v.feed.placeholder, Some(EMPTY_FEED_MESSAGE));
    }
}
