// src/mock_posts.rs
//! Synthetic post generator. Random author + templated content for a hashtag.

use chrono::Utc;
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::{Rng, SeedableRng};

use crate::types::{Post, Sentiment};

const AUTHORS: &[&str] = &[
    "@TechGuru_Alex",
    "@CreativeCat",
    "@DataDan",
    "@ReactFanatic",
    "@JS_Wizard",
    "@CSS_Queen",
    "@UX_Pro",
    "@DevRel_Diaries",
    "@CodeNewbie",
    "@Cloud_Savvy",
];

// `{tag}` is replaced by the stream hashtag.
const TEMPLATES: &[&str] = &[
    "Just deployed a new feature using {tag}! The DX is amazing. Feeling productive today. #coding #webdev",
    "I'm struggling a bit with the new update for {tag}. Any tips from the community? #help #programming",
    "Watching the keynote for {tag} Conf right now. So many exciting announcements! #tech #innovation",
    "What are your thoughts on the performance of {tag}? I think it's pretty solid.",
    "This is a game-changer! {tag} has completely transformed my workflow. Highly recommended! #productivity",
    "Ugh, another bug... Spent all day debugging this issue related to {tag}. So frustrating. #developerlife",
    "Just read an interesting article about the future of {tag}. It's going to be interesting to see where it goes.",
    "To all my followers, check out this awesome library for {tag}. It saved me hours of work! #opensource",
    "I'm not sure how I feel about the recent changes to {tag}. It feels a bit clunky now.",
    "The community around {tag} is simply the best. So supportive and helpful! \u{2764}\u{fe0f} #community #tech",
];

/// Source of new posts for the stream controller.
pub trait PostSource: Send + 'static {
    fn next_post(&mut self, hashtag: &str) -> Post;
}

#[derive(Debug)]
pub struct MockPostGenerator {
    rng: StdRng,
}

impl MockPostGenerator {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_os_rng(),
        }
    }

    /// Deterministic generator for tests and demos.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn generate(&mut self, hashtag: &str) -> Post {
        let author = AUTHORS.choose(&mut self.rng).copied().unwrap_or("@anonymous");
        let template = TEMPLATES.choose(&mut self.rng).copied().unwrap_or("{tag}");
        let now = Utc::now();
        // millis + random suffix keeps ids unique even within one millisecond
        let suffix: u64 = self.rng.random();
        Post {
            id: format!("post_{}_{:016x}", now.timestamp_millis(), suffix),
            author: author.to_string(),
            content: template.replace("{tag}", hashtag),
            created_at: now,
            sentiment: Sentiment::Analyzing,
        }
    }
}

impl Default for MockPostGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl PostSource for MockPostGenerator {
    fn next_post(&mut self, hashtag: &str) -> Post {
        self.generate(hashtag)
    }
}
