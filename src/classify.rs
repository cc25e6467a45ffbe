//! # Classifier
//! Pure tiering of new items. No I/O.
//!
//! Rules, first match wins:
//! 1. Breaking: a keyword in title/body/tags (case-insensitive), including the
//!    `[kw]` and `kw:` forms, or an alert glyph.
//! 2. Important: likes >= configured threshold, or views >= 100.
//! 3. Regular.
//!
//! Community items skip the rules entirely; they are only ever summarized.

use std::fmt;

use serde::Serialize;

use crate::ingest::types::{NewsItem, SourceKind};

/// Views at or above this make an official item important.
pub const VIEW_THRESHOLD: u64 = 100;

/// Glyphs upstream editors use to flag urgent posts.
pub const ALERT_GLYPHS: [char; 3] = ['🚨', '⚡', '🔥'];

pub const DEFAULT_BREAKING_KEYWORDS: [&str; 6] =
    ["속보", "긴급", "중요", "특보", "긴급속보", "특별속보"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Regular,
    Important,
    Breaking,
}

impl Tier {
    pub fn as_str(self) -> &'static str {
        match self {
            Tier::Breaking => "breaking",
            Tier::Important => "important",
            Tier::Regular => "regular",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Field {
    Title,
    Body,
    Tag,
}

/// Which rule fired, kept for audit and for the breaking probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum MatchedRule {
    /// `[kw]` or `kw:` in title or body.
    KeywordPattern { keyword: String, field: Field },
    Keyword { keyword: String, field: Field },
    AlertGlyph { glyph: char, field: Field },
    LikeThreshold { likes: u64, threshold: u64 },
    ViewThreshold { views: u64, threshold: u64 },
    /// Community items are never tiered.
    CommunitySource,
    Default,
}

impl fmt::Display for MatchedRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchedRule::KeywordPattern { keyword, field } => {
                write!(f, "pattern [{keyword}]/{keyword}: in {field:?}")
            }
            MatchedRule::Keyword { keyword, field } => write!(f, "keyword {keyword} in {field:?}"),
            MatchedRule::AlertGlyph { glyph, field } => write!(f, "glyph {glyph} in {field:?}"),
            MatchedRule::LikeThreshold { likes, threshold } => {
                write!(f, "likes {likes} >= {threshold}")
            }
            MatchedRule::ViewThreshold { views, threshold } => {
                write!(f, "views {views} >= {threshold}")
            }
            MatchedRule::CommunitySource => f.write_str("community source"),
            MatchedRule::Default => f.write_str("default"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassificationResult {
    pub item: NewsItem,
    pub tier: Tier,
    pub rule: MatchedRule,
}

impl ClassificationResult {
    /// Only official items may go to the immediate-delivery sink.
    pub fn is_deliverable(&self) -> bool {
        self.item.source == SourceKind::Official
    }
}

#[derive(Debug, Clone)]
pub struct Classifier {
    /// Lowercased, trimmed, non-empty.
    keywords: Vec<String>,
    like_threshold: u64,
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(DEFAULT_BREAKING_KEYWORDS, 5)
    }
}

impl Classifier {
    pub fn new<I, S>(keywords: I, like_threshold: u64) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut kws: Vec<String> = keywords
            .into_iter()
            .map(|k| k.as_ref().trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();
        kws.sort();
        kws.dedup();
        Self {
            keywords: kws,
            like_threshold,
        }
    }

    pub fn like_threshold(&self) -> u64 {
        self.like_threshold
    }

    pub fn classify(&self, item: &NewsItem) -> ClassificationResult {
        let (tier, rule) = if item.source == SourceKind::Community {
            (Tier::Regular, MatchedRule::CommunitySource)
        } else if let Some(rule) = self.breaking_rule(item) {
            (Tier::Breaking, rule)
        } else if item.likes >= self.like_threshold {
            (
                Tier::Important,
                MatchedRule::LikeThreshold {
                    likes: item.likes,
                    threshold: self.like_threshold,
                },
            )
        } else if item.views >= VIEW_THRESHOLD {
            (
                Tier::Important,
                MatchedRule::ViewThreshold {
                    views: item.views,
                    threshold: VIEW_THRESHOLD,
                },
            )
        } else {
            (Tier::Regular, MatchedRule::Default)
        };

        ClassificationResult {
            item: item.clone(),
            tier,
            rule,
        }
    }

    /// Breaking detection on free text, as if it were a title.
    pub fn probe_text(&self, text: &str) -> Option<MatchedRule> {
        self.text_rule(text, Field::Title)
    }

    fn breaking_rule(&self, item: &NewsItem) -> Option<MatchedRule> {
        self.text_rule(&item.title, Field::Title)
            .or_else(|| self.text_rule(&item.body, Field::Body))
            .or_else(|| {
                item.tags.iter().find_map(|tag| {
                    let t = tag.to_lowercase();
                    self.keywords
                        .iter()
                        .find(|k| t.contains(k.as_str()))
                        .map(|k| MatchedRule::Keyword {
                            keyword: k.clone(),
                            field: Field::Tag,
                        })
                })
            })
    }

    fn text_rule(&self, text: &str, field: Field) -> Option<MatchedRule> {
        if text.is_empty() {
            return None;
        }
        let lower = text.to_lowercase();

        // Longest keyword first so "긴급속보" is reported over "속보".
        let mut by_len: Vec<&String> = self.keywords.iter().collect();
        by_len.sort_by_key(|k| std::cmp::Reverse(k.chars().count()));

        for k in &by_len {
            if lower.contains(&format!("[{k}]")) || lower.contains(&format!("{k}:")) {
                return Some(MatchedRule::KeywordPattern {
                    keyword: (*k).clone(),
                    field,
                });
            }
        }
        for k in &by_len {
            if lower.contains(k.as_str()) {
                return Some(MatchedRule::Keyword {
                    keyword: (*k).clone(),
                    field,
                });
            }
        }
        text.chars()
            .find(|c| ALERT_GLYPHS.contains(c))
            .map(|glyph| MatchedRule::AlertGlyph { glyph, field })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn official(title: &str) -> NewsItem {
        NewsItem::new("1", title, SourceKind::Official, Utc::now())
    }

    #[test]
    fn bracket_pattern_is_reported_as_pattern() {
        let c = Classifier::default();
        let r = c.classify(&official("[속보] 연준 금리 동결"));
        assert_eq!(r.tier, Tier::Breaking);
        assert_eq!(
            r.rule,
            MatchedRule::KeywordPattern {
                keyword: "속보".into(),
                field: Field::Title
            }
        );
    }

    #[test]
    fn keyword_match_ignores_case() {
        let c = Classifier::new(["Breaking"], 5);
        let r = c.classify(&official("BREAKING: CPI hot"));
        assert_eq!(r.tier, Tier::Breaking);
        let r = c.classify(&official("breaking news tonight"));
        assert!(matches!(r.rule, MatchedRule::Keyword { .. }));
    }

    #[test]
    fn tags_and_glyphs_trigger_breaking() {
        let c = Classifier::default();
        let mut it = official("plain");
        it.tags.insert("긴급뉴스".into());
        assert_eq!(
            c.classify(&it).rule,
            MatchedRule::Keyword {
                keyword: "긴급".into(),
                field: Field::Tag
            }
        );

        let r = c.classify(&official("🚨 Nasdaq halts trading"));
        assert_eq!(
            r.rule,
            MatchedRule::AlertGlyph {
                glyph: '🚨',
                field: Field::Title
            }
        );
    }

    #[test]
    fn longest_keyword_wins() {
        let c = Classifier::default();
        assert_eq!(
            c.probe_text("긴급속보 테스트"),
            Some(MatchedRule::Keyword {
                keyword: "긴급속보".into(),
                field: Field::Title
            })
        );
    }

    #[test]
    fn keywords_are_cleaned() {
        let c = Classifier::new([" 속보 ", "", "속보"], 5);
        assert_eq!(c.keywords, vec!["속보".to_string()]);
    }

    #[test]
    fn like_rule_is_checked_before_views() {
        let c = Classifier::default();
        let mut it = official("plain");
        it.likes = 9;
        it.views = 500;
        assert!(matches!(c.classify(&it).rule, MatchedRule::LikeThreshold { .. }));
    }
}
