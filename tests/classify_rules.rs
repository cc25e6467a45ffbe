// tests/classify_rules.rs
use chrono::Utc;
use ticker_news_relay::classify::{MatchedRule, VIEW_THRESHOLD};
use ticker_news_relay::{Classifier, NewsItem, SourceKind, Tier};

fn official(title: &str, likes: u64, views: u64) -> NewsItem {
    let mut it = NewsItem::new("n", title, SourceKind::Official, Utc::now());
    it.likes = likes;
    it.views = views;
    it
}

#[test]
fn engagement_thresholds_are_inclusive() {
    let c = Classifier::default();
    assert_eq!(c.classify(&official("실적", 5, 0)).tier, Tier::Important);
    assert_eq!(c.classify(&official("실적", 4, 99)).tier, Tier::Regular);
    assert_eq!(c.classify(&official("실적", 0, VIEW_THRESHOLD)).tier, Tier::Important);
    assert_eq!(c.classify(&official("실적", 0, 0)).rule, MatchedRule::Default);
}

#[test]
fn configured_like_threshold_is_used() {
    let c = Classifier::new(["속보"], 20);
    assert_eq!(c.classify(&official("실적", 19, 0)).tier, Tier::Regular);
    assert_eq!(c.classify(&official("실적", 20, 0)).tier, Tier::Important);
}

#[test]
fn breaking_beats_engagement_and_reads_the_body() {
    let c = Classifier::default();
    assert_eq!(c.classify(&official("[속보] X", 50, 5_000)).tier, Tier::Breaking);

    let mut it = official("시장 마감", 0, 0);
    it.body = "오늘은 중요 지표 발표일".into();
    let r = c.classify(&it);
    assert_eq!(r.tier, Tier::Breaking);
    assert!(matches!(r.rule, MatchedRule::Keyword { ref keyword, .. } if keyword == "중요"));

    assert_eq!(c.classify(&official("특보: 거래소 점검", 0, 0)).tier, Tier::Breaking);
}

#[test]
fn community_items_are_never_tiered_up() {
    let c = Classifier::default();
    let mut it = NewsItem::new("c", "[속보] 같은 내용", SourceKind::Community, Utc::now());
    it.likes = 500;
    let r = c.classify(&it);
    assert_eq!(r.tier, Tier::Regular);
    assert_eq!(r.rule, MatchedRule::CommunitySource);
    assert!(!r.is_deliverable());
}

#[test]
fn classification_is_deterministic() {
    let c = Classifier::default();
    let it = official("🔥 테슬라 급등", 3, 10);
    assert_eq!(c.classify(&it), c.classify(&it));
}
