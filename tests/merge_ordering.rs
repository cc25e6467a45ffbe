// tests/merge_ordering.rs
use chrono::{TimeZone, Utc};
use ticker_news_relay::ingest::types::FetchPage;
use ticker_news_relay::merge::{merge, Fingerprint};
use ticker_news_relay::{NewsItem, SourceKind};

fn at(min: u32) -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, 9, min, 0).unwrap()
}

fn page(source: SourceKind, items: &[(&str, u32)]) -> FetchPage {
    FetchPage {
        source,
        items: items
            .iter()
            .map(|(id, m)| NewsItem::new(*id, format!("title {id}"), source, at(*m)))
            .collect(),
    }
}

fn ids(items: &[NewsItem]) -> Vec<&str> {
    items.iter().map(|i| i.id.as_str()).collect()
}

#[test]
fn interleaves_sources_newest_first() {
    let a = page(SourceKind::Official, &[("id1", 1), ("id3", 3)]);
    let b = page(SourceKind::Community, &[("id2", 2)]);
    let out = merge(Some(&a), Some(&b), None).unwrap();
    assert_eq!(ids(&out.batch.items), ["id3", "id2", "id1"]);
    assert!(out.changed);
}

#[test]
fn same_id_keeps_the_official_copy() {
    let a = page(SourceKind::Official, &[("x", 5)]);
    let b = page(SourceKind::Community, &[("x", 7), ("y", 6)]);
    let out = merge(Some(&a), Some(&b), None).unwrap();
    assert_eq!(ids(&out.batch.items), ["y", "x"]);
    assert_eq!(out.batch.items[1].source, SourceKind::Official);
}

#[test]
fn timestamp_ties_break_by_id_and_input_order_does_not_matter() {
    let a = page(SourceKind::Official, &[("b", 4), ("a", 4)]);
    let b = page(SourceKind::Community, &[("c", 4)]);
    let one = merge(Some(&a), Some(&b), None).unwrap();
    let two = merge(Some(&page(SourceKind::Official, &[("a", 4), ("b", 4)])), Some(&b), None).unwrap();
    assert_eq!(ids(&one.batch.items), ["c", "b", "a"]);
    assert_eq!(one.batch.fingerprint, two.batch.fingerprint);
}

#[test]
fn unchanged_payload_is_detected_and_single_source_still_merges() {
    let a = page(SourceKind::Official, &[("n1", 1)]);
    let first = merge(Some(&a), None, None).unwrap();
    let again = merge(Some(&a), None, Some(&first.batch.fingerprint)).unwrap();
    assert!(!again.changed);

    let only_b = merge(None, Some(&page(SourceKind::Community, &[("c1", 1)])), None).unwrap();
    assert_eq!(only_b.batch.len(), 1);
    assert!(merge(None, None, None).is_none());
}

#[test]
fn fingerprint_tracks_content_not_just_ids() {
    let mut a = page(SourceKind::Official, &[("n1", 1)]);
    let before = Fingerprint::of(&a.items);
    a.items[0].title.push('!');
    assert_ne!(before, Fingerprint::of(&a.items));
    assert_eq!(before.to_string().len(), 12);
}
