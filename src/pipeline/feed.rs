// src/pipeline/feed.rs

//! RSS 2.0 rendering of the change history.
//!
//! Every configured site gets a feed of its own events and every configured
//! region one aggregating the events of its sites. Fragments stored in the
//! history are sanitized again and embedded as CDATA, split wherever the
//! content holds a section terminator.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Duration, Utc};
use quick_xml::Writer;
use quick_xml::events::{BytesCData, BytesDecl, BytesEnd, BytesStart, BytesText, Event};

use crate::error::{AppError, Result};
use crate::models::{ChangeEvent, FeedConfig, SiteDescriptor, slugify};
use crate::storage::StateStore;
use crate::utils::xml::{cdata_sections, sanitize_fragment, xml_safe};

/// A rendered feed file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedDocument {
    /// File name relative to the feeds directory
    pub file_name: String,
    pub xml: String,
}

/// Channel-level fields of one feed.
struct Channel<'a> {
    title: String,
    link: &'a str,
    description: String,
}

/// Renders site and region feeds from the state store.
#[derive(Debug, Clone)]
pub struct FeedBuilder {
    config: FeedConfig,
}

impl FeedBuilder {
    pub fn new(config: FeedConfig) -> Self {
        Self { config }
    }

    /// File name of the feed of a site.
    pub fn site_file_name(&self, site: &SiteDescriptor) -> String {
        format!("site_{}.{}", site.slug(), self.config.extension)
    }

    /// File name of the feed of a region.
    pub fn region_file_name(&self, region: &str) -> String {
        format!(
            "{}-{}.{}",
            self.config.region_prefix,
            slugify(region),
            self.config.extension
        )
    }

    /// Render every site and region feed for the configured `sites`.
    ///
    /// Each entry fails or succeeds on its own.
    pub fn build_all(
        &self,
        store: &StateStore,
        sites: &[SiteDescriptor],
        now: DateTime<Utc>,
    ) -> Vec<Result<FeedDocument>> {
        let active: HashSet<String> = sites.iter().map(SiteDescriptor::slug).collect();
        let cutoff = Duration::try_days(self.config.retention_days)
            .and_then(|window| now.checked_sub_signed(window))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let events = store.events_for_feeds(&active, cutoff);

        let mut feeds: Vec<Result<FeedDocument>> = sites
            .iter()
            .map(|site| {
                let slug = site.slug();
                let own: Vec<&ChangeEvent> = events
                    .iter()
                    .copied()
                    .filter(|event| event.slug == slug)
                    .collect();
                self.site_feed(site, &own, now)
            })
            .collect();

        // Regions as configured now, not as recorded in older events
        let mut regions: BTreeMap<&str, HashSet<String>> = BTreeMap::new();
        for site in sites {
            regions
                .entry(site.region.as_str())
                .or_default()
                .insert(site.slug());
        }
        for (region, slugs) in regions {
            let members: Vec<&ChangeEvent> = events
                .iter()
                .copied()
                .filter(|event| slugs.contains(&event.slug))
                .collect();
            feeds.push(self.region_feed(region, &members, now));
        }

        feeds
    }

    /// Render the feed of one site from its events.
    pub fn site_feed(
        &self,
        site: &SiteDescriptor,
        events: &[&ChangeEvent],
        now: DateTime<Utc>,
    ) -> Result<FeedDocument> {
        let file_name = self.site_file_name(site);
        let channel = Channel {
            title: format!("Änderungen: {}", site.name),
            link: &site.url,
            description: format!("Änderungsfeed für {}", site.name),
        };
        let xml = self.render(
            &file_name,
            &channel,
            events,
            self.config.site_item_limit,
            now,
            |event| format!("{} - Aktualisierung", event.name),
        )?;
        Ok(FeedDocument { file_name, xml })
    }

    /// Render the aggregated feed of one region.
    pub fn region_feed(
        &self,
        region: &str,
        events: &[&ChangeEvent],
        now: DateTime<Utc>,
    ) -> Result<FeedDocument> {
        let file_name = self.region_file_name(region);
        let channel = Channel {
            title: format!("Regionalplanung {region}"),
            link: &self.config.region_link,
            description: format!("Aggregierte Änderungen für {region}"),
        };
        let xml = self.render(
            &file_name,
            &channel,
            events,
            self.config.region_item_limit,
            now,
            |event| format!("{} - Update", event.name),
        )?;
        Ok(FeedDocument { file_name, xml })
    }

    fn render(
        &self,
        feed: &str,
        channel: &Channel<'_>,
        events: &[&ChangeEvent],
        limit: usize,
        now: DateTime<Utc>,
        item_title: impl Fn(&ChangeEvent) -> String,
    ) -> Result<String> {
        let mut newest_first: Vec<&ChangeEvent> = events.to_vec();
        newest_first.sort_by(|a, b| b.checked_at.cmp(&a.checked_at));
        newest_first.truncate(limit);

        let mut writer = Writer::new(Vec::new());
        let w = &mut writer;
        emit(w, feed, Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

        let mut rss = BytesStart::new("rss");
        rss.push_attribute(("version", "2.0"));
        emit(w, feed, Event::Start(rss))?;
        emit(w, feed, Event::Start(BytesStart::new("channel")))?;

        text_element(w, feed, "title", &channel.title)?;
        text_element(w, feed, "link", channel.link)?;
        text_element(w, feed, "description", &channel.description)?;
        text_element(w, feed, "language", &self.config.language)?;
        text_element(w, feed, "lastBuildDate", &now.to_rfc2822())?;

        for event in newest_first {
            emit(w, feed, Event::Start(BytesStart::new("item")))?;
            text_element(w, feed, "title", &item_title(event))?;
            text_element(w, feed, "link", &event.url)?;

            let mut guid = BytesStart::new("guid");
            guid.push_attribute(("isPermaLink", "false"));
            emit(w, feed, Event::Start(guid))?;
            emit(w, feed, Event::Text(BytesText::new(&xml_safe(&event.id))))?;
            emit(w, feed, Event::End(BytesEnd::new("guid")))?;

            text_element(w, feed, "pubDate", &event.checked_at.to_rfc2822())?;

            emit(w, feed, Event::Start(BytesStart::new("description")))?;
            for section in cdata_sections(&xml_safe(&item_description(event))) {
                emit(w, feed, Event::CData(BytesCData::new(section)))?;
            }
            emit(w, feed, Event::End(BytesEnd::new("description")))?;

            emit(w, feed, Event::End(BytesEnd::new("item")))?;
        }

        emit(w, feed, Event::End(BytesEnd::new("channel")))?;
        emit(w, feed, Event::End(BytesEnd::new("rss")))?;

        String::from_utf8(writer.into_inner()).map_err(|e| AppError::feed(feed, e))
    }
}

/// HTML body of an item: metadata header, added content, prior content.
pub fn item_description(event: &ChangeEvent) -> String {
    let first_seen = event.first_seen.unwrap_or(event.checked_at);
    let mut body = format!(
        "<p><strong>Erste Erfassung:</strong> {}<br>\
         <strong>Geprüft am:</strong> {}<br>\
         <strong>Selektoren:</strong> {}<br>\
         <strong>Treffer:</strong> {}</p><hr>",
        html_escape::encode_text(&first_seen.to_rfc2822()),
        html_escape::encode_text(&event.checked_at.to_rfc2822()),
        html_escape::encode_text(&event.selectors_used.join(", ")),
        html_escape::encode_text(&event.matched_nodes),
    );

    body.push_str("<h3>Erkannte Änderungen</h3>");
    body.push_str(&sanitize_fragment(&event.changes_html));

    let previous = sanitize_fragment(&event.previous_html);
    if !previous.is_empty() {
        body.push_str("<hr><h3>Vorheriger Inhalt</h3>");
        body.push_str(&previous);
    }
    body
}

fn emit(writer: &mut Writer<Vec<u8>>, feed: &str, event: Event<'_>) -> Result<()> {
    writer
        .write_event(event)
        .map_err(|e| AppError::feed(feed, e))
}

fn text_element(writer: &mut Writer<Vec<u8>>, feed: &str, name: &str, text: &str) -> Result<()> {
    let text = xml_safe(text);
    emit(writer, feed, Event::Start(BytesStart::new(name)))?;
    emit(writer, feed, Event::Text(BytesText::new(&text)))?;
    emit(writer, feed, Event::End(BytesEnd::new(name)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChangeKind;
    use quick_xml::Reader;

    fn event(slug: &str, name: &str, hours_ago: i64, changes: &str) -> ChangeEvent {
        let at = Utc::now() - Duration::hours(hours_ago);
        ChangeEvent {
            id: ChangeEvent::make_id(slug, &at),
            slug: slug.into(),
            name: name.into(),
            region: "Hessen".into(),
            url: format!("https://example.com/{slug}"),
            first_seen: Some(at - Duration::days(3)),
            checked_at: at,
            kind: ChangeKind::Update,
            selectors_used: vec!["#content".into()],
            matched_nodes: "1 node(s): div#content".into(),
            changes_html: changes.into(),
            previous_html: "<p>Alt</p>".into(),
        }
    }

    #[derive(Debug, Default)]
    struct ParsedItem {
        title: String,
        guid: String,
        description: String,
    }

    /// Parse a feed back, collecting channel title and items.
    fn parse(xml: &str) -> (String, Vec<ParsedItem>) {
        let mut reader = Reader::from_str(xml);
        let mut path: Vec<String> = Vec::new();
        let mut channel_title = String::new();
        let mut items: Vec<ParsedItem> = Vec::new();

        loop {
            match reader.read_event().unwrap() {
                Event::Start(e) => {
                    let name = String::from_utf8(e.name().as_ref().to_vec()).unwrap();
                    if name == "item" {
                        items.push(ParsedItem::default());
                    }
                    path.push(name);
                }
                Event::End(_) => {
                    path.pop();
                }
                Event::Text(e) => {
                    let text = e.unescape().unwrap().into_owned();
                    match (path.last().map(String::as_str), path.len()) {
                        (Some("title"), 3) => channel_title.push_str(&text),
                        (Some("title"), 4) => items.last_mut().unwrap().title.push_str(&text),
                        (Some("guid"), 4) => items.last_mut().unwrap().guid.push_str(&text),
                        _ => {}
                    }
                }
                Event::CData(e) => {
                    let text = String::from_utf8(e.into_inner().into_owned()).unwrap();
                    items.last_mut().unwrap().description.push_str(&text);
                }
                Event::Eof => break,
                _ => {}
            }
        }
        (channel_title, items)
    }

    #[test]
    fn test_site_feed_orders_newest_first() {
        let builder = FeedBuilder::new(FeedConfig::default());
        let site = SiteDescriptor::new("Plan Nord", "Hessen", "https://example.com/nord", &[]);
        let older = event("plan-nord", "Plan Nord", 5, "<p>alt</p>");
        let newer = event("plan-nord", "Plan Nord", 1, "<p>neu</p>");

        let feed = builder
            .site_feed(&site, &[&older, &newer], Utc::now())
            .unwrap();
        assert_eq!(feed.file_name, "site_plan-nord.xml");
        assert!(feed.xml.contains(r#"<guid isPermaLink="false">"#));
        assert!(feed.xml.contains("<language>de-DE</language>"));

        let (title, items) = parse(&feed.xml);
        assert_eq!(title, "Änderungen: Plan Nord");
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].guid, newer.id);
        assert_eq!(items[0].title, "Plan Nord - Aktualisierung");
        assert!(items[0].description.contains("<h3>Erkannte Änderungen</h3><p>neu</p>"));
        assert!(items[0].description.contains("<h3>Vorheriger Inhalt</h3><p>Alt</p>"));
    }

    #[tokio::test]
    async fn test_build_all_with_huge_retention_keeps_everything() {
        let tmp = tempfile::TempDir::new().unwrap();
        let mut store = StateStore::load(
            Box::new(crate::storage::LocalStorage::new(tmp.path())),
            2000,
        )
        .await;
        store.append_event(event("plan-nord", "Plan Nord", 24 * 400, "<p>alt</p>"));

        let config = FeedConfig {
            retention_days: 100_000_000,
            ..FeedConfig::default()
        };
        let site = SiteDescriptor::new("Plan Nord", "Hessen", "https://example.com/nord", &[]);
        let feeds = FeedBuilder::new(config).build_all(&store, &[site], Utc::now());

        assert_eq!(feeds.len(), 2);
        let site_feed = feeds[0].as_ref().unwrap();
        assert_eq!(parse(&site_feed.xml).1.len(), 1);
    }

    #[test]
    fn test_site_feed_is_capped() {
        let builder = FeedBuilder::new(FeedConfig::default());
        let site = SiteDescriptor::new("Plan Nord", "Hessen", "https://example.com/nord", &[]);
        let events: Vec<ChangeEvent> = (0..25)
            .map(|i| event("plan-nord", "Plan Nord", i, "<p>x</p>"))
            .collect();
        let refs: Vec<&ChangeEvent> = events.iter().collect();

        let feed = builder.site_feed(&site, &refs, Utc::now()).unwrap();
        let (_, items) = parse(&feed.xml);
        assert_eq!(items.len(), 20);
        assert_eq!(items[0].guid, events[0].id);
    }

    #[test]
    fn test_cdata_terminator_cannot_truncate() {
        let builder = FeedBuilder::new(FeedConfig::default());
        let site = SiteDescriptor::new("Plan Nord", "Hessen", "https://example.com/nord", &[]);
        let hostile = event(
            "plan-nord",
            "Plan Nord",
            1,
            r#"<p title="]]>">Text ]]&gt; mit <a href="x">]]></a> Ende</p>"#,
        );

        let feed = builder.site_feed(&site, &[&hostile], Utc::now()).unwrap();
        let (_, items) = parse(&feed.xml);
        assert_eq!(items.len(), 1);
        let description = &items[0].description;
        assert!(description.contains(r#"<p title="]]"#));
        assert!(description.contains("Ende</p>"));
        assert!(description.ends_with("<p>Alt</p>"));
    }

    #[test]
    fn test_illegal_code_points_are_absent() {
        let builder = FeedBuilder::new(FeedConfig::default());
        let site = SiteDescriptor::new("Plan\u{1}Nord", "Hessen", "https://example.com/nord", &[]);
        let dirty = event("plannord", "Plan\u{1}Nord", 1, "<p>a\u{0}b\u{B}c\u{FFFF}d</p>");

        let feed = builder.site_feed(&site, &[&dirty], Utc::now()).unwrap();
        assert!(!feed.xml.chars().any(|c| !crate::utils::xml::is_xml_char(c)));
        let (_, items) = parse(&feed.xml);
        assert!(items[0].description.contains("<p>abcd</p>"));
    }

    #[test]
    fn test_active_content_is_stripped() {
        let dangerous = event(
            "plan-nord",
            "Plan Nord",
            1,
            "<p>ok</p><script>alert(1)</script><iframe src=\"x\"></iframe>",
        );
        let description = item_description(&dangerous);
        assert!(description.contains("<p>ok</p>"));
        assert!(!description.contains("script"));
        assert!(!description.contains("iframe"));
    }

    #[test]
    fn test_header_is_escaped() {
        let mut tricky = event("plan-nord", "Plan Nord", 1, "<p>x</p>");
        tricky.selectors_used = vec!["div > p".into(), "a[href*=\"&\"]".into()];
        let description = item_description(&tricky);
        assert!(description.contains("div &gt; p, a[href*=\"&amp;\"]"));
    }

    #[test]
    fn test_region_feed_file_and_channel() {
        let builder = FeedBuilder::new(FeedConfig::default());
        let a = event("plan-nord", "Plan Nord", 3, "<p>a</p>");
        let b = event("plan-sued", "Plan Süd", 1, "<p>b</p>");

        let feed = builder
            .region_feed("Baden-Württemberg", &[&a, &b], Utc::now())
            .unwrap();
        assert_eq!(feed.file_name, "DE-baden-w-rttemberg.xml");
        assert!(feed.xml.contains("<link>https://example.invalid/</link>"));

        let (title, items) = parse(&feed.xml);
        assert_eq!(title, "Regionalplanung Baden-Württemberg");
        assert_eq!(items[0].title, "Plan Süd - Update");
        assert_eq!(items[1].title, "Plan Nord - Update");
    }
}
