use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use shelfmark_core::extract_isbn_from_text;
use shelfmark_core::models::CatalogCandidate;
use tracing::debug;

use super::title::{split_title, volume_number};
use super::NDL_UPSTREAM;
use crate::error::{CatalogError, Result};

/// Child elements and attributes of one RSS `<item>`, keyed by qualified name.
#[derive(Debug, Default)]
struct RawItem {
    texts: Vec<(String, String)>,
    enclosure_url: Option<String>,
    thumbnail_url: Option<String>,
}

impl RawItem {
    fn first(&self, name: &str) -> Option<&str> {
        self.texts
            .iter()
            .filter(|(key, _)| key == name)
            .map(|(_, value)| value.trim())
            .find(|value| !value.is_empty())
    }

    fn all(&self, name: &str) -> impl Iterator<Item = &str> {
        self.texts
            .iter()
            .filter(move |(key, _)| key == name)
            .map(|(_, value)| value.trim())
    }

    fn into_candidate(self) -> Option<CatalogCandidate> {
        let raw_title = self.first("dc:title").or_else(|| self.first("title"))?;
        let (title, number_from_title) = split_title(raw_title);

        let volume_number = self
            .first("dcndl:volume")
            .and_then(volume_number)
            .or(number_from_title);
        let author = self.first("dc:creator").or_else(|| self.first("author"));
        let publisher = self.first("dc:publisher");
        let isbn = self
            .all("dc:identifier")
            .find_map(|value| extract_isbn_from_text(value).ok());
        let cover_url = [&self.enclosure_url, &self.thumbnail_url]
            .into_iter()
            .filter_map(|url| url.as_deref().map(str::trim))
            .find(|url| !url.is_empty());

        Some(CatalogCandidate {
            title,
            author: author.map(str::to_string),
            publisher: publisher.map(str::to_string),
            isbn,
            volume_number,
            cover_url: cover_url.map(str::to_string),
        })
    }
}

fn parse_error(reason: impl Into<String>) -> CatalogError {
    CatalogError::Parse {
        upstream: NDL_UPSTREAM.to_string(),
        reason: reason.into(),
    }
}

fn qualified_name(start: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(start.name().as_ref()).into_owned()
}

fn attribute(start: &BytesStart<'_>, key: &str) -> Result<Option<String>> {
    for attr in start.attributes() {
        let attr = attr.map_err(|e| parse_error(e.to_string()))?;
        if attr.key.as_ref() == key.as_bytes() {
            let value = attr
                .unescape_value()
                .map_err(|e| parse_error(e.to_string()))?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

fn record_attributes(item: &mut RawItem, start: &BytesStart<'_>) -> Result<()> {
    match start.name().as_ref() {
        b"enclosure" if item.enclosure_url.is_none() => {
            item.enclosure_url = attribute(start, "url")?;
        }
        b"link" if item.thumbnail_url.is_none() => {
            let is_thumbnail = attribute(start, "rel")?
                .is_some_and(|rel| rel.trim_end().ends_with("thumbnail"));
            if is_thumbnail {
                item.thumbnail_url = attribute(start, "href")?;
            }
        }
        _ => {}
    }
    Ok(())
}

/// Parse an NDL Search OpenSearch RSS document into candidates, in feed order.
/// Items without any title are skipped.
pub fn parse_opensearch_rss(xml: &str) -> Result<Vec<CatalogCandidate>> {
    let mut reader = Reader::from_str(xml);
    let mut saw_channel = false;
    let mut items = Vec::new();

    // Element names below the current <item>; empty when outside one.
    let mut path: Vec<String> = Vec::new();
    let mut current: Option<RawItem> = None;
    let mut text = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(start)) => {
                let name = qualified_name(&start);
                if name == "channel" {
                    saw_channel = true;
                }
                if let Some(item) = current.as_mut() {
                    if path.is_empty() {
                        record_attributes(item, &start)?;
                        text.clear();
                    }
                    path.push(name);
                } else if name == "item" {
                    current = Some(RawItem::default());
                }
            }
            Ok(Event::Empty(start)) => {
                if let Some(item) = current.as_mut()
                    && path.is_empty()
                {
                    record_attributes(item, &start)?;
                }
            }
            Ok(Event::Text(content)) => {
                if path.len() == 1 {
                    let unescaped = content.unescape().map_err(|e| parse_error(e.to_string()))?;
                    text.push_str(&unescaped);
                }
            }
            Ok(Event::CData(content)) => {
                if path.len() == 1 {
                    let raw = content.into_inner();
                    text.push_str(&String::from_utf8_lossy(&raw));
                }
            }
            Ok(Event::End(end)) => {
                if let Some(name) = path.pop() {
                    if path.is_empty()
                        && let Some(item) = current.as_mut()
                    {
                        item.texts.push((name, std::mem::take(&mut text)));
                    }
                } else if end.name().as_ref() == b"item"
                    && let Some(item) = current.take()
                {
                    match item.into_candidate() {
                        Some(candidate) => items.push(candidate),
                        None => {
                            debug!(upstream = NDL_UPSTREAM, "skipped catalog item without title")
                        }
                    }
                }
            }
            Ok(Event::Eof) => {
                if current.is_some() {
                    return Err(parse_error("document ended inside an item"));
                }
                break;
            }
            Err(e) => return Err(parse_error(format!("invalid XML: {e}"))),
            _ => {}
        }
    }

    if !saw_channel {
        return Err(parse_error("missing RSS channel"));
    }
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEARCH_XML: &str = r#"<rss xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:dcndl="http://ndl.go.jp/dcndl/terms/">
  <channel>
    <title>NDL Search</title>
    <item>
      <dc:title>検索テスト作品 第3巻</dc:title>
      <dc:creator>検索著者A</dc:creator>
      <dc:publisher>検索出版社A</dc:publisher>
      <dc:identifier xsi:type="dcndl:JPNO">12345678</dc:identifier>
      <dc:identifier>ISBN978-4-000-00000-2</dc:identifier>
      <dcndl:volume>第3巻</dcndl:volume>
      <enclosure url="https://example.com/covers/search-3.jpg" />
    </item>
    <item>
      <title>検索テスト別作品 2巻</title>
      <author>検索著者B</author>
      <dc:identifier>urn:isbn:9784000000005</dc:identifier>
    </item>
  </channel>
</rss>"#;

    #[test]
    fn parses_namespaced_and_plain_fields() {
        let items = parse_opensearch_rss(SEARCH_XML).unwrap();
        assert_eq!(items.len(), 2);

        let first = &items[0];
        assert_eq!(first.title, "検索テスト作品");
        assert_eq!(first.author.as_deref(), Some("検索著者A"));
        assert_eq!(first.publisher.as_deref(), Some("検索出版社A"));
        assert_eq!(first.isbn.as_ref().map(|i| i.as_str()), Some("9784000000002"));
        assert_eq!(first.volume_number, Some(3));
        assert_eq!(
            first.cover_url.as_deref(),
            Some("https://example.com/covers/search-3.jpg")
        );

        let second = &items[1];
        assert_eq!(second.title, "検索テスト別作品");
        assert_eq!(second.author.as_deref(), Some("検索著者B"));
        assert_eq!(second.publisher, None);
        assert_eq!(second.isbn.as_ref().map(|i| i.as_str()), Some("9784000000005"));
        assert_eq!(second.volume_number, Some(2));
        assert_eq!(second.cover_url, None);
    }

    #[test]
    fn falls_back_to_thumbnail_link() {
        let xml = r#"<rss xmlns:dc="http://purl.org/dc/elements/1.1/"><channel><item>
            <dc:title>サムネイル作品 第7巻</dc:title>
            <link>https://ndlsearch.ndl.go.jp/books/1</link>
            <link rel="alternate" href="https://example.com/other" />
            <link rel="http://ndl.go.jp/dcndl/terms/thumbnail" href="https://example.com/covers/thumb-7.jpg" />
        </item></channel></rss>"#;
        let items = parse_opensearch_rss(xml).unwrap();
        assert_eq!(
            items[0].cover_url.as_deref(),
            Some("https://example.com/covers/thumb-7.jpg")
        );
        assert_eq!(items[0].volume_number, Some(7));
    }

    #[test]
    fn non_cover_links_give_no_cover() {
        let xml = r#"<rss><channel><item>
            <title>作品</title>
            <link rel="alternate" href="https://example.com/other" />
        </item></channel></rss>"#;
        let items = parse_opensearch_rss(xml).unwrap();
        assert_eq!(items[0].cover_url, None);
        assert_eq!(items[0].isbn, None);
    }

    #[test]
    fn blank_values_are_absent_and_untitled_items_skipped() {
        let xml = r#"<rss xmlns:dc="http://purl.org/dc/elements/1.1/"><channel>
            <item><dc:title>  </dc:title><dc:identifier>9784000000002</dc:identifier></item>
            <item>
              <dc:title>作品</dc:title>
              <dc:creator>   </dc:creator>
              <enclosure url="  " />
            </item>
        </channel></rss>"#;
        let items = parse_opensearch_rss(xml).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].title, "作品");
        assert_eq!(items[0].author, None);
        assert_eq!(items[0].cover_url, None);
    }

    #[test]
    fn empty_channel_has_no_items() {
        assert!(parse_opensearch_rss("<rss><channel></channel></rss>").unwrap().is_empty());
    }

    #[test]
    fn malformed_documents_are_parse_errors() {
        assert!(matches!(
            parse_opensearch_rss("<rss><channel><item></channel></rss>"),
            Err(CatalogError::Parse { .. })
        ));
        assert!(matches!(
            parse_opensearch_rss("this is not xml"),
            Err(CatalogError::Parse { .. })
        ));
    }
}
