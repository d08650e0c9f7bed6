use crate::error::{Result, StreamError};
use crate::models::PageRecord;
use quick_xml::events::{BytesStart, BytesText, Event};
use quick_xml::reader::Reader;
use std::borrow::Cow;
use tracing::warn;

const ROOT_OPEN: &str = "<root>";
const ROOT_CLOSE: &str = "</root>";

#[derive(Default)]
struct PageBuilder {
    id: String,
    title: String,
    is_redirect: bool,
    redirect_target: Option<String>,
    text: Option<String>,
    revisions: u32,
}

impl PageBuilder {
    fn finish(self) -> Result<PageRecord> {
        let id = self
            .id
            .trim()
            .parse::<u64>()
            .map_err(|_| StreamError::MalformedEntry(self.id.clone()))?;
        Ok(PageRecord {
            id,
            title: self.title,
            is_redirect: self.is_redirect,
            redirect_target: self.redirect_target,
            raw_text: self.text.unwrap_or_default(),
        })
    }
}

/// Which field of the open page a text event belongs to.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Field {
    Id,
    Title,
    Text,
    Other,
}

/// Parses one decompressed block as a run of `<page>` elements.
///
/// Blocks are fragments, so the bytes are wrapped in a synthetic root
/// before parsing. Invalid UTF-8 is replaced, never fatal. A page without a
/// parsable id is logged and skipped; malformed XML fails the whole block.
pub fn extract_pages(block: &[u8]) -> Result<Vec<PageRecord>> {
    let body = String::from_utf8_lossy(block);
    let mut xml = String::with_capacity(body.len() + ROOT_OPEN.len() + ROOT_CLOSE.len());
    xml.push_str(ROOT_OPEN);
    xml.push_str(&body);
    xml.push_str(ROOT_CLOSE);

    let mut reader = Reader::from_str(&xml);
    let mut pages = Vec::new();
    let mut stack: Vec<Vec<u8>> = Vec::new();
    let mut page: Option<(usize, PageBuilder)> = None;

    loop {
        let event = reader.read_event().map_err(|e| StreamError::Parse {
            position: reader.buffer_position().saturating_sub(ROOT_OPEN.len()),
            reason: e.to_string(),
        })?;

        match event {
            Event::Start(e) => {
                stack.push(e.name().as_ref().to_vec());
                if let Some((depth, builder)) = page.as_mut() {
                    open_child(builder, &stack[*depth..], &e);
                } else if e.name().as_ref() == b"page" {
                    page = Some((stack.len(), PageBuilder::default()));
                }
            }
            Event::Empty(e) => {
                if let Some((depth, builder)) = page.as_mut() {
                    let mut rel: Vec<Vec<u8>> = stack[*depth..].to_vec();
                    rel.push(e.name().as_ref().to_vec());
                    open_child(builder, &rel, &e);
                }
            }
            Event::Text(t) => {
                if let Some((depth, builder)) = page.as_mut() {
                    let field = field_for(&stack[*depth..], builder);
                    append(builder, field, &unescape_lossy(&t));
                }
            }
            Event::CData(c) => {
                if let Some((depth, builder)) = page.as_mut() {
                    let field = field_for(&stack[*depth..], builder);
                    append(builder, field, &String::from_utf8_lossy(&c.into_inner()));
                }
            }
            Event::End(_) => {
                let closing_page = matches!(&page, Some((depth, _)) if *depth == stack.len());
                stack.pop();
                if closing_page {
                    if let Some((_, builder)) = page.take() {
                        match builder.finish() {
                            Ok(record) => pages.push(record),
                            Err(e) => warn!(error = %e, "Skipping page"),
                        }
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(pages)
}

fn open_child(builder: &mut PageBuilder, rel: &[Vec<u8>], e: &BytesStart) {
    match rel {
        [name] if name.as_slice() == b"redirect" => {
            builder.is_redirect = true;
            if let Ok(Some(attr)) = e.try_get_attribute("title") {
                let target = attr
                    .unescape_value()
                    .map(Cow::into_owned)
                    .unwrap_or_else(|_| String::from_utf8_lossy(&attr.value).into_owned());
                builder.redirect_target = Some(target);
            }
        }
        [name] if name.as_slice() == b"revision" => builder.revisions += 1,
        [rev, text] if rev.as_slice() == b"revision" && text.as_slice() == b"text" => {
            if builder.revisions == 1 && builder.text.is_none() {
                builder.text = Some(String::new());
            }
        }
        _ => {}
    }
}

fn field_for(rel: &[Vec<u8>], builder: &PageBuilder) -> Field {
    match rel {
        [name] if name.as_slice() == b"id" => Field::Id,
        [name] if name.as_slice() == b"title" => Field::Title,
        [rev, text]
            if rev.as_slice() == b"revision"
                && text.as_slice() == b"text"
                && builder.revisions == 1 =>
        {
            Field::Text
        }
        _ => Field::Other,
    }
}

fn append(builder: &mut PageBuilder, field: Field, value: &str) {
    match field {
        Field::Id => builder.id.push_str(value),
        Field::Title => builder.title.push_str(value),
        Field::Text => builder.text.get_or_insert_with(String::new).push_str(value),
        Field::Other => {}
    }
}

/// Unknown entities fall back to the raw text rather than failing the block.
fn unescape_lossy(t: &BytesText) -> String {
    match t.unescape() {
        Ok(s) => s.into_owned(),
        Err(_) => String::from_utf8_lossy(t).into_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page_xml(id: &str, title: &str, body: &str) -> String {
        format!(
            "<page>\n<title>{title}</title>\n<ns>0</ns>\n<id>{id}</id>\n<revision>\n<id>999</id>\n<text xml:space=\"preserve\">{body}</text>\n</revision>\n</page>\n"
        )
    }

    #[test]
    fn extracts_pages_in_block_order() {
        let block = format!(
            "  {}{}",
            page_xml("1", "Cat", "Cats purr."),
            page_xml("2", "Dog", "Dogs bark.")
        );
        let pages = extract_pages(block.as_bytes()).unwrap();
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].id, 1);
        assert_eq!(pages[0].title, "Cat");
        assert_eq!(pages[0].raw_text, "Cats purr.");
        assert!(!pages[0].is_redirect);
        assert_eq!(pages[1].id, 2);
        assert_eq!(pages[1].title, "Dog");
    }

    #[test]
    fn page_id_not_revision_id() {
        let pages = extract_pages(page_xml("7", "Seven", "x").as_bytes()).unwrap();
        assert_eq!(pages[0].id, 7);
    }

    #[test]
    fn redirect_marker_with_target() {
        let block = "<page><title>Kitty</title><id>3</id><redirect title=\"Cat\" /><revision><text>#REDIRECT [[Cat]]</text></revision></page>";
        let pages = extract_pages(block.as_bytes()).unwrap();
        assert!(pages[0].is_redirect);
        assert_eq!(pages[0].redirect_target.as_deref(), Some("Cat"));
        assert_eq!(pages[0].raw_text, "#REDIRECT [[Cat]]");
    }

    #[test]
    fn missing_text_is_empty() {
        let block = "<page><title>Empty</title><id>4</id><revision><id>1</id></revision></page>";
        let pages = extract_pages(block.as_bytes()).unwrap();
        assert_eq!(pages[0].raw_text, "");
    }

    #[test]
    fn self_closing_text_is_empty() {
        let block =
            "<page><title>Blank</title><id>5</id><revision><text bytes=\"0\" /></revision></page>";
        let pages = extract_pages(block.as_bytes()).unwrap();
        assert_eq!(pages[0].raw_text, "");
    }

    #[test]
    fn only_first_revision_text_is_kept() {
        let block = "<page><title>Rev</title><id>6</id><revision><text>first</text></revision><revision><text>second</text></revision></page>";
        let pages = extract_pages(block.as_bytes()).unwrap();
        assert_eq!(pages[0].raw_text, "first");
    }

    #[test]
    fn entities_are_unescaped() {
        let block = page_xml("8", "AT&amp;T", "a &lt;b&gt; [[C &amp; D]]");
        let pages = extract_pages(block.as_bytes()).unwrap();
        assert_eq!(pages[0].title, "AT&T");
        assert_eq!(pages[0].raw_text, "a <b> [[C & D]]");
    }

    #[test]
    fn bad_id_skips_only_that_page() {
        let block = format!(
            "{}{}",
            page_xml("abc", "Broken", "x"),
            page_xml("9", "Fine", "y")
        );
        let pages = extract_pages(block.as_bytes()).unwrap();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].title, "Fine");
    }

    #[test]
    fn invalid_utf8_is_replaced() {
        let mut block = b"<page><title>Caf".to_vec();
        block.push(0xff);
        block.extend_from_slice(b"</title><id>10</id></page>");
        let pages = extract_pages(&block).unwrap();
        assert_eq!(pages[0].id, 10);
        assert!(pages[0].title.starts_with("Caf"));
        assert!(pages[0].title.contains('\u{FFFD}'));
    }

    #[test]
    fn malformed_xml_fails_block() {
        let block = "<page><title>Oops</titel><id>1</id></page>";
        let err = extract_pages(block.as_bytes()).unwrap_err();
        assert!(matches!(err, StreamError::Parse { .. }));
    }

    #[test]
    fn empty_block_has_no_pages() {
        assert!(extract_pages(b"").unwrap().is_empty());
    }
}
