//! De-HTML
//!
//! Renders the HTML body of a draft as plain text for recipients who prefer it.

use once_cell::sync::Lazy;
use quick_xml::events::{BytesStart, Event};

static LINE_RE: Lazy<regex::Regex> = Lazy::new(|| regex::Regex::new(r"(\r?\n)+").unwrap());
static BLANK_LINES_RE: Lazy<regex::Regex> =
    Lazy::new(|| regex::Regex::new(r"\n{3,}").unwrap());
static TRAILING_SPACE_RE: Lazy<regex::Regex> =
    Lazy::new(|| regex::Regex::new(r"(?m)[ \t]+$").unwrap());

struct Dehtml {
    strbuilder: String,
    add_text: AddText,
    last_href: Option<String>,
    /// Depth of nested `<blockquote>`s, each level prefixes lines with "> ".
    quote_depth: usize,
}

impl Dehtml {
    fn line_prefix(&self) -> String {
        "> ".repeat(self.quote_depth)
    }

    fn new_paragraph(&mut self) {
        self.strbuilder += "\n\n";
        self.strbuilder += &self.line_prefix();
    }
}

#[derive(Debug, PartialEq)]
enum AddText {
    No,
    YesRemoveLineEnds,
    YesPreserveLineEnds,
}

/// Converts HTML to plain text.
///
/// Returns `None` if the HTML contains no text at all.
pub(crate) fn dehtml(buf: &str) -> Option<String> {
    let s = dehtml_quick_xml(buf);
    if !s.trim().is_empty() {
        return Some(tidy(&s));
    }
    let s = dehtml_manually(buf);
    if !s.trim().is_empty() {
        return Some(tidy(&s));
    }
    None
}

/// Strips trailing whitespace and collapses runs of blank lines.
fn tidy(s: &str) -> String {
    let s = s.replace('\r', "\n");
    let s = TRAILING_SPACE_RE.replace_all(&s, "");
    let s = BLANK_LINES_RE.replace_all(&s, "\n\n");
    s.trim().to_string()
}

fn dehtml_quick_xml(buf: &str) -> String {
    let buf = buf.trim().trim_start_matches("<!doctype html>");

    let mut dehtml = Dehtml {
        strbuilder: String::with_capacity(buf.len()),
        add_text: AddText::YesRemoveLineEnds,
        last_href: None,
        quote_depth: 0,
    };

    let mut reader = quick_xml::Reader::from_str(buf);
    reader.config_mut().check_end_names = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => dehtml_starttag_cb(e, &mut dehtml),
            Ok(Event::End(ref e)) => {
                dehtml_endtag_cb(&tag_name(e.name().as_ref()), &mut dehtml)
            }
            Ok(Event::Text(ref e)) => dehtml_text_cb(e, &mut dehtml),
            Ok(Event::CData(ref e)) => dehtml_text_cb(e, &mut dehtml),
            Ok(Event::Empty(ref e)) => {
                // Handle empty tags as a start tag immediately followed by end tag.
                // For example, `<p/>` is treated as `<p></p>`.
                dehtml_starttag_cb(e, &mut dehtml);
                dehtml_endtag_cb(&tag_name(e.name().as_ref()), &mut dehtml);
            }
            Ok(Event::Eof) => break,
            Err(_) => {
                // Whatever was parsed so far is kept, the caller falls back
                // to stripping tags manually if that is nothing.
                break;
            }
            _ => (),
        }
    }

    dehtml.strbuilder
}

fn tag_name(name: &[u8]) -> String {
    String::from_utf8_lossy(name).trim().to_lowercase()
}

fn dehtml_text_cb(text: &[u8], dehtml: &mut Dehtml) {
    if dehtml.add_text == AddText::YesPreserveLineEnds
        || dehtml.add_text == AddText::YesRemoveLineEnds
    {
        let last_added = escaper::decode_html_buf_sloppy(text).unwrap_or_default();

        if dehtml.add_text == AddText::YesRemoveLineEnds {
            dehtml.strbuilder += LINE_RE.replace_all(&last_added, " ").as_ref();
        } else {
            let replacement = format!("\n{}", dehtml.line_prefix());
            dehtml.strbuilder += LINE_RE.replace_all(&last_added, replacement.as_str()).as_ref();
        }
    }
}

fn dehtml_endtag_cb(tag: &str, dehtml: &mut Dehtml) {
    match tag {
        "p" | "table" | "tr" | "div" | "h1" | "h2" | "h3" | "h4" | "h5" | "h6" | "ul" | "ol" => {
            dehtml.new_paragraph();
            dehtml.add_text = AddText::YesRemoveLineEnds;
        }
        "style" | "script" | "title" | "head" | "pre" => {
            dehtml.new_paragraph();
            dehtml.add_text = AddText::YesRemoveLineEnds;
        }
        "blockquote" => {
            dehtml.quote_depth = dehtml.quote_depth.saturating_sub(1);
            dehtml.new_paragraph();
        }
        "a" => {
            if let Some(ref last_href) = dehtml.last_href.take() {
                dehtml.strbuilder += " (";
                dehtml.strbuilder += last_href;
                dehtml.strbuilder += ")";
            }
        }
        "b" | "strong" => {
            dehtml.strbuilder += "*";
        }
        "i" | "em" => {
            dehtml.strbuilder += "_";
        }
        _ => {}
    }
}

fn dehtml_starttag_cb(event: &BytesStart, dehtml: &mut Dehtml) {
    let tag = tag_name(event.name().as_ref());

    match tag.as_str() {
        "p" | "table" | "tr" | "div" | "h1" | "h2" | "h3" | "h4" | "h5" | "h6" | "ul" | "ol" => {
            dehtml.new_paragraph();
            dehtml.add_text = AddText::YesRemoveLineEnds;
        }
        "blockquote" => {
            dehtml.quote_depth += 1;
            dehtml.new_paragraph();
        }
        "li" => {
            dehtml.strbuilder += "\n";
            dehtml.strbuilder += &dehtml.line_prefix();
            dehtml.strbuilder += "- ";
        }
        "br" => {
            dehtml.strbuilder += "\n";
            dehtml.strbuilder += &dehtml.line_prefix();
            dehtml.add_text = AddText::YesRemoveLineEnds;
        }
        "style" | "script" | "title" | "head" => {
            dehtml.add_text = AddText::No;
        }
        "pre" => {
            dehtml.new_paragraph();
            dehtml.add_text = AddText::YesPreserveLineEnds;
        }
        "a" => {
            if let Some(href) = event
                .html_attributes()
                .filter_map(|attr| attr.ok())
                .find(|attr| tag_name(attr.key.as_ref()) == "href")
            {
                let href = escaper::decode_html_buf_sloppy(&href.value).unwrap_or_default();
                if !href.is_empty() && !href.starts_with("mailto:") {
                    dehtml.last_href = Some(href);
                }
            }
        }
        "b" | "strong" => {
            dehtml.strbuilder += "*";
        }
        "i" | "em" => {
            dehtml.strbuilder += "_";
        }
        _ => {}
    }
}

fn dehtml_manually(buf: &str) -> String {
    // Just strip out everything between "<" and ">"
    let mut strbuilder = String::new();
    let mut show_next_chars = true;
    for c in buf.chars() {
        match c {
            '<' => show_next_chars = false,
            '>' => show_next_chars = true,
            _ => {
                if show_next_chars {
                    strbuilder.push(c)
                }
            }
        }
    }
    escaper::decode_html_sloppy(&strbuilder).unwrap_or(strbuilder)
}
