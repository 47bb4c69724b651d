use scraper::ElementRef;
use serde::{Deserialize, Serialize};

use super::locale::last_positive_amount;

/// Elements whose text never reaches the rendered page.
const HIDDEN_TAGS: &[&str] = &["script", "style", "noscript", "template"];

/// Elements that start a new line or cell when rendered. Text on either side
/// of them is separated; text across inline elements (`b`, `sup`, `span`...)
/// runs together.
const BLOCK_TAGS: &[&str] = &[
    "address", "article", "aside", "blockquote", "body", "br", "caption", "dd", "div", "dl",
    "dt", "fieldset", "figcaption", "figure", "footer", "form", "h1", "h2", "h3", "h4", "h5",
    "h6", "header", "hr", "html", "li", "main", "nav", "ol", "option", "p", "pre", "section",
    "table", "tbody", "td", "tfoot", "th", "thead", "tr", "ul",
];

/// Where, relative to the label element, the value was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProximityLevel {
    Row,
    Siblings,
    OwnText,
    Descendants,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NearbyNumber {
    pub value: f64,
    pub level: ProximityLevel,
}

/// Rendered text of an element, close to what a browser shows: whitespace
/// collapsed, blocks and table cells separated by a single space, inline
/// runs joined as they are, hidden content left out.
///
/// `<td>1.500<sup>,00</sup></td>` reads `"1.500,00"`.
pub fn visible_text(element: ElementRef<'_>) -> String {
    let mut text = RenderedText::default();
    text.walk(element, None);
    text.out
}

/// Rendered text of `element`'s parent with `element` itself left out: the
/// sibling elements together with the loose text between them.
fn text_around(element: ElementRef<'_>) -> Option<String> {
    let parent = element.parent().and_then(ElementRef::wrap)?;
    let mut text = RenderedText::default();
    text.walk(parent, Some(element));
    Some(text.out)
}

#[derive(Default)]
struct RenderedText {
    out: String,
    gap: bool,
}

impl RenderedText {
    fn walk(&mut self, element: ElementRef<'_>, skip: Option<ElementRef<'_>>) {
        for child in element.children() {
            if let Some(text) = child.value().as_text() {
                self.push_text(text);
                continue;
            }
            let Some(child) = ElementRef::wrap(child) else {
                continue;
            };
            if skip.is_some_and(|skip| skip.id() == child.id()) {
                self.gap = true;
                continue;
            }

            let name = child.value().name();
            if HIDDEN_TAGS.contains(&name) {
                continue;
            }
            let block = BLOCK_TAGS.contains(&name);
            if block {
                self.gap = true;
            }
            self.walk(child, skip);
            if block {
                self.gap = true;
            }
        }
    }

    fn push_text(&mut self, text: &str) {
        for c in text.chars() {
            if c.is_whitespace() {
                self.gap = true;
                continue;
            }
            if self.gap && !self.out.is_empty() {
                self.out.push(' ');
            }
            self.gap = false;
            self.out.push(c);
        }
    }
}

/// Search outward from a label element for the value it labels.
///
/// Levels are tried in order and the first one that yields a positive amount
/// wins. Inside a level the last valid token in document order is taken.
pub fn find_number_near(element: ElementRef<'_>) -> Option<NearbyNumber> {
    let levels: [(ProximityLevel, fn(ElementRef<'_>) -> Option<f64>); 4] = [
        (ProximityLevel::Row, row_amount),
        (ProximityLevel::Siblings, sibling_amount),
        (ProximityLevel::OwnText, own_amount),
        (ProximityLevel::Descendants, descendant_amount),
    ];

    levels.iter().find_map(|(level, search)| {
        search(element).map(|value| NearbyNumber {
            value,
            level: *level,
        })
    })
}

/// The closest `<tr>` containing the element, the element itself included.
pub fn enclosing_row(element: ElementRef<'_>) -> Option<ElementRef<'_>> {
    std::iter::once(element)
        .chain(element.ancestors().filter_map(ElementRef::wrap))
        .find(|candidate| candidate.value().name() == "tr")
}

fn row_amount(element: ElementRef<'_>) -> Option<f64> {
    let row = enclosing_row(element)?;
    last_positive_amount(&visible_text(row))
}

fn sibling_amount(element: ElementRef<'_>) -> Option<f64> {
    last_positive_amount(&text_around(element)?)
}

fn own_amount(element: ElementRef<'_>) -> Option<f64> {
    last_positive_amount(&visible_text(element))
}

fn descendant_amount(element: ElementRef<'_>) -> Option<f64> {
    let descendants: Vec<ElementRef<'_>> = element
        .descendants()
        .skip(1)
        .filter_map(ElementRef::wrap)
        .collect();

    descendants
        .into_iter()
        .rev()
        .find_map(|child| last_positive_amount(&visible_text(child)))
}
