use serde::Deserialize;
use tracing::warn;

use crate::hands::{Page, PageError};

/// The three element kinds the loop exposes to the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementKind {
    Input,
    Button,
    Link,
}

/// JavaScript injected into the page to enumerate one element kind.
/// NON-DESTRUCTIVE: reads attributes without touching the DOM. Each script
/// returns a JSON string so the result survives the evaluate boundary as
/// plain text.
const SCAN_INPUTS_JS: &str = r#"
JSON.stringify([...document.querySelectorAll('input')].map(el => ({
  placeholder: el.placeholder || '',
  name: el.name || ''
})))
"#;

const SCAN_BUTTONS_JS: &str = r#"
JSON.stringify([...document.querySelectorAll('button')].map(el => ({
  ariaLabel: el.getAttribute('aria-label') || '',
  text: el.textContent || ''
})))
"#;

const SCAN_LINKS_JS: &str = r#"
JSON.stringify([...document.querySelectorAll('a')].map(el => ({
  text: el.textContent || '',
  href: el.getAttribute('href') || ''
})))
"#;

impl ElementKind {
    pub fn scan_js(self) -> &'static str {
        match self {
            ElementKind::Input => SCAN_INPUTS_JS,
            ElementKind::Button => SCAN_BUTTONS_JS,
            ElementKind::Link => SCAN_LINKS_JS,
        }
    }
}

/// Raw attributes scraped from one element by a scan script. An empty string
/// means the attribute is absent.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ElementFacts {
    pub placeholder: String,
    pub name: String,
    #[serde(rename = "ariaLabel")]
    pub aria_label: String,
    pub text: String,
    pub href: String,
}

/// Insertion-ordered map of synthetic element name to XPath selector.
/// Rebuilt from scratch on every inspection pass and discarded with it.
#[derive(Debug, Clone, Default)]
pub struct PageElementMap {
    entries: Vec<(String, String)>,
}

impl PageElementMap {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&mut self, name: String, selector: String) {
        self.entries.push((name, selector));
    }

    pub fn selector(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(entry, _)| entry == name)
            .map(|(_, selector)| selector.as_str())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Scan the current page and build a fresh element map. Any scan failure
/// degrades the whole pass to an empty map so the loop keeps going.
pub async fn resolve_elements(page: &dyn Page) -> PageElementMap {
    match scan_all(page).await {
        Ok(map) => map,
        Err(e) => {
            warn!(error = %e, "element scan failed, treating the page as empty");
            PageElementMap::new()
        }
    }
}

async fn scan_all(page: &dyn Page) -> Result<PageElementMap, PageError> {
    let inputs = page.scan(ElementKind::Input).await?;
    let buttons = page.scan(ElementKind::Button).await?;
    let links = page.scan(ElementKind::Link).await?;
    Ok(build_element_map(&inputs, &buttons, &links))
}

/// Naming policy: prefer the most descriptive attribute the element carries,
/// falling back to its position among elements of the same kind. The index
/// is the element's DOM-order position within its kind, shared across naming
/// styles, so names stay stable for a given page snapshot.
pub fn build_element_map(
    inputs: &[ElementFacts],
    buttons: &[ElementFacts],
    links: &[ElementFacts],
) -> PageElementMap {
    let mut map = PageElementMap::new();
    for (i, facts) in inputs.iter().enumerate() {
        let (name, selector) = name_input(facts, i);
        map.insert(name, selector);
    }
    for (i, facts) in buttons.iter().enumerate() {
        let (name, selector) = name_button(facts, i);
        map.insert(name, selector);
    }
    for (i, facts) in links.iter().enumerate() {
        let (name, selector) = name_link(facts, i);
        map.insert(name, selector);
    }
    map
}

fn name_input(facts: &ElementFacts, i: usize) -> (String, String) {
    if !facts.placeholder.is_empty() {
        (
            format!("input_placeholder_{i}"),
            format!("//input[@placeholder={}]", xpath_literal(&facts.placeholder)),
        )
    } else if !facts.name.is_empty() {
        (
            format!("input_name_{i}"),
            format!("//input[@name={}]", xpath_literal(&facts.name)),
        )
    } else {
        (format!("input_{i}"), format!("(//input)[{}]", i + 1))
    }
}

fn name_button(facts: &ElementFacts, i: usize) -> (String, String) {
    let text = squish(&facts.text);
    if !facts.aria_label.is_empty() {
        (
            format!("button_aria_label_{i}"),
            format!("//button[@aria-label={}]", xpath_literal(&facts.aria_label)),
        )
    } else if !text.is_empty() {
        (
            format!("button_text_{i}"),
            format!("//button[normalize-space(.)={}]", xpath_literal(&text)),
        )
    } else {
        (format!("button_{i}"), format!("(//button)[{}]", i + 1))
    }
}

fn name_link(facts: &ElementFacts, i: usize) -> (String, String) {
    let text = squish(&facts.text);
    if !text.is_empty() {
        (
            format!("link_text_{i}"),
            format!("//a[normalize-space(.)={}]", xpath_literal(&text)),
        )
    } else if !facts.href.is_empty() {
        (
            format!("link_href_{i}"),
            format!("//a[@href={}]", xpath_literal(&facts.href)),
        )
    } else {
        (format!("link_{i}"), format!("(//a)[{}]", i + 1))
    }
}

/// Collapse runs of space, tab, CR, and LF to single spaces and trim. This
/// is exactly the set XPath `normalize-space` folds; other Unicode spacing
/// (U+00A0 and friends) must stay put or the selector stops matching the
/// element it was named from.
fn squish(text: &str) -> String {
    text.split([' ', '\t', '\r', '\n'])
        .filter(|chunk| !chunk.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Quote a string as an XPath 1.0 literal. There is no escape syntax, so a
/// value containing both quote kinds has to be assembled with concat().
fn xpath_literal(value: &str) -> String {
    if !value.contains('"') {
        format!("\"{value}\"")
    } else if !value.contains('\'') {
        format!("'{value}'")
    } else {
        let mut parts = Vec::new();
        for (i, chunk) in value.split('"').enumerate() {
            if i > 0 {
                parts.push("'\"'".to_string());
            }
            if !chunk.is_empty() {
                parts.push(format!("\"{chunk}\""));
            }
        }
        format!("concat({})", parts.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    fn with_placeholder(placeholder: &str) -> ElementFacts {
        ElementFacts {
            placeholder: placeholder.to_string(),
            ..ElementFacts::default()
        }
    }

    fn with_text(text: &str) -> ElementFacts {
        ElementFacts {
            text: text.to_string(),
            ..ElementFacts::default()
        }
    }

    #[test]
    fn input_naming_prefers_placeholder_then_name_then_position() {
        let inputs = [
            with_placeholder("Search"),
            ElementFacts {
                name: "q".to_string(),
                ..ElementFacts::default()
            },
            ElementFacts::default(),
        ];
        let map = build_element_map(&inputs, &[], &[]);

        let names: Vec<&str> = map.names().collect();
        assert_eq!(names, ["input_placeholder_0", "input_name_1", "input_2"]);
        assert_eq!(
            map.selector("input_placeholder_0"),
            Some(r#"//input[@placeholder="Search"]"#)
        );
        assert_eq!(map.selector("input_name_1"), Some(r#"//input[@name="q"]"#));
        assert_eq!(map.selector("input_2"), Some("(//input)[3]"));
    }

    #[test]
    fn button_naming_prefers_aria_label_then_text() {
        let buttons = [
            ElementFacts {
                aria_label: "close dialog".to_string(),
                text: "X".to_string(),
                ..ElementFacts::default()
            },
            with_text("  Sign\n   in  "),
            ElementFacts::default(),
        ];
        let map = build_element_map(&[], &buttons, &[]);

        let names: Vec<&str> = map.names().collect();
        assert_eq!(names, ["button_aria_label_0", "button_text_1", "button_2"]);
        assert_eq!(
            map.selector("button_text_1"),
            Some(r#"//button[normalize-space(.)="Sign in"]"#)
        );
        assert_eq!(map.selector("button_2"), Some("(//button)[3]"));
    }

    #[test]
    fn link_naming_prefers_text_then_href() {
        let links = [
            with_text("Docs"),
            ElementFacts {
                href: "/pricing".to_string(),
                ..ElementFacts::default()
            },
            ElementFacts::default(),
        ];
        let map = build_element_map(&[], &[], &links);

        let names: Vec<&str> = map.names().collect();
        assert_eq!(names, ["link_text_0", "link_href_1", "link_2"]);
        assert_eq!(
            map.selector("link_text_0"),
            Some(r#"//a[normalize-space(.)="Docs"]"#)
        );
        assert_eq!(map.selector("link_href_1"), Some(r#"//a[@href="/pricing"]"#));
        assert_eq!(map.selector("link_2"), Some("(//a)[3]"));
    }

    #[test]
    fn whitespace_only_text_falls_back_to_position() {
        let map = build_element_map(&[], &[with_text(" \n\t ")], &[]);
        assert_eq!(map.names().collect::<Vec<_>>(), ["button_0"]);
        assert_eq!(map.selector("button_0"), Some("(//button)[1]"));
    }

    #[test]
    fn kinds_index_independently() {
        let map = build_element_map(
            &[with_placeholder("Email")],
            &[with_text("Go")],
            &[with_text("Home")],
        );
        let names: Vec<&str> = map.names().collect();
        assert_eq!(names, ["input_placeholder_0", "button_text_0", "link_text_0"]);
    }

    #[test]
    fn naming_is_deterministic_across_passes() {
        let inputs = [with_placeholder("Search"), ElementFacts::default()];
        let first = build_element_map(&inputs, &[], &[]);
        let second = build_element_map(&inputs, &[], &[]);
        assert_eq!(
            first.names().collect::<Vec<_>>(),
            second.names().collect::<Vec<_>>()
        );
        for name in first.names() {
            assert_eq!(first.selector(name), second.selector(name));
        }
    }

    #[test]
    fn unknown_names_resolve_to_nothing() {
        let map = build_element_map(&[], &[], &[]);
        assert!(map.is_empty());
        assert_eq!(map.selector("input_placeholder_0"), None);
    }

    /// Scans inputs fine, then fails on buttons.
    struct FlakyScanPage;

    #[async_trait]
    impl Page for FlakyScanPage {
        async fn goto(&self, _url: &str) -> Result<(), PageError> {
            Ok(())
        }

        async fn click(&self, _selector: &str) -> Result<(), PageError> {
            Ok(())
        }

        async fn fill(&self, _selector: &str, _text: &str) -> Result<(), PageError> {
            Ok(())
        }

        async fn press_enter(&self, _selector: &str) -> Result<(), PageError> {
            Ok(())
        }

        async fn scan(&self, kind: ElementKind) -> Result<Vec<ElementFacts>, PageError> {
            match kind {
                ElementKind::Input => Ok(vec![with_placeholder("Search")]),
                _ => Err(PageError::Browser("tab detached".to_string())),
            }
        }
    }

    #[tokio::test]
    async fn a_failed_scan_degrades_the_whole_pass_to_an_empty_map() {
        let map = resolve_elements(&FlakyScanPage).await;
        assert!(map.is_empty());
    }

    #[test]
    fn xpath_literals_handle_both_quote_kinds() {
        assert_eq!(xpath_literal("plain"), r#""plain""#);
        assert_eq!(xpath_literal(r#"say "hi""#), r#"'say "hi"'"#);
        assert_eq!(xpath_literal("it's"), r#""it's""#);
        assert_eq!(
            xpath_literal(r#"it's "fine""#),
            r#"concat("it's ", '"', "fine", '"')"#
        );
    }

    #[test]
    fn squish_collapses_inner_whitespace() {
        assert_eq!(squish("  Sign \n\t in  "), "Sign in");
        assert_eq!(squish("\n \t"), "");
    }

    #[test]
    fn squish_folds_only_xml_whitespace() {
        assert_eq!(squish(" Sign\u{a0}up  now "), "Sign\u{a0}up now");
    }

    #[test]
    fn non_breaking_spaces_survive_into_the_selector() {
        let map = build_element_map(&[], &[with_text("Sign\u{a0}up")], &[]);
        assert_eq!(
            map.selector("button_text_0"),
            Some("//button[normalize-space(.)=\"Sign\u{a0}up\"]")
        );
    }
}
