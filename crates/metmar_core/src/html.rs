use std::collections::HashSet;

use scraper::node::Node;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};

use crate::error::ServiceError;
use crate::model::Forecast;
use crate::text::{compact_ws, html_to_text};

/// Where report zones and their parts live in the page.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct ZoneMarkup {
    pub zone_selector: String,
    pub id_attribute: String,
    pub heading_selector: String,
    pub text_selector: String,
    pub section_title_class: String,
}

impl Default for ZoneMarkup {
    fn default() -> Self {
        Self {
            zone_selector: "div.bulletin-zone".to_string(),
            id_attribute: "data-zone-id".to_string(),
            heading_selector: "h1, h2, h3, h4".to_string(),
            text_selector: "p".to_string(),
            section_title_class: "titre".to_string(),
        }
    }
}

struct CompiledMarkup<'a> {
    zone: Selector,
    heading: Selector,
    text: Selector,
    markup: &'a ZoneMarkup,
}

impl<'a> CompiledMarkup<'a> {
    fn compile(markup: &'a ZoneMarkup) -> Result<Self, ServiceError> {
        Ok(Self {
            zone: selector(&markup.zone_selector)?,
            heading: selector(&markup.heading_selector)?,
            text: selector(&markup.text_selector)?,
            markup,
        })
    }
}

fn selector(value: &str) -> Result<Selector, ServiceError> {
    Selector::parse(value)
        .map_err(|error| ServiceError::Decode(format!("invalid selector {value:?}: {error}")))
}

/// Extract one forecast per report zone of the page. A zone is flat: a
/// heading then text paragraphs, some of them flagged as section titles.
///
/// Finding no zone at all is a failure, so is a zone without id or an id
/// used twice.
pub fn extract(raw: &[u8], markup: &ZoneMarkup) -> Result<Vec<Forecast>, ServiceError> {
    let compiled = CompiledMarkup::compile(markup)?;
    let document = Html::parse_document(&String::from_utf8_lossy(raw));

    let mut forecasts = Vec::new();
    let mut seen = HashSet::new();
    for zone in document.select(&compiled.zone) {
        let forecast = extract_zone(zone, &compiled)?;
        if !seen.insert(forecast.id.clone()) {
            return Err(ServiceError::Decode(format!(
                "duplicate report zone id: {}",
                forecast.id
            )));
        }
        forecasts.push(forecast);
    }

    if forecasts.is_empty() {
        return Err(ServiceError::Decode(format!(
            "no report zone matching {:?}",
            markup.zone_selector
        )));
    }
    Ok(forecasts)
}

fn extract_zone(zone: ElementRef<'_>, compiled: &CompiledMarkup<'_>) -> Result<Forecast, ServiceError> {
    let id = zone
        .value()
        .attr(&compiled.markup.id_attribute)
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| {
            ServiceError::Decode(format!(
                "report zone without {} attribute",
                compiled.markup.id_attribute
            ))
        })?
        .to_string();

    let title = zone
        .select(&compiled.heading)
        .next()
        .map(|heading| compact_ws(&heading.text().collect::<String>()))
        .unwrap_or_default();

    let mut fragments = Vec::new();
    for element in zone.select(&compiled.text) {
        let is_section_title = element
            .value()
            .classes()
            .any(|class| class == compiled.markup.section_title_class);
        let normalized = html_to_text(&fragment_text(element));
        if normalized.is_empty() {
            continue;
        }
        if is_section_title && !fragments.is_empty() {
            fragments.push(String::new());
        }
        fragments.push(normalized);
    }

    let mut content = fragments.join("\n");
    if !content.is_empty() {
        content.push('\n');
    }
    Ok(Forecast { id, title, content })
}

/// Text of an element with `<br>` kept as newlines; other tags are flattened.
fn fragment_text(element: ElementRef<'_>) -> String {
    let mut output = String::new();
    for node in element.descendants() {
        match node.value() {
            Node::Text(text) => output.push_str(text),
            Node::Element(inner) if inner.name().eq_ignore_ascii_case("br") => {
                output.push('\n')
            }
            _ => {}
        }
    }
    output
}
