use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

use crate::error::ServiceError;
use crate::model::Forecast;
use crate::text::{html_to_text, split_wind_and_sea};

const SPECIAL_BULLETIN_PREFIX: &str = "Bulletin spécial: ";

/// Layout of an upstream JSON bulletin. Both share the horizon/region nesting
/// and render through the same writer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum BulletinSchema {
    /// At least one report, the first one is rendered.
    SingleArea,
    /// Exactly two reports (offshore, coastal), the coastal one is rendered.
    CoastalPair,
}

impl BulletinSchema {
    pub fn parse(value: &str) -> Result<Self> {
        if value.eq_ignore_ascii_case("single-area") {
            return Ok(Self::SingleArea);
        }
        if value.eq_ignore_ascii_case("coastal-pair") {
            return Ok(Self::CoastalPair);
        }
        bail!("unsupported bulletin schema: {value} (expected single-area|coastal-pair)")
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::SingleArea => "single-area",
            Self::CoastalPair => "coastal-pair",
        }
    }

    /// Decode one upstream document into the forecast served under `id`.
    pub fn decode(self, id: &str, raw: &[u8]) -> Result<Forecast, ServiceError> {
        let reports: Vec<RawReport> = serde_json::from_slice(raw).map_err(|error| {
            ServiceError::Decode(format!("could not decode json response: {error}"))
        })?;
        let report = self.select(reports)?;
        let content = match self {
            Self::SingleArea => render_single_area(&report),
            Self::CoastalPair => render_coastal(&report),
        };
        Ok(Forecast {
            id: id.to_string(),
            title: html_to_text(text(&report.title)),
            content,
        })
    }

    fn select(self, reports: Vec<RawReport>) -> Result<RawReport, ServiceError> {
        match self {
            Self::SingleArea => reports
                .into_iter()
                .next()
                .ok_or_else(|| ServiceError::Decode("no report retrieved".to_string())),
            Self::CoastalPair => {
                if reports.len() != 2 {
                    return Err(ServiceError::Decode(format!(
                        "2 reports expected, got {}",
                        reports.len()
                    )));
                }
                reports
                    .into_iter()
                    .nth(1)
                    .ok_or_else(|| ServiceError::Decode("coastal report missing".to_string()))
            }
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawReport {
    #[serde(rename = "titreBulletin")]
    title: Option<String>,
    #[serde(rename = "bulletinSpecial")]
    special: Option<String>,
    #[serde(rename = "chapeauBulletin")]
    header: Option<String>,
    #[serde(rename = "piedBulletin")]
    footer: Option<String>,
    #[serde(rename = "echeance")]
    echeances: Option<Vec<Option<RawEcheance>>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawEcheance {
    #[serde(rename = "titreEcheance")]
    title: Option<String>,
    #[serde(rename = "region")]
    regions: Option<Vec<Option<RawRegion>>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawRegion {
    situation: Option<String>,
    observation: Option<String>,
    #[serde(rename = "ventEtMer")]
    wind_and_sea: Option<String>,
    #[serde(rename = "houle")]
    swell: Option<String>,
    #[serde(rename = "visi")]
    visibility: Option<String>,
    #[serde(rename = "indice")]
    confidence: Option<String>,
    #[serde(rename = "ts")]
    weather: Option<String>,
}

impl RawReport {
    fn echeances(&self) -> impl Iterator<Item = &RawEcheance> {
        self.echeances.iter().flatten().flatten()
    }
}

impl RawEcheance {
    fn regions(&self) -> impl Iterator<Item = &RawRegion> {
        self.regions.iter().flatten().flatten()
    }
}

impl RawRegion {
    /// Single-area reports carry a confidence index, coastal ones a weather line.
    fn confidence(&self) -> &str {
        let confidence = text(&self.confidence);
        if confidence.trim().is_empty() {
            text(&self.weather)
        } else {
            confidence
        }
    }
}

fn text(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or("")
}

#[derive(Default)]
struct ReportWriter {
    buf: String,
}

impl ReportWriter {
    fn line(&mut self, value: &str) {
        self.buf.push_str(value);
        self.buf.push('\n');
    }

    fn blank(&mut self) {
        self.buf.push('\n');
    }

    /// Returns whether anything was written.
    fn paragraph(&mut self, raw: &str) -> bool {
        let normalized = html_to_text(raw);
        if normalized.is_empty() {
            return false;
        }
        self.line(&normalized);
        true
    }

    fn region(&mut self, region: &RawRegion) {
        self.paragraph(text(&region.situation));
        self.paragraph(text(&region.observation));
        for part in split_wind_and_sea(text(&region.wind_and_sea)) {
            self.line(&part);
        }
        self.paragraph(text(&region.swell));
        self.paragraph(text(&region.visibility));
        self.paragraph(region.confidence());
    }

    fn echeance(&mut self, echeance: &RawEcheance, header_prefix: &str) {
        let title = html_to_text(text(&echeance.title));
        if !title.is_empty() {
            self.line(&format!("{header_prefix}{title}"));
        }
        for region in echeance.regions() {
            self.region(region);
        }
        self.blank();
    }

    fn finish(self) -> String {
        self.buf
    }
}

fn render_single_area(report: &RawReport) -> String {
    let mut writer = ReportWriter::default();
    writer.line(&html_to_text(text(&report.title)));
    // Saved copies of this line feed the gale timeline, keep it even when empty.
    writer.line(&format!(
        "{SPECIAL_BULLETIN_PREFIX}{}",
        html_to_text(text(&report.special))
    ));
    writer.blank();
    for echeance in report.echeances() {
        writer.echeance(echeance, "");
    }
    writer.finish()
}

fn render_coastal(report: &RawReport) -> String {
    let mut writer = ReportWriter::default();
    writer.line(&html_to_text(text(&report.title)));
    writer.blank();
    let header = writer.paragraph(text(&report.header));
    let footer = writer.paragraph(text(&report.footer));
    if header || footer {
        writer.blank();
    }
    let special = html_to_text(text(&report.special));
    if !special.is_empty() {
        writer.line(&format!("{SPECIAL_BULLETIN_PREFIX}{special}"));
        writer.blank();
    }
    for echeance in report.echeances() {
        writer.echeance(echeance, "# ");
    }
    writer.finish()
}

#[cfg(test)]
mod tests {
    use super::BulletinSchema;
    use crate::error::ServiceError;

    const COASTAL_PAIR: &str = include_str!("../tests/fixtures/coastal_pair.json");
    const SINGLE_AREA: &str = include_str!("../tests/fixtures/single_area.json");

    #[test]
    fn coastal_pair_renders_second_report_in_field_order() {
        let forecast = BulletinSchema::CoastalPair
            .decode("4", COASTAL_PAIR.as_bytes())
            .expect("decode");
        assert_eq!(forecast.id, "4");
        assert_eq!(
            forecast.title,
            "Bulletin côte de la pointe de Penmarc'h à l'anse de l'Aiguillon"
        );
        let expected = concat!(
            "Bulletin côte de la pointe de Penmarc'h à l'anse de l'Aiguillon\n",
            "\n",
            "Bulletin émis le lundi 15 février 2016 à 06h00\n",
            "Prochain bulletin à 18h00\n",
            "\n",
            "Bulletin spécial: Avis de Grand frais à Coup de vent numéro 36\n",
            "\n",
            "# Aujourd'hui lundi\n",
            "Dépression 985 hPa sur l'Irlande.\n",
            "Sud-Ouest 6 à 7, rafales 45 nœuds.\n",
            "MER : agitée à forte.\n",
            "Ouest 3 m.\n",
            "Bonne, médiocre sous grains.\n",
            "Averses.\n",
            "\n",
            "# Nuit de lundi à mardi\n",
            "Ouest 5 à 6, mer agitée.\n",
            "Bonne.\n",
            "Averses éparses.\n",
            "\n",
        );
        assert_eq!(forecast.content, expected);
    }

    #[test]
    fn single_area_renders_first_report() {
        let forecast = BulletinSchema::SingleArea
            .decode("metropole", SINGLE_AREA.as_bytes())
            .expect("decode");
        let expected = concat!(
            "Bulletin Large Manche Atlantique\n",
            "Bulletin spécial: Avis de Grand frais à Coup de vent numéro 37\n",
            "\n",
            "Situation générale et évolution\n",
            "Dépression 975 hPa près de l'Irlande, se décalant vers l'Écosse.\n",
            "Sud-Ouest 7 à 8.\n",
            "MER : forte.\n",
            "Ouest 4 m.\n",
            "Indice de confiance : 4\n",
            "\n",
        );
        assert_eq!(forecast.content, expected);
    }

    #[test]
    fn coastal_pair_rejects_wrong_report_count() {
        for raw in ["[{}]", "[{}, {}, {}]"] {
            let error = BulletinSchema::CoastalPair
                .decode("1", raw.as_bytes())
                .expect_err("must fail");
            let count = if raw == "[{}]" { 1 } else { 3 };
            assert_eq!(
                error,
                ServiceError::Decode(format!("2 reports expected, got {count}"))
            );
        }
    }

    #[test]
    fn coastal_pair_accepts_report_without_horizons() {
        let raw = r#"[{"titreBulletin": "Large"}, {"titreBulletin": "Côte", "echeance": []}]"#;
        let forecast = BulletinSchema::CoastalPair
            .decode("1", raw.as_bytes())
            .expect("decode");
        assert_eq!(forecast.content, "Côte\n\n");
    }

    #[test]
    fn single_area_requires_one_report() {
        let error = BulletinSchema::SingleArea
            .decode("1", b"[]")
            .expect_err("must fail");
        assert!(matches!(error, ServiceError::Decode(_)));
    }

    #[test]
    fn malformed_json_is_a_decode_failure() {
        let error = BulletinSchema::SingleArea
            .decode("1", b"<html>maintenance</html>")
            .expect_err("must fail");
        assert!(error.to_string().starts_with("unable to produce forecast"));
    }

    #[test]
    fn schema_names_round_trip_through_parse() {
        for schema in [BulletinSchema::SingleArea, BulletinSchema::CoastalPair] {
            assert_eq!(BulletinSchema::parse(schema.as_str()).expect("parse"), schema);
        }
        assert!(BulletinSchema::parse("xml").is_err());
    }
}
