use chrono::{DateTime, Datelike, TimeZone, Utc};
use serde::Serialize;

use crate::model::GaleWarning;

pub const DATA_PLACEHOLDER: &str = "$DATA";
pub const REF_PLACEHOLDER: &str = "$REF";

const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const SECONDS_PER_DAY: f64 = 86_400.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlotPoint {
    pub x: f64,
    pub y: f64,
    pub date: String,
    pub yearday: u32,
}

/// The two series drawn on the chart: warning numbers, and the day of year
/// used as a "day equals day" reference line.
#[derive(Debug, Clone, PartialEq)]
pub struct GaleSeries {
    pub warnings: Vec<PlotPoint>,
    pub reference: Vec<PlotPoint>,
}

/// Origin of the x axis.
pub fn plot_epoch() -> DateTime<Utc> {
    Utc.timestamp_opt(1_451_606_400, 0)
        .single()
        .unwrap_or(DateTime::UNIX_EPOCH)
}

pub fn build_series(warnings: &[GaleWarning]) -> GaleSeries {
    let epoch = plot_epoch();
    let mut series = GaleSeries {
        warnings: Vec::with_capacity(warnings.len()),
        reference: Vec::with_capacity(warnings.len()),
    };
    for warning in warnings {
        let elapsed = warning.timestamp.signed_duration_since(epoch);
        let point = PlotPoint {
            x: elapsed.num_milliseconds() as f64 / 1000.0 / SECONDS_PER_DAY,
            y: f64::from(warning.number),
            date: warning.timestamp.format(DATE_FORMAT).to_string(),
            yearday: warning.timestamp.ordinal(),
        };
        series.reference.push(PlotPoint {
            y: f64::from(point.yearday),
            ..point.clone()
        });
        series.warnings.push(point);
    }
    series
}

/// Substitute both series into the page template.
pub fn render_page(template: &str, series: &GaleSeries) -> serde_json::Result<String> {
    let data = serde_json::to_string(&series.warnings)?;
    let reference = serde_json::to_string(&series.reference)?;
    Ok(template
        .replace(DATA_PLACEHOLDER, &data)
        .replace(REF_PLACEHOLDER, &reference))
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::{build_series, plot_epoch, render_page};
    use crate::gale::{build_timeline, with_boundaries};
    use crate::model::GaleWarning;

    #[test]
    fn epoch_is_first_of_january_2016() {
        assert_eq!(plot_epoch().to_rfc3339(), "2016-01-01T00:00:00+00:00");
    }

    #[test]
    fn points_carry_offset_number_date_and_yearday() {
        let timestamp = Utc.with_ymd_and_hms(2016, 2, 1, 12, 0, 0).single().expect("date");
        let series = build_series(&[GaleWarning {
            number: 36,
            timestamp,
        }]);
        let point = &series.warnings[0];
        assert_eq!(point.x, 31.5);
        assert_eq!(point.y, 36.0);
        assert_eq!(point.date, "2016-02-01 12:00:00");
        assert_eq!(point.yearday, 32);

        let reference = &series.reference[0];
        assert_eq!(reference.y, 32.0);
        assert_eq!(reference.x, point.x);
        assert_eq!(reference.date, point.date);
    }

    #[test]
    fn padded_series_starts_on_yearday_one_and_ends_now() {
        let now = Utc.with_ymd_and_hms(2017, 4, 2, 8, 15, 0).single().expect("now");
        let timeline = build_timeline(vec![
            GaleWarning {
                number: 0,
                timestamp: Utc.with_ymd_and_hms(2017, 2, 3, 6, 0, 0).single().expect("date"),
            },
            GaleWarning {
                number: 7,
                timestamp: Utc.with_ymd_and_hms(2017, 3, 3, 6, 0, 0).single().expect("date"),
            },
        ]);
        let series = build_series(&with_boundaries(timeline, now));
        let first = series.warnings.first().expect("first");
        assert_eq!(first.yearday, 1);
        assert_eq!(first.y, 0.0);
        assert_eq!(series.warnings[1].y, 1.0);
        let last = series.warnings.last().expect("last");
        assert_eq!(last.date, "2017-04-02 08:15:00");
        assert_eq!(last.y, 7.0);
    }

    #[test]
    fn page_substitutes_both_placeholders() {
        let timestamp = Utc.with_ymd_and_hms(2016, 1, 2, 0, 0, 0).single().expect("date");
        let series = build_series(&[GaleWarning {
            number: 3,
            timestamp,
        }]);
        let page = render_page("var data = $DATA;\nvar ref = $REF;\n", &series).expect("render");
        assert_eq!(
            page,
            concat!(
                "var data = [{\"x\":1.0,\"y\":3.0,\"date\":\"2016-01-02 00:00:00\",\"yearday\":2}];\n",
                "var ref = [{\"x\":1.0,\"y\":2.0,\"date\":\"2016-01-02 00:00:00\",\"yearday\":2}];\n",
            )
        );
    }

    #[test]
    fn empty_series_renders_empty_arrays() {
        let page = render_page("$DATA|$REF", &build_series(&[])).expect("render");
        assert_eq!(page, "[]|[]");
    }
}
