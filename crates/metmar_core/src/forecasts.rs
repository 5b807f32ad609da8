use crate::bulletin::BulletinSchema;
use crate::config::ForecastSource;
use crate::error::ServiceError;
use crate::fetch::Fetch;
use crate::html;
use crate::model::Forecast;
use crate::text::escape_html;

/// Fetch and decode the whole batch. The first failure aborts it.
pub fn fetch_forecasts(
    fetcher: &dyn Fetch,
    source: &ForecastSource,
) -> Result<Vec<Forecast>, ServiceError> {
    match source {
        ForecastSource::Json { schema, endpoints } => endpoints
            .iter()
            .map(|endpoint| fetch_bulletin(fetcher, *schema, &endpoint.id, &endpoint.url))
            .collect(),
        ForecastSource::Html { url, markup } => {
            let raw = fetcher.get(url)?;
            html::extract(&raw, markup)
        }
    }
}

pub fn fetch_bulletin(
    fetcher: &dyn Fetch,
    schema: BulletinSchema,
    id: &str,
    url: &str,
) -> Result<Forecast, ServiceError> {
    let raw = fetcher.get(url)?;
    schema.decode(id, &raw)
}

pub fn find_forecast(forecasts: Vec<Forecast>, id: &str) -> Result<Forecast, ServiceError> {
    forecasts
        .into_iter()
        .find(|forecast| forecast.id == id)
        .ok_or_else(|| ServiceError::NotFound(id.to_string()))
}

pub fn render_area_index(title: &str, forecasts: &[Forecast]) -> String {
    let mut page = String::new();
    page.push_str("<html>\n<head>\n");
    page.push_str(&format!("\t<title>{}</title>\n", escape_html(title)));
    page.push_str("</head>\n<body>\n");
    for forecast in forecasts {
        page.push_str(&format!(
            "\t<a href=\"areas/{}\">{}</a><br/>\n",
            escape_html(&forecast.id),
            escape_html(&forecast.title)
        ));
    }
    page.push_str("</body>\n</html>\n");
    page
}
