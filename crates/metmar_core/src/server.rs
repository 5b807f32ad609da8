use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::thread;

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use tiny_http::{Header, Request, Response, Server, StatusCode};
use tracing::{error, info, warn};

use crate::bulletin::BulletinSchema;
use crate::config::ForecastSource;
use crate::error::ServiceError;
use crate::fetch::Fetch;
use crate::fingerprint::{fingerprint, matches_validator};
use crate::forecasts::{fetch_bulletin, fetch_forecasts, find_forecast, render_area_index};
use crate::gale::{extract_warnings, with_boundaries};
use crate::plot::{build_series, render_page};

const TEXT_PLAIN: &str = "text/plain;charset=utf-8";
const TEXT_HTML: &str = "text/html;charset=utf-8";

pub type SharedFetch = Box<dyn Fetch + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: String,
    pub path: String,
    pub if_none_match: Option<String>,
}

impl HttpRequest {
    pub fn get(path: &str) -> Self {
        Self {
            method: "GET".to_string(),
            path: path.to_string(),
            if_none_match: None,
        }
    }

    pub fn with_validator(mut self, value: &str) -> Self {
        self.if_none_match = Some(value.to_string());
        self
    }

    fn from_tiny(request: &Request) -> Self {
        let url = request.url();
        let path = url.split_once('?').map(|(path, _)| path).unwrap_or(url);
        let if_none_match = request
            .headers()
            .iter()
            .find(|header| header.field.equiv("If-None-Match"))
            .map(|header| header.value.as_str().to_string());
        Self {
            method: request.method().to_string(),
            path: path.to_string(),
            if_none_match,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub status: u16,
    pub content_type: String,
    pub etag: Option<String>,
    pub body: Vec<u8>,
}

impl Reply {
    fn new(status: u16, content_type: &str, body: Vec<u8>) -> Self {
        Self {
            status,
            content_type: content_type.to_string(),
            etag: None,
            body,
        }
    }

    /// Full body with its fingerprint, or an empty 304 when the client
    /// already holds it.
    pub fn conditional(content_type: &str, body: String, if_none_match: Option<&str>) -> Self {
        let etag = fingerprint(&body);
        let mut reply = if matches_validator(if_none_match, &etag) {
            Self::new(304, content_type, Vec::new())
        } else {
            Self::new(200, content_type, body.into_bytes())
        };
        reply.etag = Some(etag);
        reply
    }

    pub fn failure(err: &ServiceError) -> Self {
        error!(error = %err, "request failed");
        Self::new(500, TEXT_PLAIN, format!("error: {err}\n").into_bytes())
    }

    pub fn not_found() -> Self {
        Self::new(404, TEXT_PLAIN, b"not found\n".to_vec())
    }

    fn method_not_allowed() -> Self {
        Self::new(405, TEXT_PLAIN, b"method not allowed\n".to_vec())
    }
}

pub trait Handler: Send + Sync {
    fn handle(&self, request: &HttpRequest) -> Reply;
}

/// Path relative to `prefix`, `None` when the request is outside of it.
fn route<'a>(prefix: &str, path: &'a str) -> Option<&'a str> {
    let rest = path.strip_prefix(prefix)?;
    if rest.is_empty() {
        return Some("/");
    }
    rest.starts_with('/').then_some(rest)
}

/// Area index at `/` and one text report per area at `/areas/<id>`.
pub struct ForecastSite {
    fetcher: SharedFetch,
    source: ForecastSource,
    prefix: String,
    index_title: String,
}

impl ForecastSite {
    pub fn new(fetcher: SharedFetch, source: ForecastSource, prefix: &str, index_title: &str) -> Self {
        Self {
            fetcher,
            source,
            prefix: prefix.to_string(),
            index_title: index_title.to_string(),
        }
    }

    pub fn render_report(&self, id: &str) -> Result<String, ServiceError> {
        let forecasts = fetch_forecasts(self.fetcher.as_ref(), &self.source)?;
        Ok(find_forecast(forecasts, id)?.content)
    }

    fn render_index(&self) -> Result<String, ServiceError> {
        let forecasts = fetch_forecasts(self.fetcher.as_ref(), &self.source)?;
        Ok(render_area_index(&self.index_title, &forecasts))
    }
}

impl Handler for ForecastSite {
    fn handle(&self, request: &HttpRequest) -> Reply {
        let Some(path) = route(&self.prefix, &request.path) else {
            return Reply::not_found();
        };
        let validator = request.if_none_match.as_deref();
        if path == "/" {
            return match self.render_index() {
                Ok(page) => Reply::conditional(TEXT_HTML, page, validator),
                Err(err) => Reply::failure(&err),
            };
        }
        let Some(id) = path
            .strip_prefix("/areas/")
            .filter(|id| !id.is_empty() && !id.contains('/'))
        else {
            return Reply::not_found();
        };
        match self.render_report(id) {
            Ok(report) => Reply::conditional(TEXT_PLAIN, report, validator),
            Err(err) => Reply::failure(&err),
        }
    }
}

/// One report served at the root.
pub struct BulletinSite {
    fetcher: SharedFetch,
    schema: BulletinSchema,
    url: String,
}

impl BulletinSite {
    pub fn new(fetcher: SharedFetch, schema: BulletinSchema, url: &str) -> Self {
        Self {
            fetcher,
            schema,
            url: url.to_string(),
        }
    }
}

impl Handler for BulletinSite {
    fn handle(&self, request: &HttpRequest) -> Reply {
        let validator = request.if_none_match.as_deref();
        match fetch_bulletin(self.fetcher.as_ref(), self.schema, "bulletin", &self.url) {
            Ok(forecast) => Reply::conditional(TEXT_PLAIN, forecast.content, validator),
            Err(err) => Reply::failure(&err),
        }
    }
}

/// Gale warning chart at `/` plus its assets under `/scripts/`.
pub struct GaleSite {
    forecast_dir: PathBuf,
    template: String,
    scripts_dir: PathBuf,
    prefix: String,
    clock: fn() -> DateTime<Utc>,
}

impl GaleSite {
    pub fn new(forecast_dir: &Path, template_path: &Path, scripts_dir: &Path, prefix: &str) -> Result<Self> {
        let template = fs::read_to_string(template_path)
            .with_context(|| format!("failed to read {}", template_path.display()))?;
        Ok(Self {
            forecast_dir: forecast_dir.to_path_buf(),
            template,
            scripts_dir: scripts_dir.to_path_buf(),
            prefix: prefix.to_string(),
            clock: Utc::now,
        })
    }

    pub fn with_clock(mut self, clock: fn() -> DateTime<Utc>) -> Self {
        self.clock = clock;
        self
    }

    pub fn render(&self) -> Result<String, ServiceError> {
        let warnings = extract_warnings(&self.forecast_dir)?;
        let series = build_series(&with_boundaries(warnings, (self.clock)()));
        render_page(&self.template, &series).map_err(|error| {
            ServiceError::extraction(self.forecast_dir.display().to_string(), error)
        })
    }

    fn serve_script(&self, relative: &str) -> Reply {
        let relative = Path::new(relative);
        let scoped = relative
            .components()
            .all(|component| matches!(component, Component::Normal(_)));
        if !scoped {
            return Reply::not_found();
        }
        let path = self.scripts_dir.join(relative);
        match fs::read(&path) {
            Ok(body) => Reply::new(200, content_type_for(&path), body),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "script not served");
                Reply::not_found()
            }
        }
    }
}

impl Handler for GaleSite {
    fn handle(&self, request: &HttpRequest) -> Reply {
        let Some(path) = route(&self.prefix, &request.path) else {
            return Reply::not_found();
        };
        if let Some(relative) = path.strip_prefix("/scripts/") {
            return self.serve_script(relative);
        }
        if path != "/" {
            return Reply::not_found();
        }
        match self.render() {
            Ok(page) => Reply::new(200, TEXT_HTML, page.into_bytes()),
            Err(err) => Reply::failure(&err),
        }
    }
}

fn content_type_for(path: &Path) -> &'static str {
    match path.extension().and_then(|ext| ext.to_str()).unwrap_or("") {
        "html" | "htm" => TEXT_HTML,
        "js" => "application/javascript",
        "css" => "text/css",
        "json" => "application/json",
        "png" => "image/png",
        "svg" => "image/svg+xml",
        _ => "application/octet-stream",
    }
}

pub fn bind(addr: &str) -> Result<Server> {
    Server::http(addr).map_err(|error| anyhow!("failed to listen on {addr}: {error}"))
}

/// Accept requests forever, each one handled on its own thread.
pub fn run(server: Server, handler: Arc<dyn Handler>) {
    for request in server.incoming_requests() {
        let handler = Arc::clone(&handler);
        thread::spawn(move || respond(handler.as_ref(), request));
    }
}

pub fn serve(addr: &str, handler: Arc<dyn Handler>) -> Result<()> {
    let server = bind(addr)?;
    info!(addr, "serving");
    run(server, handler);
    Ok(())
}

fn respond(handler: &dyn Handler, request: Request) {
    let incoming = HttpRequest::from_tiny(&request);
    let reply = match incoming.method.as_str() {
        "GET" | "HEAD" => handler.handle(&incoming),
        _ => Reply::method_not_allowed(),
    };
    info!(
        method = %incoming.method,
        path = %incoming.path,
        status = reply.status,
        "request"
    );

    let mut response = Response::from_data(reply.body).with_status_code(StatusCode(reply.status));
    let mut headers = vec![("Content-Type", reply.content_type)];
    if let Some(etag) = reply.etag {
        headers.push(("ETag", etag));
    }
    for (field, value) in headers {
        match Header::from_bytes(field.as_bytes(), value.as_bytes()) {
            Ok(header) => response.add_header(header),
            Err(()) => warn!(field, value = %value, "invalid response header dropped"),
        }
    }
    if let Err(err) = request.respond(response) {
        warn!(error = %err, "failed to send response");
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use chrono::{DateTime, TimeZone, Utc};
    use tempfile::tempdir;

    use super::{GaleSite, Handler, HttpRequest, Reply, content_type_for, route};
    use crate::error::ServiceError;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2016, 3, 1, 0, 0, 0).single().expect("now")
    }

    #[test]
    fn routes_are_relative_to_prefix() {
        assert_eq!(route("", "/"), Some("/"));
        assert_eq!(route("", "/areas/1"), Some("/areas/1"));
        assert_eq!(route("/meteo", "/meteo"), Some("/"));
        assert_eq!(route("/meteo", "/meteo/areas/1"), Some("/areas/1"));
        assert_eq!(route("/meteo", "/meteorology"), None);
        assert_eq!(route("/meteo", "/other"), None);
    }

    #[test]
    fn conditional_reply_short_circuits_on_matching_validator() {
        let fresh = Reply::conditional("text/plain", "report\n".to_string(), None);
        assert_eq!(fresh.status, 200);
        assert_eq!(fresh.body, b"report\n");
        let etag = fresh.etag.clone().expect("etag");

        let cached = Reply::conditional("text/plain", "report\n".to_string(), Some(&etag));
        assert_eq!(cached.status, 304);
        assert!(cached.body.is_empty());
        assert_eq!(cached.etag, Some(etag));
    }

    #[test]
    fn failures_are_one_line_plain_text() {
        let reply = Reply::failure(&ServiceError::NotFound("7".to_string()));
        assert_eq!(reply.status, 500);
        assert_eq!(reply.body, b"error: cannot find forecast: 7\n");
        assert!(reply.content_type.starts_with("text/plain"));
    }

    #[test]
    fn gale_site_renders_template_and_scripts() {
        let temp = tempdir().expect("tempdir");
        let forecasts = temp.path().join("forecasts");
        let scripts = temp.path().join("scripts");
        fs::create_dir_all(&forecasts).expect("mkdir");
        fs::create_dir_all(&scripts).expect("mkdir");
        fs::write(
            forecasts.join("2016_02_01T06_00_00.txt"),
            "Bulletin spécial: Avis de Grand frais à Coup de vent numéro 36\n",
        )
        .expect("write");
        fs::write(scripts.join("chart.js"), "draw();").expect("write");
        let template = scripts.join("main.html");
        fs::write(&template, "<script>var d = $DATA; var r = $REF;</script>").expect("write");

        let site = GaleSite::new(&forecasts, &template, &scripts, "/gale")
            .expect("site")
            .with_clock(fixed_now);

        let page = site.handle(&HttpRequest::get("/gale/"));
        assert_eq!(page.status, 200);
        let body = String::from_utf8(page.body).expect("utf8");
        assert!(body.contains(r#"{"x":0.0,"y":0.0,"date":"2016-01-01 00:00:00","yearday":1}"#));
        assert!(body.contains(r#""y":36.0,"date":"2016-03-01 00:00:00""#));
        assert!(!body.contains("$DATA") && !body.contains("$REF"));

        let script = site.handle(&HttpRequest::get("/gale/scripts/chart.js"));
        assert_eq!(script.status, 200);
        assert_eq!(script.body, b"draw();");
        assert_eq!(script.content_type, "application/javascript");

        assert_eq!(site.handle(&HttpRequest::get("/gale/scripts/../forecasts")).status, 404);
        assert_eq!(site.handle(&HttpRequest::get("/gale/scripts/missing.js")).status, 404);
        assert_eq!(site.handle(&HttpRequest::get("/gale/other")).status, 404);
    }

    #[test]
    fn gale_site_reports_extraction_failures() {
        let temp = tempdir().expect("tempdir");
        let template = temp.path().join("main.html");
        fs::write(&template, "$DATA").expect("write");
        let site = GaleSite::new(&temp.path().join("absent"), &template, temp.path(), "")
            .expect("site")
            .with_clock(fixed_now);
        let reply = site.handle(&HttpRequest::get("/"));
        assert_eq!(reply.status, 500);
        assert!(String::from_utf8_lossy(&reply.body).starts_with("error: cannot extract gale warnings"));
    }

    #[test]
    fn gale_site_requires_template() {
        let temp = tempdir().expect("tempdir");
        let error = GaleSite::new(temp.path(), &temp.path().join("missing.html"), temp.path(), "")
            .err()
            .expect("must fail");
        assert!(error.to_string().contains("failed to read"));
    }

    #[test]
    fn script_content_types() {
        assert_eq!(content_type_for(std::path::Path::new("a.css")), "text/css");
        assert_eq!(content_type_for(std::path::Path::new("a.bin")), "application/octet-stream");
    }
}
