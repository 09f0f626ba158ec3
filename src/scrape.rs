use std::time::Duration;

use once_cell::sync::Lazy;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, CONTENT_TYPE, ORIGIN, REFERER};
use scraper::{Html, Selector};
use serde_json::{Map, Value};
use url::Url;

use crate::models::SearchForm;

// ── Constants ────────────────────────────────────────────────────────────────

/// The portal serves the token page on GET and the search endpoint on POST,
/// both at the same path.
pub const DEFAULT_PORTAL_URL: &str =
    "https://buscador-admin-consorcio.buenosaires.gob.ar/administradores";

pub const DEFAULT_MATRICULA: &str = "3502";

/// Top-level key the portal nests the result array under.
const WRAPPER_KEY: &str = "Objeto";

/// The search endpoint rejects non-browser clients.
const USER_AGENT: &str = "Mozilla/5.0 (Linux; Android 6.0; Nexus 5 Build/MRA58N) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Mobile Safari/537.36";

// ── Lazy static selectors ────────────────────────────────────────────────────

static CSRF_META_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"meta[name="csrf-token"]"#).unwrap());

// ── Error type ───────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ScrapeError {
    #[error("portal page has no <meta name=\"csrf-token\"> content")]
    TokenNotFound,
    #[error("http request failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("portal returned HTTP {0}")]
    Upstream(reqwest::StatusCode),
    #[error("search response is not valid JSON: {0}")]
    MalformedResponse(#[from] serde_json::Error),
    #[error("search response has no `Objeto` array of records")]
    UnexpectedSchema,
}

// ── HTTP client ──────────────────────────────────────────────────────────────

/// Shared client for both portal calls. The cookie store matters: the session
/// cookie set on the token GET must be replayed on the search POST, or the
/// endpoint answers as if unauthenticated.
pub fn build_client() -> Result<reqwest::Client, ScrapeError> {
    let mut headers = HeaderMap::new();
    headers.insert(
        ACCEPT_LANGUAGE,
        HeaderValue::from_static("es-ES,es;q=0.9,en;q=0.8"),
    );

    let client = reqwest::ClientBuilder::new()
        .connect_timeout(Duration::from_secs(5))
        .timeout(Duration::from_secs(30))
        .redirect(reqwest::redirect::Policy::limited(10))
        .cookie_store(true)
        .user_agent(USER_AGENT)
        .default_headers(headers)
        .build()?;

    Ok(client)
}

// ── Token fetch ──────────────────────────────────────────────────────────────

pub async fn fetch_csrf_token(
    client: &reqwest::Client,
    url: &str,
) -> Result<String, ScrapeError> {
    let response = client.get(url).send().await?;

    if !response.status().is_success() {
        return Err(ScrapeError::Upstream(response.status()));
    }

    let body = response.text().await?;
    extract_csrf_token(&body)
}

/// Pull the anti-forgery token out of the page, exactly as served. The value
/// is opaque to us; an unparseable page or a tag without `content` is an
/// error, never an empty default, since the POST would then fail server-side
/// validation.
pub fn extract_csrf_token(html: &str) -> Result<String, ScrapeError> {
    let document = Html::parse_document(html);
    document
        .select(&CSRF_META_SELECTOR)
        .next()
        .and_then(|el| el.value().attr("content"))
        .map(str::to_string)
        .ok_or(ScrapeError::TokenNotFound)
}

// ── Search POST ──────────────────────────────────────────────────────────────

/// Header set the portal's own frontend sends with the XHR search request.
fn search_headers(url: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        ACCEPT,
        HeaderValue::from_static("application/json, text/javascript, */*; q=0.01"),
    );
    headers.insert(
        CONTENT_TYPE,
        HeaderValue::from_static("application/x-www-form-urlencoded; charset=UTF-8"),
    );
    headers.insert(
        "X-Requested-With",
        HeaderValue::from_static("XMLHttpRequest"),
    );
    if let Ok(value) = HeaderValue::from_str(url) {
        headers.insert(REFERER, value);
    }
    if let Ok(parsed) = Url::parse(url) {
        if let Ok(value) = HeaderValue::from_str(&parsed.origin().ascii_serialization()) {
            headers.insert(ORIGIN, value);
        }
    }
    headers
}

pub async fn fetch_search_results(
    client: &reqwest::Client,
    url: &str,
    form: &SearchForm,
) -> Result<Vec<Map<String, Value>>, ScrapeError> {
    let response = client
        .post(url)
        .headers(search_headers(url))
        .form(form)
        .send()
        .await?;

    if !response.status().is_success() {
        return Err(ScrapeError::Upstream(response.status()));
    }

    let body = response.text().await?;
    parse_search_response(&body)
}

/// Parse the search response body: valid JSON with an `Objeto` array whose
/// elements are objects. Anything else means the portal schema changed and we
/// refuse to guess.
pub fn parse_search_response(body: &str) -> Result<Vec<Map<String, Value>>, ScrapeError> {
    let mut document: Value = serde_json::from_str(body)?;

    let wrapper = document
        .get_mut(WRAPPER_KEY)
        .map(Value::take)
        .ok_or(ScrapeError::UnexpectedSchema)?;

    serde_json::from_value(wrapper).map_err(|_| ScrapeError::UnexpectedSchema)
}

// ── Pipeline ─────────────────────────────────────────────────────────────────

/// The full fetch: scrape the token, build the filtered search form, POST it
/// on the same session, return the raw records.
pub async fn fetch_administradores(
    client: &reqwest::Client,
    url: &str,
    matricula: &str,
) -> Result<Vec<Map<String, Value>>, ScrapeError> {
    let token = fetch_csrf_token(client, url).await?;
    tracing::debug!(%token, "extracted csrf token");

    let form = SearchForm::new(&token, matricula);
    let records = fetch_search_results(client, url, &form).await?;
    tracing::info!(records = records.len(), matricula, "fetched registry records");

    Ok(records)
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_token_content_verbatim() {
        let html = r#"<html><head>
            <meta charset="utf-8">
            <meta name="viewport" content="width=device-width">
            <meta name="csrf-token" content="AbC123==">
        </head><body></body></html>"#;
        assert_eq!(extract_csrf_token(html).unwrap(), "AbC123==");
    }

    #[test]
    fn token_missing_tag_is_an_error() {
        let html = "<html><head><meta name=\"author\" content=\"x\"></head></html>";
        assert!(matches!(
            extract_csrf_token(html),
            Err(ScrapeError::TokenNotFound)
        ));
    }

    #[test]
    fn token_tag_without_content_attribute_is_an_error() {
        let html = "<html><head><meta name=\"csrf-token\"></head></html>";
        assert!(matches!(
            extract_csrf_token(html),
            Err(ScrapeError::TokenNotFound)
        ));
    }

    #[test]
    fn empty_token_content_is_returned_as_found() {
        let html = "<html><head><meta name=\"csrf-token\" content=\"\"></head></html>";
        assert_eq!(extract_csrf_token(html).unwrap(), "");
    }

    #[test]
    fn non_json_body_is_malformed() {
        assert!(matches!(
            parse_search_response("not json"),
            Err(ScrapeError::MalformedResponse(_))
        ));
    }

    #[test]
    fn missing_wrapper_key_is_unexpected_schema() {
        assert!(matches!(
            parse_search_response(r#"{"Resultado": []}"#),
            Err(ScrapeError::UnexpectedSchema)
        ));
    }

    #[test]
    fn non_array_wrapper_is_unexpected_schema() {
        assert!(matches!(
            parse_search_response(r#"{"Objeto": "nothing"}"#),
            Err(ScrapeError::UnexpectedSchema)
        ));
    }

    #[test]
    fn non_object_elements_are_unexpected_schema() {
        assert!(matches!(
            parse_search_response(r#"{"Objeto": [1, 2]}"#),
            Err(ScrapeError::UnexpectedSchema)
        ));
    }

    #[test]
    fn empty_wrapper_array_parses_to_no_records() {
        assert!(parse_search_response(r#"{"Objeto": []}"#).unwrap().is_empty());
    }

    #[test]
    fn parses_wrapped_records() {
        let records =
            parse_search_response(r#"{"Objeto":[{"id":1,"nombre":"A"},{"id":2,"nombre":"B"}]}"#)
                .unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["nombre"], "A");
        assert_eq!(records[1]["id"], 2);
    }

    #[test]
    fn search_headers_derive_origin_and_referer() {
        let headers = search_headers("https://example.gob.ar/administradores");
        assert_eq!(
            headers.get(REFERER).unwrap(),
            "https://example.gob.ar/administradores"
        );
        assert_eq!(headers.get(ORIGIN).unwrap(), "https://example.gob.ar");
        assert_eq!(headers.get("X-Requested-With").unwrap(), "XMLHttpRequest");
    }
}
