//! Balance form adapter.
//!
//! Drives the ASP.NET balance page: GET for postback tokens and the captcha,
//! multipart POST with card number + code, then scrape the result table.

use std::{sync::OnceLock, time::Duration};

use async_trait::async_trait;
use regex::Regex;
use reqwest::Url;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;

use tcb_core::{
    domain::{CaptchaCode, CardNumber},
    errors::{Error, FormError},
    formatting::{bold, escape_html},
    model::Challenge,
    ports::{FormClient, FormResult},
    Result,
};

/// Names and selectors of the balance page markup.
pub mod markup {
    pub const VIEW_STATE: &str = "__VIEWSTATE";
    pub const EVENT_VALIDATION: &str = "__EVENTVALIDATION";
    pub const CARD_NUMBER: &str = "cardnum";
    pub const CAPTCHA_CODE: &str = "checkcode";

    pub const CAPTCHA_IMAGE: &str = "img";
    pub const PAGE_HEADER: &str = ".PageHeader";
    pub const TABLE: &str = "table";
    pub const ROW: &str = "tr";
    pub const FIELD_HEADER: &str = ".FieldHeader";
    pub const FIELD_VALUE: &str = ".FieldValue";

    /// Shown by the page when the captcha code does not match.
    pub const INCORRECT_CODE_MARKER: &str = "Код проверки введен с ошибкой";
}

#[derive(Clone, Debug)]
pub struct FormSettings {
    pub base_url: String,
    pub page: String,
    pub fetch_timeout: Duration,
    pub submit_timeout: Duration,
}

#[derive(Clone, Debug)]
pub struct FormHttpClient {
    endpoint: Url,
    settings: FormSettings,
    http: reqwest::Client,
}

impl FormHttpClient {
    pub fn new(settings: FormSettings) -> Result<Self> {
        let base = Url::parse(&settings.base_url)
            .map_err(|e| Error::Config(format!("invalid form base url: {e}")))?;
        let endpoint = base
            .join(&settings.page)
            .map_err(|e| Error::Config(format!("invalid form page: {e}")))?;

        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| Error::Config(format!("cannot build http client: {e}")))?;

        Ok(Self {
            endpoint,
            settings,
            http,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    async fn get_bytes(&self, url: &str) -> FormResult<Vec<u8>> {
        let resp = self
            .http
            .get(url)
            .timeout(self.settings.fetch_timeout)
            .send()
            .await
            .map_err(|e| FormError::Scrape(format!("cannot do get request: {e}")))?;

        if !resp.status().is_success() {
            return Err(FormError::Scrape(format!(
                "get {url} failed: {}",
                resp.status()
            )));
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| FormError::Scrape(format!("cannot read body: {e}")))?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl FormClient for FormHttpClient {
    async fn fetch_challenge(&self) -> FormResult<Challenge> {
        let body = self.get_bytes(self.endpoint.as_str()).await?;
        let html = String::from_utf8_lossy(&body);
        let challenge = parse_challenge(&html, &self.endpoint)?;
        debug!(captcha = %challenge.captcha_url, "fetched challenge");
        Ok(challenge)
    }

    async fn fetch_captcha(&self, captcha_url: &str) -> FormResult<Vec<u8>> {
        let bytes = self.get_bytes(captcha_url).await?;
        if bytes.is_empty() {
            return Err(FormError::Scrape("captcha image is empty".to_string()));
        }
        Ok(bytes)
    }

    async fn submit_code(
        &self,
        view_state: &str,
        event_validation: &str,
        number: CardNumber,
        code: CaptchaCode,
    ) -> FormResult<String> {
        let form = reqwest::multipart::Form::new()
            .text(markup::VIEW_STATE, view_state.to_string())
            .text(markup::EVENT_VALIDATION, event_validation.to_string())
            .text(markup::CARD_NUMBER, number.padded())
            .text(markup::CAPTCHA_CODE, code.padded());

        let resp = self
            .http
            .post(self.endpoint.clone())
            .timeout(self.settings.submit_timeout)
            .multipart(form)
            .send()
            .await
            .map_err(|e| FormError::Scrape(format!("cannot do request: {e}")))?;

        let status = resp.status();
        let html = resp
            .text()
            .await
            .map_err(|e| FormError::Scrape(format!("cannot read body: {e}")))?;

        // The wrong-code page wins over the status; anything else needs a 2xx.
        let report = parse_report(&html);
        if !status.is_success() && report != Err(FormError::IncorrectCode) {
            return Err(FormError::Scrape(format!("form post failed: {status}")));
        }
        report
    }
}

/// Pull postback tokens and the absolute captcha URL out of the form page.
pub fn parse_challenge(html: &str, page_url: &Url) -> FormResult<Challenge> {
    let doc = Html::parse_document(html);

    let view_state = input_value(&doc, markup::VIEW_STATE)?;
    let event_validation = input_value(&doc, markup::EVENT_VALIDATION)?;

    let img = selector(markup::CAPTCHA_IMAGE)?;
    let src = doc
        .select(&img)
        .find_map(|e| e.value().attr("src"))
        .ok_or_else(|| FormError::Scrape("cannot find img src value".to_string()))?;
    let captcha_url = page_url
        .join(src)
        .map_err(|e| FormError::Scrape(format!("bad captcha src {src:?}: {e}")))?;

    Ok(Challenge {
        view_state,
        event_validation,
        captcha_url: captcha_url.to_string(),
    })
}

/// Turn the POST response into the HTML report sent to the user.
///
/// ```text
/// <b>{page header}</b>
///
/// <b>{field}</b>: {value}
/// ```
pub fn parse_report(html: &str) -> FormResult<String> {
    let doc = Html::parse_document(html);

    let all_text: String = doc.root_element().text().collect();
    if all_text.contains(markup::INCORRECT_CODE_MARKER) {
        return Err(FormError::IncorrectCode);
    }

    let header_sel = selector(markup::PAGE_HEADER)?;
    let table_sel = selector(markup::TABLE)?;
    let row_sel = selector(markup::ROW)?;
    let field_sel = selector(markup::FIELD_HEADER)?;
    let value_sel = selector(markup::FIELD_VALUE)?;

    let headers: Vec<_> = doc.select(&header_sel).collect();
    let header = (!headers.is_empty()).then(|| {
        let raw: String = headers.iter().flat_map(|e| e.text()).collect();
        collapse_ws(&raw)
    });
    let table = doc.select(&table_sel).last();
    if header.is_none() && table.is_none() {
        return Err(FormError::Scrape("unexpected result page".to_string()));
    }

    let mut report = format!("{}\n\n", bold(&header.unwrap_or_default()));
    for row in table.iter().flat_map(|t| t.select(&row_sel)) {
        let Some(field) = row.select(&field_sel).next() else {
            continue;
        };
        let name = text_of(field).replace(':', "");
        let value = row.select(&value_sel).next().map(text_of).unwrap_or_default();
        report.push_str(&format!(
            "{}: {}\n",
            bold(name.trim()),
            escape_html(&value)
        ));
    }
    Ok(report)
}

fn input_value(doc: &Html, id: &str) -> FormResult<String> {
    let sel = selector(&format!("#{id}"))?;
    doc.select(&sel)
        .find_map(|e| e.value().attr("value"))
        .map(str::to_string)
        .ok_or_else(|| FormError::Scrape(format!("cannot find {id} value")))
}

fn selector(css: &str) -> FormResult<Selector> {
    Selector::parse(css).map_err(|e| FormError::Scrape(format!("bad selector {css:?}: {e}")))
}

/// Element text with runs of whitespace collapsed.
fn text_of(el: ElementRef<'_>) -> String {
    let raw: String = el.text().collect();
    collapse_ws(&raw)
}

fn collapse_ws(raw: &str) -> String {
    static WS: OnceLock<Regex> = OnceLock::new();
    let ws = WS.get_or_init(|| Regex::new(r"\s+").expect("valid regex"));
    ws.replace_all(raw.trim(), " ").into_owned()
}
