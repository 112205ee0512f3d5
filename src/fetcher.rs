use std::borrow::Cow;
use std::time::Duration;

use chrono::NaiveDate;
use encoding_rs::{Encoding, WINDOWS_1252};
use reqwest::header::{self, HeaderMap, HeaderValue};
use scraper::{Html, Selector};
use tracing::{debug, info, instrument};
use url::form_urlencoded;

use crate::fetch_error::FetchError;

pub const DATA_URL: &str = "http://tabnet.datasus.gov.br/cgi/tabcgi.exe?sih/cnv/nibr.def";
pub const REFERENCE_URL: &str = "http://tabnet.datasus.gov.br/cgi/deftohtm.exe?sih/cnv/nibr.def";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

const USER_AGENT: &str =
    "Mozilla/5.0 (X11; Ubuntu; Linux x86_64; rv:82.0) Gecko/20100101 Firefox/82.0";

/// Value of a form field; multi-valued fields repeat their key on the wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormValue {
    Scalar(String),
    Multi(Vec<String>),
}

impl FormValue {
    pub fn values(&self) -> &[String] {
        match self {
            FormValue::Scalar(value) => std::slice::from_ref(value),
            FormValue::Multi(values) => values,
        }
    }
}

impl From<&str> for FormValue {
    fn from(value: &str) -> Self {
        FormValue::Scalar(value.to_string())
    }
}

pub type FormData = Vec<(String, FormValue)>;

const ALL: &str = "TODAS_AS_CATEGORIAS__";
const SEARCH_HINT: &str = "Digite o texto e ache fácil";

/// TabNet query for hospitalizations by municipality and age bracket,
/// restricted to female epilepsy admissions, exported as PRN.
pub fn base_form() -> FormData {
    let scalar = |value: &str| FormValue::Scalar(value.to_string());
    let fields = [
        ("Linha", scalar("Município")),
        ("Coluna", scalar("Faixa_Etária_2")),
        ("Incremento", scalar("Internações")),
        ("pesqmes1", scalar(SEARCH_HINT)),
        ("SMunicípio", scalar(ALL)),
        ("pesqmes2", scalar(SEARCH_HINT)),
        ("SCapital", scalar(ALL)),
        ("pesqmes3", scalar(SEARCH_HINT)),
        ("SRegião_de_Saúde_(CIR)", scalar(ALL)),
        ("pesqmes4", scalar(SEARCH_HINT)),
        ("SMacrorregião_de_Saúde", scalar(ALL)),
        ("pesqmes5", scalar(SEARCH_HINT)),
        ("SMicrorregião_IBGE", scalar(ALL)),
        ("pesqmes6", scalar(SEARCH_HINT)),
        ("SRegião_Metropolitana_-_RIDE", scalar(ALL)),
        ("pesqmes7", scalar(SEARCH_HINT)),
        ("STerritório_da_Cidadania", scalar(ALL)),
        ("pesqmes8", scalar(SEARCH_HINT)),
        ("SMesorregião_PNDR", scalar(ALL)),
        ("SAmazônia_Legal", scalar(ALL)),
        ("SSemiárido", scalar(ALL)),
        ("SFaixa_de_Fronteira", scalar(ALL)),
        ("SZona_de_Fronteira", scalar(ALL)),
        ("SMunicípio_de_extrema_pobreza", scalar(ALL)),
        ("SCaráter_atendimento", scalar(ALL)),
        ("SRegime", scalar(ALL)),
        ("pesqmes16", scalar(SEARCH_HINT)),
        ("SCapítulo_CID-10", scalar(ALL)),
        ("pesqmes17", scalar("")),
        ("SLista_Morb__CID-10", scalar("148")),
        ("pesqmes18", scalar(SEARCH_HINT)),
        ("SFaixa_Etária_1", scalar(ALL)),
        ("pesqmes19", scalar(SEARCH_HINT)),
        ("SFaixa_Etária_2", FormValue::Multi(vec!["6".into(), "7".into(), "8".into()])),
        ("SSexo", scalar("2")),
        ("SCor/raça", scalar(ALL)),
        ("formato", scalar("prn")),
        ("mostre", scalar("Mostra")),
    ];

    fields
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect()
}

/// Name of the monthly DBF file TabNet tabulates, e.g. 2020-01 → `nibr2001.dbf`
pub fn file_name(date: NaiveDate) -> String {
    format!("nibr{}.dbf", date.format("%y%m"))
}

pub fn file_names(dates: &[NaiveDate]) -> Vec<String> {
    dates.iter().copied().map(file_name).collect()
}

/// Set `key` to `value`, replacing an existing entry in place
pub fn merge_field(form: &mut FormData, key: &str, value: FormValue) {
    match form.iter_mut().find(|(k, _)| k == key) {
        Some((_, existing)) => *existing = value,
        None => form.push((key.to_string(), value)),
    }
}

fn encode_text<'a>(text: &'a str, encoding: &'static Encoding) -> Result<Cow<'a, [u8]>, FetchError> {
    let (bytes, _, had_errors) = encoding.encode(text);
    if had_errors {
        return Err(FetchError::Encoding {
            encoding: encoding.name(),
            text: text.to_string(),
        });
    }
    Ok(bytes)
}

/// Encode a form as `application/x-www-form-urlencoded` after transcoding
/// every key and value to `encoding`.
pub fn encode_form(form: &[(String, FormValue)], encoding: &'static Encoding) -> Result<String, FetchError> {
    let mut pairs = Vec::new();

    for (key, value) in form {
        let key: String = form_urlencoded::byte_serialize(&encode_text(key, encoding)?).collect();
        for item in value.values() {
            let item: String =
                form_urlencoded::byte_serialize(&encode_text(item, encoding)?).collect();
            pairs.push(format!("{key}={item}"));
        }
    }

    Ok(pairs.join("&"))
}

/// Text of the first `<pre>` element, without its leading line break.
///
/// Returns None when the page has no `<pre>`, which is how TabNet reports a
/// period without data.
pub fn extract_csv(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let pre_selector = Selector::parse("pre").expect("static selector");

    let pre = document.select(&pre_selector).next()?;
    let text = pre.text().collect::<String>();

    // html5ever already drops a newline that directly follows <pre>
    let csv = text
        .strip_prefix("\r\n")
        .or_else(|| text.strip_prefix('\n'))
        .unwrap_or(&text);
    Some(csv.to_string())
}

#[derive(Clone)]
pub struct PageFetcher {
    client: reqwest::Client,
    url: String,
    encoding: &'static Encoding,
}

impl PageFetcher {
    pub fn new(url: String, reference_url: &str, timeout: Duration) -> Result<Self, FetchError> {
        let origin = url::Url::parse(reference_url)
            .map(|u| u.origin().ascii_serialization())
            .unwrap_or_default();

        let mut headers = HeaderMap::new();
        headers.insert(header::USER_AGENT, HeaderValue::from_static(USER_AGENT));
        headers.insert(
            header::ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
            ),
        );
        headers.insert(header::ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.5"));
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/x-www-form-urlencoded"),
        );
        headers.insert(header::ORIGIN, HeaderValue::from_str(&origin)?);
        headers.insert(header::REFERER, HeaderValue::from_str(reference_url)?);
        headers.insert(header::UPGRADE_INSECURE_REQUESTS, HeaderValue::from_static("1"));
        headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            url,
            encoding: WINDOWS_1252,
        })
    }

    /// Form body for the given months
    pub fn form_for(&self, dates: &[NaiveDate]) -> FormData {
        let mut form = base_form();
        merge_field(&mut form, "Arquivos", FormValue::Multi(file_names(dates)));
        form
    }

    /// Fetch the tabulation for `dates` and return the embedded CSV, or None
    /// when TabNet has no data for them.
    #[instrument(skip(self), fields(url = %self.url))]
    pub async fn fetch_csv(&self, dates: &[NaiveDate]) -> Result<Option<String>, FetchError> {
        let body = encode_form(&self.form_for(dates), self.encoding)?;
        debug!("Posting {} byte form", body.len());

        let response = self
            .client
            .post(&self.url)
            .body(body)
            .send()
            .await?
            .error_for_status()?;
        info!("Got response with status: {}", response.status());

        // Decodes with the charset from Content-Type, Latin-1 when absent
        let html = response.text_with_charset(self.encoding.name()).await?;
        debug!("Decoded {} characters", html.len());

        Ok(extract_csv(&html))
    }
}
