//! MediaWiki `action=parse` client: section listing, title resolution and
//! per-section text.
//!
//! The API addresses sections positionally, so a human-readable title is
//! first resolved to an index ([`MediaWikiApi::resolve_section`]) and the
//! text is then requested by that index ([`MediaWikiApi::section_text`]).
//! Every field is looked up explicitly; anything missing surfaces as
//! [`CheckError::MalformedResponse`].
use concord_common::{ApiContent, CheckError, Result};
use concord_http::{HttpClient, HttpError, RequestOpts};
use serde_json::Value;
use std::borrow::Cow;
use tracing::debug;
use url::Url;

/// A section title bound to its positional index in the API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionDescriptor {
    pub title: String,
    pub index: u32,
}

/// Client for one page's parse API.
#[derive(Clone)]
pub struct MediaWikiApi {
    http: HttpClient,
    page: String,
}

impl MediaWikiApi {
    /// `http` must be anchored at the `api.php` endpoint.
    pub fn new(http: HttpClient, page: impl Into<String>) -> Self {
        Self {
            http,
            page: page.into(),
        }
    }

    /// Page title as sent in the `page` parameter.
    pub fn page(&self) -> &str {
        &self.page
    }

    /// All sections with a numeric index, in page order.
    ///
    /// Sections transcluded from templates (index `T-1`, ...) cannot be
    /// requested by number and are skipped.
    pub async fn sections(&self) -> Result<Vec<SectionDescriptor>> {
        let listed = self.list_sections().await?;
        Ok(listed
            .into_iter()
            .filter_map(|(title, raw)| match parse_index(&raw) {
                Some(index) => Some(SectionDescriptor { title, index }),
                None => {
                    debug!(target: "concord.api", %title, index = %raw, "skipping non-numeric section");
                    None
                }
            })
            .collect())
    }

    /// First section whose title equals `title` exactly (case-sensitive).
    ///
    /// There is no fallback: a miss is [`CheckError::SectionNotFound`], never
    /// section 0, which is the lead and would corrupt the comparison.
    pub async fn resolve_section(&self, title: &str) -> Result<SectionDescriptor> {
        let listed = self.list_sections().await?;
        let (position, (line, raw)) = listed
            .into_iter()
            .enumerate()
            .find(|(_, (line, _))| line == title)
            .ok_or_else(|| CheckError::SectionNotFound {
                page: self.page.clone(),
                title: title.to_string(),
            })?;

        let index = parse_index(&raw).ok_or_else(|| CheckError::MalformedResponse {
            page: self.page.clone(),
            field: format!("parse.sections[{position}].index ({raw})"),
        })?;

        debug!(target: "concord.api", page = %self.page, title = %line, index, "section resolved");
        Ok(SectionDescriptor { title: line, index })
    }

    /// Text payload of one section.
    ///
    /// [`ApiContent::Text`] returns the parser's HTML (`parse.text["*"]`);
    /// [`ApiContent::Wikitext`] returns source markup (`parse.wikitext["*"]`).
    pub async fn section_text(
        &self,
        section: &SectionDescriptor,
        content: ApiContent,
    ) -> Result<String> {
        let prop = match content {
            ApiContent::Text => "text",
            ApiContent::Wikitext => "wikitext",
        };
        let mut params = vec![
            ("prop", Cow::Borrowed(prop)),
            ("section", Cow::Owned(section.index.to_string())),
        ];
        if content == ApiContent::Text {
            params.push(("disableeditsection", Cow::Borrowed("1")));
            params.push(("disablelimitreport", Cow::Borrowed("1")));
        }
        let body = self.parse(params).await?;

        let pointer = format!("/parse/{prop}/*");
        let text = body
            .pointer(&pointer)
            .and_then(Value::as_str)
            .ok_or_else(|| self.malformed(format!("parse.{prop}[\"*\"]")))?;

        debug!(
            target: "concord.api",
            page = %self.page,
            index = section.index,
            prop,
            chars = text.len(),
            "section text fetched"
        );
        Ok(text.to_string())
    }

    async fn list_sections(&self) -> Result<Vec<(String, String)>> {
        let body = self
            .parse(vec![("prop", Cow::Borrowed("sections"))])
            .await?;
        let entries = body
            .pointer("/parse/sections")
            .and_then(Value::as_array)
            .ok_or_else(|| self.malformed("parse.sections"))?;

        entries
            .iter()
            .enumerate()
            .map(|(i, entry)| {
                let line = entry
                    .get("line")
                    .and_then(Value::as_str)
                    .ok_or_else(|| self.malformed(format!("parse.sections[{i}].line")))?;
                let index = match entry.get("index") {
                    Some(Value::String(s)) => s.clone(),
                    Some(Value::Number(n)) => n.to_string(),
                    _ => return Err(self.malformed(format!("parse.sections[{i}].index"))),
                };
                Ok((line.to_string(), index))
            })
            .collect()
    }

    async fn parse<'a>(&'a self, mut params: Vec<(&'a str, Cow<'a, str>)>) -> Result<Value> {
        params.extend([
            ("action", Cow::Borrowed("parse")),
            ("page", Cow::Borrowed(self.page.as_str())),
            ("redirects", Cow::Borrowed("1")),
            ("format", Cow::Borrowed("json")),
        ]);
        let body: Value = self
            .http
            .get_json(
                "",
                RequestOpts {
                    query: Some(params),
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| self.transport_error(e))?;

        if let Some(err) = body.get("error") {
            let code = err.get("code").and_then(Value::as_str).unwrap_or("unknown");
            let info = err.get("info").and_then(Value::as_str).unwrap_or("");
            return Err(CheckError::ApiRequestFailed {
                page: self.page.clone(),
                status: None,
                message: format!("{code}: {info}"),
            });
        }
        Ok(body)
    }

    fn transport_error(&self, err: HttpError) -> CheckError {
        match err {
            HttpError::Decode(msg, _) => self.malformed(format!("JSON body ({msg})")),
            HttpError::Api {
                status, message, ..
            } => CheckError::ApiRequestFailed {
                page: self.page.clone(),
                status: Some(status.as_u16()),
                message,
            },
            other => CheckError::ApiRequestFailed {
                page: self.page.clone(),
                status: None,
                message: other.to_string(),
            },
        }
    }

    fn malformed(&self, field: impl Into<String>) -> CheckError {
        CheckError::MalformedResponse {
            page: self.page.clone(),
            field: field.into(),
        }
    }
}

fn parse_index(raw: &str) -> Option<u32> {
    raw.trim().parse().ok()
}

/// Page title encoded in an article URL.
///
/// Understands `/wiki/<title>` paths and `index.php?title=<title>` queries;
/// the title is percent-decoded.
///
/// ```
/// use concord_checks::api::page_title_from_url;
///
/// assert_eq!(
///     page_title_from_url("https://en.wikipedia.org/wiki/Playwright_(software)").as_deref(),
///     Some("Playwright_(software)")
/// );
/// assert_eq!(
///     page_title_from_url("https://en.wikipedia.org/wiki/C%2B%2B").as_deref(),
///     Some("C++")
/// );
/// ```
pub fn page_title_from_url(page_url: &str) -> Option<String> {
    let url = Url::parse(page_url).ok()?;
    if let Some(title) = url.query_pairs().find(|(k, _)| k == "title") {
        return Some(title.1.into_owned()).filter(|t| !t.is_empty());
    }
    let encoded = url.path().strip_prefix("/wiki/")?;
    let decoded = urlencoding::decode(encoded).ok()?;
    Some(decoded.into_owned()).filter(|t| !t.is_empty())
}
