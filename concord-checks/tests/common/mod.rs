#![allow(dead_code)]

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use concord_checks::{MediaWikiApi, RenderedTarget};
use concord_common::observability::{LogConfig, LogFormat, init_logging};
use concord_drivers::{PageDriver, PageSource};
use concord_http::HttpClient;
use scraper::{ElementRef, Html, Selector};
use serde_json::{Value, json};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

static INIT_PATH: OnceLock<PathBuf> = OnceLock::new();

pub fn init_test_tracing() {
    let _ = INIT_PATH.get_or_init(|| {
        let config = LogConfig {
            app_name: "concord-tests".to_string(),
            log_dir: Some(std::env::temp_dir().join("concord-tests")),
            emit_stderr: true,
            format: if std::env::var("CONCORD_LOG_FORMAT")
                .map(|raw| raw.trim().eq_ignore_ascii_case("json"))
                .unwrap_or(false)
            {
                LogFormat::Json
            } else {
                LogFormat::Text
            },
            default_filter: "debug".to_string(),
        };
        init_logging(config).unwrap_or_default()
    });
}

pub const PAGE_URL: &str = "https://wiki.test/wiki/Playwright_(software)";

/// A page with current and legacy heading markup, link boxes inside and
/// outside the article, and a theme switch.
pub const PLAYWRIGHT_HTML: &str = r##"<!DOCTYPE html>
<html class="client-js skin-theme-clientpref-day">
<head><title>Playwright</title></head>
<body>
<div id="vector-appearance">
  <input type="checkbox" id="vector-appearance-dropdown-checkbox">
  <input type="radio" id="skin-client-pref-skin-theme-value-night" name="theme">
</div>
<div id="mw-content-text"><div class="mw-parser-output">
<p>Playwright is a framework for web testing.</p>
<div class="mw-heading mw-heading2"><h2 id="Features">Features</h2><span class="mw-editsection">[edit]</span></div>
<p>Cross-browser automation.</p>
<div class="mw-heading mw-heading3"><h3 id="Trace_viewer">Trace viewer</h3></div>
<p>Traces record every action.</p>
<div class="mw-heading mw-heading2"><h2 id="Debugging_features">Debugging features</h2></div>
<p>Playwright supports debugging via trace viewer and inspector.</p>
<h2><span class="mw-headline" id="History">History</span><span class="mw-editsection">[<a href="#">edit</a>]</span></h2>
<p>The history began with a release in 2020.</p>
<ul><li>Version 1.0</li></ul>
<table><tbody><tr><td>Not collected</td></tr></tbody></table>
<div class="mw-heading mw-heading2"><h2 id="See_also">See also</h2></div>
<div class="mw-heading mw-heading3"><h3 id="Microsoft_development_tools">Microsoft development tools</h3><span class="mw-editsection">[<a href="#">edit</a>]</span></div>
<ul><li><a href="/wiki/Visual_Studio_Code">Visual Studio Code</a></li><li><a href="/wiki/TypeScript">TypeScript</a></li></ul>
<div class="mw-heading mw-heading3"><h3 id="Testing_frameworks">Testing frameworks</h3></div>
<ul><li><a href="#">Selenium</a></li></ul>
</div></div>
<div id="footer">
  <ul><li><a href="https://x">Privacy</a></li><li><a href="#">About</a></li></ul>
</div>
<div id="good-links"><a href="https://x">X</a> <a href="https://y">Y</a></div>
<div id="bare-links"><a>no href</a><a href="https://z">Z</a><a href="  ">blank</a></div>
<div id="empty-box"><span>no anchors</span></div>
<div id="nested-links" class="link-box"><div class="link-box"><a href="#">Top</a><a href="https://ok">Ok</a></div></div>
</body>
</html>
"##;

pub const PAGE_TITLE: &str = "Playwright_(software)";

pub fn target() -> RenderedTarget {
    RenderedTarget {
        page_url: PAGE_URL.to_string(),
        content_root: "#mw-content-text .mw-parser-output".to_string(),
        text_tags: ["p", "ul", "ol", "dl", "blockquote", "pre"]
            .into_iter()
            .map(String::from)
            .collect(),
    }
}

pub fn playwright_site() -> FakeSite {
    FakeSite::new().page(PAGE_URL, PLAYWRIGHT_HTML)
}

pub fn api_for(server: &MockServer) -> MediaWikiApi {
    let http = HttpClient::new(&format!("{}/w/api.php", server.uri())).unwrap();
    MediaWikiApi::new(http, PAGE_TITLE)
}

/// Section listing as `prop=sections` returns it for [`PLAYWRIGHT_HTML`].
pub fn playwright_sections() -> Value {
    json!({
        "parse": {
            "title": "Playwright (software)",
            "pageid": 64_262_573,
            "sections": [
                {"toclevel": 1, "level": "2", "line": "Features", "number": "1", "index": "1", "anchor": "Features"},
                {"toclevel": 2, "level": "3", "line": "Trace viewer", "number": "1.1", "index": "2", "anchor": "Trace_viewer"},
                {"toclevel": 1, "level": "2", "line": "Debugging features", "number": "2", "index": "3", "anchor": "Debugging_features"},
                {"toclevel": 1, "level": "2", "line": "History", "number": "3", "index": "4", "anchor": "History"}
            ]
        }
    })
}

pub async fn mount_sections(server: &MockServer, body: Value) {
    Mock::given(method("GET"))
        .and(path("/w/api.php"))
        .and(query_param("action", "parse"))
        .and(query_param("prop", "sections"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

pub async fn mount_section_html(server: &MockServer, index: u32, html: &str) {
    Mock::given(method("GET"))
        .and(path("/w/api.php"))
        .and(query_param("prop", "text"))
        .and(query_param("section", index.to_string()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "parse": {"title": "Playwright (software)", "text": {"*": html}}
        })))
        .mount(server)
        .await;
}

enum FakeScript {
    Fixed(Value),
    HasClass { selector: String, class: String },
}

struct ClickRule {
    trigger: String,
    target: String,
    class: String,
}

/// Static description of the pages a [`FakeBrowser`] serves.
#[derive(Default)]
pub struct FakeSite {
    pages: HashMap<String, String>,
    scripts: HashMap<String, FakeScript>,
    clicks: Vec<ClickRule>,
    stall_navigation: bool,
}

impl FakeSite {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, url: &str, html: &str) -> Self {
        self.pages.insert(url.to_string(), html.to_string());
        self
    }

    /// Clicking an element matching `trigger` flips `class` on the first
    /// element matching `target`.
    pub fn on_click(mut self, trigger: &str, target: &str, class: &str) -> Self {
        self.clicks.push(ClickRule {
            trigger: trigger.to_string(),
            target: target.to_string(),
            class: class.to_string(),
        });
        self
    }

    pub fn script(mut self, script: &str, value: Value) -> Self {
        self.scripts
            .insert(script.to_string(), FakeScript::Fixed(value));
        self
    }

    /// `script` evaluates to whether `class` is currently on `selector`.
    pub fn class_probe(mut self, script: &str, selector: &str, class: &str) -> Self {
        self.scripts.insert(
            script.to_string(),
            FakeScript::HasClass {
                selector: selector.to_string(),
                class: class.to_string(),
            },
        );
        self
    }

    /// Navigation never completes.
    pub fn stalling(mut self) -> Self {
        self.stall_navigation = true;
        self
    }

    pub fn into_browser(self) -> FakeBrowser {
        FakeBrowser {
            shared: Arc::new(Shared {
                site: self,
                opened: AtomicUsize::new(0),
                released: AtomicUsize::new(0),
                navigations: Mutex::new(Vec::new()),
            }),
        }
    }
}

struct Shared {
    site: FakeSite,
    opened: AtomicUsize,
    released: AtomicUsize,
    navigations: Mutex<Vec<String>>,
}

/// In-memory [`PageSource`] backed by static HTML.
#[derive(Clone)]
pub struct FakeBrowser {
    shared: Arc<Shared>,
}

impl FakeBrowser {
    /// A page that is not tracked by the open/release counters.
    pub fn page(&self) -> FakePage {
        FakePage {
            shared: self.shared.clone(),
            current: Mutex::new(None),
            flips: Mutex::new(Vec::new()),
        }
    }

    pub fn opened(&self) -> usize {
        self.shared.opened.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.shared.released.load(Ordering::SeqCst)
    }

    pub fn navigations(&self) -> Vec<String> {
        self.shared
            .navigations
            .lock()
            .map(|n| n.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl PageSource for FakeBrowser {
    type Page = FakePage;

    async fn open_page(&self) -> Result<FakePage> {
        self.shared.opened.fetch_add(1, Ordering::SeqCst);
        Ok(self.page())
    }

    async fn release_page(&self, _page: FakePage) -> Result<()> {
        self.shared.released.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// One tab of the [`FakeBrowser`]. Elements are addressed by their position
/// in document order; the document is re-parsed per call since parsed trees
/// cannot cross threads.
pub struct FakePage {
    shared: Arc<Shared>,
    current: Mutex<Option<String>>,
    flips: Mutex<Vec<(usize, String)>>,
}

fn selector(raw: &str) -> Result<Selector> {
    Selector::parse(raw).map_err(|e| anyhow!("invalid selector {raw}: {e:?}"))
}

fn elements(doc: &Html) -> Vec<ElementRef<'_>> {
    doc.root_element()
        .descendants()
        .filter_map(ElementRef::wrap)
        .collect()
}

fn position(all: &[ElementRef<'_>], el: &ElementRef<'_>) -> usize {
    all.iter()
        .position(|e| e.id() == el.id())
        .unwrap_or(usize::MAX)
}

impl FakePage {
    fn with_doc<R>(&self, f: impl FnOnce(&Html, &[ElementRef<'_>]) -> Result<R>) -> Result<R> {
        let url = self
            .current
            .lock()
            .map_err(|_| anyhow!("poisoned"))?
            .clone()
            .ok_or_else(|| anyhow!("no page loaded"))?;
        let html = self
            .shared
            .site
            .pages
            .get(&url)
            .ok_or_else(|| anyhow!("no such page {url}"))?;
        let doc = Html::parse_document(html);
        let all = elements(&doc);
        f(&doc, &all)
    }

    fn element<'d>(all: &[ElementRef<'d>], idx: usize) -> Result<ElementRef<'d>> {
        all.get(idx)
            .copied()
            .ok_or_else(|| anyhow!("stale element {idx}"))
    }

    fn classes(&self, el: &ElementRef<'_>, idx: usize) -> Result<Option<String>> {
        let mut classes: Vec<String> = el.value().classes().map(str::to_string).collect();
        let had_attr = el.value().attr("class").is_some();
        let flips = self.flips.lock().map_err(|_| anyhow!("poisoned"))?;
        let mut flipped = false;
        for (_, class) in flips.iter().filter(|(t, _)| *t == idx) {
            flipped = true;
            match classes.iter().position(|c| c == class) {
                Some(i) => {
                    classes.remove(i);
                }
                None => classes.push(class.clone()),
            }
        }
        if !had_attr && !flipped {
            return Ok(None);
        }
        Ok(Some(classes.join(" ")))
    }

    fn has_class(&self, doc: &Html, all: &[ElementRef<'_>], raw: &str, class: &str) -> Result<bool> {
        let sel = selector(raw)?;
        let Some(el) = doc.select(&sel).next() else {
            return Ok(false);
        };
        let idx = position(all, &el);
        Ok(self
            .classes(&el, idx)?
            .is_some_and(|c| c.split_whitespace().any(|c| c == class)))
    }
}

#[async_trait]
impl PageDriver for FakePage {
    type Element = usize;

    async fn navigate(&self, url: &str) -> Result<()> {
        if let Ok(mut log) = self.shared.navigations.lock() {
            log.push(url.to_string());
        }
        if self.shared.site.stall_navigation {
            std::future::pending::<()>().await;
        }
        if !self.shared.site.pages.contains_key(url) {
            return Err(anyhow!("navigation to {url} failed: 404"));
        }
        *self.current.lock().map_err(|_| anyhow!("poisoned"))? = Some(url.to_string());
        self.flips.lock().map_err(|_| anyhow!("poisoned"))?.clear();
        Ok(())
    }

    async fn locate(&self, raw: &str) -> Result<Vec<usize>> {
        let sel = selector(raw)?;
        self.with_doc(|doc, all| Ok(doc.select(&sel).map(|el| position(all, &el)).collect()))
    }

    async fn locate_within(&self, scope: &usize, raw: &str) -> Result<Vec<usize>> {
        let sel = selector(raw)?;
        self.with_doc(|_, all| {
            let scope = Self::element(all, *scope)?;
            Ok(scope.select(&sel).map(|el| position(all, &el)).collect())
        })
    }

    async fn text(&self, element: &usize) -> Result<String> {
        self.with_doc(|_, all| Ok(Self::element(all, *element)?.text().collect()))
    }

    async fn attribute(&self, element: &usize, name: &str) -> Result<Option<String>> {
        self.with_doc(|_, all| {
            let el = Self::element(all, *element)?;
            if name == "class" {
                return self.classes(&el, *element);
            }
            Ok(el.value().attr(name).map(str::to_string))
        })
    }

    async fn tag_name(&self, element: &usize) -> Result<String> {
        self.with_doc(|_, all| Ok(Self::element(all, *element)?.value().name().to_ascii_lowercase()))
    }

    async fn click(&self, element: &usize) -> Result<()> {
        let flips = self.with_doc(|doc, all| {
            let mut flips = Vec::new();
            for rule in &self.shared.site.clicks {
                let trigger = selector(&rule.trigger)?;
                if !doc.select(&trigger).any(|el| position(all, &el) == *element) {
                    continue;
                }
                let target = selector(&rule.target)?;
                let el = doc
                    .select(&target)
                    .next()
                    .ok_or_else(|| anyhow!("click target {} missing", rule.target))?;
                flips.push((position(all, &el), rule.class.clone()));
            }
            Ok(flips)
        })?;
        self.flips
            .lock()
            .map_err(|_| anyhow!("poisoned"))?
            .extend(flips);
        Ok(())
    }

    async fn evaluate(&self, script: &str) -> Result<Value> {
        match self.shared.site.scripts.get(script) {
            Some(FakeScript::Fixed(value)) => Ok(value.clone()),
            Some(FakeScript::HasClass { selector, class }) => self
                .with_doc(|doc, all| self.has_class(doc, all, selector, class))
                .map(Value::Bool),
            None => Err(anyhow!("javascript error: unknown script")),
        }
    }
}
