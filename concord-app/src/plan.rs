//! Turns the loaded configuration into an API client and a suite plan.
use anyhow::{Result, anyhow};
use concord_checks::{
    MediaWikiApi, PlannedCheck, RenderedTarget, SuitePlan, ThemeToggle, page_title_from_url,
};
use concord_config::ConcordConfig;
use concord_http::HttpClient;
use std::time::Duration;

pub fn build_api(cfg: &ConcordConfig) -> Result<MediaWikiApi> {
    let endpoint = cfg.target.resolved_api_endpoint()?;
    let mut http = match &cfg.http.user_agent {
        Some(ua) => HttpClient::with_user_agent(&endpoint, ua)?,
        None => HttpClient::new(&endpoint)?,
    }
    .with_retries(cfg.http.retries);
    if let Some(secs) = cfg.http.timeout_secs {
        http = http.with_timeout(Duration::from_secs(secs));
    }

    let title = match &cfg.target.page_title {
        Some(title) => title.clone(),
        None => page_title_from_url(&cfg.target.page_url).ok_or_else(|| {
            anyhow!(
                "cannot derive a page title from {}; set target.page_title",
                cfg.target.page_url
            )
        })?,
    };
    Ok(MediaWikiApi::new(http, title))
}

/// Sections first, in configured order, then links, then the theme toggle.
pub fn build_plan(cfg: &ConcordConfig) -> Result<SuitePlan> {
    let target = RenderedTarget {
        page_url: cfg.target.page_url.clone(),
        content_root: cfg.target.content_root.clone(),
        text_tags: cfg
            .target
            .text_tags
            .iter()
            .map(|t| t.to_ascii_lowercase())
            .collect(),
    };

    let mut checks: Vec<PlannedCheck> = cfg
        .sections
        .iter()
        .map(|s| PlannedCheck::Section {
            title: s.title.clone(),
            scope: s.scope,
            content: s.content,
        })
        .collect();
    if let Some(links) = &cfg.links {
        checks.push(PlannedCheck::Links {
            scope: links.scope()?,
            policy: links.policy,
        });
    }
    if let Some(theme) = &cfg.theme {
        checks.push(PlannedCheck::Theme(ThemeToggle {
            triggers: theme.triggers.clone(),
            marker: theme.marker.clone(),
        }));
    }

    Ok(SuitePlan { target, checks })
}
