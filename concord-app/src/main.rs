use anyhow::Result;
use std::process::ExitCode;
use concord_checks::run_suite;
use concord_common::observability::init_logging;
use concord_config::{ConcordConfig, ConcordConfigLoader};
use concord_drivers::webdriver_browser::WebDriverBrowser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
mod plan;

const CONFIG_ENV: &str = "CONCORD_CONFIG";
const DEFAULT_CONFIG_FILE: &str = "concord.yaml";

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // 1) Load config (env wins)
    let config_file = std::env::var(CONFIG_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_FILE.into());
    let cfg: ConcordConfig = ConcordConfigLoader::new()
        .with_optional_file(&config_file)
        .load()?;

    // 2) Logging from the same config
    let log_path = init_logging(cfg.logging.to_log_config("concord"))?;
    info!(target: "concord.app", config = %config_file, log = %log_path.display(), "starting");

    // 3) Ctrl-C abandons the running check and skips the rest
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!(target: "concord.app", "interrupted, cancelling remaining checks");
                cancel.cancel();
            }
        });
    }

    let api = plan::build_api(&cfg)?;
    let suite = plan::build_plan(&cfg)?;
    info!(
        target: "concord.app",
        page = %api.page(),
        url = %suite.target.page_url,
        checks = suite.checks.len(),
        "suite planned"
    );

    let browser = WebDriverBrowser::connect(&cfg.webdriver.url, cfg.webdriver.headless).await?;
    let report = run_suite(&browser, &api, &suite, &cancel).await;
    if let Err(e) = browser.close().await {
        warn!(target: "concord.app", error = %e, "failed to close browser session");
    }

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(if report.passed() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
