use std::sync::Arc;
use std::time::Duration;

use browser::{ChromiumBrowser, LaunchOptions, TimeoutConfig, watch_mutations};
use tracing_subscriber::EnvFilter;
use unbanner_core::{PolicyOverrides, Reporter, SettingsSource, SignatureCatalog};
use unbanner_scheduler::{PageGuard, Trigger, forward_mutations, mutation_stream};
use unbanner_storage::{JsonFileStorage, SettingsStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let store = Arc::new(SettingsStore::open(JsonFileStorage::new(".unbanner")).await);
    let default_filter = store.log_filter().await;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)))
        .init();

    let url = std::env::args().nth(1).unwrap_or_else(|| "https://example.com".to_string());
    let watch_secs: u64 = std::env::args().nth(2).and_then(|s| s.parse().ok()).unwrap_or(15);
    let headed = std::env::args().any(|a| a == "--headed");

    let options = if headed { LaunchOptions::headed() } else { LaunchOptions::default() };
    let browser = ChromiumBrowser::launch(options, TimeoutConfig::default()).await?;
    let page = browser.open(&url).await?;

    let settings: Arc<dyn SettingsSource> = store.clone();
    let reporter: Arc<dyn Reporter> = store.clone();
    let mut guard = PageGuard::new(settings, Arc::new(SignatureCatalog::bundled()), reporter);
    // optional classifier tuning next to the settings file
    if let Ok(json) = tokio::fs::read_to_string(".unbanner/policy.json").await {
        guard = guard.with_overrides(PolicyOverrides::from_json(&json)?);
    }

    match guard.attach(page.document.clone(), &page.consent).await {
        Some((scheduler, triggers)) => {
            let mutations = watch_mutations(page.document.clone(), browser.timeout_config().mutation_poll).await?;
            tokio::spawn(forward_mutations(mutation_stream(mutations), scheduler.trigger_sender()));
            scheduler.submit(Trigger::Explicit).ok();

            match tokio::time::timeout(Duration::from_secs(watch_secs), scheduler.run(triggers)).await {
                Ok(stats) => println!("{}", serde_json::to_string_pretty(&stats)?),
                Err(_) => println!("watched {} for {}s", url, watch_secs),
            }
        }
        None => println!("{} is allowlisted or protection is disabled", url),
    }

    println!("{}", serde_json::to_string_pretty(&store.recent_actions())?);
    println!("{}", serde_json::to_string_pretty(&store.snapshot().await.stats)?);
    browser.close().await?;
    Ok(())
}
