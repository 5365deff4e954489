use tracing_subscriber::EnvFilter;
use unbanner_core::Policy;
use unbanner_dom::Document;
use unbanner_engine::{ScanSession, scan_page};
use unbanner_parser::PageLoader;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let url = std::env::args().nth(1).unwrap_or_else(|| "https://example.com".to_string());
    let extreme = std::env::args().any(|a| a == "--extreme");
    let policy = if extreme { Policy::extreme() } else { Policy::normal() };

    let doc = PageLoader::new().fetch(&url).await?;
    let hostname = doc.hostname().await?;
    let session = ScanSession::with_policy(hostname, policy);
    let outcome = scan_page(&doc, &session).await;

    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}
