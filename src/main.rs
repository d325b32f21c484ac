use std::net::Ipv4Addr;
use std::path::PathBuf;

use serde::Deserialize;
use tracing_subscriber::EnvFilter;

use mailbatch::config::EnvConfig;
use mailbatch::{http, serve};

#[derive(Debug, Deserialize)]
struct AppConfig {
    #[serde(default = "default_port")]
    port: u16,
    #[serde(default = "default_templates_dir")]
    templates_dir: PathBuf,
}

fn default_port() -> u16 {
    3000
}

fn default_templates_dir() -> PathBuf {
    PathBuf::from("templates")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config: AppConfig = AppConfig::from_env()?;
    let ctx = http::Context::from_env(&config.templates_dir);
    let router = http::router(ctx);

    serve::serve((Ipv4Addr::UNSPECIFIED, config.port), router).await?;
    Ok(())
}
