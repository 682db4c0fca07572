use anyhow::Context;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    demo_agent::init_tracing();

    let config = match std::env::args().nth(1) {
        Some(path) => demo_agent::config::load_config_from(std::path::Path::new(&path)),
        None => demo_agent::config::load_config(),
    }
    .context("failed to load configuration")?;

    demo_agent::config::validate_config(&config).context("invalid configuration")?;

    demo_agent::run(config).await.context("demo agent server failed")?;
    Ok(())
}
