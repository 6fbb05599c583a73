use anyhow::Context;
use vulnfeeds::logging::init_logging;
use vulnfeeds::{Config, FeedPipeline};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("loading configuration")?;

    // keep the appender guard alive for the whole run
    let _guard = init_logging(&config);

    FeedPipeline::new(config)
        .run()
        .await
        .context("pipeline run failed")?;
    Ok(())
}
