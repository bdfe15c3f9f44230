use audio_transcode::{run, Config};
use ffmpeg_next as ffmpeg;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let config = Config::load()?;
    ffmpeg::init()?;
    ffmpeg::util::log::set_level(config.parsed_ffmpeg_log_level()?);

    run(config).await;
    Ok(())
}
