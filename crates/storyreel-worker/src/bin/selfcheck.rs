use std::path::Path;
use std::process::Command;

use storyreel_worker::WorkerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = WorkerConfig::from_env()?;

    println!(
        "storyreel-selfcheck: starting with work_dir={}",
        config.work_dir.display()
    );
    ensure_dir(&config.work_dir).await?;
    ensure_dir(&config.output_root).await?;

    for (tool, path) in config.tools.verify()? {
        println!("storyreel-selfcheck: {} -> {}", tool, path.display());
    }
    ensure_ffmpeg(&config.tools.ffmpeg)?;

    println!("storyreel-selfcheck: ok");
    Ok(())
}

async fn ensure_dir<P: AsRef<Path>>(path: P) -> anyhow::Result<()> {
    tokio::fs::create_dir_all(path.as_ref()).await?;
    Ok(())
}

fn ensure_ffmpeg(ffmpeg: &Path) -> anyhow::Result<()> {
    let output = Command::new(ffmpeg)
        .arg("-version")
        .output()
        .map_err(|e| anyhow::anyhow!("ffmpeg not available: {}", e))?;

    if !output.status.success() {
        return Err(anyhow::anyhow!("ffmpeg -version failed: {:?}", output.status));
    }
    Ok(())
}
