// Third Party
use tracing::info;

// Local
use pod_watcher::{config, utils::init_tracing, watcher::KubePodSource, PodWatcher};

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    init_tracing(&["pod_watcher", "watcher"], tracing::Level::INFO);

    // Startup failures are the only way out of this process
    let watcher = PodWatcher::connect(config::resolve().await, |client| {
        KubePodSource::new(&client)
    })?;

    info!("Starting pod watcher...");
    match watcher.run().await {}
}
