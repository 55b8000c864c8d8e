use std::path::PathBuf;

use tessera_client::config::default_config_path;

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(default_config_path);
    if let Err(e) = tessera_client::run(&config_path).await {
        log::error!("[tessera.mirror] {}", e);
        std::process::exit(1);
    }
}
