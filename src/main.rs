use std::sync::Arc;
use tokio::sync::Notify;

mod config;
mod error;
mod handler;
mod http;
mod logger;
mod server;

/// Config file used when no path is given on the command line (extension optional)
const DEFAULT_CONFIG_PATH: &str = "config";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let cfg = config::Config::load_from(&config_path)?;
    logger::init(&cfg.logging)?;

    // Tokio runtime, thread count from `server.workers`
    let mut runtime_builder = tokio::runtime::Builder::new_multi_thread();
    runtime_builder.enable_all();
    if let Some(workers) = cfg.server.workers {
        runtime_builder.worker_threads(workers);
    }
    let runtime = runtime_builder.build()?;

    runtime.block_on(async_main(cfg))
}

async fn async_main(cfg: config::Config) -> Result<(), Box<dyn std::error::Error>> {
    let addr = cfg.socket_addr()?;

    let exe = std::env::current_exe()?;
    let frontend_dir = config::resolve_frontend_dir(cfg.frontend.dir.as_deref(), &exe);
    if !frontend_dir.is_dir() {
        logger::log_warning(&format!(
            "Frontend directory '{}' does not exist; file requests will return 404",
            frontend_dir.display()
        ));
    }

    let listener = server::create_listener(addr)?;
    let state = Arc::new(config::AppState::new(cfg, frontend_dir));
    logger::log_server_start(&addr, &state);

    let shutdown = Arc::new(Notify::new());
    let server_task = tokio::spawn(server::run(listener, state, Arc::clone(&shutdown)));

    server::wait_for_shutdown().await;
    logger::log_shutdown();
    shutdown.notify_one();
    server_task.await?;

    Ok(())
}
