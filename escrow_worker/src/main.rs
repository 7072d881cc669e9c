use dotenvy::dotenv;
use escrow_worker::{cli::handle_command_line_args, config::WorkerConfig, worker::run_worker};
use log::info;

#[actix_web::main]
async fn main() {
    dotenv().ok();
    env_logger::init();
    if handle_command_line_args() {
        return;
    }
    let config = WorkerConfig::from_env_or_default();

    info!("🚀️ Starting escrow worker. Health checks on {}:{}", config.host, config.port);
    match run_worker(config).await {
        Ok(_) => println!("Bye!"),
        Err(e) => eprintln!("{e}"),
    }
}
