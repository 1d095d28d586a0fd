use std::env;

use env_logger::{Builder, Env};

#[tokio::main]
async fn main() -> clarity_cache::Result<()> {
    Builder::from_env(Env::default().default_filter_or("info"))
        .filter_module("hyper_util", log::LevelFilter::Warn)
        .init();

    let args: Vec<String> = env::args().skip(1).collect();
    if let Err(e) = clarity_cache::cli::run(&args).await {
        if matches!(e, clarity_cache::Error::Usage(_)) {
            eprintln!("Error: {e}\n");
            eprintln!("{}", clarity_cache::cli::USAGE);
            std::process::exit(2);
        }
        return Err(e);
    }
    Ok(())
}
