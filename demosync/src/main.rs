use clap::Parser;
use demosync_lib::config::Cli;

fn main() {
    let cli = Cli::parse();

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Failed to start async runtime: {}", e);
            std::process::exit(demosync_lib::EXIT_FATAL);
        }
    };

    let code = runtime.block_on(demosync_lib::run(cli));
    std::process::exit(code);
}
