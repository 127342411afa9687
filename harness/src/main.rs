use clap::Parser;
use harness::Cli;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let code = tokio::select! {
        result = harness::run(cli) => harness::finish(result),
        _ = tokio::signal::ctrl_c() => {
            eprintln!("Interrupted");
            1
        }
    };

    std::process::exit(code);
}
