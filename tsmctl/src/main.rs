use clap::Parser;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = tsmctl::Cli::parse();
    tsmctl::init_tracing(cli.verbose);
    match tsmctl::run(cli).await {
        Ok(status) => std::process::exit(status),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(2);
        }
    }
}
