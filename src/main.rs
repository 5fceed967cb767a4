use clap::Parser;
use oci_pusher::RegistryError;
use oci_pusher::cli::{Args, Runner};
use oci_pusher::error::handlers::HttpErrorHandler;
use oci_pusher::logging::init_tracing;

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_tracing(args.verbose);

    let runner = Runner::new(args);
    if let Err(err) = runner.run().await {
        runner.logger().error(&err.to_string());
        if let RegistryError::Protocol { status, .. } = &err {
            if let Some(hint) = HttpErrorHandler::hint(*status) {
                runner.logger().error(&format!("hint: {}", hint));
            }
        }
        std::process::exit(1);
    }
}
