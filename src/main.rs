use clap::Parser;
use env_logger::Env;
use gemini_chat::cli::{run, Args};
use std::process::ExitCode;

fn main() -> ExitCode {
    let args = Args::parse();
    let default_filter = if args.debug { "gemini_chat=debug" } else { "warn" };
    env_logger::Builder::from_env(Env::default().default_filter_or(default_filter)).init();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Error: failed to start the async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    let result = runtime.block_on(run(args));
    // An interrupted stdin read is still parked on a blocking thread.
    runtime.shutdown_background();

    match result {
        Ok(termination) => ExitCode::from(termination.exit_code()),
        // Already reported through the chat logger.
        Err(_) => ExitCode::FAILURE,
    }
}
