use log::debug;

use super::args::Args;
use crate::{
    core::{ApiKey, ChatError, ChatLoop, Config, CsvFileSink, Level, Logger, Termination},
    providers::GeminiConnector,
};
use std::io;
use tokio::io::BufReader;

/// Builds the session config from the config file and command line overrides,
/// and resolves the API key from the environment.
///
/// # Arguments
/// * `args` - Parsed command line arguments
///
/// # Returns
/// The validated configuration; `api_key` is `None` when no key is set
fn load_config(args: &Args) -> Result<Config, ChatError> {
    let mut config = Config::load(args.config.as_deref())?;

    if let Some(model) = &args.model {
        config.update_model(model.as_str());
        config.validate()?;
    }
    if args.no_stream {
        config.stream = false;
    }
    if args.log_file.is_some() {
        config.log_file.clone_from(&args.log_file);
    }
    config.api_key = ApiKey::from_env();

    Ok(config)
}

pub async fn run(args: Args) -> Result<Termination, ChatError> {
    let _ = dotenv::dotenv();

    let logger = Logger::stderr();
    let config = load_config(&args).inspect_err(|e| logger.report(Level::Critical, e))?;

    if let Some(path) = &config.log_file {
        match CsvFileSink::open(path) {
            Ok(sink) => logger.attach(sink),
            Err(e) => logger.error(format!("Cannot write log file {}: {e}", path.display())),
        }
    }
    logger.info("Starting Gemini client...");

    debug!(
        "[SETTINGS] model: {}, stream: {}, context_window: {}, max_turns: {}",
        config.model(),
        config.stream,
        config.context_window,
        config.max_turns
    );

    let mut chat = ChatLoop::start(config, &GeminiConnector, &logger)
        .inspect_err(|e| logger.report(Level::Critical, e))?;

    let mut stdin = BufReader::new(tokio::io::stdin());
    let mut stdout = io::stdout();
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            debug!("[Signal] cannot listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    Ok(chat.run(&mut stdin, &mut stdout, shutdown).await)
}
