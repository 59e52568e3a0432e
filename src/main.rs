use daas::configuration::config::Config;
use daas::controller::controller_handler::Controller;
use daas::error_handling::types::ControllerError;
use log::{error, info};

#[tokio::main]
async fn main() {
    // RUST_LOG overrides the default Info level
    // https://docs.rs/env_logger/latest/env_logger/
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .format_target(false)
        .init();

    info!("Importing configuration");

    let config = match Config::load().map_err(ControllerError::ConfigurationError) {
        Ok(config) => config,
        Err(e) => {
            error!("Unable to load configuration: {}, exiting...", e);
            std::process::exit(1);
        }
    };

    info!("Configuration imported successfully");

    let mut controller = Controller::new(config);

    let result = tokio::spawn(async move {
        info!("Spawning the controller");
        controller.run().await
    })
    .await;

    match result {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            error!("Error occured in the controller process: {}, exiting...", e);
            std::process::exit(1);
        }
        Err(e) => {
            error!("Error joining at the end of execution: {:?}", e);
            std::process::exit(1);
        }
    }
}
