use aws_config::BehaviorVersion;
use aws_sdk_s3::Client as S3Client;
use lambda_runtime::{run, service_fn, tracing, Error};

mod config;
mod deadline;
mod error;
mod event_handler;
mod request;
mod scan;
mod scanner;
mod store;
mod summary;
#[cfg(test)]
mod testing;

use config::Config;
use event_handler::function_handler;
use scan::ScanService;
use scanner::ClamScan;

#[tokio::main]
async fn main() -> Result<(), Error> {
    let config = Config::from_env()?;
    tracing::subscriber::fmt()
        .json()
        .with_max_level(config.log_level)
        .init();

    let shared_config = aws_config::load_defaults(BehaviorVersion::latest()).await;
    let s3_client = S3Client::new(&shared_config);
    let scanner = ClamScan::from_config(&config);
    tracing::info!(
        bucket = config.bucket.as_deref(),
        clamscan = %config.clamscan_path.display(),
        max_file_size = config.max_file_size,
        "Scanner configured"
    );

    let service = ScanService::new(config, s3_client, scanner);
    run(service_fn(|event| function_handler(event, &service))).await
}
