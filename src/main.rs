use anyhow::{Context, Result};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use propsearch_client::api::{AuthApi, PropertiesApi};
use propsearch_client::config::{Command, Config, FilterArgs};
use propsearch_client::models::PropertyFilter;
use propsearch_client::{ApiClient, ApiError, RequestOptions, Session};

#[tokio::main]
async fn main() -> Result<()> {
    let (config, args) = Config::load()?;
    config.validate()?;

    // Initialize logging with a configured level
    let log_level = config.log_level.to_lowercase();
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::debug!(api_root = %config.api_root(), "Configuration loaded");

    let session = Session::init();
    let client = ApiClient::new(&config, session.clone())?;

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_ctrl_c(cancel.clone()));

    let result = run(&client, &args.command, args.email, args.password, cancel).await;
    session.dispose();

    match result {
        Ok(value) => {
            println!("{}", serde_json::to_string_pretty(&value)?);
            Ok(())
        }
        Err(ApiError::Aborted) => {
            tracing::info!("Cancelled");
            Ok(())
        }
        Err(e) => {
            if let Some(envelope) = e.envelope() {
                tracing::debug!(envelope = ?envelope, "Request failed");
            }
            Err(e).context("Request failed")
        }
    }
}

async fn run(
    client: &ApiClient,
    command: &Command,
    email: Option<String>,
    password: Option<String>,
    cancel: CancellationToken,
) -> Result<Value, ApiError> {
    if let (Some(email), Some(password)) = (email, password) {
        AuthApi::new(client.clone())
            .login(&email, &password, Some(cancel.clone()))
            .await?;
    }

    let properties = PropertiesApi::new(client.clone());

    match command {
        Command::Count(filter) => {
            let count = properties.count(&to_filter(filter), Some(cancel)).await?;
            Ok(serde_json::json!({ "count": count.count }))
        }
        Command::Listing(filter) => {
            let listing = properties
                .short_listing(&to_filter(filter), Some(cancel))
                .await?;
            Ok(serde_json::json!({ "total": listing.total, "data": listing.data }))
        }
        Command::Me => {
            let profile = AuthApi::new(client.clone()).me(Some(cancel)).await?;
            serde_json::to_value(profile).map_err(|e| ApiError::InvalidResponse(e.to_string()))
        }
        Command::Get { path } => {
            client
                .get(path, RequestOptions::new().signal(cancel))
                .await
        }
    }
}

fn to_filter(args: &FilterArgs) -> PropertyFilter {
    PropertyFilter {
        city: args.city.clone(),
        property_type: args.property_type.clone(),
        operation: args.operation.clone(),
        min_price: args.min_price,
        max_price: args.max_price,
        rooms: args.rooms,
        page: args.page,
        limit: args.limit,
        sort: None,
    }
}

/// Cancel in-flight requests on Ctrl+C
async fn cancel_on_ctrl_c(cancel: CancellationToken) {
    if tokio::signal::ctrl_c().await.is_ok() {
        tracing::info!("Received Ctrl+C signal, cancelling request...");
        cancel.cancel();
    }
}
