//! Raw API access through the authenticated client.

use super::{describe, Context};
use crate::output;
use anyhow::Result;
use auth_session::ApiRequest;
use tracing::debug;

/// GET a path and print the response body.
pub async fn get(ctx: &Context, path: &str) -> Result<()> {
    let path = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    };

    let response = match ctx.client.send(ApiRequest::get(path.as_str())).await {
        Ok(response) => response,
        Err(e) => anyhow::bail!("GET {} failed: {}", path, describe(&e)),
    };
    debug!(path = %path, status = response.status, body_summary = %response.body_summary(), "GET complete");

    match serde_json::from_str::<serde_json::Value>(&response.body) {
        Ok(value) => output::print_value(&value, &ctx.format),
        Err(_) => println!("{}", response.body),
    }
    Ok(())
}
