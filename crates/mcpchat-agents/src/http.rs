use mcpchat_common::{Error, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

/// POST `body` as JSON and decode the reply of a successful call.
///
/// Non-2xx replies become [`Error::Agent`] carrying the status and the raw
/// body so the user sees what the provider complained about.
pub(crate) async fn post_json<B, R>(
    request: reqwest::RequestBuilder,
    provider: &str,
    body: &B,
) -> Result<R>
where
    B: Serialize + ?Sized,
    R: DeserializeOwned,
{
    let response = request
        .json(body)
        .send()
        .await
        .map_err(|e| Error::Agent(format!("{provider} request failed: {e}")))?;

    let status = response.status();
    debug!("{provider} replied with {status}");
    if !status.is_success() {
        let detail = response.text().await.unwrap_or_default();
        return Err(Error::Agent(format!(
            "{provider} API error: status={status}, body={detail}"
        )));
    }

    response
        .json()
        .await
        .map_err(|e| Error::Agent(format!("failed to parse {provider} response: {e}")))
}

/// Join `path` onto a base URL that may or may not end in a slash.
pub(crate) fn endpoint(base_url: &str, path: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), path)
}
