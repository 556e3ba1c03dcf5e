use std::path::Path;

use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::error::{Error, HttpError};
use crate::transport::{ReqwestClient, RequestParams};

/// Loads a specification document from disk.
///
/// `.yaml`/`.yml` files parse as YAML, everything else as JSON. The parsed
/// document is the same generic value either way, so a spec round-trips
/// identically between the two formats.
///
/// # Errors
///
/// Fails with [`Error::Io`] when the file is absent or unreadable
/// (surfaced unmodified), or with [`Error::Json`]/[`Error::Yaml`] when it
/// does not parse.
pub async fn load_file(path: impl AsRef<Path>) -> Result<Value, Error> {
    let path = path.as_ref();
    debug!(?path, "loading specification file");
    let bytes = tokio::fs::read(path).await?;
    let yaml = path
        .extension()
        .and_then(|extension| extension.to_str())
        .is_some_and(|extension| extension.eq_ignore_ascii_case("yaml")
            || extension.eq_ignore_ascii_case("yml"));
    parse_document(&bytes, yaml)
}

/// Fetches a specification document over HTTP.
///
/// Goes through the raw (operation-less) future path: the response is not
/// unmarshalled, but a non-2xx status here means there is no document and
/// is an error. YAML is detected from the URL suffix or the response
/// content type; everything else parses as JSON.
///
/// # Errors
///
/// Fails with [`Error::Http`] for a non-2xx status, with transport or
/// timeout errors from the fetch, or with parse errors as in
/// [`load_file`].
pub async fn load_url(client: &ReqwestClient, url: &Url) -> Result<Value, Error> {
    debug!(%url, "fetching specification document");
    let params = RequestParams::new(http::Method::GET, url.clone());
    let future = client.request(params, None)?;
    let Some(mut response) = future.result(None).await?.into_response() else {
        return Err(Error::SpecFormat {
            message: "specification fetch produced no response".to_string(),
        });
    };

    if !response.status_code().is_success() {
        return Err(HttpError::new(response).into());
    }

    let yaml = wants_yaml(url, response.content_type().as_ref());
    let bytes = response.raw_bytes().await?;
    parse_document(&bytes, yaml)
}

fn wants_yaml(url: &Url, content_type: Option<&mime::Mime>) -> bool {
    let path = url.path();
    if path.ends_with(".yaml") || path.ends_with(".yml") {
        return true;
    }
    content_type.is_some_and(|mime| mime.subtype() == "yaml" || mime.suffix().is_some_and(|suffix| suffix == "yaml"))
}

fn parse_document(bytes: &[u8], yaml: bool) -> Result<Value, Error> {
    if yaml {
        Ok(serde_yaml::from_slice(bytes)?)
    } else {
        Ok(serde_json::from_slice(bytes)?)
    }
}
