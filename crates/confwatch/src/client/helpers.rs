//! Pure helpers: key paths, URLs, form bodies (no HTTP, no status logic).

use url::form_urlencoded;
use url::Url;

use crate::error::{ConfError, ConfResult};

/// Versioned keys endpoint, relative to the store base URL.
const KEYS_PREFIX: [&str; 2] = ["v2", "keys"];

/// Parse and check a store base URL.
pub(crate) fn parse_endpoint(endpoint: &str) -> ConfResult<Url> {
    let url = Url::parse(endpoint).map_err(|e| ConfError::Config {
        message: format!("invalid endpoint {:?}: {}", endpoint, e),
    })?;
    if url.cannot_be_a_base() {
        return Err(ConfError::Config {
            message: format!("endpoint {:?} cannot be a base URL", endpoint),
        });
    }
    Ok(url)
}

/// Split a dotted key ("a.b.c") into path segments ("a", "b", "c").
pub(crate) fn key_to_segments(key: &str) -> impl Iterator<Item = &str> {
    key.split('.')
}

/// URL of `key` under the keys endpoint. Segments are percent-escaped.
pub(crate) fn keys_url(endpoint: &Url, key: &str) -> ConfResult<Url> {
    let mut url = endpoint.clone();
    url.set_query(None);
    url.path_segments_mut()
        .map_err(|_| ConfError::Config {
            message: format!("endpoint {} cannot be a base URL", endpoint),
        })?
        .pop_if_empty()
        .extend(KEYS_PREFIX)
        .extend(key_to_segments(key));
    Ok(url)
}

/// Long-poll URL. With `after`, waits for the first change past that index.
pub(crate) fn wait_url(
    endpoint: &Url,
    key: &str,
    recursive: bool,
    after: Option<u64>,
) -> ConfResult<Url> {
    let mut url = keys_url(endpoint, key)?;
    {
        let mut query = url.query_pairs_mut();
        query.append_pair("wait", "true");
        if let Some(index) = after {
            // Exclusive: the last observed index was already delivered.
            query.append_pair("waitIndex", &index.saturating_add(1).to_string());
        }
        query.append_pair("recursive", if recursive { "true" } else { "false" });
    }
    Ok(url)
}

/// Form-encode write parameters.
pub(crate) fn encode_form(params: &[(&str, &str)]) -> String {
    form_urlencoded::Serializer::new(String::new())
        .extend_pairs(params)
        .finish()
}

/// Truncate a response body for use in an error message.
pub(crate) fn body_snippet(body: &str) -> String {
    body.trim().chars().take(200).collect()
}
