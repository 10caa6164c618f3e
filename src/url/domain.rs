use crate::{UrlError, UrlResult};
use url::Url;

/// Extracts the host from a URL
///
/// This function retrieves the host portion of a URL and converts it to lowercase.
/// If the URL has no host (which shouldn't happen for valid HTTP(S) URLs), it returns None.
///
/// # Examples
///
/// ```
/// use url::Url;
/// use whateley_fetch::url::extract_host;
///
/// let url = Url::parse("http://WhateleyAcademy.net/images/a.jpg").unwrap();
/// assert_eq!(extract_host(&url), Some("whateleyacademy.net".to_string()));
/// ```
pub fn extract_host(url: &Url) -> Option<String> {
    url.host_str().map(|h| h.to_lowercase())
}

/// Derives the cache key for an asset URL
///
/// Assets are only cached for the site's own host; the key is the escaped
/// path, so the same image requested with a different query or scheme still
/// hits the same row.
///
/// # Arguments
///
/// * `url` - The asset URL
/// * `allowed_host` - The site host taken from the configured base URL
///
/// # Returns
///
/// * `Ok(String)` - The escaped path of the asset
/// * `Err(UrlError::ForeignHost)` - The asset lives on another host
pub fn asset_cache_key(url: &Url, allowed_host: &str) -> UrlResult<String> {
    match extract_host(url) {
        Some(host) if host == allowed_host.to_lowercase() => Ok(url.path().to_string()),
        _ => Err(UrlError::ForeignHost {
            url: url.to_string(),
            expected: allowed_host.to_string(),
        }),
    }
}
