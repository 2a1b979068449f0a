//! URL handling: tolerant parsing of user input, `/.git` base normalization,
//! and the mapping from a base URL to a local directory name.

use url::Url;

use crate::error::DumpError;
use crate::paths::ROOT_DIR;

const MAX_DIRECTORY_NAME: usize = 150;

/// Parse a URL, tolerating a missing scheme; `https` is assumed.
pub fn parse_url_or_domain(input: &str) -> Result<Url, DumpError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(DumpError::InvalidUrl(input.to_string()));
    }
    let candidate = if input.contains("://") {
        input.to_string()
    } else {
        format!("https://{input}")
    };
    let url =
        Url::parse(&candidate).map_err(|_| DumpError::InvalidUrl(input.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(DumpError::InvalidUrl(input.to_string()));
    }
    Ok(url)
}

/// Expand one line of user input. A bare domain has no scheme to trust, so
/// it yields both the `http://` and `https://` variants; anything with an
/// explicit scheme stays as-is.
pub fn expand_input(input: &str) -> Result<Vec<Url>, DumpError> {
    let https = parse_url_or_domain(input)?;
    if input.trim().contains("://") {
        return Ok(vec![https]);
    }
    let mut http = https.clone();
    http.set_scheme("http")
        .expect("http is a valid scheme for an http(s) url");
    Ok(vec![http, https])
}

/// Normalize a crawl base so its path ends with `/.git`, dropping any query
/// or fragment.
pub fn normalize_base(url: &Url) -> Url {
    let mut url = url.clone();
    url.set_query(None);
    url.set_fragment(None);
    let path = url.path().trim_end_matches('/').to_string();
    if path.ends_with("/.git") {
        url.set_path(&path);
    } else {
        url.set_path(&format!("{path}/{ROOT_DIR}"));
    }
    url
}

/// Absolute URL for one repository-relative path.
pub(crate) fn item_url(base: &Url, path: &str) -> Result<Url, url::ParseError> {
    Url::parse(&format!("{}/{}", base.as_str().trim_end_matches('/'), path))
}

/// Local directory name for a base URL: the URL minus its `/.git` suffix,
/// lowercased, with `/`, `.` and spaces turned into underscores, all other
/// special characters dropped, and the result capped at 150 characters.
pub fn directory_name(base: &Url) -> String {
    let spelled = base.as_str().trim_end_matches('/');
    let spelled = spelled.strip_suffix("/.git").unwrap_or(spelled);

    let mut name = String::with_capacity(spelled.len());
    for ch in spelled.to_lowercase().chars() {
        match ch {
            '/' | '.' | ' ' => name.push('_'),
            'a'..='z' | '0'..='9' | '_' | '-' => name.push(ch),
            _ => {}
        }
    }
    name.truncate(MAX_DIRECTORY_NAME);
    name
}
