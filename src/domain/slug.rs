//! Slug resolution for permalinks.
//!
//! Incoming links may be absolute (`https://example.com/2020/01/15/my-post/`)
//! or site-relative (`/tag/rust/?page=2`). Both resolve to the slug the cache
//! indexes (`my-post`, `tag/rust`). Legacy date permalinks drop their
//! `YYYY/MM/DD/` segment.

use url::Url;

use super::error::FetchError;

const RELATIVE_BASE: &str = "http://localhost/";
const DATE_SEGMENT_LEN: usize = "0000/00/00/".len();

/// Derive the cache slug for a permalink.
///
/// Query strings and fragments never take part in the result.
pub fn slug_from_url(input: &str) -> Result<String, FetchError> {
    if input.is_empty() || input.chars().any(char::is_whitespace) {
        return Err(FetchError::malformed(format!("`{input}` is not a url")));
    }

    let url = parse(input)?;
    let path = urlencoding::decode(url.path())
        .map_err(|err| FetchError::malformed(format!("`{input}` has an invalid path: {err}")))?;

    let lowered = path.to_lowercase();
    let slug = strip_date_segment(&lowered).trim_matches('/').to_string();

    if slug.is_empty() {
        return Err(FetchError::malformed(format!(
            "`{input}` has no path to derive a slug from"
        )));
    }

    Ok(slug)
}

/// Case-insensitive slug equality.
pub fn slugs_match(left: &str, right: &str) -> bool {
    left.chars()
        .flat_map(char::to_lowercase)
        .eq(right.chars().flat_map(char::to_lowercase))
}

/// Key under which a slug is indexed.
pub fn slug_key(slug: &str) -> String {
    slug.to_lowercase()
}

fn parse(input: &str) -> Result<Url, FetchError> {
    match Url::parse(input) {
        Ok(url) => Ok(url),
        Err(url::ParseError::RelativeUrlWithoutBase) => Url::parse(RELATIVE_BASE)
            .and_then(|base| base.join(input))
            .map_err(|err| FetchError::malformed(format!("`{input}` is not a url: {err}"))),
        Err(err) => Err(FetchError::malformed(format!(
            "`{input}` is not a url: {err}"
        ))),
    }
}

/// Remove the first `NNNN/NN/NN/` run from `path`.
fn strip_date_segment(path: &str) -> String {
    match find_date_segment(path.as_bytes()) {
        Some(start) => {
            let mut stripped = String::with_capacity(path.len() - DATE_SEGMENT_LEN);
            stripped.push_str(&path[..start]);
            stripped.push_str(&path[start + DATE_SEGMENT_LEN..]);
            stripped
        }
        None => path.to_string(),
    }
}

fn find_date_segment(bytes: &[u8]) -> Option<usize> {
    if bytes.len() < DATE_SEGMENT_LEN {
        return None;
    }

    (0..=bytes.len() - DATE_SEGMENT_LEN).find(|&start| {
        let window = &bytes[start..start + DATE_SEGMENT_LEN];
        window.iter().enumerate().all(|(index, byte)| match index {
            4 | 7 | 10 => *byte == b'/',
            _ => byte.is_ascii_digit(),
        })
    })
}
