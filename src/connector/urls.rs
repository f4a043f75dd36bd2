use crate::connector::{ConnectorError, Result};
use url::Url;

/// Fail unless `url` is absolute (has a scheme)
pub fn ensure_absolute(url: &str) -> Result<()> {
    Url::parse(url)
        .map(|_| ())
        .map_err(|_| ConnectorError::NotAbsolute(url.to_string()))
}

/// Resolve `reference` against `base` the way a browser would
pub fn join_url(base: &str, reference: &str) -> Result<String> {
    let invalid = |source| ConnectorError::InvalidUrl {
        base: base.to_string(),
        reference: reference.to_string(),
        source,
    };
    let base_url = Url::parse(base).map_err(invalid)?;
    let joined = base_url.join(reference).map_err(invalid)?;
    Ok(joined.to_string())
}

/// Append `pairs` to the query string of `base`
pub fn with_query<K, V>(base: &str, pairs: &[(K, V)]) -> Result<String>
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut url = Url::parse(base).map_err(|_| ConnectorError::NotAbsolute(base.to_string()))?;
    {
        let mut query = url.query_pairs_mut();
        for (key, value) in pairs {
            query.append_pair(key.as_ref(), value.as_ref());
        }
    }
    Ok(url.to_string())
}
