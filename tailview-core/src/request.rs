//! # Stream Requests
//!
//! Turns filter criteria and the resume cursor into the URL used to open a stream.

use url::Url;

use crate::{error::TailResult, models::FilterCriteria};

/// Query parameter for [`FilterCriteria::connection_kind`].
pub const PARAM_CONNECTION: &str = "connection";
/// Query parameter for [`FilterCriteria::date`].
pub const PARAM_DATE: &str = "date";
/// Query parameter for [`FilterCriteria::tags`], comma-joined ascending.
pub const PARAM_TAGS: &str = "tags";
/// Query parameter for [`FilterCriteria::search_term`].
pub const PARAM_SEARCH: &str = "search";
/// Query parameter carrying the resume cursor.
pub const PARAM_LAST_EVENT_ID: &str = "lastEventId";

/// Resolves `endpoint` against `server_url`; absolute endpoints are used as-is.
///
/// # Errors
/// Returns [`crate::TailError::InvalidEndpoint`] when the result is not a valid URL.
pub fn resolve_endpoint(server_url: &Url, endpoint: &str) -> TailResult<Url> {
    match Url::parse(endpoint) {
        Ok(url) => Ok(url),
        Err(url::ParseError::RelativeUrlWithoutBase) => Ok(server_url.join(endpoint)?),
        Err(err) => Err(err.into()),
    }
}

/// Query pairs for every criterion that is set, in wire order.
#[must_use]
pub fn criteria_pairs(criteria: &FilterCriteria) -> Vec<(&'static str, String)> {
    let mut pairs = Vec::with_capacity(4);
    if let Some(kind) = criteria.connection_kind {
        pairs.push((PARAM_CONNECTION, kind.to_string()));
    }
    if let Some(date) = &criteria.date {
        pairs.push((PARAM_DATE, date.clone()));
    }
    if let Some(tags) = criteria.tags_param() {
        pairs.push((PARAM_TAGS, tags));
    }
    if let Some(search) = &criteria.search_term {
        pairs.push((PARAM_SEARCH, search.clone()));
    }
    pairs
}

/// Builds the stream URL.
///
/// Query parameters already on `endpoint` are kept unless they collide with a
/// filter parameter, in which case the filter value replaces them.
#[must_use]
pub fn build_stream_url(
    endpoint: &Url,
    criteria: &FilterCriteria,
    last_event_id: Option<&str>,
) -> Url {
    let mut pairs = criteria_pairs(criteria);
    if let Some(id) = last_event_id.filter(|id| !id.is_empty()) {
        pairs.push((PARAM_LAST_EVENT_ID, id.to_string()));
    }

    let preserved: Vec<(String, String)> = endpoint
        .query_pairs()
        .filter(|(key, _)| {
            let key: &str = key;
            !pairs.iter().any(|(name, _)| *name == key)
        })
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();

    let mut url = endpoint.clone();
    if preserved.is_empty() && pairs.is_empty() {
        url.set_query(None);
        return url;
    }

    {
        let mut query = url.query_pairs_mut();
        query.clear();
        for (key, value) in &preserved {
            query.append_pair(key, value);
        }
        for (key, value) in &pairs {
            query.append_pair(key, value);
        }
    }
    url
}

/// Points the `lastEventId` parameter of `url` at `id`.
///
/// The parameter keeps its position when present and is appended otherwise;
/// every other pair is left as it was.
#[must_use]
pub fn with_last_event_id(url: &Url, id: &str) -> Url {
    let mut replaced = false;
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .filter_map(|(key, value)| {
            if key != PARAM_LAST_EVENT_ID {
                return Some((key.into_owned(), value.into_owned()));
            }
            if replaced {
                return None;
            }
            replaced = true;
            Some((key.into_owned(), id.to_string()))
        })
        .collect();

    let mut url = url.clone();
    {
        let mut query = url.query_pairs_mut();
        query.clear();
        for (key, value) in &pairs {
            query.append_pair(key, value);
        }
        if !replaced {
            query.append_pair(PARAM_LAST_EVENT_ID, id);
        }
    }
    url
}
