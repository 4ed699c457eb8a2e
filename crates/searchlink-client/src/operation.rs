//! Document operations and the query parameters each one accepts.

use searchlink_common::{Result, SearchlinkError};

/// Accepted by every operation
pub const COMMON_PARAMS: &[&str] = &["pretty", "human", "error_trace", "filter_path"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Index,
    Get,
    Update,
    Delete,
    Search,
}

impl Operation {
    pub fn name(self) -> &'static str {
        match self {
            Operation::Index => "index",
            Operation::Get => "get",
            Operation::Update => "update",
            Operation::Delete => "delete",
            Operation::Search => "search",
        }
    }

    /// Operation-specific query parameters, on top of [`COMMON_PARAMS`]
    pub fn allowed_params(self) -> &'static [&'static str] {
        match self {
            Operation::Index => &[
                "if_primary_term",
                "if_seq_no",
                "op_type",
                "pipeline",
                "refresh",
                "routing",
                "timeout",
                "version",
                "version_type",
                "wait_for_active_shards",
            ],
            Operation::Get => &[
                "_source",
                "_source_excludes",
                "_source_includes",
                "preference",
                "realtime",
                "refresh",
                "routing",
                "stored_fields",
                "version",
                "version_type",
            ],
            Operation::Update => &[
                "_source",
                "_source_excludes",
                "_source_includes",
                "if_primary_term",
                "if_seq_no",
                "lang",
                "refresh",
                "retry_on_conflict",
                "routing",
                "timeout",
                "wait_for_active_shards",
            ],
            Operation::Delete => &[
                "if_primary_term",
                "if_seq_no",
                "refresh",
                "routing",
                "timeout",
                "version",
                "version_type",
                "wait_for_active_shards",
            ],
            Operation::Search => &[
                "_source",
                "_source_excludes",
                "_source_includes",
                "allow_no_indices",
                "analyzer",
                "default_operator",
                "df",
                "expand_wildcards",
                "from",
                "ignore_unavailable",
                "preference",
                "q",
                "request_cache",
                "routing",
                "scroll",
                "search_type",
                "size",
                "sort",
                "timeout",
                "track_total_hits",
            ],
        }
    }

    pub fn accepts(self, param: &str) -> bool {
        COMMON_PARAMS.contains(&param) || self.allowed_params().contains(&param)
    }

    /// Checks every key against the allow-list and converts to owned pairs.
    pub fn validate_params(self, params: &[(&str, &str)]) -> Result<Vec<(String, String)>> {
        params
            .iter()
            .map(|(key, value)| {
                if self.accepts(key) {
                    Ok((key.to_string(), value.to_string()))
                } else {
                    Err(SearchlinkError::InvalidParam {
                        operation: self.name().to_string(),
                        param: key.to_string(),
                    })
                }
            })
            .collect()
    }
}

/// Percent-encodes one path segment. Empty segments are rejected since they
/// would silently address a different endpoint.
pub fn path_segment(name: &str, value: &str) -> Result<String> {
    if value.is_empty() {
        return Err(SearchlinkError::InvalidRequest(format!(
            "{} must not be empty",
            name
        )));
    }
    Ok(urlencoding::encode(value).into_owned())
}
