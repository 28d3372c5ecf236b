//! Recognized query-string parameters

use std::collections::HashMap;

use data_common::error::{Error, Result};

/// Raw values of the parameters the executor understands
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams {
    /// `where`: JSON filter expression
    pub filter: Option<String>,
    pub limit: Option<String>,
    pub offset: Option<String>,
    /// `fields`: comma-separated projection
    pub fields: Option<String>,
}

impl QueryParams {
    /// Parse an `application/x-www-form-urlencoded` query string.
    /// Unrecognized parameters are ignored.
    pub fn parse(query_string: &str) -> Self {
        let mut params: HashMap<String, String> =
            url::form_urlencoded::parse(query_string.as_bytes())
                .into_owned()
                .collect();

        Self {
            filter: params.remove("where"),
            limit: params.remove("limit"),
            offset: params.remove("offset"),
            fields: params.remove("fields"),
        }
    }

    /// Requested `limit`, if any
    pub fn limit(&self) -> Result<Option<u64>> {
        parse_count("limit", self.limit.as_deref())
    }

    /// Requested `offset`, if any
    pub fn offset(&self) -> Result<Option<u64>> {
        parse_count("offset", self.offset.as_deref())
    }

    #[must_use]
    pub fn fields(&self) -> &str {
        self.fields.as_deref().unwrap_or("")
    }
}

fn parse_count(name: &str, raw: Option<&str>) -> Result<Option<u64>> {
    match raw.map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => value
            .parse()
            .map(Some)
            .map_err(|_| Error::InvalidQueryParam(name.to_string())),
    }
}
