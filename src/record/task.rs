use crate::crawler::EntryMode;
use crate::{UrlError, UrlResult};
use std::fmt;
use std::sync::Arc;
use url::Url;

/// Query parameter carrying the result offset on listing search pages
const OFFSET_PARAM: &str = "start";

/// What a task searches for
#[derive(Debug, Clone, PartialEq)]
pub enum TaskQuery {
    /// A keyword searched in a location
    Keyword { keyword: String, location: String },

    /// A ready-made search results URL
    SearchUrl(Url),
}

/// One unit of search work
///
/// Tasks are immutable once created. The orchestrator owns them and drops each one
/// when its pagination ends.
#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    /// Position of the task in the input list
    pub id: usize,

    pub query: TaskQuery,
}

impl Task {
    pub fn keyword(id: usize, keyword: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            id,
            query: TaskQuery::Keyword {
                keyword: keyword.into(),
                location: location.into(),
            },
        }
    }

    pub fn search_url(id: usize, url: Url) -> Self {
        Self {
            id,
            query: TaskQuery::SearchUrl(url),
        }
    }

    /// Short human-readable label used in logs and snapshot names
    pub fn label(&self) -> String {
        match &self.query {
            TaskQuery::Keyword { keyword, location } => format!("{} @ {}", keyword, location),
            TaskQuery::SearchUrl(url) => url.to_string(),
        }
    }

    /// Terms to search for when arriving through a search engine
    pub fn search_terms(&self) -> String {
        match &self.query {
            TaskQuery::Keyword { keyword, location } => format!("{} {}", keyword, location),
            TaskQuery::SearchUrl(url) => {
                let terms: Vec<String> = url
                    .query_pairs()
                    .filter(|(k, _)| k == "find_desc" || k == "find_loc")
                    .map(|(_, v)| v.into_owned())
                    .collect();
                if terms.is_empty() {
                    url.to_string()
                } else {
                    terms.join(" ")
                }
            }
        }
    }

    /// Builds the URL of a search results page
    ///
    /// # Arguments
    ///
    /// * `base` - The listing site's base URL (keyword tasks only)
    /// * `page` - 1-based page number
    /// * `page_size` - Results per page, used to compute the offset
    ///
    /// # Returns
    ///
    /// * `Ok(Url)` - The page URL; page 1 carries no offset parameter
    /// * `Err(UrlError)` - The base URL cannot be joined
    pub fn page_url(&self, base: &Url, page: u32, page_size: u32) -> UrlResult<Url> {
        let mut url = match &self.query {
            TaskQuery::Keyword { keyword, location } => {
                let mut url = base
                    .join("/search")
                    .map_err(|e| UrlError::Parse(e.to_string()))?;
                url.query_pairs_mut()
                    .append_pair("find_desc", keyword)
                    .append_pair("find_loc", location);
                url
            }
            TaskQuery::SearchUrl(url) => {
                let kept: Vec<(String, String)> = url
                    .query_pairs()
                    .filter(|(k, _)| k != OFFSET_PARAM)
                    .map(|(k, v)| (k.into_owned(), v.into_owned()))
                    .collect();
                let mut url = url.clone();
                url.set_query(None);
                if !kept.is_empty() {
                    url.query_pairs_mut().extend_pairs(kept);
                }
                url
            }
        };

        if page > 1 {
            let offset = (page - 1) * page_size;
            url.query_pairs_mut()
                .append_pair(OFFSET_PARAM, &offset.to_string());
        }

        Ok(url)
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task {} ({})", self.id, self.label())
    }
}

/// A business detail page waiting to be processed
#[derive(Debug, Clone)]
pub struct PendingDetail {
    /// Normalized detail page URL
    pub url: Url,

    /// Task whose search results listed this business
    pub task: Arc<Task>,

    /// Entry mode the task arrived with
    pub entry_mode: EntryMode,

    /// Referer to present when navigating to the detail page
    pub referer: Option<String>,
}
