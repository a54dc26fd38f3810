//! Search query construction

use crate::state::{PostId, Window};

const QUERY_TIME_FORMAT: &str = "%Y-%m-%d_%H:%M:%S_UTC";

/// Builds the search expression for one page of a window
///
/// `keywords since:<since> until:<until> lang:<lang>`, plus `max_id:<cursor>`
/// when paging past the first page.
pub fn build_query(keywords: &str, lang: &str, window: Window, cursor: Option<&PostId>) -> String {
    let mut query = format!(
        "{} since:{} until:{} lang:{}",
        keywords,
        window.since.format(QUERY_TIME_FORMAT),
        window.until.format(QUERY_TIME_FORMAT),
        lang
    );
    if let Some(cursor) = cursor {
        query.push_str(" max_id:");
        query.push_str(cursor.as_str());
    }
    query
}
