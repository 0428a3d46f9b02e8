//! Ordering of voted articles for digests.
//!
//! Upvotes and stars count the same. Ties on the vote count go to the most
//! recently published article, undated articles sort after dated ones, and
//! the article id settles whatever is left so the order never depends on how
//! rows came out of the database.

use std::cmp::Ordering;

use crate::models::RankedArticle;

pub fn rank(mut entries: Vec<RankedArticle>, limit: usize) -> Vec<RankedArticle> {
    entries.sort_by(compare);
    entries.truncate(limit);
    entries
}

fn compare(a: &RankedArticle, b: &RankedArticle) -> Ordering {
    b.vote_count
        .cmp(&a.vote_count)
        .then_with(|| b.article.published_at.cmp(&a.article.published_at))
        .then_with(|| b.article.id.cmp(&a.article.id))
}
