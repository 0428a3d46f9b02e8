mod article;
mod user;
mod vote;

pub use article::{Article, NewArticle, RankedArticle};
pub use user::{SubscriptionChange, User};
pub use vote::{Vote, VoteKind};
