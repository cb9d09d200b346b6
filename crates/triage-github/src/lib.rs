//! Repository-scoped GitHub REST and GraphQL gateway.
//!
//! All pagination, pull-request filtering and response normalization happen
//! here so that callers only ever see the canonical records in [`model`].

mod config;
mod error;
mod gateway;
mod graphql;
pub mod model;
mod transport;

pub use config::{GatewayConfig, RepoRef, DEFAULT_GITHUB_API_BASE, DEFAULT_GITHUB_GRAPHQL_URL};
pub use error::GatewayError;
pub use gateway::{GithubGateway, IssueQuery, IssueSort, IssueStateFilter, SortDirection};
pub use graphql::lacks_status_field;
pub use model::{
    Actor, Discussion, DiscussionComment, DiscussionPage, Issue, IssueLabel, IssueState, Label,
    ProjectFieldValue, ProjectIssue, ProjectItem, TimelineEvent,
};
