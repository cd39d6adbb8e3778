//! GitHub REST client.
//!
//! The hosting platform is the only backend: repositories, forks, branches, file
//! contents and pull requests are all reached through this module.
//!
//! - `client`: request execution with retry/backoff and the typed operations
//! - `error`: the closed failure variant every caller matches on
//! - `rate_limit`: quota header inspection and warnings
//! - `types`: wire payloads

mod client;
mod error;
mod rate_limit;
mod types;

pub use client::GitHubClient;
pub use error::{ErrorBody, GitHubError};
pub use rate_limit::{RateLimitMonitor, RateLimitSnapshot, RateLimitWarning, WarningSink};
pub use types::{
    Account, AuthenticatedUser, Branch, CommitAuthor, CommitDetail, CommitRef, CommitSummary,
    Comparison, ContentRef, DirectoryEntry, EntryKind, FileContent, GitObject, GitRef,
    MergeUpstreamResponse, NewPullRequest, PullRequest, PullRequestRef, PutFileRequest,
    PutFileResponse, Repository,
};
