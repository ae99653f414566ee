//! Credential-injecting [`HttpClient`](super::HttpClient) wrappers.

mod path_key;

pub use path_key::PathKey;
