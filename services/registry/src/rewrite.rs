//! Repository-name path rewriting
//!
//! V2 repository names may contain slashes (`a/b/c`), which no fixed
//! route pattern can capture in the middle of a path. Before routing we
//! percent-encode the slashes inside the name segment; axum decodes path
//! parameters, so handlers see the original slashed name in `{name}`.

use std::sync::LazyLock;

use axum::extract::Request;
use axum::http::Uri;
use axum::middleware::Next;
use axum::response::Response;
use regex::Regex;

/// Route shapes whose first capture is the repository name. References,
/// digests, and upload ids never contain slashes, so the greedy name
/// group always stops at the right segment.
static NAME_ROUTES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"^/v2/(.+)/tags/list$",
        r"^/v2/(.+)/manifests/[^/]+$",
        r"^/v2/(.+)/blobs/uploads/$",
        r"^/v2/(.+)/blobs/uploads/[^/]+$",
        r"^/v2/(.+)/blobs/[^/]+$",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("route patterns are valid"))
    .collect()
});

/// Encode the name segment of a V2 path. Returns `None` when the path is
/// not a named route or the name has no slashes to encode.
fn encode_name(path: &str) -> Option<String> {
    for route in NAME_ROUTES.iter() {
        if let Some(captures) = route.captures(path) {
            let name = captures.get(1).expect("route patterns capture the name");
            if !name.as_str().contains('/') {
                return None;
            }

            let mut rewritten = String::with_capacity(path.len() + 8);
            rewritten.push_str(&path[..name.start()]);
            rewritten.push_str(&name.as_str().replace('/', "%2F"));
            rewritten.push_str(&path[name.end()..]);
            return Some(rewritten);
        }
    }

    None
}

/// Middleware that rewrites slashed repository names before routing.
pub(crate) async fn rewrite_name_paths(mut request: Request, next: Next) -> Response {
    if let Some(path) = encode_name(request.uri().path()) {
        let path_and_query = match request.uri().query() {
            Some(query) => format!("{path}?{query}"),
            None => path,
        };

        let mut parts = request.uri().clone().into_parts();
        parts.path_and_query = Some(path_and_query.parse().expect("rewritten path is valid"));
        *request.uri_mut() = Uri::from_parts(parts).expect("rewritten uri is valid");

        tracing::trace!(uri = %request.uri(), "rewrote repository path");
    }

    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_slashed_names_in_every_route_shape() {
        let cases = [
            ("/v2/a/b/c/tags/list", "/v2/a%2Fb%2Fc/tags/list"),
            ("/v2/a/b/manifests/v1.0", "/v2/a%2Fb/manifests/v1.0"),
            ("/v2/a/b/manifests/sha256:abc", "/v2/a%2Fb/manifests/sha256:abc"),
            ("/v2/a/b/blobs/uploads/", "/v2/a%2Fb/blobs/uploads/"),
            ("/v2/a/b/blobs/uploads/uuid-1", "/v2/a%2Fb/blobs/uploads/uuid-1"),
            ("/v2/a/b/blobs/sha256:abc", "/v2/a%2Fb/blobs/sha256:abc"),
        ];

        for (path, expected) in cases {
            assert_eq!(encode_name(path).as_deref(), Some(expected), "{path}");
        }
    }

    #[test]
    fn plain_names_are_left_alone() {
        assert_eq!(encode_name("/v2/plain/manifests/latest"), None);
        assert_eq!(encode_name("/v2/plain/blobs/uploads/"), None);
    }

    #[test]
    fn unrelated_paths_are_left_alone() {
        assert_eq!(encode_name("/v2/"), None);
        assert_eq!(encode_name("/v2/_catalog"), None);
        assert_eq!(encode_name("/api/v1/repositories"), None);
    }

    #[test]
    fn name_swallows_nested_route_words() {
        // The last matching segment wins, since references cannot
        // contain slashes.
        assert_eq!(
            encode_name("/v2/a/manifests/b/manifests/v1").as_deref(),
            Some("/v2/a%2Fmanifests%2Fb/manifests/v1")
        );
    }
}
