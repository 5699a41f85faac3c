//! Static URL routing table.
//!
//! One table of `(method, prefix, exact)` tuples instead of a chain of
//! string compares; prefix routes hand the remainder of the target to
//! their handler.

use crate::http::Method;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteKind {
    /// `POST /api/ota` — firmware upload into the staging slot.
    PostOta,
    /// `POST /api/ot2` — same pipeline, activation withheld.
    PostOtaDryRun,
    /// `POST /api/flash/<hex-start>` — raw write at an explicit address.
    PostFlashAt,
    /// `GET /api/flash/<hex-start>-<hex-len>` — raw read-back.
    GetFlashRange,
    /// `POST /api/fsblock` — rewrite the file-store backing region.
    PostFsBlock,
    /// `POST /api/lfs/<path>` — file upload into the store.
    PostStoreFile,
}

pub struct Route {
    pub method: Method,
    pub prefix: &'static str,
    pub exact: bool,
    pub kind: RouteKind,
}

const ROUTES: &[Route] = &[
    Route { method: Method::Post, prefix: "api/ota", exact: true, kind: RouteKind::PostOta },
    Route { method: Method::Post, prefix: "api/ot2", exact: true, kind: RouteKind::PostOtaDryRun },
    Route { method: Method::Post, prefix: "api/fsblock", exact: true, kind: RouteKind::PostFsBlock },
    Route { method: Method::Post, prefix: "api/flash/", exact: false, kind: RouteKind::PostFlashAt },
    Route { method: Method::Get, prefix: "api/flash/", exact: false, kind: RouteKind::GetFlashRange },
    Route { method: Method::Post, prefix: "api/lfs/", exact: false, kind: RouteKind::PostStoreFile },
];

/// Resolves a request to a route.
///
/// Returns the route kind and, for prefix routes, the rest of the target
/// after the prefix (the address range or store path).
pub fn resolve(method: Method, target: &str) -> Option<(RouteKind, &str)> {
    for route in ROUTES {
        if route.method != method {
            continue;
        }
        if route.exact {
            if target == route.prefix {
                return Some((route.kind, ""));
            }
        } else if let Some(rest) = target.strip_prefix(route.prefix) {
            return Some((route.kind, rest));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_routes_match_exactly() {
        assert_eq!(
            resolve(Method::Post, "api/ota"),
            Some((RouteKind::PostOta, ""))
        );
        assert_eq!(resolve(Method::Post, "api/ota2"), None);
        assert_eq!(resolve(Method::Get, "api/ota"), None);
    }

    #[test]
    fn prefix_routes_return_the_remainder() {
        assert_eq!(
            resolve(Method::Post, "api/flash/12a000"),
            Some((RouteKind::PostFlashAt, "12a000"))
        );
        assert_eq!(
            resolve(Method::Get, "api/flash/100000-10000"),
            Some((RouteKind::GetFlashRange, "100000-10000"))
        );
        assert_eq!(
            resolve(Method::Post, "api/lfs/a/b/c.txt"),
            Some((RouteKind::PostStoreFile, "a/b/c.txt"))
        );
    }

    #[test]
    fn dry_run_and_fsblock() {
        assert_eq!(
            resolve(Method::Post, "api/ot2"),
            Some((RouteKind::PostOtaDryRun, ""))
        );
        assert_eq!(
            resolve(Method::Post, "api/fsblock"),
            Some((RouteKind::PostFsBlock, ""))
        );
    }

    #[test]
    fn unknown_targets_do_not_resolve() {
        assert_eq!(resolve(Method::Get, "api/unknown"), None);
        assert_eq!(resolve(Method::Post, "something/else"), None);
    }
}
