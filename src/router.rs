//! Radix-tree request router.
//!
//! One tree per HTTP method, O(path-length) lookup via [`matchit`]. Beyond
//! the handler, every registration keeps the route template it was
//! registered under; a match hands the template back so log lines and
//! metrics aggregate on `/users/{id}` instead of one entry per user.

use std::collections::HashMap;
use std::sync::Arc;

use http::Method;
use matchit::Router as MatchitRouter;

use crate::handler::{BoxedHandler, Handler};
use crate::lifecycle::RouteInfo;

struct Route {
    handler: BoxedHandler,
    template: String,
}

/// The result of a successful lookup: the handler plus the resolved
/// [`RouteInfo`] to attach to the request.
pub(crate) struct RouteMatch {
    pub handler: BoxedHandler,
    pub info: RouteInfo,
}

/// The application router.
///
/// Build it once at startup; pass it to
/// [`Server::serve`](crate::Server::serve). Each registration returns
/// `self` so calls chain naturally. Path parameters use `{name}` syntax and
/// are read back with
/// [`Exchange::path_value`](crate::Exchange::path_value).
pub struct Router {
    routes: HashMap<Method, MatchitRouter<Route>>,
}

impl Router {
    pub fn new() -> Self {
        Self {
            routes: HashMap::new(),
        }
    }

    /// Register a handler for a method + path pair.
    ///
    /// # Panics
    ///
    /// Panics if the path is not a valid route pattern or conflicts with an
    /// existing registration. Routes are wired at startup; a bad table is a
    /// programming error, not a runtime condition.
    pub fn on(mut self, method: Method, path: &str, handler: impl Handler) -> Self {
        let route = Route {
            handler: handler.into_boxed_handler(),
            template: path.to_owned(),
        };
        self.routes
            .entry(method)
            .or_default()
            .insert(path, route)
            .unwrap_or_else(|e| panic!("invalid route `{path}`: {e}"));
        self
    }

    pub fn get(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::GET, path, handler)
    }

    pub fn post(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::POST, path, handler)
    }

    pub fn put(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::PUT, path, handler)
    }

    pub fn delete(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::DELETE, path, handler)
    }

    pub(crate) fn lookup(&self, method: &Method, path: &str) -> Option<RouteMatch> {
        let tree = self.routes.get(method)?;
        let matched = tree.at(path).ok()?;
        let params = matched
            .params
            .iter()
            .map(|(k, v)| (k.to_owned(), v.to_owned()))
            .collect();
        Some(RouteMatch {
            handler: Arc::clone(&matched.value.handler),
            info: RouteInfo::new(&matched.value.template).with_params(params),
        })
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::finish::Finished;
    use crate::lifecycle::Exchange;

    async fn noop(ex: Exchange) -> Finished {
        ex.no_content()
    }

    #[test]
    fn lookup_returns_template_and_params() {
        let router = Router::new().get("/users/{id}", noop);
        let matched = router.lookup(&Method::GET, "/users/42").unwrap();
        assert_eq!(matched.info.template, "/users/{id}");
        assert_eq!(matched.info.param("id"), Some("42"));
    }

    #[test]
    fn method_mismatch_is_a_miss() {
        let router = Router::new().get("/users/{id}", noop);
        assert!(router.lookup(&Method::POST, "/users/42").is_none());
        assert!(router.lookup(&Method::GET, "/nope").is_none());
    }

    #[test]
    fn sugar_registers_the_right_methods() {
        let router = Router::new()
            .get("/r", noop)
            .post("/r", noop)
            .put("/r", noop)
            .delete("/r", noop);
        for method in [Method::GET, Method::POST, Method::PUT, Method::DELETE] {
            assert!(router.lookup(&method, "/r").is_some(), "{method}");
        }
    }
}
