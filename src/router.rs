//! Backend route trees.
//!
//! One radix tree per HTTP method, O(path-length) lookup via [`matchit`].
//! A [`RouteTree`] is built once at startup and never mutated afterwards; the
//! gateway holds two of them, one per backend, behind [`RouteMatcher`].
//!
//! Path syntax:
//!
//! - `/calls`: static
//! - `/calls/{id}`: one segment, available as `req.param("id")`
//! - `/webhooks/{id:[0-9]+}`: one segment that must match the regex
//! - `/files/{*rest}`: catch-all tail

use std::collections::HashMap;
use std::sync::Arc;

use matchit::Router as MatchitRouter;
use regex::Regex;

use crate::error::Error;
use crate::handler::{BoxedHandler, Handler};
use crate::method::Method;

/// A successful lookup: the handler plus the captured path parameters.
pub struct RouteMatch {
    pub handler: BoxedHandler,
    pub params: HashMap<String, String>,
}

/// Maps a method and a prefix-relative path to a handler.
///
/// Each backend's matching policy is one implementation of this trait, so the
/// dispatcher never depends on a specific matching engine.
pub trait RouteMatcher: Send + Sync + 'static {
    fn route(&self, method: &http::Method, path: &str) -> Option<RouteMatch>;

    /// Methods that would match `path`. Used to answer 405 instead of 404.
    fn allowed_methods(&self, _path: &str) -> Vec<Method> {
        Vec::new()
    }
}

/// One registration. Parameters are stored under positional keys in the
/// matchit tree, so `names` maps them back to the names this route declared.
struct Route {
    pattern: String,
    handler: BoxedHandler,
    names: Vec<(String, String)>,
    constraints: Vec<(String, Regex)>,
}

impl Route {
    fn accepts(&self, params: &matchit::Params<'_, '_>) -> bool {
        self.constraints.iter().all(|(key, re)| {
            params.get(key).is_some_and(|value| re.is_match(value))
        })
    }

    fn name_of<'k>(&'k self, key: &'k str) -> &'k str {
        self.names
            .iter()
            .find(|(positional, _)| positional == key)
            .map_or(key, |(_, name)| name.as_str())
    }
}

/// Routes of one method. Registrations that differ only in parameter names
/// and constraints share a matchit node; constrained candidates are tried in
/// registration order, an unconstrained one last.
#[derive(Default)]
struct MethodTree {
    matcher: MatchitRouter<usize>,
    shapes: HashMap<String, usize>,
    slots: Vec<Vec<Route>>,
}

impl MethodTree {
    fn insert(&mut self, shape: String, route: Route) -> Result<(), Error> {
        if let Some(&slot) = self.shapes.get(&shape) {
            let candidates = &mut self.slots[slot];
            let clash = candidates.iter().find(|c| {
                c.pattern == route.pattern
                    || (c.constraints.is_empty() && route.constraints.is_empty())
            });
            if let Some(existing) = clash {
                return Err(Error::invalid_route(
                    &route.pattern,
                    format!("conflicts with `{}`", existing.pattern),
                ));
            }
            let at = candidates
                .iter()
                .position(|c| c.constraints.is_empty())
                .filter(|_| !route.constraints.is_empty())
                .unwrap_or(candidates.len());
            candidates.insert(at, route);
            return Ok(());
        }

        self.matcher
            .insert(shape.clone(), self.slots.len())
            .map_err(|e| Error::invalid_route(&route.pattern, e))?;
        self.shapes.insert(shape, self.slots.len());
        self.slots.push(vec![route]);
        Ok(())
    }

    fn lookup(&self, path: &str) -> Option<RouteMatch> {
        let matched = self.matcher.at(path).ok()?;
        let route = self.slots[*matched.value]
            .iter()
            .find(|route| route.accepts(&matched.params))?;
        let params = matched.params.iter()
            .map(|(k, v)| (route.name_of(k).to_owned(), v.to_owned()))
            .collect();
        Some(RouteMatch { handler: Arc::clone(&route.handler), params })
    }
}

/// A static method+path → handler table.
///
/// Registration chains. The first invalid registration (bad constraint regex,
/// conflicting pattern) is kept and reported by [`RouteTree::finish`], which
/// the gateway builder calls, so a misconfigured tree fails startup instead
/// of a request.
///
/// `/webhooks/{id:[0-9]+}` and `/webhooks/{slug:[a-z]+}` may both be
/// registered: the first whose constraints accept the segment wins, and a
/// plain `/webhooks/{name}` on the same shape is tried after them. Two
/// unconstrained routes of the same shape conflict.
///
/// ```rust
/// use apigate::{Method, Request, RouteTree};
///
/// async fn list_calls(_: Request) -> &'static str { "calls" }
/// async fn get_webhook(req: Request) -> String {
///     format!("webhook {}", req.param("id").unwrap_or_default())
/// }
///
/// let tree = RouteTree::new()
///     .on(Method::Get, "/calls", list_calls)
///     .on(Method::Get, "/webhooks/{id:[0-9]+}", get_webhook)
///     .finish()
///     .unwrap();
/// ```
pub struct RouteTree {
    routes: HashMap<Method, MethodTree>,
    error: Option<Error>,
}

impl RouteTree {
    pub fn new() -> Self {
        Self { routes: HashMap::new(), error: None }
    }

    /// Registers a handler for a method + path pair. Returns `self` for chaining.
    pub fn on(self, method: Method, path: &str, handler: impl Handler) -> Self {
        let handler = handler.into_boxed_handler();
        self.add(method, path, handler)
    }

    /// Registers the same handler for every method on `path`.
    pub fn any(mut self, path: &str, handler: impl Handler) -> Self {
        let handler = handler.into_boxed_handler();
        for method in Method::ALL {
            self = self.add(method, path, Arc::clone(&handler));
        }
        self
    }

    fn add(mut self, method: Method, path: &str, handler: BoxedHandler) -> Self {
        if self.error.is_some() {
            return self;
        }
        let result = parse_pattern(path).and_then(|Pattern { shape, names, constraints }| {
            let route = Route { pattern: path.to_owned(), handler, names, constraints };
            self.routes.entry(method).or_default().insert(shape, route)
        });
        if let Err(e) = result {
            self.error = Some(e);
        }
        self
    }

    /// Ends registration, surfacing the first registration error.
    pub fn finish(mut self) -> Result<Self, Error> {
        match self.error.take() {
            Some(e) => Err(e),
            None => Ok(self),
        }
    }

    fn lookup(&self, method: Method, path: &str) -> Option<RouteMatch> {
        self.routes.get(&method)?.lookup(path)
    }
}

impl Default for RouteTree {
    fn default() -> Self { Self::new() }
}

impl RouteMatcher for RouteTree {
    fn route(&self, method: &http::Method, path: &str) -> Option<RouteMatch> {
        self.lookup(Method::from_http(method)?, path)
    }

    fn allowed_methods(&self, path: &str) -> Vec<Method> {
        Method::ALL
            .into_iter()
            .filter(|&m| self.lookup(m, path).is_some())
            .collect()
    }
}

struct Pattern {
    /// The path with every whole-segment parameter renamed to a positional
    /// key, which is what matchit sees.
    shape: String,
    /// Positional key → declared name.
    names: Vec<(String, String)>,
    /// Positional key → anchored regex.
    constraints: Vec<(String, Regex)>,
}

/// Splits `{name:regex}` constraints out of a pattern and renames
/// parameters positionally, so routes that differ only in names share a
/// shape.
fn parse_pattern(path: &str) -> Result<Pattern, Error> {
    let mut names = Vec::new();
    let mut constraints = Vec::new();
    let mut segments = Vec::new();

    for segment in path.split('/') {
        let Some(inner) = segment.strip_prefix('{').and_then(|s| s.strip_suffix('}')) else {
            segments.push(segment.to_owned());
            continue;
        };
        let key = format!("_p{}", names.len());

        if let Some(name) = inner.strip_prefix('*') {
            segments.push(format!("{{*{key}}}"));
            names.push((key, name.to_owned()));
            continue;
        }

        let name = match inner.split_once(':') {
            Some((name, expr)) => {
                let re = Regex::new(&format!("^(?:{expr})$"))
                    .map_err(|e| Error::invalid_route(path, e))?;
                constraints.push((key.clone(), re));
                name
            }
            None => inner,
        };
        segments.push(format!("{{{key}}}"));
        names.push((key, name.to_owned()));
    }

    Ok(Pattern { shape: segments.join("/"), names, constraints })
}
