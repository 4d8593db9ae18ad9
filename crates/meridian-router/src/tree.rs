//! The compiled segment tree.
//!
//! Each [`Node`] stands for one `/`-delimited segment. A node keeps its
//! literal children in a map and at most one positional (`:name`) child and
//! one catch-all (`*`) child in dedicated slots. Lookups try the literal
//! child first, then the positional child, then the catch-all child.

use std::collections::HashMap;

use crate::error::{RouteError, RouteResult};
use crate::params::Params;

/// Method key meaning "any method".
pub const ANY: &str = "";

/// Name under which a catch-all segment stores the rest of the path.
pub const CATCH_ALL_PARAM: &str = "path";

const PARAM_MARKER: &str = ":";
const CATCH_ALL_MARKER: &str = "*";

/// One parsed pattern segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Segment<'a> {
    Literal(&'a str),
    Param(&'a str),
    CatchAll,
}

impl<'a> Segment<'a> {
    fn parse(segment: &'a str) -> Self {
        if let Some(name) = segment.strip_prefix(PARAM_MARKER) {
            Self::Param(name)
        } else if segment == CATCH_ALL_MARKER {
            Self::CatchAll
        } else {
            Self::Literal(segment)
        }
    }

    fn name(&self) -> &'a str {
        match self {
            Self::Literal(name) => name,
            Self::Param(_) => PARAM_MARKER,
            Self::CatchAll => CATCH_ALL_MARKER,
        }
    }

    fn param(&self) -> Option<&'a str> {
        match self {
            Self::Literal(_) => None,
            Self::Param(name) => Some(name),
            Self::CatchAll => Some(CATCH_ALL_PARAM),
        }
    }
}

/// A node of the route tree.
#[derive(Debug)]
pub struct Node<H, M> {
    name: String,
    param: Option<String>,
    middleware: Vec<M>,
    handlers: HashMap<String, H>,
    children: HashMap<String, Node<H, M>>,
    param_child: Option<Box<Node<H, M>>>,
    catch_all_child: Option<Box<Node<H, M>>>,
}

impl<H, M> Node<H, M> {
    fn new(name: &str, param: Option<&str>) -> Self {
        Self {
            name: name.to_string(),
            param: param.map(str::to_string),
            middleware: Vec::new(),
            handlers: HashMap::new(),
            children: HashMap::new(),
            param_child: None,
            catch_all_child: None,
        }
    }

    /// Segment text for literal nodes, `:` for positional nodes, `*` for
    /// catch-all nodes and the empty string for a root.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Parameter name captured by this node, if any.
    #[must_use]
    pub fn param(&self) -> Option<&str> {
        self.param.as_deref()
    }

    /// Middleware registered on this node, in registration order.
    #[must_use]
    pub fn middleware(&self) -> &[M] {
        &self.middleware
    }

    /// Handler registered for exactly this method key.
    ///
    /// Use [`ANY`] to read the any-method handler.
    #[must_use]
    pub fn handler(&self, method: &str) -> Option<&H> {
        self.handlers.get(method)
    }

    /// Returns true if no handler is registered on this node.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Literal child for `name`.
    #[must_use]
    pub fn child(&self, name: &str) -> Option<&Self> {
        self.children.get(name)
    }

    /// Positional child, if any.
    #[must_use]
    pub fn param_child(&self) -> Option<&Self> {
        self.param_child.as_deref()
    }

    /// Catch-all child, if any.
    #[must_use]
    pub fn catch_all_child(&self) -> Option<&Self> {
        self.catch_all_child.as_deref()
    }

    fn handler_for(&self, method: &str) -> Option<&H> {
        self.handlers.get(method).or_else(|| self.handlers.get(ANY))
    }

    fn child_or_create(&mut self, segment: Segment<'_>) -> RouteResult<&mut Self> {
        let child = match segment {
            Segment::Literal(name) => self
                .children
                .entry(name.to_string())
                .or_insert_with(|| Node::new(name, None)),
            Segment::Param(name) => self
                .param_child
                .get_or_insert_with(|| Box::new(Node::new(PARAM_MARKER, Some(name))))
                .as_mut(),
            Segment::CatchAll => self
                .catch_all_child
                .get_or_insert_with(|| {
                    Box::new(Node::new(CATCH_ALL_MARKER, Some(CATCH_ALL_PARAM)))
                })
                .as_mut(),
        };

        if child.param.as_deref() != segment.param() {
            return Err(RouteError::ParamNameMismatch {
                previous: child.param.clone().unwrap_or_default(),
                current: segment.param().unwrap_or_default().to_string(),
            });
        }
        Ok(child)
    }

    fn attach(&mut self, segment: Segment<'_>, mut child: Self) -> RouteResult<()> {
        child.name = segment.name().to_string();
        child.param = segment.param().map(str::to_string);

        let duplicate = || RouteError::DuplicateChild(segment.name().to_string());
        match segment {
            Segment::Literal(name) => {
                if self.children.contains_key(name) {
                    return Err(duplicate());
                }
                self.children.insert(name.to_string(), child);
            }
            Segment::Param(_) => {
                if self.param_child.is_some() {
                    return Err(duplicate());
                }
                self.param_child = Some(Box::new(child));
            }
            Segment::CatchAll => {
                if self.catch_all_child.is_some() {
                    return Err(duplicate());
                }
                self.catch_all_child = Some(Box::new(child));
            }
        }
        Ok(())
    }
}

/// Result of [`RouteTree::resolve`].
#[derive(Debug)]
pub struct Resolved<'a, H, M> {
    /// Matched nodes from the root to the leaf.
    pub nodes: Vec<&'a Node<H, M>>,
    /// Captured parameters.
    pub params: Params,
}

impl<'a, H, M> Resolved<'a, H, M> {
    /// The last matched node.
    #[must_use]
    pub fn leaf(&self) -> &'a Node<H, M> {
        // `resolve` always pushes the root first.
        self.nodes[self.nodes.len() - 1]
    }
}

/// Result of [`RouteTree::match_route`].
#[derive(Debug)]
pub struct RouteMatch<'a, H, M> {
    /// Handler chosen for the method.
    pub handler: &'a H,
    /// Middleware of every matched node, root first.
    pub middleware: Vec<&'a M>,
    /// Captured parameters.
    pub params: Params,
}

/// A tree of routes with handlers of type `H` and middleware of type `M`.
///
/// Trees are built before serving and only read afterwards, so lookups take
/// `&self` and need no locking.
///
/// # Example
///
/// ```rust
/// use meridian_router::{RouteTree, RouteError};
///
/// let mut tree: RouteTree<&str, ()> = RouteTree::new();
/// tree.get("/users/:id", "get_user").unwrap();
/// tree.post("/users", "create_user").unwrap();
///
/// let found = tree.match_route("GET", "/users/7").unwrap();
/// assert_eq!(*found.handler, "get_user");
/// assert_eq!(found.params.get("id"), Some("7"));
///
/// let err = tree.match_route("GET", "/users").unwrap_err();
/// assert_eq!(err, RouteError::MethodNotAllowed);
/// ```
#[derive(Debug)]
pub struct RouteTree<H, M> {
    root: Node<H, M>,
    route_count: usize,
}

impl<H, M> Default for RouteTree<H, M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H, M> RouteTree<H, M> {
    /// Creates an empty tree.
    #[must_use]
    pub fn new() -> Self {
        Self {
            root: Node::new("", None),
            route_count: 0,
        }
    }

    /// The root node.
    #[must_use]
    pub fn root(&self) -> &Node<H, M> {
        &self.root
    }

    /// Number of registered handlers, including those of attached subtrees.
    #[must_use]
    pub fn route_count(&self) -> usize {
        self.route_count
    }

    /// Registers a handler for any method.
    pub fn any(&mut self, pattern: &str, handler: H) -> RouteResult<()> {
        self.handler(ANY, pattern, handler)
    }

    /// Registers a `HEAD` handler.
    pub fn head(&mut self, pattern: &str, handler: H) -> RouteResult<()> {
        self.handler("HEAD", pattern, handler)
    }

    /// Registers a `GET` handler.
    pub fn get(&mut self, pattern: &str, handler: H) -> RouteResult<()> {
        self.handler("GET", pattern, handler)
    }

    /// Registers a `POST` handler.
    pub fn post(&mut self, pattern: &str, handler: H) -> RouteResult<()> {
        self.handler("POST", pattern, handler)
    }

    /// Registers a `PUT` handler.
    pub fn put(&mut self, pattern: &str, handler: H) -> RouteResult<()> {
        self.handler("PUT", pattern, handler)
    }

    /// Registers a `DELETE` handler.
    pub fn delete(&mut self, pattern: &str, handler: H) -> RouteResult<()> {
        self.handler("DELETE", pattern, handler)
    }

    /// Registers a handler for `method` at `pattern`.
    ///
    /// The method is upper-cased; [`ANY`] registers an any-method handler.
    /// An any-method handler cannot share a node with method handlers.
    pub fn handler(&mut self, method: &str, pattern: &str, handler: H) -> RouteResult<()> {
        let method = method.to_ascii_uppercase();
        let node = self.make_path(pattern)?;

        let taken = if method == ANY {
            !node.handlers.is_empty()
        } else {
            node.handlers.contains_key(&method) || node.handlers.contains_key(ANY)
        };
        if taken {
            return Err(RouteError::DuplicateHandler {
                method: if method == ANY { "*".to_string() } else { method },
                path: pattern.to_string(),
            });
        }

        node.handlers.insert(method, handler);
        self.route_count += 1;
        Ok(())
    }

    /// Appends middleware to the node at `pattern`, creating it if needed.
    pub fn middleware(&mut self, pattern: &str, middleware: M) -> RouteResult<()> {
        self.make_path(pattern)?.middleware.push(middleware);
        Ok(())
    }

    /// Grafts `subtree` at `pattern`.
    ///
    /// The last segment of the pattern names the subtree root and may be a
    /// positional or catch-all segment.
    pub fn add(&mut self, pattern: &str, subtree: RouteTree<H, M>) -> RouteResult<()> {
        let pattern = normalize_pattern(pattern)?;
        if pattern.is_empty() {
            return Err(RouteError::RootSubtree);
        }

        let index = pattern.rfind('/').unwrap_or(0);
        let segment = Segment::parse(&pattern[index + 1..]);
        let parent = self.make_path(&pattern[..index])?;
        parent.attach(segment, subtree.root)?;
        self.route_count += subtree.route_count;
        Ok(())
    }

    /// Resolves `path` to the chain of matched nodes and captured params.
    ///
    /// `""` and `"/"` resolve to the root. A missing leading slash is
    /// tolerated.
    pub fn resolve(&self, path: &str) -> RouteResult<Resolved<'_, H, M>> {
        let mut nodes = vec![&self.root];
        let mut params = Params::new();
        if path.is_empty() || path == "/" {
            return Ok(Resolved { nodes, params });
        }

        let mut node = &self.root;
        let mut rest = path.strip_prefix('/').unwrap_or(path);
        loop {
            let (segment, tail) = match rest.split_once('/') {
                Some((segment, tail)) => (segment, Some(tail)),
                None => (rest, None),
            };

            if let Some(child) = node.children.get(segment) {
                node = child;
            } else if let Some(child) = node.param_child.as_deref() {
                params.insert(child.param.clone().unwrap_or_default(), segment);
                node = child;
            } else if let Some(child) = node.catch_all_child.as_deref() {
                params.insert(CATCH_ALL_PARAM, rest);
                nodes.push(child);
                break;
            } else {
                return Err(RouteError::NotFound);
            }
            nodes.push(node);

            match tail {
                Some(tail) => rest = tail,
                None => break,
            }
        }

        Ok(Resolved { nodes, params })
    }

    /// Resolves `path` and picks the handler for `method`.
    ///
    /// Falls back to the any-method handler of the leaf. A path that
    /// resolves but has no handler for the method is
    /// [`RouteError::MethodNotAllowed`].
    pub fn match_route(&self, method: &str, path: &str) -> RouteResult<RouteMatch<'_, H, M>> {
        let Resolved { nodes, params } = self.resolve(path)?;
        let leaf = nodes[nodes.len() - 1];
        let handler = leaf
            .handler_for(method)
            .ok_or(RouteError::MethodNotAllowed)?;

        let middleware = nodes
            .iter()
            .flat_map(|node| node.middleware.iter())
            .collect();

        Ok(RouteMatch {
            handler,
            middleware,
            params,
        })
    }

    // Walks the pattern, creating absent nodes, and returns the last one.
    fn make_path(&mut self, pattern: &str) -> RouteResult<&mut Node<H, M>> {
        let pattern = normalize_pattern(pattern)?;
        if pattern.is_empty() {
            return Ok(&mut self.root);
        }

        let segments: Vec<Segment<'_>> = pattern[1..].split('/').map(Segment::parse).collect();
        if let Some(pos) = segments.iter().position(|s| *s == Segment::CatchAll) {
            if pos + 1 != segments.len() {
                return Err(RouteError::CatchAllNotLast(pattern.to_string()));
            }
        }

        let mut node = &mut self.root;
        for segment in segments {
            node = node.child_or_create(segment)?;
        }
        Ok(node)
    }
}

// Rejects patterns without a leading slash and strips one trailing slash.
// The root pattern comes back as an empty string.
fn normalize_pattern(pattern: &str) -> RouteResult<&str> {
    if pattern.is_empty() || pattern == "/" {
        return Ok("");
    }
    if !pattern.starts_with('/') {
        return Err(RouteError::MissingLeadingSlash(pattern.to_string()));
    }
    Ok(pattern.strip_suffix('/').unwrap_or(pattern))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    type Tree = RouteTree<&'static str, &'static str>;

    fn hello_tree() -> Tree {
        let mut tree = Tree::new();
        tree.get("/hello", "hello").unwrap();
        tree.get("/hello/world", "world").unwrap();
        tree.get("/hello/:p", "param").unwrap();
        tree.get("/hello/goodbye/*", "catch_all").unwrap();
        tree
    }

    #[test]
    fn test_resolve_root() {
        let tree = hello_tree();
        for path in ["", "/"] {
            let resolved = tree.resolve(path).unwrap();
            assert_eq!(resolved.nodes.len(), 1);
            assert_eq!(resolved.leaf().name(), "");
            assert!(resolved.params.is_empty());
        }
    }

    #[test]
    fn test_resolve_literal_before_param() {
        let tree = hello_tree();

        let resolved = tree.resolve("/hello/world").unwrap();
        assert_eq!(resolved.leaf().name(), "world");
        assert!(resolved.params.is_empty());

        let resolved = tree.resolve("/hello/abc").unwrap();
        assert_eq!(resolved.leaf().name(), ":");
        assert_eq!(resolved.leaf().param(), Some("p"));
        assert_eq!(resolved.params.get("p"), Some("abc"));
        assert_eq!(resolved.params.len(), 1);
    }

    #[test]
    fn test_resolve_catch_all_captures_rest() {
        let tree = hello_tree();

        let resolved = tree.resolve("/hello/goodbye/a/b").unwrap();
        assert_eq!(resolved.leaf().name(), "*");
        assert_eq!(resolved.params.get(CATCH_ALL_PARAM), Some("a/b"));
        let names: Vec<_> = resolved.nodes.iter().map(|n| n.name()).collect();
        assert_eq!(names, vec!["", "hello", "goodbye", "*"]);
    }

    #[test]
    fn test_resolve_without_leading_slash() {
        let tree = hello_tree();
        let resolved = tree.resolve("hello/world").unwrap();
        assert_eq!(resolved.leaf().name(), "world");
    }

    #[test]
    fn test_resolve_not_found() {
        let tree = hello_tree();
        assert_eq!(tree.resolve("/nope").unwrap_err(), RouteError::NotFound);
        assert_eq!(
            tree.resolve("/hello/abc/def").unwrap_err(),
            RouteError::NotFound
        );
    }

    #[test]
    fn test_path_marker_is_captured_not_matched_literally() {
        let tree = hello_tree();
        let resolved = tree.resolve("/hello/:").unwrap();
        assert_eq!(resolved.params.get("p"), Some(":"));
    }

    #[test]
    fn test_match_exact_and_any_method() {
        let mut tree = Tree::new();
        tree.get("/items", "list").unwrap();
        tree.post("/items", "create").unwrap();
        tree.any("/anything", "any").unwrap();

        assert_eq!(*tree.match_route("GET", "/items").unwrap().handler, "list");
        assert_eq!(*tree.match_route("POST", "/items").unwrap().handler, "create");
        assert_eq!(*tree.match_route("PATCH", "/anything").unwrap().handler, "any");
    }

    #[test]
    fn test_match_method_not_allowed_is_distinct() {
        let mut tree = Tree::new();
        tree.post("/submit", "submit").unwrap();

        assert_eq!(
            tree.match_route("GET", "/submit").unwrap_err(),
            RouteError::MethodNotAllowed
        );
        assert_eq!(
            tree.match_route("GET", "/other").unwrap_err(),
            RouteError::NotFound
        );
    }

    #[test]
    fn test_intermediate_node_without_handler() {
        let tree = hello_tree();
        assert_eq!(
            tree.match_route("GET", "/hello/goodbye").unwrap_err(),
            RouteError::MethodNotAllowed
        );
    }

    #[test]
    fn test_duplicate_handlers_rejected() {
        let mut tree = Tree::new();
        tree.get("/a", "first").unwrap();

        assert!(matches!(
            tree.get("/a", "second"),
            Err(RouteError::DuplicateHandler { .. })
        ));
        assert!(matches!(
            tree.any("/a", "any"),
            Err(RouteError::DuplicateHandler { .. })
        ));

        tree.any("/b", "any").unwrap();
        assert!(matches!(
            tree.post("/b", "post"),
            Err(RouteError::DuplicateHandler { .. })
        ));
    }

    #[test]
    fn test_method_is_uppercased() {
        let mut tree = Tree::new();
        tree.handler("get", "/a", "lower").unwrap();
        assert_eq!(*tree.match_route("GET", "/a").unwrap().handler, "lower");
    }

    #[test]
    fn test_trailing_slash_ignored_on_registration() {
        let mut tree = Tree::new();
        tree.get("/docs/", "docs").unwrap();
        assert_eq!(*tree.match_route("GET", "/docs").unwrap().handler, "docs");
    }

    #[test]
    fn test_malformed_patterns() {
        let mut tree = Tree::new();
        assert_eq!(
            tree.get("no-slash", "x").unwrap_err(),
            RouteError::MissingLeadingSlash("no-slash".to_string())
        );
        assert!(matches!(
            tree.get("/files/*/more", "x"),
            Err(RouteError::CatchAllNotLast(_))
        ));

        tree.get("/users/:id", "x").unwrap();
        assert_eq!(
            tree.get("/users/:name/posts", "y").unwrap_err(),
            RouteError::ParamNameMismatch {
                previous: "id".to_string(),
                current: "name".to_string(),
            }
        );
    }

    #[test]
    fn test_middleware_accumulates_root_to_leaf() {
        let mut tree = Tree::new();
        tree.get("/api/users", "users").unwrap();
        tree.middleware("/", "root").unwrap();
        tree.middleware("/api", "api-1").unwrap();
        tree.middleware("/api", "api-2").unwrap();
        tree.middleware("/api/users", "users").unwrap();

        let found = tree.match_route("GET", "/api/users").unwrap();
        let chain: Vec<_> = found.middleware.into_iter().copied().collect();
        assert_eq!(chain, vec!["root", "api-1", "api-2", "users"]);
        assert_eq!(tree.root().middleware(), &["root"]);
    }

    #[test]
    fn test_add_subtree() {
        let mut users = Tree::new();
        users.get("/", "list").unwrap();
        users.get("/:id", "show").unwrap();
        users.middleware("/", "users-mw").unwrap();

        let mut tree = Tree::new();
        tree.add("/api/users", users).unwrap();

        assert_eq!(tree.route_count(), 2);
        assert_eq!(*tree.match_route("GET", "/api/users").unwrap().handler, "list");

        let found = tree.match_route("GET", "/api/users/9").unwrap();
        assert_eq!(*found.handler, "show");
        assert_eq!(found.params.get("id"), Some("9"));
        assert_eq!(found.middleware, vec![&"users-mw"]);
    }

    #[test]
    fn test_add_subtree_under_param() {
        let mut posts = Tree::new();
        posts.get("/", "user").unwrap();

        let mut tree = Tree::new();
        tree.add("/users/:uid", posts).unwrap();

        let found = tree.match_route("GET", "/users/3").unwrap();
        assert_eq!(found.params.get("uid"), Some("3"));
    }

    #[test]
    fn test_add_subtree_errors() {
        let mut tree = Tree::new();
        assert_eq!(tree.add("/", Tree::new()).unwrap_err(), RouteError::RootSubtree);
        assert_eq!(tree.add("", Tree::new()).unwrap_err(), RouteError::RootSubtree);

        tree.add("/child", Tree::new()).unwrap();
        assert_eq!(
            tree.add("/child", Tree::new()).unwrap_err(),
            RouteError::DuplicateChild("child".to_string())
        );
    }

    proptest! {
        #[test]
        fn prop_match_returns_registered_handler(
            paths in proptest::collection::hash_set("(/[a-z]{1,6}){1,4}", 1..20)
        ) {
            let mut tree: RouteTree<usize, ()> = RouteTree::new();
            let paths: Vec<String> = paths.into_iter().collect();
            for (i, path) in paths.iter().enumerate() {
                tree.get(path, i).unwrap();
            }
            for (i, path) in paths.iter().enumerate() {
                prop_assert_eq!(*tree.match_route("GET", path).unwrap().handler, i);
                let duplicate = tree.get(path, usize::MAX);
                let is_duplicate = matches!(duplicate, Err(RouteError::DuplicateHandler { .. }));
                prop_assert!(is_duplicate);
            }
        }
    }
}
