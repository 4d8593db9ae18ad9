//! Segment tree router for Meridian.
//!
//! Routes are compiled into a tree where every node is one `/`-delimited
//! path segment. A node may carry handlers keyed by method, middleware, and
//! three kinds of children:
//!
//! - literal children, matched by exact segment text
//! - one positional child (`/users/:id`), capturing one segment
//! - one catch-all child (`/files/*`), capturing the rest of the path under
//!   [`CATCH_ALL_PARAM`]
//!
//! The tree is generic over the handler and middleware types so the HTTP
//! layer can store whatever callable it dispatches to.
//!
//! # Example
//!
//! ```rust
//! use meridian_router::{RouteTree, CATCH_ALL_PARAM};
//!
//! let mut tree: RouteTree<&str, &str> = RouteTree::new();
//! tree.get("/hello", "hello").unwrap();
//! tree.get("/hello/:name", "greet").unwrap();
//! tree.get("/static/*", "files").unwrap();
//! tree.middleware("/", "log").unwrap();
//!
//! let found = tree.match_route("GET", "/static/css/site.css").unwrap();
//! assert_eq!(*found.handler, "files");
//! assert_eq!(found.params.get(CATCH_ALL_PARAM), Some("css/site.css"));
//! assert_eq!(found.middleware, vec![&"log"]);
//! ```
//!
//! # Tree shape
//!
//! ```text
//!                 (root)
//!                   │
//!          ┌────────┴────────┐
//!       "hello"           "static"
//!          │                 │
//!        ":name"            "*"
//! ```

#![doc(html_root_url = "https://docs.rs/meridian-router/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod error;
mod params;
mod tree;

pub use error::{RouteError, RouteResult};
pub use params::Params;
pub use tree::{Node, Resolved, RouteMatch, RouteTree, ANY, CATCH_ALL_PARAM};
