/// Scope model: resource types, their hierarchy and route chains
///
/// The hierarchy and the route table are built once at startup and are
/// immutable afterwards.
///
/// # Examples
///
/// ```
/// use stratum_authz::scope::{Method, Route, RouteTable, ScopeTree, ScopeType};
///
/// let tree = ScopeTree::new().unwrap();
/// let routes = RouteTable::new(&tree, vec![Route::new(
///     Method::Get,
///     "/projects/{project_id}/clusters/{cluster_id}",
///     [ScopeType::Project, ScopeType::Cluster],
/// )])
/// .unwrap();
///
/// assert_eq!(routes.len(), 1);
/// ```

mod types;
mod graph;
mod route;


pub use types::{IdentifierKind, ScopeType};
pub use graph::{ScopeGraphError, ScopeNode, ScopeTree};
pub use route::{Method, Route, RouteFlags, RouteTable};
