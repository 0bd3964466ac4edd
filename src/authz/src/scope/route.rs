//! Route declarations and the startup-validated route table

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use super::graph::ScopeTree;
use super::types::ScopeType;
use crate::error::{AuthzError, Result};
use crate::types::Verb;

/// HTTP verb of a route
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }

    /// Verb a route requires unless declared otherwise
    pub fn default_verb(&self) -> Verb {
        match self {
            Method::Get => Verb::Read,
            _ => Verb::Write,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Behavioral flags attached to a route
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteFlags {
    /// Redirect to the login page instead of answering 401
    pub redirect_on_auth_failure: bool,
    /// Skip the audit log stage
    pub quiet: bool,
    /// Long-lived connection that must be upgraded
    pub streaming: bool,
    /// Count the request against the tenant's usage limits
    pub usage_metered: bool,
}

/// One API route: template, verb, scope chain and flags
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    pub method: Method,
    pub path: String,
    pub chain: Vec<ScopeType>,
    pub verb: Verb,
    #[serde(default)]
    pub flags: RouteFlags,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage_metric: Option<String>,
}

impl Route {
    /// Create a route whose required verb follows from its method
    pub fn new(method: Method, path: impl Into<String>, chain: impl Into<Vec<ScopeType>>) -> Self {
        Self {
            method,
            path: path.into(),
            chain: chain.into(),
            verb: method.default_verb(),
            flags: RouteFlags::default(),
            usage_metric: None,
        }
    }

    pub fn verb(mut self, verb: Verb) -> Self {
        self.verb = verb;
        self
    }

    pub fn quiet(mut self) -> Self {
        self.flags.quiet = true;
        self
    }

    pub fn streaming(mut self) -> Self {
        self.flags.streaming = true;
        self
    }

    pub fn redirect_on_auth_failure(mut self) -> Self {
        self.flags.redirect_on_auth_failure = true;
        self
    }

    pub fn metered(mut self, metric: impl Into<String>) -> Self {
        self.flags.usage_metered = true;
        self.usage_metric = Some(metric.into());
        self
    }

    /// Display name, e.g. `GET /projects/{project_id}`
    pub fn name(&self) -> String {
        format!("{} {}", self.method, self.path)
    }

    /// Parameter names declared in the path template
    pub fn path_params(&self) -> Vec<&str> {
        self.path
            .split('/')
            .filter_map(|segment| {
                segment
                    .strip_prefix('{')
                    .and_then(|rest| rest.strip_suffix('}'))
            })
            .collect()
    }

    /// Leaf scope of the chain
    pub fn leaf(&self) -> Option<ScopeType> {
        self.chain.last().copied()
    }

    /// Validate the route against the scope tree
    pub fn validate(&self, tree: &ScopeTree) -> Result<()> {
        tree.validate_chain(&self.chain)
            .map_err(|e| self.invalid(e.to_string()))?;

        let params = self.path_params();
        for scope in &self.chain {
            if let Some(param) = scope.path_param() {
                if !params.contains(&param) {
                    return Err(self.invalid(format!(
                        "path template has no {{{}}} parameter for scope {}",
                        param, scope
                    )));
                }
            }
        }

        if self.flags.usage_metered && self.usage_metric.is_none() {
            return Err(self.invalid("metered route has no usage metric".to_string()));
        }

        Ok(())
    }

    fn invalid(&self, reason: String) -> AuthzError {
        AuthzError::InvalidRoute {
            route: self.name(),
            reason,
        }
    }
}

/// Immutable, validated set of routes
#[derive(Debug, Clone)]
pub struct RouteTable {
    routes: Vec<Arc<Route>>,
}

impl RouteTable {
    /// Validate every route once, at startup
    ///
    /// # Errors
    ///
    /// Returns `InvalidRoute` for the first route whose chain skips a level,
    /// reverses parent/child order, lacks a path parameter, or duplicates an
    /// earlier method and path.
    pub fn new(tree: &ScopeTree, routes: Vec<Route>) -> Result<Self> {
        let mut seen = HashSet::new();

        for route in &routes {
            route.validate(tree)?;

            if !seen.insert((route.method, route.path.clone())) {
                return Err(route.invalid("declared more than once".to_string()));
            }
        }

        info!("Route table validated: {} routes", routes.len());

        Ok(Self {
            routes: routes.into_iter().map(Arc::new).collect(),
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Route>> {
        self.routes.iter()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
