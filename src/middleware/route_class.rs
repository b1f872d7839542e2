//! Path classification for the session gate.
//!
//! Classification is an ordered rule table evaluated top-down; the first
//! matching rule decides the class, and unmatched paths are public. Rules are
//! static data, so classifying a path allocates nothing.
//!
//! # Default Rules
//!
//! | # | Matcher            | Class     |
//! |---|--------------------|-----------|
//! | 1 | prefix `/api`      | Api       |
//! | 2 | exact `/`          | Protected |
//! | 3 | prefix `/dashboard`| Protected |
//! | 4 | prefix `/projects` | Protected |
//! | 5 | prefix `/tasks`    | Protected |
//! | 6 | prefix `/teams`    | Protected |
//! | 7 | prefix `/settings` | Protected |
//! | 8 | exact `/login`     | AuthOnly  |
//! | 9 | exact `/register`  | AuthOnly  |
//!
//! # Path Matching Behavior
//!
//! Matching is case-sensitive and runs against the path only (no query).
//! Prefixes are segment-aware: `/projects` matches `/projects` and
//! `/projects/42`, but not `/projectsx`.

/// Login surface; protected routes redirect here.
pub const LOGIN_PATH: &str = "/login";

/// Registration surface.
pub const REGISTER_PATH: &str = "/register";

/// Root of the application; authenticated users on auth-only routes land here.
pub const ROOT_PATH: &str = "/";

/// Namespace whose routes authorize requests themselves.
pub const API_PREFIX: &str = "/api";

/// Query parameter carrying the original path through the login redirect.
pub const CALLBACK_PARAM: &str = "callbackUrl";

/// How the session gate treats a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouteClass {
    /// API namespace: passed through untouched
    Api,
    /// Requires a session
    Protected,
    /// Login/register: only for visitors without a session
    AuthOnly,
    /// Open to everyone
    Public,
}

impl RouteClass {
    /// Stable label for logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            RouteClass::Api => "api",
            RouteClass::Protected => "protected",
            RouteClass::AuthOnly => "auth_only",
            RouteClass::Public => "public",
        }
    }
}

impl std::fmt::Display for RouteClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a rule matches a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathMatch {
    Exact(&'static str),
    Prefix(&'static str),
}

impl PathMatch {
    pub fn matches(&self, path: &str) -> bool {
        match self {
            PathMatch::Exact(expected) => path == *expected,
            PathMatch::Prefix(prefix) => match path.strip_prefix(prefix) {
                Some(rest) => rest.is_empty() || rest.starts_with('/'),
                None => false,
            },
        }
    }
}

/// One row of the classification table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteRule {
    pub matcher: PathMatch,
    pub class: RouteClass,
}

impl RouteRule {
    pub const fn exact(path: &'static str, class: RouteClass) -> Self {
        Self {
            matcher: PathMatch::Exact(path),
            class,
        }
    }

    pub const fn prefix(path: &'static str, class: RouteClass) -> Self {
        Self {
            matcher: PathMatch::Prefix(path),
            class,
        }
    }
}

/// The dashboard's route table.
pub const DEFAULT_ROUTE_RULES: &[RouteRule] = &[
    RouteRule::prefix(API_PREFIX, RouteClass::Api),
    RouteRule::exact(ROOT_PATH, RouteClass::Protected),
    RouteRule::prefix("/dashboard", RouteClass::Protected),
    RouteRule::prefix("/projects", RouteClass::Protected),
    RouteRule::prefix("/tasks", RouteClass::Protected),
    RouteRule::prefix("/teams", RouteClass::Protected),
    RouteRule::prefix("/settings", RouteClass::Protected),
    RouteRule::exact(LOGIN_PATH, RouteClass::AuthOnly),
    RouteRule::exact(REGISTER_PATH, RouteClass::AuthOnly),
];

/// Ordered rule table.
#[derive(Debug, Clone, Copy)]
pub struct RouteTable {
    rules: &'static [RouteRule],
}

impl RouteTable {
    pub const fn new(rules: &'static [RouteRule]) -> Self {
        Self { rules }
    }

    /// Classify a request path. First matching rule wins.
    pub fn classify(&self, path: &str) -> RouteClass {
        self.rules
            .iter()
            .find(|rule| rule.matcher.matches(path))
            .map_or(RouteClass::Public, |rule| rule.class)
    }
}

impl Default for RouteTable {
    fn default() -> Self {
        Self::new(DEFAULT_ROUTE_RULES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(path: &str) -> RouteClass {
        RouteTable::default().classify(path)
    }

    #[test]
    fn test_root_is_protected() {
        assert_eq!(classify("/"), RouteClass::Protected);
    }

    #[test]
    fn test_feature_areas_are_protected() {
        for path in [
            "/dashboard",
            "/dashboard/overview",
            "/projects",
            "/projects/42/board",
            "/tasks/7",
            "/teams",
            "/settings/profile",
        ] {
            assert_eq!(classify(path), RouteClass::Protected, "{path}");
        }
    }

    #[test]
    fn test_login_and_register_are_auth_only() {
        assert_eq!(classify("/login"), RouteClass::AuthOnly);
        assert_eq!(classify("/register"), RouteClass::AuthOnly);
    }

    #[test]
    fn test_auth_only_is_exact() {
        assert_eq!(classify("/login/help"), RouteClass::Public);
        assert_eq!(classify("/registered"), RouteClass::Public);
    }

    #[test]
    fn test_api_namespace() {
        assert_eq!(classify("/api"), RouteClass::Api);
        assert_eq!(classify("/api/projects"), RouteClass::Api);
        assert_eq!(classify("/apiary"), RouteClass::Public);
    }

    #[test]
    fn test_prefix_is_segment_aware() {
        assert_eq!(classify("/projectsx"), RouteClass::Public);
        assert_eq!(classify("/dashboards"), RouteClass::Public);
    }

    #[test]
    fn test_matching_is_case_sensitive() {
        assert_eq!(classify("/Dashboard"), RouteClass::Public);
        assert_eq!(classify("/LOGIN"), RouteClass::Public);
    }

    #[test]
    fn test_other_paths_are_public() {
        assert_eq!(classify("/about"), RouteClass::Public);
        assert_eq!(classify("/health"), RouteClass::Public);
        assert_eq!(classify(""), RouteClass::Public);
    }

    #[test]
    fn test_first_rule_wins() {
        const RULES: &[RouteRule] = &[
            RouteRule::prefix("/docs", RouteClass::Public),
            RouteRule::prefix("/docs/internal", RouteClass::Protected),
        ];
        let table = RouteTable::new(RULES);
        assert_eq!(table.classify("/docs/internal/x"), RouteClass::Public);
    }

    #[test]
    fn test_route_class_labels() {
        assert_eq!(RouteClass::AuthOnly.to_string(), "auth_only");
        assert_eq!(RouteClass::Protected.as_str(), "protected");
    }
}
