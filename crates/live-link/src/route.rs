use std::collections::BTreeMap;

use parking_lot::RwLock;

/// Navigation state a registration was created under: the active page plus
/// its route arguments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteContext {
    pub page: String,
    pub args: BTreeMap<String, String>,
}

impl RouteContext {
    pub fn new(page: impl Into<String>) -> Self {
        Self {
            page: page.into(),
            args: BTreeMap::new(),
        }
    }

    pub fn with_arg(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.args.insert(key.into(), value.into());
        self
    }

    pub fn arg(&self, key: &str) -> Option<&str> {
        self.args.get(key).map(String::as_str)
    }

    /// A context captured at `self` has expired under `current` when the page
    /// changed or any of the listed argument fields changed. Arguments outside
    /// `dependencies` are ignored.
    pub fn expired_under(&self, current: &RouteContext, dependencies: &[String]) -> bool {
        self.page != current.page
            || dependencies
                .iter()
                .any(|field| self.arg(field) != current.arg(field))
    }
}

/// Holder of the current navigation context, shared by the session and the UI.
#[derive(Debug, Default)]
pub struct RouteState {
    current: RwLock<RouteContext>,
}

impl RouteState {
    pub fn new(initial: RouteContext) -> Self {
        Self {
            current: RwLock::new(initial),
        }
    }

    pub fn current(&self) -> RouteContext {
        self.current.read().clone()
    }

    pub fn navigate(&self, next: RouteContext) {
        *self.current.write() = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deps(fields: &[&str]) -> Vec<String> {
        fields.iter().map(|f| f.to_string()).collect()
    }

    #[test]
    fn page_change_expires() {
        let created = RouteContext::new("portfolios");
        let current = RouteContext::new("positions");
        assert!(created.expired_under(&current, &[]));
    }

    #[test]
    fn only_dependency_args_matter() {
        let created = RouteContext::new("portfolios")
            .with_arg("id", "DbPrt~1")
            .with_arg("filter", "eq");
        let current = RouteContext::new("portfolios")
            .with_arg("id", "DbPrt~1")
            .with_arg("filter", "usd");
        assert!(!created.expired_under(&current, &deps(&["id"])));
        assert!(created.expired_under(&current, &deps(&["id", "filter"])));
    }

    #[test]
    fn missing_dependency_arg_counts_as_change() {
        let created = RouteContext::new("views").with_arg("id", "v1");
        let current = RouteContext::new("views");
        assert!(created.expired_under(&current, &deps(&["id"])));
    }

    #[test]
    fn route_state_navigates() {
        let state = RouteState::new(RouteContext::new("home"));
        state.navigate(RouteContext::new("analytics").with_arg("view", "7"));
        assert_eq!(state.current().page, "analytics");
        assert_eq!(state.current().arg("view"), Some("7"));
    }
}
