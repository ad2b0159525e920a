//! CDP Domain Dispatch
//!
//! Methods the proxy answers itself instead of forwarding to a page.
//! Handlers are registered per `Domain`; bad names and duplicates are
//! rejected when registering, not when a client calls them.

pub mod browser;

use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::config::ProxyConfig;
use crate::error::{ProxyError, Result};

/// Protocol domains the proxy knows about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Domain {
    Browser,
    Target,
    Page,
    Runtime,
    Network,
    Debugger,
    Emulation,
}

impl Domain {
    pub const ALL: [Domain; 7] = [
        Domain::Browser,
        Domain::Target,
        Domain::Page,
        Domain::Runtime,
        Domain::Network,
        Domain::Debugger,
        Domain::Emulation,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Domain::Browser => "Browser",
            Domain::Target => "Target",
            Domain::Page => "Page",
            Domain::Runtime => "Runtime",
            Domain::Network => "Network",
            Domain::Debugger => "Debugger",
            Domain::Emulation => "Emulation",
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Domain {
    type Err = ProxyError;

    fn from_str(s: &str) -> Result<Self> {
        Domain::ALL
            .into_iter()
            .find(|d| d.as_str() == s)
            .ok_or_else(|| ProxyError::MethodNotFound(s.to_string()))
    }
}

/// What a handler gets besides its params
#[derive(Debug, Clone, Copy)]
pub struct MethodContext<'a> {
    pub session_id: Option<&'a str>,
    pub config: &'a ProxyConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MethodResult {
    pub result: Value,
}

impl MethodResult {
    pub fn new(result: Value) -> Self {
        Self { result }
    }
}

pub type MethodHandler = fn(&Value, &MethodContext<'_>) -> Result<MethodResult>;

/// Handler table for one domain, keyed by unqualified method name
pub type DomainTable = &'static [(&'static str, MethodHandler)];

#[derive(Default)]
pub struct MethodRegistry {
    handlers: HashMap<Domain, HashMap<String, MethodHandler>>,
}

impl MethodRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in domain table
    pub fn with_defaults() -> Result<Self> {
        let mut registry = Self::new();
        registry.register_domain(Domain::Browser, browser::HANDLERS)?;
        Ok(registry)
    }

    pub fn register(&mut self, domain: Domain, method: &str, handler: MethodHandler) -> Result<()> {
        if method.is_empty() || method.contains('.') {
            return Err(ProxyError::Registration(format!(
                "invalid method name {:?} for domain {}",
                method, domain
            )));
        }

        let methods = self.handlers.entry(domain).or_default();
        if methods.contains_key(method) {
            return Err(ProxyError::Registration(format!(
                "{}.{} is already registered",
                domain, method
            )));
        }
        methods.insert(method.to_string(), handler);
        tracing::trace!("Registered {}.{}", domain, method);
        Ok(())
    }

    pub fn register_domain(&mut self, domain: Domain, table: DomainTable) -> Result<()> {
        for (method, handler) in table {
            self.register(domain, method, *handler)?;
        }
        Ok(())
    }

    /// Resolve a fully qualified name such as `Browser.getVersion`
    pub fn lookup(&self, full_method: &str) -> Option<MethodHandler> {
        let (domain, method) = full_method.split_once('.')?;
        let domain = domain.parse::<Domain>().ok()?;
        self.handlers.get(&domain)?.get(method).copied()
    }

    pub fn contains(&self, full_method: &str) -> bool {
        self.lookup(full_method).is_some()
    }

    pub fn dispatch(
        &self,
        full_method: &str,
        params: Option<&Value>,
        ctx: &MethodContext<'_>,
    ) -> Result<MethodResult> {
        let handler = self
            .lookup(full_method)
            .ok_or_else(|| ProxyError::MethodNotFound(full_method.to_string()))?;
        handler(params.unwrap_or(&Value::Null), ctx)
    }

    pub fn len(&self) -> usize {
        self.handlers.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn echo(params: &Value, _ctx: &MethodContext<'_>) -> Result<MethodResult> {
        Ok(MethodResult::new(params.clone()))
    }

    #[test]
    fn domains_round_trip_through_their_names() {
        for domain in Domain::ALL {
            assert_eq!(domain.as_str().parse::<Domain>().unwrap(), domain);
        }
        assert!("browser".parse::<Domain>().is_err());
    }

    #[test]
    fn duplicate_and_malformed_registrations_are_rejected() {
        let mut registry = MethodRegistry::new();
        registry.register(Domain::Page, "echo", echo).unwrap();

        assert!(matches!(
            registry.register(Domain::Page, "echo", echo),
            Err(ProxyError::Registration(_))
        ));
        assert!(matches!(
            registry.register(Domain::Page, "", echo),
            Err(ProxyError::Registration(_))
        ));
        assert!(matches!(
            registry.register(Domain::Page, "Page.echo", echo),
            Err(ProxyError::Registration(_))
        ));
        // Same method name under another domain is fine
        registry.register(Domain::Runtime, "echo", echo).unwrap();
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn dispatch_resolves_qualified_names() {
        let mut registry = MethodRegistry::new();
        registry.register(Domain::Page, "echo", echo).unwrap();
        let config = ProxyConfig::default();
        let ctx = MethodContext {
            session_id: None,
            config: &config,
        };

        let params = json!({ "x": 1 });
        let result = registry.dispatch("Page.echo", Some(&params), &ctx).unwrap();
        assert_eq!(result.result, params);

        let result = registry.dispatch("Page.echo", None, &ctx).unwrap();
        assert_eq!(result.result, Value::Null);

        for missing in ["Runtime.echo", "Nope.echo", "echo", ""] {
            assert!(matches!(
                registry.dispatch(missing, None, &ctx),
                Err(ProxyError::MethodNotFound(_))
            ));
        }
    }

    #[test]
    fn defaults_include_the_browser_domain() {
        let registry = MethodRegistry::with_defaults().unwrap();
        for method in [
            "Browser.getVersion",
            "Browser.close",
            "Browser.getWindowForTarget",
            "Browser.getWindowBounds",
        ] {
            assert!(registry.contains(method), "{} missing", method);
        }
        assert!(!registry.contains("Page.navigate"));
    }
}
