//! Navigation Abstraction
//!
//! The host owns the navigation stack; the core only issues commands and
//! reads the document chain. Transitions the user causes (menu/back presses)
//! are reported by the host as [`NavigationTransition`] values, which it
//! broadcasts to interested components.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::{Mutex, PoisonError};

use crate::error::{BridgeError, Result};

/// Parameters passed to a route when navigating to it
pub type RouteParams = BTreeMap<String, String>;

/// The route a transition started from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteRef {
    pub route: String,
    /// Whether a modal was presented over the route
    pub modal: bool,
}

/// The route a transition ended on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteTarget {
    pub route: String,
}

/// A user-driven change of the visible route
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavigationTransition {
    pub from: RouteRef,
    pub to: RouteTarget,
}

impl NavigationTransition {
    pub fn new(from: impl Into<String>, modal: bool, to: impl Into<String>) -> Self {
        Self {
            from: RouteRef {
                route: from.into(),
                modal,
            },
            to: RouteTarget { route: to.into() },
        }
    }
}

/// Identifier of a document on the host navigation stack
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentId(u64);

impl DocumentId {
    pub const fn new(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "doc-{}", self.0)
    }
}

/// A document on the stack and the route that produced it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentRef {
    pub id: DocumentId,
    pub route: String,
}

/// Host navigation stack
///
/// Documents form a chain from the current one back through
/// [`previous_document`](Navigator::previous_document) links.
pub trait Navigator: Send + Sync {
    /// Make a route name known to the host
    fn register_route(&self, route: &str) -> Result<()>;

    /// Forget a route name; unknown routes are ignored
    fn unregister_route(&self, route: &str) -> Result<()>;

    /// Push a document for `route`; the route must be registered
    fn navigate(&self, route: &str, params: RouteParams) -> Result<()>;

    /// Pop the current document
    fn dismiss_current(&self) -> Result<()>;

    /// The document currently on top of the stack
    fn current_document(&self) -> Option<DocumentRef>;

    /// The document below `document`, if any
    fn previous_document(&self, document: &DocumentRef) -> Option<DocumentRef>;

    /// Remove a document wherever it sits in the stack
    fn remove_document(&self, document: &DocumentRef) -> Result<()>;
}

#[derive(Debug, Default)]
struct NavigatorState {
    routes: HashSet<String>,
    stack: Vec<(DocumentRef, RouteParams)>,
    next_id: u64,
}

/// Headless [`Navigator`] keeping the stack in memory.
#[derive(Debug, Default)]
pub struct InMemoryNavigator {
    state: Mutex<NavigatorState>,
}

impl InMemoryNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Routes of the documents on the stack, bottom first
    pub fn stack_routes(&self) -> Vec<String> {
        let state = self.lock();
        state.stack.iter().map(|(doc, _)| doc.route.clone()).collect()
    }

    /// Parameters the current document was opened with
    pub fn current_params(&self) -> Option<RouteParams> {
        let state = self.lock();
        state.stack.last().map(|(_, params)| params.clone())
    }

    pub fn is_registered(&self, route: &str) -> bool {
        self.lock().routes.contains(route)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, NavigatorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Navigator for InMemoryNavigator {
    fn register_route(&self, route: &str) -> Result<()> {
        self.lock().routes.insert(route.to_string());
        Ok(())
    }

    fn unregister_route(&self, route: &str) -> Result<()> {
        self.lock().routes.remove(route);
        Ok(())
    }

    fn navigate(&self, route: &str, params: RouteParams) -> Result<()> {
        let mut state = self.lock();
        if !state.routes.contains(route) {
            return Err(BridgeError::UnknownRoute(route.to_string()));
        }
        state.next_id += 1;
        let document = DocumentRef {
            id: DocumentId::new(state.next_id),
            route: route.to_string(),
        };
        state.stack.push((document, params));
        Ok(())
    }

    fn dismiss_current(&self) -> Result<()> {
        self.lock().stack.pop();
        Ok(())
    }

    fn current_document(&self) -> Option<DocumentRef> {
        self.lock().stack.last().map(|(doc, _)| doc.clone())
    }

    fn previous_document(&self, document: &DocumentRef) -> Option<DocumentRef> {
        let state = self.lock();
        let index = state.stack.iter().position(|(doc, _)| doc.id == document.id)?;
        index
            .checked_sub(1)
            .and_then(|prev| state.stack.get(prev))
            .map(|(doc, _)| doc.clone())
    }

    fn remove_document(&self, document: &DocumentRef) -> Result<()> {
        self.lock().stack.retain(|(doc, _)| doc.id != document.id);
        Ok(())
    }
}
