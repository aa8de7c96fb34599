//! Navigation targets and the auth-related routing decisions
//!
//! Both decisions here are pure so they can be tested without a router.

use serde::{Deserialize, Serialize};

use super::store::SessionSnapshot;

/// Public entry points that bounce to the landing page after sign-in
const PUBLIC_ENTRY_PATHS: [&str; 3] = ["/", "/login", "/register"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Route {
    Home,
    Login,
    Register,
    Shop,
    Dashboard,
    Checkout,
    AddBalance,
    BalanceHistory,
    Admin,
    AdminOrders,
    AdminBalance,
    AdminProducts,
    AdminLicenses,
}

/// Who may see a route
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Public,
    User,
    Admin,
}

impl Route {
    /// Authenticated landing page
    pub const LANDING: Route = Route::Dashboard;

    pub fn path(&self) -> &'static str {
        match self {
            Self::Home => "/",
            Self::Login => "/login",
            Self::Register => "/register",
            Self::Shop => "/shop",
            Self::Dashboard => "/dashboard",
            Self::Checkout => "/checkout",
            Self::AddBalance => "/add-balance",
            Self::BalanceHistory => "/balance-history",
            Self::Admin => "/admin",
            Self::AdminOrders => "/admin/orders",
            Self::AdminBalance => "/admin/balance",
            Self::AdminProducts => "/admin/products",
            Self::AdminLicenses => "/admin/licenses",
        }
    }

    pub fn from_path(path: &str) -> Option<Self> {
        let path = normalize(path);
        match path {
            "/" => Some(Self::Home),
            "/login" => Some(Self::Login),
            "/register" => Some(Self::Register),
            "/shop" => Some(Self::Shop),
            "/dashboard" | "/products" | "/orders" => Some(Self::Dashboard),
            "/checkout" => Some(Self::Checkout),
            "/add-balance" => Some(Self::AddBalance),
            "/balance-history" => Some(Self::BalanceHistory),
            "/admin" => Some(Self::Admin),
            "/admin/orders" => Some(Self::AdminOrders),
            "/admin/balance" => Some(Self::AdminBalance),
            "/admin/products" => Some(Self::AdminProducts),
            "/admin/licenses" => Some(Self::AdminLicenses),
            _ => None,
        }
    }

    pub fn access(&self) -> Access {
        match self {
            Self::Home | Self::Login | Self::Register | Self::Shop => Access::Public,
            Self::Dashboard
            | Self::Checkout
            | Self::AddBalance
            | Self::BalanceHistory => Access::User,
            Self::Admin
            | Self::AdminOrders
            | Self::AdminBalance
            | Self::AdminProducts
            | Self::AdminLicenses => Access::Admin,
        }
    }
}

/// Strip query, fragment and trailing slash
fn normalize(path: &str) -> &str {
    let path = path.split(['?', '#']).next().unwrap_or("");
    if path.len() > 1 {
        path.trim_end_matches('/')
    } else if path.is_empty() {
        "/"
    } else {
        path
    }
}

/// Whether a just-completed sync should move the user to the landing page.
///
/// Only public entry points redirect; a reload on a protected route stays put.
pub fn should_redirect_after_sync(current_path: &str) -> bool {
    PUBLIC_ENTRY_PATHS.contains(&normalize(current_path))
}

/// What the UI should do for a route given the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteDecision {
    Render,
    /// Identity sync outstanding; show the indeterminate "syncing" state
    Wait,
    Redirect(Route),
}

pub fn guard_route(route: Route, session: &SessionSnapshot) -> RouteDecision {
    if session.syncing && route.access() != Access::Public {
        return RouteDecision::Wait;
    }
    match route.access() {
        Access::Public => RouteDecision::Render,
        Access::User if session.authenticated => RouteDecision::Render,
        Access::Admin if session.authenticated && session.is_admin() => RouteDecision::Render,
        _ => RouteDecision::Redirect(Route::Login),
    }
}
