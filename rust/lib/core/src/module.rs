use axum::Router;

/// A service module that contributes HTTP routes.
///
/// Business modules implement this trait so the server binary can collect
/// them and merge their routes into one router.
pub trait Module: Send + Sync {
    /// Module name, used for logging.
    fn name(&self) -> &str;

    /// Return the module's routes.
    fn routes(&self) -> Router;
}
