use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use crate::route::RouteContext;

/// Why a handler is being called.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    /// The server reported a change to the registered resource.
    Update,
    /// The session was re-established; all prior state must be refetched.
    Reset,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub url: String,
    pub kind: NoticeKind,
}

impl Notice {
    pub fn is_reset(&self) -> bool {
        self.kind == NoticeKind::Reset
    }
}

/// Receiver of registry notices. Errors are logged by the dispatcher and never
/// interrupt delivery to other registrations.
pub trait UpdateHandler: Send + Sync {
    fn on_update(&self, notice: &Notice) -> Result<(), String>;
}

impl<F> UpdateHandler for F
where
    F: Fn(&Notice) -> Result<(), String> + Send + Sync,
{
    fn on_update(&self, notice: &Notice) -> Result<(), String> {
        (self)(notice)
    }
}

/// Whether a registration survives its first delivery.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SubscriptionMode {
    /// Removed before the handler runs; the owner re-registers for more.
    #[default]
    OneShot,
    Recurring,
}

#[derive(Debug, Clone, Default)]
pub struct RegistrationOptions {
    pub mode: SubscriptionMode,
    pub route: RouteContext,
    /// Route argument names whose change invalidates the registration.
    pub dependencies: Vec<String>,
}

impl RegistrationOptions {
    pub fn one_shot(route: RouteContext) -> Self {
        Self {
            mode: SubscriptionMode::OneShot,
            route,
            dependencies: Vec::new(),
        }
    }

    pub fn recurring(route: RouteContext) -> Self {
        Self {
            mode: SubscriptionMode::Recurring,
            route,
            dependencies: Vec::new(),
        }
    }

    pub fn depends_on<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies.extend(fields.into_iter().map(Into::into));
        self
    }
}

pub struct Registration {
    pub url: String,
    pub route: RouteContext,
    pub dependencies: Vec<String>,
    pub mode: SubscriptionMode,
    pub registered_at: Instant,
    pub generation: u64,
    pub deliveries: u64,
    pub last_delivery: Option<Instant>,
    handler: Arc<dyn UpdateHandler>,
}

impl Registration {
    pub fn is_expired(&self, current: &RouteContext) -> bool {
        self.route.expired_under(current, &self.dependencies)
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("url", &self.url)
            .field("route", &self.route)
            .field("dependencies", &self.dependencies)
            .field("mode", &self.mode)
            .field("generation", &self.generation)
            .field("deliveries", &self.deliveries)
            .finish()
    }
}

/// A handler taken out of the registry so it can run with no lock held.
pub struct Delivery {
    pub notice: Notice,
    pub generation: u64,
    handler: Arc<dyn UpdateHandler>,
}

impl Delivery {
    /// Run the handler, turning a panic into an error.
    pub fn invoke(&self) -> Result<(), String> {
        match catch_unwind(AssertUnwindSafe(|| self.handler.on_update(&self.notice))) {
            Ok(result) => result,
            Err(payload) => Err(panic_message(payload.as_ref())),
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        format!("handler panicked: {msg}")
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        format!("handler panicked: {msg}")
    } else {
        "handler panicked".to_string()
    }
}

/// Url → registration map. Holds at most one registration per url.
#[derive(Default)]
pub struct Registry {
    entries: HashMap<String, Registration>,
    next_generation: u64,
    dirty: bool,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `handler` for `url`, replacing any earlier registration.
    /// Returns `true` when one was replaced.
    pub fn register(
        &mut self,
        url: impl Into<String>,
        options: RegistrationOptions,
        handler: Arc<dyn UpdateHandler>,
    ) -> bool {
        let url = url.into();
        self.next_generation += 1;
        let registration = Registration {
            url: url.clone(),
            route: options.route,
            dependencies: options.dependencies,
            mode: options.mode,
            registered_at: Instant::now(),
            generation: self.next_generation,
            deliveries: 0,
            last_delivery: None,
            handler,
        };
        let replaced = self.entries.insert(url, registration).is_some();
        if !replaced {
            self.dirty = true;
        }
        replaced
    }

    pub fn unregister(&mut self, url: &str) -> Option<Registration> {
        let removed = self.entries.remove(url);
        if removed.is_some() {
            self.dirty = true;
        }
        removed
    }

    pub fn get(&self, url: &str) -> Option<&Registration> {
        self.entries.get(url)
    }

    pub fn contains(&self, url: &str) -> bool {
        self.entries.contains_key(url)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Registered urls in sorted order.
    pub fn urls(&self) -> Vec<String> {
        let mut urls: Vec<String> = self.entries.keys().cloned().collect();
        urls.sort();
        urls
    }

    /// Prepare the delivery of an update for `url`. One-shot registrations
    /// leave the registry here, before their handler can run.
    pub fn take_for_update(&mut self, url: &str) -> Option<Delivery> {
        let mode = self.entries.get(url)?.mode;
        let now = Instant::now();
        let notice = Notice {
            url: url.to_string(),
            kind: NoticeKind::Update,
        };
        match mode {
            SubscriptionMode::OneShot => {
                let registration = self.entries.remove(url)?;
                self.dirty = true;
                Some(Delivery {
                    notice,
                    generation: registration.generation,
                    handler: registration.handler,
                })
            }
            SubscriptionMode::Recurring => {
                let registration = self.entries.get_mut(url)?;
                registration.deliveries += 1;
                registration.last_delivery = Some(now);
                Some(Delivery {
                    notice,
                    generation: registration.generation,
                    handler: Arc::clone(&registration.handler),
                })
            }
        }
    }

    /// Remove every registration whose route expired under `current`.
    /// Returns the removed urls.
    pub fn prune_expired(&mut self, current: &RouteContext) -> Vec<String> {
        let expired: Vec<String> = self
            .entries
            .values()
            .filter(|registration| registration.is_expired(current))
            .map(|registration| registration.url.clone())
            .collect();
        for url in &expired {
            self.entries.remove(url);
        }
        if !expired.is_empty() {
            self.dirty = true;
        }
        expired
    }

    /// Snapshot a reset delivery for every registration, consuming one-shot ones.
    pub fn take_reset_deliveries(&mut self) -> Vec<Delivery> {
        let now = Instant::now();
        let mut deliveries = Vec::with_capacity(self.entries.len());
        for url in self.urls() {
            let Some(registration) = self.entries.get_mut(&url) else {
                continue;
            };
            let notice = Notice {
                url: url.clone(),
                kind: NoticeKind::Reset,
            };
            match registration.mode {
                SubscriptionMode::Recurring => {
                    registration.deliveries += 1;
                    registration.last_delivery = Some(now);
                    deliveries.push(Delivery {
                        notice,
                        generation: registration.generation,
                        handler: Arc::clone(&registration.handler),
                    });
                }
                SubscriptionMode::OneShot => {
                    if let Some(registration) = self.entries.remove(&url) {
                        self.dirty = true;
                        deliveries.push(Delivery {
                            notice,
                            generation: registration.generation,
                            handler: registration.handler,
                        });
                    }
                }
            }
        }
        deliveries
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// The url set to push to the server, if it changed since the last call.
    pub fn take_dirty(&mut self) -> Option<Vec<String>> {
        if !self.dirty {
            return None;
        }
        self.dirty = false;
        Some(self.urls())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_handler(counter: Arc<AtomicUsize>) -> Arc<dyn UpdateHandler> {
        Arc::new(move |_: &Notice| -> Result<(), String> {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    fn route() -> RouteContext {
        RouteContext::new("portfolios")
    }

    #[test]
    fn registering_twice_keeps_latest_handler() {
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        let mut registry = Registry::new();

        assert!(!registry.register(
            "/a",
            RegistrationOptions::one_shot(route()),
            counting_handler(first.clone())
        ));
        assert!(registry.register(
            "/a",
            RegistrationOptions::one_shot(route()),
            counting_handler(second.clone())
        ));
        assert_eq!(registry.len(), 1);

        let delivery = registry.take_for_update("/a").expect("registered");
        delivery.invoke().unwrap();
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn one_shot_is_removed_before_invocation() {
        let mut registry = Registry::new();
        registry.register(
            "/a",
            RegistrationOptions::one_shot(route()),
            counting_handler(Arc::new(AtomicUsize::new(0))),
        );
        let delivery = registry.take_for_update("/a");
        assert!(delivery.is_some());
        assert!(!registry.contains("/a"));
        assert!(registry.take_for_update("/a").is_none());
    }

    #[test]
    fn recurring_stays_and_tracks_arrivals() {
        let mut registry = Registry::new();
        registry.register(
            "/a",
            RegistrationOptions::recurring(route()),
            counting_handler(Arc::new(AtomicUsize::new(0))),
        );
        registry.take_for_update("/a").unwrap();
        registry.take_for_update("/a").unwrap();
        let registration = registry.get("/a").expect("still registered");
        assert_eq!(registration.deliveries, 2);
        assert!(registration.last_delivery.is_some());
    }

    #[test]
    fn unknown_url_yields_nothing() {
        let mut registry = Registry::new();
        assert!(registry.take_for_update("/missing").is_none());
        assert!(registry.unregister("/missing").is_none());
    }

    #[test]
    fn prune_drops_only_expired() {
        let mut registry = Registry::new();
        let counter = Arc::new(AtomicUsize::new(0));
        registry.register(
            "/stale",
            RegistrationOptions::one_shot(RouteContext::new("positions")),
            counting_handler(counter.clone()),
        );
        registry.register(
            "/fresh",
            RegistrationOptions::one_shot(route()),
            counting_handler(counter),
        );
        registry.take_dirty();

        let removed = registry.prune_expired(&route());
        assert_eq!(removed, vec!["/stale".to_string()]);
        assert_eq!(registry.urls(), vec!["/fresh".to_string()]);
        assert_eq!(registry.take_dirty(), Some(vec!["/fresh".to_string()]));
    }

    #[test]
    fn reset_reaches_everyone_and_consumes_one_shots() {
        let mut registry = Registry::new();
        let counter = Arc::new(AtomicUsize::new(0));
        registry.register(
            "/once",
            RegistrationOptions::one_shot(route()),
            counting_handler(counter.clone()),
        );
        registry.register(
            "/always",
            RegistrationOptions::recurring(route()),
            counting_handler(counter.clone()),
        );

        let deliveries = registry.take_reset_deliveries();
        assert_eq!(deliveries.len(), 2);
        assert!(deliveries.iter().all(|d| d.notice.is_reset()));
        for delivery in &deliveries {
            delivery.invoke().unwrap();
        }
        assert_eq!(counter.load(Ordering::SeqCst), 2);
        assert_eq!(registry.urls(), vec!["/always".to_string()]);
    }

    #[test]
    fn dirty_tracks_url_set_changes_only() {
        let mut registry = Registry::new();
        let counter = Arc::new(AtomicUsize::new(0));
        registry.register(
            "/a",
            RegistrationOptions::recurring(route()),
            counting_handler(counter.clone()),
        );
        assert_eq!(registry.take_dirty(), Some(vec!["/a".to_string()]));
        assert_eq!(registry.take_dirty(), None);

        // replacing the handler leaves the url set alone
        registry.register(
            "/a",
            RegistrationOptions::recurring(route()),
            counting_handler(counter),
        );
        assert_eq!(registry.take_dirty(), None);

        registry.unregister("/a");
        assert_eq!(registry.take_dirty(), Some(Vec::new()));
    }

    #[test]
    fn panicking_handler_becomes_error() {
        let mut registry = Registry::new();
        let handler: Arc<dyn UpdateHandler> =
            Arc::new(|_: &Notice| -> Result<(), String> { panic!("grid destroyed") });
        registry.register("/a", RegistrationOptions::default(), handler);
        let delivery = registry.take_for_update("/a").unwrap();
        let err = delivery.invoke().unwrap_err();
        assert!(err.contains("grid destroyed"), "{err}");
    }
}
