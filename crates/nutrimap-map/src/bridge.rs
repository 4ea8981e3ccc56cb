//! Popup call-to-action to navigation request bridge.
//!
//! The bridge never navigates. Marker owners register one binding per popup,
//! keyed by a stable [`PopupKey`]. Opening the popup arms the binding; the
//! first activation of the call-to-action sends the request to the router and
//! disarms it, so a popup that is opened once dispatches at most once.

use async_channel::{Receiver, Sender};
use nutrimap_core::error::BindingError;
use nutrimap_core::{LocationId, NavigationRequest};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

/// Receiving end handed to the router.
pub type NavigationReceiver = Receiver<NavigationRequest>;

/// Stable identity of a popup, independent of rendering details.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum PopupKey {
    /// Popup of a location marker
    Location(LocationId),
    /// Popup of a country summary marker
    Country(String),
}

impl PopupKey {
    pub fn location(id: impl Into<LocationId>) -> Self {
        PopupKey::Location(id.into())
    }

    pub fn country(id: impl Into<String>) -> Self {
        PopupKey::Country(id.into())
    }

    pub fn is_location(&self) -> bool {
        matches!(self, PopupKey::Location(_))
    }

    /// The navigation request this popup's call-to-action emits.
    pub fn navigation_request(&self) -> NavigationRequest {
        match self {
            PopupKey::Location(id) => NavigationRequest::Location {
                location_id: id.clone(),
            },
            PopupKey::Country(id) => NavigationRequest::CountryAnalysis {
                country_id: id.clone(),
            },
        }
    }
}

impl fmt::Display for PopupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PopupKey::Location(id) => write!(f, "{}", id),
            PopupKey::Country(id) => write!(f, "country:{}", id),
        }
    }
}

impl FromStr for PopupKey {
    type Err = std::convert::Infallible;

    /// `country:<id>` names a country popup; anything else a location.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.strip_prefix("country:") {
            Some(id) => PopupKey::country(id),
            None => PopupKey::location(s),
        })
    }
}

#[derive(Debug)]
struct Binding {
    /// `None` when the popup has no call-to-action control
    request: Option<NavigationRequest>,
    armed: bool,
}

/// Translates popup interactions into navigation requests.
#[derive(Clone)]
pub struct NavigationBridge {
    tx: Sender<NavigationRequest>,
    bindings: Arc<Mutex<HashMap<PopupKey, Binding>>>,
}

impl NavigationBridge {
    /// Creates a bridge and the receiver the router listens on.
    pub fn channel() -> (Self, NavigationReceiver) {
        let (tx, rx) = async_channel::unbounded();
        (
            Self {
                tx,
                bindings: Arc::new(Mutex::new(HashMap::new())),
            },
            rx,
        )
    }

    /// Registers the popup-open handler for a marker. Re-registering a key
    /// replaces the previous binding rather than adding a second one.
    pub fn register(&self, key: PopupKey, request: Option<NavigationRequest>) {
        self.bindings.lock().insert(
            key,
            Binding {
                request,
                armed: false,
            },
        );
    }

    /// Drops every binding matching `predicate`.
    pub fn release_where(&self, predicate: impl Fn(&PopupKey) -> bool) {
        self.bindings.lock().retain(|key, _| !predicate(key));
    }

    /// Drops all bindings.
    pub fn clear(&self) {
        self.bindings.lock().clear();
    }

    /// Number of registered popups.
    pub fn len(&self) -> usize {
        self.bindings.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the call-to-action of `key` is currently armed.
    pub fn is_armed(&self, key: &PopupKey) -> bool {
        self.bindings
            .lock()
            .get(key)
            .map(|b| b.armed)
            .unwrap_or(false)
    }

    /// Handles a popup-open: arms its call-to-action for a single use.
    ///
    /// Opening an already-armed popup leaves exactly one armed binding.
    pub fn popup_opened(&self, key: &PopupKey) -> Result<(), BindingError> {
        let mut bindings = self.bindings.lock();
        let binding = bindings.get_mut(key).ok_or_else(|| BindingError::UnknownPopup {
            key: key.to_string(),
        })?;

        if binding.request.is_none() {
            return Err(BindingError::MissingControl {
                key: key.to_string(),
            });
        }

        binding.armed = true;
        Ok(())
    }

    /// Handles a call-to-action activation: dispatches the request once and
    /// disarms the binding.
    pub fn activate(&self, key: &PopupKey) -> Result<NavigationRequest, BindingError> {
        let request = {
            let mut bindings = self.bindings.lock();
            let binding = bindings.get_mut(key).ok_or_else(|| BindingError::UnknownPopup {
                key: key.to_string(),
            })?;

            if !binding.armed {
                return Err(BindingError::NotArmed {
                    key: key.to_string(),
                });
            }
            binding.armed = false;

            binding.request.clone().ok_or_else(|| BindingError::MissingControl {
                key: key.to_string(),
            })?
        };

        self.tx
            .try_send(request.clone())
            .map_err(|_| BindingError::DispatchFailed {
                key: key.to_string(),
            })?;

        debug!(popup = %key, route = %request.route(), "Navigation requested");
        Ok(request)
    }

    /// [`popup_opened`](Self::popup_opened) with failures logged and dropped.
    pub fn popup_opened_quiet(&self, key: &PopupKey) {
        if let Err(e) = self.popup_opened(key) {
            debug!(popup = %key, error = %e, "Popup action not bound");
        }
    }

    /// [`activate`](Self::activate) with failures logged and dropped.
    pub fn activate_quiet(&self, key: &PopupKey) -> Option<NavigationRequest> {
        match self.activate(key) {
            Ok(request) => Some(request),
            Err(e) => {
                debug!(popup = %key, error = %e, "Popup action ignored");
                None
            }
        }
    }
}

impl fmt::Debug for NavigationBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NavigationBridge")
            .field("bindings", &self.len())
            .finish()
    }
}
