//! Shared views keyed by query hash.
//!
//! Identical queries subscribed at the same time share one hydrated view.
//! Each `subscribe` takes a reference and each `unsubscribe` drops one; the
//! view is destroyed when the last reference goes away.

use crate::view::ArrayView;
use hashbrown::HashMap;
use std::cell::RefCell;
use std::rc::Rc;
use tracing::debug;
use trellis_core::Result;

struct Registered {
    view: Rc<ArrayView>,
    ref_count: usize,
}

type Views = Rc<RefCell<HashMap<String, Registered>>>;

/// Owns the live views of a binding layer.
#[derive(Default)]
pub struct ViewRegistry {
    views: Views,
}

impl ViewRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the view registered under `hash`, creating and hydrating it
    /// with `factory` on first use.
    ///
    /// Factory and hydration errors are returned and nothing is registered.
    pub fn subscribe<F>(&self, hash: &str, factory: F) -> Result<Rc<ArrayView>>
    where
        F: FnOnce() -> Result<Rc<ArrayView>>,
    {
        if let Some(registered) = self.views.borrow_mut().get_mut(hash) {
            registered.ref_count += 1;
            return Ok(registered.view.clone());
        }

        let view = factory()?;
        if !view.is_hydrated() {
            if let Err(err) = view.hydrate() {
                view.destroy();
                return Err(err);
            }
        }

        let views = Rc::downgrade(&self.views);
        let key = hash.to_string();
        view.set_on_destroy(move || {
            if let Some(views) = views.upgrade() {
                views.borrow_mut().remove(&key);
            }
        });

        debug!(hash, "view registered");
        self.views.borrow_mut().insert(
            hash.to_string(),
            Registered {
                view: view.clone(),
                ref_count: 1,
            },
        );
        Ok(view)
    }

    /// Drops one reference to the view under `hash`, destroying it when no
    /// references remain. Returns false if no such view is registered.
    pub fn unsubscribe(&self, hash: &str) -> bool {
        let released = {
            let mut views = self.views.borrow_mut();
            let Some(registered) = views.get_mut(hash) else {
                return false;
            };
            registered.ref_count -= 1;
            if registered.ref_count > 0 {
                return true;
            }
            views.remove(hash).map(|r| r.view)
        };
        if let Some(view) = released {
            debug!(hash, "view released");
            view.destroy();
        }
        true
    }

    pub fn get(&self, hash: &str) -> Option<Rc<ArrayView>> {
        self.views.borrow().get(hash).map(|r| r.view.clone())
    }

    /// Number of live subscriptions to the view under `hash`.
    pub fn ref_count(&self, hash: &str) -> usize {
        self.views.borrow().get(hash).map_or(0, |r| r.ref_count)
    }

    pub fn len(&self) -> usize {
        self.views.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.views.borrow().is_empty()
    }
}
