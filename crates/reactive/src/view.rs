//! Materialized views over a pipeline.
//!
//! An [`ArrayView`] is the terminal output of a pipeline. It pulls the
//! initial result once on [`ArrayView::hydrate`], then applies every pushed
//! change to its tree in place and notifies listeners before the push
//! returns.

use crate::apply_change::apply_change;
use crate::entry::ViewValue;
use crate::format::Format;
use crate::subscription::{Listener, ListenerId, ListenerSet};
use std::cell::{Cell, Ref, RefCell};
use std::rc::{Rc, Weak};
use tracing::debug;
use trellis_core::ordering::assert_ordering_includes_pk;
use trellis_core::{Error, Result};
use trellis_incremental::{Change, FetchRequest, Input, Output, SourceSchema};

/// A sorted, nested snapshot of a pipeline's output.
///
/// # Example
///
/// ```ignore
/// let view = ArrayView::new(input, Format::list())?;
/// view.add_listener(|value| println!("{}", value.to_json()));
/// view.hydrate()?;
/// ```
pub struct ArrayView {
    input: Rc<dyn Input>,
    schema: SourceSchema,
    format: Format,
    root: RefCell<ViewValue>,
    listeners: RefCell<ListenerSet>,
    hydrated: Cell<bool>,
    on_destroy: RefCell<Option<Box<dyn FnOnce()>>>,
}

impl ArrayView {
    /// Creates a view over `input` and registers it as the input's output.
    ///
    /// Fails if the input's ordering does not include its primary key.
    pub fn new(input: Rc<dyn Input>, format: Format) -> Result<Rc<Self>> {
        let schema = input.schema().clone();
        assert_ordering_includes_pk(&schema.sort, &schema.primary_key)?;
        let view = Rc::new(Self {
            input,
            schema,
            root: RefCell::new(ViewValue::empty(format.singular)),
            format,
            listeners: RefCell::new(ListenerSet::new()),
            hydrated: Cell::new(false),
            on_destroy: RefCell::new(None),
        });
        let weak: Weak<dyn Output> = Rc::downgrade(&view) as Weak<dyn Output>;
        view.input.set_output(weak);
        Ok(view)
    }

    /// Fills the view from a full fetch of the input and notifies listeners.
    ///
    /// A view can only be hydrated once.
    pub fn hydrate(&self) -> Result<()> {
        if self.hydrated.replace(true) {
            return Err(Error::AlreadyHydrated);
        }
        {
            let mut root = self.root.borrow_mut();
            for node in self.input.fetch(FetchRequest::all()) {
                apply_change(&mut root, Change::add(node), &self.schema, &self.format);
            }
            debug!(table = %self.schema.table_name, rows = root.len(), "view hydrated");
        }
        self.fire_listeners();
        Ok(())
    }

    #[inline]
    pub fn is_hydrated(&self) -> bool {
        self.hydrated.get()
    }

    /// Borrows the current snapshot.
    ///
    /// The borrow must be released before the next push reaches the view.
    pub fn value(&self) -> Ref<'_, ViewValue> {
        self.root.borrow()
    }

    /// Copies the current snapshot.
    pub fn snapshot(&self) -> ViewValue {
        self.root.borrow().clone()
    }

    pub fn to_json(&self) -> serde_json::Value {
        self.root.borrow().to_json()
    }

    pub fn format(&self) -> &Format {
        &self.format
    }

    pub fn schema(&self) -> &SourceSchema {
        &self.schema
    }

    /// Registers a listener. It is called right away when the view is
    /// already hydrated, and after every change from then on.
    pub fn add_listener<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&ViewValue) + 'static,
    {
        let listener: Listener = Rc::new(listener);
        let id = self.listeners.borrow_mut().add(listener.clone());
        if self.hydrated.get() {
            listener(&self.root.borrow());
        }
        id
    }

    /// Returns true if the listener was registered.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.listeners.borrow_mut().remove(id)
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.borrow().len()
    }

    /// Sets the hook run once when the view is destroyed.
    pub fn set_on_destroy<F>(&self, hook: F)
    where
        F: FnOnce() + 'static,
    {
        *self.on_destroy.borrow_mut() = Some(Box::new(hook));
    }

    /// Tears down the pipeline behind the view and runs the destroy hook.
    pub fn destroy(&self) {
        debug!(table = %self.schema.table_name, "view destroyed");
        self.listeners.borrow_mut().clear();
        self.input.destroy();
        let hook = self.on_destroy.borrow_mut().take();
        if let Some(hook) = hook {
            hook();
        }
    }

    fn fire_listeners(&self) {
        let listeners = self.listeners.borrow().snapshot();
        let root = self.root.borrow();
        for listener in listeners {
            listener(&root);
        }
    }
}

impl Output for ArrayView {
    fn push(&self, change: Change) {
        // Hydration fetches the current state, so earlier changes are
        // already part of it.
        if !self.hydrated.get() {
            debug!(table = %self.schema.table_name, kind = change.kind(), "change before hydrate dropped");
            return;
        }
        apply_change(&mut self.root.borrow_mut(), change, &self.schema, &self.format);
        self.fire_listeners();
    }
}
