//! Reference-counted sharing of expensive instances with delayed disposal.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};
use std::time::Duration;

use log::{debug, error, trace};

use crate::config::CachePolicy;
use crate::scheduler::{Scheduler, TimerHandle};

/// Shares one instance per key among all holders of a [`Lease`].
///
/// When the last lease for a key is released, the instance lingers for the
/// retention time of the [`CachePolicy`]. Acquiring it again within that
/// window cancels the disposal; otherwise it is removed and disposed.
///
/// Clones share the same entries.
pub struct RetentionCache<K, T> {
    inner: Rc<Inner<K, T>>,
}

impl<K, T> Clone for RetentionCache<K, T> {
    fn clone(&self) -> Self {
        RetentionCache {
            inner: self.inner.clone(),
        }
    }
}

struct Inner<K, T> {
    this: Weak<Inner<K, T>>,
    entries: RefCell<HashMap<String, Entry<T>>>,
    serializer: Box<dyn Fn(&K) -> String>,
    factory: Box<dyn Fn(&K) -> T>,
    dispose: Box<dyn Fn(T)>,
    retention: Duration,
    scheduler: Rc<dyn Scheduler>,
    next_generation: Cell<u64>,
}

struct Entry<T> {
    instance: T,
    refs: usize,
    /// Distinguishes this entry from earlier ones stored under the same id.
    generation: u64,
    disposal: Option<TimerHandle>,
}

impl<K: 'static, T: Clone + 'static> RetentionCache<K, T> {
    /// `serializer` maps a key to the id entries are stored under; keys
    /// with equal ids share an instance.
    pub fn new(
        policy: CachePolicy,
        scheduler: Rc<dyn Scheduler>,
        serializer: impl Fn(&K) -> String + 'static,
        factory: impl Fn(&K) -> T + 'static,
        dispose: impl Fn(T) + 'static,
    ) -> Self {
        let inner = Rc::new_cyclic(|this| Inner {
            this: this.clone(),
            entries: RefCell::new(HashMap::new()),
            serializer: Box::new(serializer),
            factory: Box::new(factory),
            dispose: Box::new(dispose),
            retention: policy.retention(),
            scheduler,
            next_generation: Cell::new(0),
        });
        RetentionCache { inner }
    }

    /// Returns the instance for `key`, creating it if needed.
    ///
    /// A pending disposal for the key is cancelled before this returns.
    pub fn acquire(&self, key: &K) -> Lease<T> {
        let id = (self.inner.serializer)(key);
        let (instance, generation) = match self.inner.retain(&id) {
            Some(found) => found,
            None => self.inner.create(key, &id),
        };
        Lease {
            instance,
            owner: self.inner.clone(),
            id,
            generation,
            released: Cell::new(false),
        }
    }

    /// Number of live entries, including those awaiting disposal.
    pub fn size(&self) -> usize {
        self.inner.entries.borrow().len()
    }

    pub fn contains(&self, key: &K) -> bool {
        let id = (self.inner.serializer)(key);
        self.inner.entries.borrow().contains_key(&id)
    }
}

impl<K: 'static, T: Clone + 'static> Inner<K, T> {
    fn retain(&self, id: &str) -> Option<(T, u64)> {
        let mut entries = self.entries.borrow_mut();
        let entry = entries.get_mut(id)?;
        entry.refs += 1;
        if let Some(timer) = entry.disposal.take() {
            trace!("cancelled disposal of {id:?}");
            timer.cancel();
        }
        Some((entry.instance.clone(), entry.generation))
    }

    fn create(&self, key: &K, id: &str) -> (T, u64) {
        // The factory runs without the map borrowed so it may use the cache.
        let instance = (self.factory)(key);
        if let Some(found) = self.retain(id) {
            error!("entry {id:?} was created while its factory was running");
            (self.dispose)(instance);
            return found;
        }
        let generation = self.next_generation.get();
        self.next_generation.set(generation + 1);
        debug!("created entry {id:?}");
        self.entries.borrow_mut().insert(
            id.to_string(),
            Entry {
                instance: instance.clone(),
                refs: 1,
                generation,
                disposal: None,
            },
        );
        (instance, generation)
    }

    fn expire(&self, id: &str, generation: u64) {
        let mut entries = self.entries.borrow_mut();
        let Some(entry) = entries.get(id) else {
            error!("disposal of {id:?} fired but the entry is already gone");
            return;
        };
        if entry.generation != generation {
            error!("disposal of {id:?} fired for a replaced entry");
            return;
        }
        if entry.refs != 0 {
            error!("disposal of {id:?} fired with {} live references", entry.refs);
            return;
        }
        let Some(entry) = entries.remove(id) else {
            return;
        };
        drop(entries);
        debug!("disposing entry {id:?}");
        (self.dispose)(entry.instance);
    }
}

trait Release {
    fn release(&self, id: &str, generation: u64);
}

impl<K: 'static, T: Clone + 'static> Release for Inner<K, T> {
    fn release(&self, id: &str, generation: u64) {
        {
            let mut entries = self.entries.borrow_mut();
            let Some(entry) = entries.get_mut(id).filter(|e| e.generation == generation) else {
                error!("released {id:?} but no matching entry exists");
                return;
            };
            if entry.refs == 0 {
                error!("released {id:?} with no live references");
                return;
            }
            entry.refs -= 1;
            if entry.refs > 0 {
                return;
            }
        }

        trace!("scheduling disposal of {id:?} in {:?}", self.retention);
        let this = self.this.clone();
        let task_id = id.to_string();
        let timer = self.scheduler.schedule(
            self.retention,
            Box::new(move || {
                if let Some(inner) = this.upgrade() {
                    inner.expire(&task_id, generation);
                }
            }),
        );
        if let Some(entry) = self.entries.borrow_mut().get_mut(id) {
            entry.disposal = Some(timer);
        }
    }
}

/// A counted reference to a cached instance.
///
/// Dropping a lease does not release it; call [`Lease::release`].
#[must_use = "a lease keeps its entry alive until released"]
pub struct Lease<T> {
    instance: T,
    owner: Rc<dyn Release>,
    id: String,
    generation: u64,
    released: Cell<bool>,
}

impl<T> Lease<T> {
    pub fn instance(&self) -> &T {
        &self.instance
    }

    /// Gives the reference back. Only the first call has an effect.
    pub fn release(&self) {
        if self.released.replace(true) {
            return;
        }
        self.owner.release(&self.id, self.generation);
    }

    pub fn is_released(&self) -> bool {
        self.released.get()
    }
}

impl<T: fmt::Debug> fmt::Debug for Lease<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lease")
            .field("id", &self.id)
            .field("instance", &self.instance)
            .field("released", &self.released.get())
            .finish()
    }
}
