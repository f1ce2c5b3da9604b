//! Shared upstream subscriptions with replay of the latest value.
//!
//! All subscribers with the same serialized parameters share one upstream
//! subscription. The upstream is started when the first subscriber arrives
//! and torn down once the last one has left and the retention time has
//! passed. A subscriber joining after the upstream has emitted receives the
//! latest value immediately.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use log::{debug, warn};

use crate::config::CachePolicy;
use crate::retention::RetentionCache;
use crate::scheduler::Scheduler;

pub type Listener<D> = Rc<dyn Fn(&D)>;

/// Stops an upstream subscription.
pub type Teardown = Box<dyn FnOnce()>;

struct Channel<D> {
    listeners: RefCell<Vec<Listener<D>>>,
    last: RefCell<Option<Rc<D>>>,
    teardown: RefCell<Option<Teardown>>,
    closed: Cell<bool>,
}

impl<D> Channel<D> {
    fn new() -> Self {
        Channel {
            listeners: RefCell::new(Vec::new()),
            last: RefCell::new(None),
            teardown: RefCell::new(None),
            closed: Cell::new(false),
        }
    }

    fn add(&self, listener: &Listener<D>) {
        let mut listeners = self.listeners.borrow_mut();
        if listeners.iter().any(|l| Rc::ptr_eq(l, listener)) {
            warn!("listener is already subscribed");
            return;
        }
        listeners.push(listener.clone());
    }

    fn remove(&self, listener: &Listener<D>) {
        let mut listeners = self.listeners.borrow_mut();
        match listeners.iter().position(|l| Rc::ptr_eq(l, listener)) {
            Some(i) => {
                listeners.remove(i);
            }
            None => warn!("unsubscribing a listener that is not subscribed"),
        }
    }

    fn emit(&self, data: D) {
        if self.closed.get() {
            warn!("emit after upstream teardown ignored");
            return;
        }
        let data = Rc::new(data);
        *self.last.borrow_mut() = Some(data.clone());
        // Listeners added or removed during delivery take effect next time.
        let snapshot = self.listeners.borrow().clone();
        for listener in snapshot {
            listener(&*data);
        }
    }

    fn close(&self) {
        self.closed.set(true);
        self.listeners.borrow_mut().clear();
        let teardown = self.teardown.borrow_mut().take();
        match teardown {
            Some(teardown) => teardown(),
            None => warn!("upstream closed before it finished starting"),
        }
    }
}

/// Handle given to an upstream generator for pushing new data.
pub struct Emitter<D> {
    channel: Weak<Channel<D>>,
}

impl<D> Clone for Emitter<D> {
    fn clone(&self) -> Self {
        Emitter {
            channel: self.channel.clone(),
        }
    }
}

impl<D> Emitter<D> {
    /// Stores `data` as the latest value and delivers it to every current
    /// listener, synchronously and in subscription order.
    pub fn emit(&self, data: D) {
        match self.channel.upgrade() {
            Some(channel) => channel.emit(data),
            None => warn!("emit after upstream teardown ignored"),
        }
    }
}

impl<D> fmt::Debug for Emitter<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Emitter")
            .field("open", &self.channel.upgrade().is_some_and(|c| !c.closed.get()))
            .finish()
    }
}

/// Deduplicates upstream subscriptions by parameters.
pub struct SubscriptionCache<P, D> {
    cache: RetentionCache<P, Rc<Channel<D>>>,
}

impl<P: 'static, D: 'static> SubscriptionCache<P, D> {
    /// `generator` starts the upstream for a set of parameters and returns
    /// its teardown. It may emit before returning.
    pub fn new(
        policy: CachePolicy,
        scheduler: Rc<dyn Scheduler>,
        serializer: impl Fn(&P) -> String + 'static,
        generator: impl Fn(&P, Emitter<D>) -> Teardown + 'static,
    ) -> Self {
        let cache = RetentionCache::new(
            policy,
            scheduler,
            serializer,
            move |params: &P| {
                let channel = Rc::new(Channel::new());
                let emitter = Emitter {
                    channel: Rc::downgrade(&channel),
                };
                debug!("starting upstream");
                let teardown = generator(params, emitter);
                *channel.teardown.borrow_mut() = Some(teardown);
                channel
            },
            |channel: Rc<Channel<D>>| {
                debug!("stopping upstream");
                channel.close();
            },
        );
        SubscriptionCache { cache }
    }

    /// Registers `listener` for `params`, starting the upstream if this is
    /// the first subscriber. If the upstream has already emitted, `listener`
    /// is called with the latest value before this returns.
    pub fn subscribe(&self, params: &P, listener: Listener<D>) -> Subscription {
        let lease = self.cache.acquire(params);
        let channel = lease.instance().clone();
        channel.add(&listener);

        let last = channel.last.borrow().clone();
        if let Some(last) = last {
            listener(&*last);
        }

        Subscription {
            unsubscribe: RefCell::new(Some(Box::new(move || {
                channel.remove(&listener);
                lease.release();
            }))),
        }
    }

    /// Number of upstreams that are running or awaiting teardown.
    pub fn size(&self) -> usize {
        self.cache.size()
    }
}

/// A registered listener.
///
/// Dropping a subscription does not unsubscribe; call
/// [`Subscription::unsubscribe`].
#[must_use = "a subscription stays active until unsubscribed"]
pub struct Subscription {
    unsubscribe: RefCell<Option<Box<dyn FnOnce()>>>,
}

impl Subscription {
    /// Removes the listener. Only the first call has an effect.
    pub fn unsubscribe(&self) {
        let unsubscribe = self.unsubscribe.borrow_mut().take();
        if let Some(unsubscribe) = unsubscribe {
            unsubscribe();
        }
    }

    pub fn is_active(&self) -> bool {
        self.unsubscribe.borrow().is_some()
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use log::Level;

    use super::*;
    use crate::scheduler::ManualScheduler;
    use crate::test_log::{capture, quietly};

    const RETENTION: Duration = Duration::from_millis(100);

    #[derive(Default)]
    struct Upstream {
        started: Cell<usize>,
        stopped: Cell<usize>,
        emitters: RefCell<Vec<Emitter<u32>>>,
    }

    impl Upstream {
        fn emit(&self, data: u32) {
            for emitter in self.emitters.borrow().iter() {
                emitter.emit(data);
            }
        }
    }

    fn setup() -> (ManualScheduler, Rc<Upstream>, SubscriptionCache<&'static str, u32>) {
        let scheduler = ManualScheduler::new();
        let upstream = Rc::new(Upstream::default());
        let source = upstream.clone();
        let cache = SubscriptionCache::new(
            CachePolicy::new(RETENTION),
            Rc::new(scheduler.clone()),
            |topic: &&'static str| topic.to_string(),
            move |_: &&'static str, emitter| {
                source.started.set(source.started.get() + 1);
                source.emitters.borrow_mut().push(emitter);
                let source = source.clone();
                Box::new(move || source.stopped.set(source.stopped.get() + 1))
            },
        );
        (scheduler, upstream, cache)
    }

    fn collector() -> (Rc<RefCell<Vec<u32>>>, Listener<u32>) {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        (seen, Rc::new(move |d: &u32| sink.borrow_mut().push(*d)))
    }

    #[test]
    fn one_upstream_per_key() {
        quietly(|| {
            let (scheduler, upstream, cache) = setup();
            let (a_seen, a) = collector();
            let (b_seen, b) = collector();

            let sa = cache.subscribe(&"prices", a);
            let sb = cache.subscribe(&"prices", b);
            assert_eq!(upstream.started.get(), 1);
            assert_eq!(cache.size(), 1);

            upstream.emit(7);
            assert_eq!(*a_seen.borrow(), vec![7]);
            assert_eq!(*b_seen.borrow(), vec![7]);

            sa.unsubscribe();
            sb.unsubscribe();
            scheduler.advance(RETENTION);
            assert_eq!(upstream.stopped.get(), 1);
            assert_eq!(cache.size(), 0);
        });
    }

    #[test]
    fn late_subscriber_gets_latest_value() {
        quietly(|| {
            let (_scheduler, upstream, cache) = setup();
            let (_, first) = collector();
            let _s1 = cache.subscribe(&"t", first);
            upstream.emit(1);
            upstream.emit(2);

            let (late_seen, late) = collector();
            let _s2 = cache.subscribe(&"t", late);
            assert_eq!(*late_seen.borrow(), vec![2]);

            upstream.emit(3);
            assert_eq!(*late_seen.borrow(), vec![2, 3]);
        });
    }

    #[test]
    fn no_replay_before_first_emit() {
        quietly(|| {
            let (_scheduler, _upstream, cache) = setup();
            let (seen, listener) = collector();
            let _s = cache.subscribe(&"t", listener);
            assert!(seen.borrow().is_empty());
        });
    }

    #[test]
    fn self_unsubscribe_during_emit() {
        quietly(|| {
            let (_scheduler, upstream, cache) = setup();
            let slot: Rc<RefCell<Option<Subscription>>> = Rc::new(RefCell::new(None));
            let calls = Rc::new(Cell::new(0));

            let (slot_in, calls_in) = (slot.clone(), calls.clone());
            let quitter: Listener<u32> = Rc::new(move |_: &u32| {
                calls_in.set(calls_in.get() + 1);
                if let Some(sub) = slot_in.borrow().as_ref() {
                    sub.unsubscribe();
                }
            });
            let (other_seen, other) = collector();

            *slot.borrow_mut() = Some(cache.subscribe(&"t", quitter));
            let _other = cache.subscribe(&"t", other);

            upstream.emit(1);
            upstream.emit(2);

            assert_eq!(calls.get(), 1);
            assert_eq!(*other_seen.borrow(), vec![1, 2]);
        });
    }

    #[test]
    fn unsubscribing_another_listener_mid_emit_keeps_this_pass() {
        quietly(|| {
            let (_scheduler, upstream, cache) = setup();
            let victim_slot: Rc<RefCell<Option<Subscription>>> = Rc::new(RefCell::new(None));

            let slot_in = victim_slot.clone();
            let killer: Listener<u32> = Rc::new(move |_: &u32| {
                if let Some(sub) = slot_in.borrow().as_ref() {
                    sub.unsubscribe();
                }
            });
            let (victim_seen, victim) = collector();

            let _killer = cache.subscribe(&"t", killer);
            *victim_slot.borrow_mut() = Some(cache.subscribe(&"t", victim));

            upstream.emit(1);
            upstream.emit(2);

            assert_eq!(*victim_seen.borrow(), vec![1]);
        });
    }

    #[test]
    fn duplicate_listener_is_delivered_once() {
        let (scheduler, upstream, cache) = setup();
        let (seen, listener) = collector();

        let first = cache.subscribe(&"t", listener.clone());
        let (second, logged) = capture(|| cache.subscribe(&"t", listener));
        assert_eq!(
            logged.messages(Level::Warn),
            vec!["listener is already subscribed"]
        );

        upstream.emit(5);
        assert_eq!(*seen.borrow(), vec![5]);

        // Each subscription holds its own reference.
        let ((), logged) = capture(|| {
            first.unsubscribe();
            scheduler.advance(RETENTION);
        });
        assert_eq!(logged.count(Level::Warn), 0);
        assert_eq!(upstream.stopped.get(), 0);

        // The shared listener is already gone when the second one leaves.
        let ((), logged) = capture(|| {
            second.unsubscribe();
            scheduler.advance(RETENTION);
        });
        assert_eq!(
            logged.messages(Level::Warn),
            vec!["unsubscribing a listener that is not subscribed"]
        );
        assert_eq!(logged.count(Level::Error), 0);
        assert_eq!(upstream.stopped.get(), 1);
    }

    #[test]
    fn unsubscribe_is_idempotent() {
        quietly(|| {
            let (scheduler, upstream, cache) = setup();
            let (_, a) = collector();
            let (_, b) = collector();
            let sa = cache.subscribe(&"t", a);
            let sb = cache.subscribe(&"t", b);

            sa.unsubscribe();
            sa.unsubscribe();
            assert!(!sa.is_active());

            scheduler.advance(RETENTION * 2);
            assert_eq!(upstream.stopped.get(), 0);
            assert!(sb.is_active());
        });
    }

    #[test]
    fn upstream_restarts_one_to_one_with_entries() {
        quietly(|| {
            let (scheduler, upstream, cache) = setup();

            for round in 1..=3 {
                let (_, listener) = collector();
                let sub = cache.subscribe(&"t", listener);
                assert_eq!(upstream.started.get(), round);
                sub.unsubscribe();

                // Resubscribing inside the retention window reuses the upstream.
                scheduler.advance(RETENTION / 2);
                let (_, listener) = collector();
                let sub = cache.subscribe(&"t", listener);
                assert_eq!(upstream.started.get(), round);
                sub.unsubscribe();

                scheduler.advance(RETENTION);
                assert_eq!(upstream.stopped.get(), round);
            }
        });
    }

    #[test]
    fn emits_after_teardown_are_ignored() {
        let (scheduler, upstream, cache) = setup();
        let (seen, listener) = collector();
        let sub = cache.subscribe(&"t", listener);
        sub.unsubscribe();
        scheduler.advance(RETENTION);

        let ((), logged) = capture(|| upstream.emit(9));

        assert!(seen.borrow().is_empty());
        assert_eq!(
            logged.messages(Level::Warn),
            vec!["emit after upstream teardown ignored"]
        );
        assert_eq!(logged.count(Level::Error), 0);
    }

    #[test]
    fn emit_during_start_is_replayed() {
        quietly(|| {
            let scheduler = ManualScheduler::new();
            let cache: SubscriptionCache<u32, u32> = SubscriptionCache::new(
                CachePolicy::new(RETENTION),
                Rc::new(scheduler),
                |n: &u32| n.to_string(),
                |n: &u32, emitter: Emitter<u32>| {
                    emitter.emit(n * 2);
                    Box::new(|| {})
                },
            );
            let (seen, listener) = collector();

            let _s = cache.subscribe(&21, listener);

            assert_eq!(*seen.borrow(), vec![42]);
        });
    }
}
