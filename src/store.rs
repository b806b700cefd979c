// Observable value cell with explicit subscriptions

pub type SubscriptionId = usize;

type Subscriber<T> = Box<dyn Fn(&T) + Send>;

/// A value with subscribers that are notified on every change.
///
/// Writes go through `&mut self`, so a store has a single writer. Subscribers
/// are called with the current value when they subscribe and after each
/// `set` or `update`.
pub struct Store<T> {
    value: T,
    subscribers: Vec<(SubscriptionId, Subscriber<T>)>,
    next_id: SubscriptionId,
}

impl<T> Store<T> {
    pub fn new(value: T) -> Self {
        Self {
            value,
            subscribers: Vec::new(),
            next_id: 0,
        }
    }

    pub fn get(&self) -> &T {
        &self.value
    }

    pub fn subscribe(&mut self, subscriber: impl Fn(&T) + Send + 'static) -> SubscriptionId {
        let id = self.next_id;
        self.next_id += 1;
        subscriber(&self.value);
        self.subscribers.push((id, Box::new(subscriber)));
        id
    }

    /// Returns false when the subscription was already gone.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(sid, _)| *sid != id);
        self.subscribers.len() != before
    }

    pub fn set(&mut self, value: T) {
        self.value = value;
        self.notify();
    }

    pub fn update(&mut self, f: impl FnOnce(&mut T)) {
        f(&mut self.value);
        self.notify();
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    fn notify(&self) {
        for (_, subscriber) in &self.subscribers {
            subscriber(&self.value);
        }
    }
}

impl<T: Default> Default for Store<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}
