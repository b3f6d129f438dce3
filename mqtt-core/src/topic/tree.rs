//! Transactional trie over subscriptions (component B). Keyed by topic
//! filter segment; `+` and `#` are ordinary map keys alongside literal
//! segments. Grounded on the aws-c-mqtt topic tree: a root node, child
//! lookup by segment, and insert/remove/publish walking the tree one level
//! at a time.

use std::collections::HashMap;

use crate::err::{DecodeError, DecodeErrorKind};
use crate::qos::QosLevel;
use crate::topic::{TopicFilter, TopicName, TopicToken};

/// A live subscription attached to a terminal topic node.
pub struct Subscription {
    pub qos: QosLevel,
    pub callback: Box<dyn FnMut(&str, &[u8]) + Send>,
    pub cleanup: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(
        qos: QosLevel,
        callback: Box<dyn FnMut(&str, &[u8]) + Send>,
        cleanup: Option<Box<dyn FnOnce() + Send>>,
    ) -> Self {
        Self {
            qos,
            callback,
            cleanup,
        }
    }
}

#[derive(Default)]
struct TopicNode {
    subtopics: HashMap<String, TopicNode>,
    /// Set only on a terminal subscription node; doubles as the owned
    /// filter string backing every segment key on the path to this node.
    full_filter: Option<String>,
    subscription: Option<Subscription>,
}

impl TopicNode {
    fn is_empty_leaf(&self) -> bool {
        self.subtopics.is_empty() && self.subscription.is_none()
    }
}

/// One reversible step recorded while applying a transaction. `commit`
/// drops these; `roll_back` replays them in reverse.
enum TreeAction {
    AddNode { path: Vec<String> },
    RemoveNode { path: Vec<String>, removed: TopicNode },
    SetSubscription {
        path: Vec<String>,
        previous: Option<Subscription>,
        previous_filter: Option<String>,
    },
    ClearSubscription {
        path: Vec<String>,
        previous: Option<Subscription>,
        previous_filter: Option<String>,
    },
}

/// A batch of subscribe/unsubscribe operations applied atomically: either
/// every action in the transaction lands (`commit`) or none of them do
/// (`roll_back`), because a single SUBSCRIBE packet can carry multiple
/// filters and any one of them might fail validation.
#[derive(Default)]
pub struct Transaction {
    actions: Vec<TreeAction>,
}

pub struct TopicTree {
    root: TopicNode,
}

impl Default for TopicTree {
    fn default() -> Self {
        Self::new()
    }
}

impl TopicTree {
    pub fn new() -> Self {
        Self {
            root: TopicNode::default(),
        }
    }

    fn segments(filter: &TopicFilter) -> Vec<String> {
        filter
            .clone()
            .into_iter()
            .map(|token| segment_key(&token))
            .collect()
    }

    /// Subscribes `filter`, staging the walk into `txn` so a failure in a
    /// later filter of the same SUBSCRIBE can be rolled back.
    pub fn transaction_insert(
        &mut self,
        txn: &mut Transaction,
        filter: &TopicFilter,
        qos: QosLevel,
        callback: Box<dyn FnMut(&str, &[u8]) + Send>,
        cleanup: Option<Box<dyn FnOnce() + Send>>,
    ) -> Result<(), DecodeError> {
        let segments = Self::segments(filter);
        if segments.is_empty() {
            return Err(DecodeError::new(
                DecodeErrorKind::MalformedTopicFilter,
                String::from("topic filter has no segments"),
            ));
        }

        let mut node = &mut self.root;
        let mut path = Vec::with_capacity(segments.len());
        for segment in &segments {
            path.push(segment.clone());
            if !node.subtopics.contains_key(segment) {
                node.subtopics.insert(segment.clone(), TopicNode::default());
                txn.actions.push(TreeAction::AddNode { path: path.clone() });
            }
            node = node.subtopics.get_mut(segment).expect("just inserted");
        }

        let previous = node.subscription.take();
        let previous_filter = node.full_filter.take();

        txn.actions.push(TreeAction::SetSubscription {
            path,
            previous,
            previous_filter,
        });

        node.full_filter = Some(filter.clone().to_string());
        node.subscription = Some(Subscription::new(qos, callback, cleanup));

        Ok(())
    }

    /// Unsubscribes `filter`, staging the walk into `txn`. Unknown filters
    /// are not an error (idempotent unsubscribe) — the action list simply
    /// gains no entries.
    pub fn transaction_remove(&mut self, txn: &mut Transaction, filter: &TopicFilter) {
        let segments = Self::segments(filter);
        if segments.is_empty() {
            return;
        }

        if let Some(node) = Self::find_mut(&mut self.root, &segments) {
            let previous = node.subscription.take();
            let previous_filter = node.full_filter.take();
            txn.actions.push(TreeAction::ClearSubscription {
                path: segments.clone(),
                previous,
                previous_filter,
            });
        }

        self.prune(&segments, txn);
    }

    fn find_mut<'a>(root: &'a mut TopicNode, segments: &[String]) -> Option<&'a mut TopicNode> {
        let mut node = root;
        for segment in segments {
            node = node.subtopics.get_mut(segment)?;
        }
        Some(node)
    }

    /// Removes any now-empty internal node on the path, working from the
    /// leaf back up to (but not including) the root.
    fn prune(&mut self, segments: &[String], txn: &mut Transaction) {
        for depth in (1..=segments.len()).rev() {
            let parent_path = &segments[..depth - 1];
            let key = &segments[depth - 1];

            let Some(parent) = Self::find_mut(&mut self.root, parent_path) else {
                break;
            };
            let should_remove = parent
                .subtopics
                .get(key)
                .map(TopicNode::is_empty_leaf)
                .unwrap_or(false);

            if should_remove {
                let removed = parent.subtopics.remove(key).expect("checked above");
                txn.actions.push(TreeAction::RemoveNode {
                    path: segments[..depth].to_vec(),
                    removed,
                });
            } else {
                break;
            }
        }
    }

    /// Applies every staged action permanently. Any subscription superseded
    /// or cleared during the transaction has its cleanup run now; the undo
    /// log itself is discarded.
    pub fn commit(&mut self, txn: Transaction) {
        for action in txn.actions {
            match action {
                TreeAction::SetSubscription { previous, .. }
                | TreeAction::ClearSubscription { previous, .. } => {
                    if let Some(old) = previous {
                        if let Some(cleanup) = old.cleanup {
                            cleanup();
                        }
                    }
                }
                TreeAction::AddNode { .. } | TreeAction::RemoveNode { .. } => {}
            }
        }
    }

    /// Reverses every staged action in `txn`, in reverse order, restoring
    /// the tree to its pre-transaction state.
    pub fn roll_back(&mut self, mut txn: Transaction) {
        while let Some(action) = txn.actions.pop() {
            match action {
                TreeAction::AddNode { path } => {
                    if let Some(parent) = Self::find_mut(&mut self.root, &path[..path.len() - 1])
                    {
                        parent.subtopics.remove(path.last().unwrap());
                    }
                }
                TreeAction::RemoveNode { path, removed } => {
                    if let Some(parent) = Self::find_mut(&mut self.root, &path[..path.len() - 1])
                    {
                        parent
                            .subtopics
                            .insert(path.last().unwrap().clone(), removed);
                    }
                }
                TreeAction::SetSubscription {
                    path,
                    previous,
                    previous_filter,
                } => {
                    if let Some(node) = Self::find_mut(&mut self.root, &path) {
                        node.subscription = previous;
                        node.full_filter = previous_filter;
                    }
                }
                TreeAction::ClearSubscription {
                    path,
                    previous,
                    previous_filter,
                } => {
                    if let Some(node) = Self::find_mut(&mut self.root, &path) {
                        node.subscription = previous;
                        node.full_filter = previous_filter;
                    }
                }
            }
        }
    }

    /// Non-transactional convenience wrapper around `transaction_insert`.
    pub fn insert(
        &mut self,
        filter: &TopicFilter,
        qos: QosLevel,
        callback: Box<dyn FnMut(&str, &[u8]) + Send>,
        cleanup: Option<Box<dyn FnOnce() + Send>>,
    ) -> Result<(), DecodeError> {
        let mut txn = Transaction::default();
        self.transaction_insert(&mut txn, filter, qos, callback, cleanup)?;
        self.commit(txn);
        Ok(())
    }

    /// Non-transactional convenience wrapper around `transaction_remove`.
    pub fn remove(&mut self, filter: &TopicFilter) {
        let mut txn = Transaction::default();
        self.transaction_remove(&mut txn, filter);
        self.commit(txn);
    }

    /// Dispatches an inbound PUBLISH to every matching subscription.
    /// `#` terminates a branch (it must be the final filter segment, so
    /// there is nothing further to walk once it matches); `+` and literal
    /// matches continue the walk.
    pub fn publish(&mut self, topic: &TopicName, payload: &[u8]) {
        let segments: Vec<String> = topic
            .tokens()
            .iter()
            .map(|t| match t {
                TopicToken::Dollar(s) => s.clone(),
                TopicToken::String(s) => s.clone(),
                TopicToken::SingleLevel | TopicToken::MultiLevel => {
                    unreachable!("topic names never contain wildcards")
                }
            })
            .collect();

        let starts_with_dollar = matches!(topic.tokens().first(), Some(TopicToken::Dollar(_)));
        Self::walk(&mut self.root, &segments, 0, starts_with_dollar, payload);
    }

    fn walk(node: &mut TopicNode, levels: &[String], idx: usize, is_dollar_topic: bool, payload: &[u8]) {
        if idx == levels.len() {
            if let (Some(sub), Some(filter)) = (node.subscription.as_mut(), node.full_filter.as_ref()) {
                let topic = levels.join("/");
                let _ = filter;
                (sub.callback)(&topic, payload);
            }
            return;
        }

        let level = &levels[idx];

        if let Some(child) = node.subtopics.get_mut(level) {
            Self::walk(child, levels, idx + 1, is_dollar_topic, payload);
        }

        // '+' never matches the first level of a topic beginning with '$'.
        if !(idx == 0 && is_dollar_topic) {
            if let Some(child) = node.subtopics.get_mut("+") {
                Self::walk(child, levels, idx + 1, is_dollar_topic, payload);
            }
        }

        // '#' is always a terminal match and never matches a leading '$' topic.
        if !(idx == 0 && is_dollar_topic) {
            if let Some(child) = node.subtopics.get_mut("#") {
                if let (Some(sub), Some(filter)) =
                    (child.subscription.as_mut(), child.full_filter.as_ref())
                {
                    let topic = levels.join("/");
                    let _ = filter;
                    (sub.callback)(&topic, payload);
                }
            }
        }
    }
}

fn segment_key(token: &TopicToken) -> String {
    match token {
        TopicToken::Dollar(s) => s.clone(),
        TopicToken::String(s) => s.clone(),
        TopicToken::SingleLevel => String::from("+"),
        TopicToken::MultiLevel => String::from("#"),
    }
}

#[cfg(test)]
mod tree_tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    fn collecting_callback() -> (Box<dyn FnMut(&str, &[u8]) + Send>, Arc<Mutex<Vec<String>>>) {
        let received = Arc::new(Mutex::new(Vec::new()));
        let handle = received.clone();
        let callback = Box::new(move |topic: &str, _payload: &[u8]| {
            handle.lock().unwrap().push(topic.to_string());
        });
        (callback, received)
    }

    #[test]
    fn exact_match_round_trips() {
        let mut tree = TopicTree::new();
        let (cb, received) = collecting_callback();
        tree.insert(
            &TopicFilter::from_str("sensor/kitchen/temp").unwrap(),
            QosLevel::AtLeastOnce,
            cb,
            None,
        )
        .unwrap();

        tree.publish(&TopicName::from_str("sensor/kitchen/temp").unwrap(), b"21.5");
        assert_eq!(*received.lock().unwrap(), vec!["sensor/kitchen/temp"]);
    }

    #[test]
    fn single_level_wildcard_matches_one_segment() {
        let mut tree = TopicTree::new();
        let (cb, received) = collecting_callback();
        tree.insert(
            &TopicFilter::from_str("sensor/+/temp").unwrap(),
            QosLevel::AtLeastOnce,
            cb,
            None,
        )
        .unwrap();

        tree.publish(&TopicName::from_str("sensor/kitchen/temp").unwrap(), b"21.5");
        tree.publish(&TopicName::from_str("sensor/kitchen/bath/temp").unwrap(), b"x");
        assert_eq!(*received.lock().unwrap(), vec!["sensor/kitchen/temp"]);
    }

    #[test]
    fn multi_level_wildcard_matches_parent_and_descendants() {
        let mut tree = TopicTree::new();
        let (cb, received) = collecting_callback();
        tree.insert(
            &TopicFilter::from_str("home/#").unwrap(),
            QosLevel::AtMostOnce,
            cb,
            None,
        )
        .unwrap();

        tree.publish(&TopicName::from_str("home").unwrap(), b"");
        tree.publish(&TopicName::from_str("home/a").unwrap(), b"");
        tree.publish(&TopicName::from_str("home/a/b").unwrap(), b"");
        tree.publish(&TopicName::from_str("house/a").unwrap(), b"");

        assert_eq!(
            *received.lock().unwrap(),
            vec!["home", "home/a", "home/a/b"]
        );
    }

    #[test]
    fn rollback_restores_prior_subscription() {
        let mut tree = TopicTree::new();
        let (cb1, received1) = collecting_callback();
        tree.insert(
            &TopicFilter::from_str("a/b").unwrap(),
            QosLevel::AtMostOnce,
            cb1,
            None,
        )
        .unwrap();

        let mut txn = Transaction::default();
        let (cb2, received2) = collecting_callback();
        tree.transaction_insert(
            &mut txn,
            &TopicFilter::from_str("a/b/c").unwrap(),
            QosLevel::AtMostOnce,
            cb2,
            None,
        )
        .unwrap();
        tree.roll_back(txn);

        tree.publish(&TopicName::from_str("a/b").unwrap(), b"");
        assert_eq!(*received1.lock().unwrap(), vec!["a/b"]);

        tree.publish(&TopicName::from_str("a/b/c").unwrap(), b"");
        assert!(received2.lock().unwrap().is_empty(), "rolled-back callback must never fire");
        assert!(tree.root.subtopics.get("a").unwrap().subtopics.get("b").unwrap().subtopics.is_empty());
    }

    #[test]
    fn dollar_topics_excluded_from_root_wildcards() {
        let mut tree = TopicTree::new();
        let (cb, received) = collecting_callback();
        tree.insert(&TopicFilter::from_str("#").unwrap(), QosLevel::AtMostOnce, cb, None)
            .unwrap();

        tree.publish(&TopicName::from_str("$SYS/uptime").unwrap(), b"");
        tree.publish(&TopicName::from_str("normal/topic").unwrap(), b"");

        assert_eq!(*received.lock().unwrap(), vec!["normal/topic"]);
    }

    #[test]
    fn unsubscribe_is_idempotent() {
        let mut tree = TopicTree::new();
        tree.remove(&TopicFilter::from_str("never/subscribed").unwrap());
    }

    #[test]
    fn remove_prunes_empty_ancestors() {
        let mut tree = TopicTree::new();
        let (cb, _) = collecting_callback();
        tree.insert(
            &TopicFilter::from_str("a/b/c").unwrap(),
            QosLevel::AtMostOnce,
            cb,
            None,
        )
        .unwrap();
        tree.remove(&TopicFilter::from_str("a/b/c").unwrap());

        assert!(tree.root.subtopics.is_empty());
    }
}
