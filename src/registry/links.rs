//! Sender/receiver link table
//!
//! Links are stored once per direction in two adjacency indexes, both owned
//! here so every mutation updates the pair together. Per-device link order is
//! creation order.

use std::collections::HashMap;

use indexmap::IndexSet;

use crate::error::BrokerError;

/// Symmetric edge table keyed by sender and receiver name
#[derive(Debug, Default)]
pub struct LinkTable {
    /// sender name -> linked receiver names
    by_sender: HashMap<String, IndexSet<String>>,
    /// receiver name -> linked sender names
    by_receiver: HashMap<String, IndexSet<String>>,
}

impl LinkTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the sender's side names this receiver
    pub fn contains(&self, sender: &str, receiver: &str) -> bool {
        self.by_sender
            .get(sender)
            .is_some_and(|receivers| receivers.contains(receiver))
    }

    /// Add a link in both directions
    ///
    /// Returns false if the link already exists.
    pub fn insert(&mut self, sender: &str, receiver: &str) -> bool {
        if self.contains(sender, receiver) {
            return false;
        }

        self.by_sender
            .entry(sender.to_owned())
            .or_default()
            .insert(receiver.to_owned());
        self.by_receiver
            .entry(receiver.to_owned())
            .or_default()
            .insert(sender.to_owned());
        true
    }

    /// Remove a link in both directions
    ///
    /// Returns `Ok(false)` if the sender's side has no such link. A sender-side
    /// entry without its receiver-side twin is an
    /// [`BrokerError::InternalConsistency`]; the sender-side entry is still
    /// removed so the table converges.
    pub fn remove(&mut self, sender: &str, receiver: &str) -> Result<bool, BrokerError> {
        if !remove_from(&mut self.by_sender, sender, receiver) {
            return Ok(false);
        }

        if !remove_from(&mut self.by_receiver, receiver, sender) {
            return Err(BrokerError::InternalConsistency(format!(
                "link {sender} -> {receiver} has no receiver-side entry"
            )));
        }

        Ok(true)
    }

    /// Receivers linked to a sender, in link order
    pub fn receivers_of<'a>(&'a self, sender: &str) -> impl Iterator<Item = &'a str> + 'a {
        self.by_sender
            .get(sender)
            .into_iter()
            .flat_map(|names| names.iter().map(String::as_str))
    }

    /// Senders linked to a receiver, in link order
    pub fn senders_of<'a>(&'a self, receiver: &str) -> impl Iterator<Item = &'a str> + 'a {
        self.by_receiver
            .get(receiver)
            .into_iter()
            .flat_map(|names| names.iter().map(String::as_str))
    }

    /// Drop every link of a sender, removing each receiver's back-link
    ///
    /// Returns the number of back-links removed.
    pub fn remove_sender(&mut self, sender: &str) -> usize {
        let Some(receivers) = self.by_sender.remove(sender) else {
            return 0;
        };

        receivers
            .iter()
            .filter(|receiver| remove_from(&mut self.by_receiver, receiver, sender))
            .count()
    }

    /// Drop every link of a receiver, removing each sender's back-link
    ///
    /// Returns the number of back-links removed.
    pub fn remove_receiver(&mut self, receiver: &str) -> usize {
        let Some(senders) = self.by_receiver.remove(receiver) else {
            return 0;
        };

        senders
            .iter()
            .filter(|sender| remove_from(&mut self.by_sender, sender, receiver))
            .count()
    }

    /// Total number of links
    pub fn len(&self) -> usize {
        self.by_sender.values().map(IndexSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop a receiver's back-links while leaving the sender side intact
    #[cfg(test)]
    pub(crate) fn drop_receiver_side(&mut self, receiver: &str) {
        self.by_receiver.remove(receiver);
    }
}

/// Remove `value` from the set under `key`, dropping the set when it empties
fn remove_from(index: &mut HashMap<String, IndexSet<String>>, key: &str, value: &str) -> bool {
    let Some(set) = index.get_mut(key) else {
        return false;
    };

    let removed = set.shift_remove(value);
    if set.is_empty() {
        index.remove(key);
    }
    removed
}
