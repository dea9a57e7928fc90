//! Event registry: maps a stored event's type tag to a typed decoder.
//!
//! Each bounded context owns a registry over its closed event catalog `E`.
//! Decoders are pure; the same stored event always decodes to the same value.

use std::collections::HashMap;
use std::fmt;

use serde::de::DeserializeOwned;

use crate::error::DomainError;
use crate::event::{EventType, StoredEvent};

type Decoder<E> = Box<dyn Fn(&StoredEvent) -> Result<E, DomainError> + Send + Sync>;

/// Registry of decoders keyed by event type.
pub struct EventRegistry<E> {
    decoders: HashMap<EventType, Decoder<E>>,
}

impl<E> EventRegistry<E> {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            decoders: HashMap::new(),
        }
    }

    /// Registers `decoder` for `event_type`, replacing any previous one.
    /// Empty event types are ignored.
    pub fn register<F>(&mut self, event_type: impl Into<EventType>, decoder: F) -> &mut Self
    where
        F: Fn(&StoredEvent) -> Result<E, DomainError> + Send + Sync + 'static,
    {
        let event_type = event_type.into();
        if event_type.is_empty() {
            return self;
        }
        self.decoders.insert(event_type, Box::new(decoder));
        self
    }

    /// Returns `true` if a decoder exists for `event_type`.
    #[must_use]
    pub fn is_registered(&self, event_type: &str) -> bool {
        self.decoders.contains_key(&EventType::from(event_type))
    }

    /// Number of registered event types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.decoders.len()
    }

    /// Returns `true` if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.decoders.is_empty()
    }

    /// Registered event types in sorted order.
    #[must_use]
    pub fn event_types(&self) -> Vec<EventType> {
        let mut types: Vec<EventType> = self.decoders.keys().cloned().collect();
        types.sort();
        types
    }

    /// Decodes one stored event.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Internal` naming the event type if no decoder is
    /// registered or the decoder fails.
    pub fn decode(&self, stored: &StoredEvent) -> Result<E, DomainError> {
        let decoder = self.decoders.get(&stored.event_type).ok_or_else(|| {
            DomainError::Internal(format!(
                "no decoder registered for event type {}",
                stored.event_type
            ))
        })?;
        decoder(stored)
    }

    /// Decodes a whole stream. Fails on the first undecodable event so that
    /// callers never fold a partial stream.
    ///
    /// # Errors
    ///
    /// Returns the first decode error.
    pub fn decode_all(&self, stored: &[StoredEvent]) -> Result<Vec<E>, DomainError> {
        stored.iter().map(|event| self.decode(event)).collect()
    }
}

impl<E> Default for EventRegistry<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> fmt::Debug for EventRegistry<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventRegistry")
            .field("event_types", &self.event_types())
            .finish()
    }
}

/// Deserializes the payload of `stored` into `T`.
///
/// # Errors
///
/// Returns `DomainError::Internal` naming the event type on failure.
pub fn decode_payload<T: DeserializeOwned>(stored: &StoredEvent) -> Result<T, DomainError> {
    serde_json::from_value(stored.data.clone()).map_err(|e| {
        DomainError::Internal(format!(
            "event deserialization failed for {} (aggregate {}, sequence {}): {e}",
            stored.event_type, stored.aggregate_id, stored.sequence
        ))
    })
}
