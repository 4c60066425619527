//! The lifecycle notification dispatcher.
//!
//! Observers attach to a subset of the three lifecycle events and run in
//! registration order. The ledger commits its own state before dispatching,
//! so handlers only ever see consistent snapshots; the first handler error
//! aborts the enclosing ledger operation.

use crate::domain::PaymentId;
use crate::domain::notification::LifecycleEventKind;
use crate::domain::payment::PaymentSnapshot;
use crate::error::{PaymentError, Result};
use std::collections::HashMap;
use std::sync::Arc;

pub trait MadeHandler: Send + Sync {
    fn on_payment_made(&self, id: PaymentId, new: &PaymentSnapshot) -> Result<()>;
}

pub trait UpdatedHandler: Send + Sync {
    fn on_payment_updated(
        &self,
        id: PaymentId,
        old: &PaymentSnapshot,
        new: &PaymentSnapshot,
    ) -> Result<()>;
}

pub trait CanceledHandler: Send + Sync {
    fn on_payment_canceled(
        &self,
        id: PaymentId,
        old: &PaymentSnapshot,
        new: &PaymentSnapshot,
    ) -> Result<()>;
}

/// A registrable observer. The `as_*` accessors double as the
/// registration-time probe: returning `Some` declares support for that
/// event, `None` declines it.
pub trait LifecycleObserver: Send + Sync {
    /// Stable name; the registry key.
    fn name(&self) -> &str;

    /// Compatibility probe. Must be a no-op that does not fail; registration
    /// rejects a candidate whose probe errors.
    fn probe(&self) -> Result<()> {
        Ok(())
    }

    fn as_made(&self) -> Option<&dyn MadeHandler> {
        None
    }

    fn as_updated(&self) -> Option<&dyn UpdatedHandler> {
        None
    }

    fn as_canceled(&self) -> Option<&dyn CanceledHandler> {
        None
    }
}

/// Capability token returned by registration. Unregistration presents it
/// back; without the nonce a third party cannot force a detachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistrationTicket {
    dispatcher: u64,
    nonce: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryChange {
    Attached(LifecycleEventKind),
    Detached(LifecycleEventKind),
}

const EVENT_KINDS: [LifecycleEventKind; 3] = [
    LifecycleEventKind::Made,
    LifecycleEventKind::Updated,
    LifecycleEventKind::Canceled,
];

struct Registration {
    observer: Arc<dyn LifecycleObserver>,
    ticket: RegistrationTicket,
    /// Attachment flags indexed like `EVENT_KINDS`.
    attached: [bool; 3],
}

pub struct LifecycleDispatcher {
    id: u64,
    /// Registration order; dispatch walks this.
    order: Vec<String>,
    registrations: HashMap<String, Registration>,
}

impl Default for LifecycleDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl LifecycleDispatcher {
    pub fn new() -> Self {
        Self {
            id: rand::random(),
            order: Vec::new(),
            registrations: HashMap::new(),
        }
    }

    fn declared(observer: &dyn LifecycleObserver) -> [bool; 3] {
        [
            observer.as_made().is_some(),
            observer.as_updated().is_some(),
            observer.as_canceled().is_some(),
        ]
    }

    /// Attaches the observer to exactly the events it declares, detaching it
    /// from the rest. Idempotent: re-registering with an unchanged
    /// declaration reports no changes and keeps the existing ticket.
    pub fn register(
        &mut self,
        observer: Arc<dyn LifecycleObserver>,
    ) -> Result<(RegistrationTicket, Vec<RegistryChange>)> {
        observer
            .probe()
            .map_err(|e| PaymentError::ProbeRejected(observer.name().to_string(), e.to_string()))?;

        let name = observer.name().to_string();
        let declared = Self::declared(observer.as_ref());
        let mut changes = Vec::new();

        if let Some(existing) = self.registrations.get_mut(&name) {
            for (i, kind) in EVENT_KINDS.iter().enumerate() {
                match (existing.attached[i], declared[i]) {
                    (false, true) => changes.push(RegistryChange::Attached(*kind)),
                    (true, false) => changes.push(RegistryChange::Detached(*kind)),
                    _ => {}
                }
            }
            existing.observer = observer;
            existing.attached = declared;
            for change in &changes {
                log::debug!("observer '{name}' registry change: {change:?}");
            }
            return Ok((existing.ticket, changes));
        }

        let ticket = RegistrationTicket {
            dispatcher: self.id,
            nonce: rand::random(),
        };
        for (i, kind) in EVENT_KINDS.iter().enumerate() {
            if declared[i] {
                changes.push(RegistryChange::Attached(*kind));
            }
        }
        self.order.push(name.clone());
        self.registrations.insert(
            name.clone(),
            Registration {
                observer,
                ticket,
                attached: declared,
            },
        );
        log::debug!("observer '{name}' registered: {changes:?}");
        Ok((ticket, changes))
    }

    /// Detaches the named observer from all events. Fails closed when the
    /// presented ticket does not match the one issued at registration.
    pub fn unregister(&mut self, name: &str, ticket: RegistrationTicket) -> Result<Vec<RegistryChange>> {
        let matches = self
            .registrations
            .get(name)
            .is_some_and(|r| r.ticket == ticket);
        let Some(registration) = matches.then(|| self.registrations.remove(name)).flatten() else {
            return Err(PaymentError::TicketMismatch(name.to_string()));
        };
        self.order.retain(|n| n != name);
        let changes = EVENT_KINDS
            .iter()
            .enumerate()
            .filter(|(i, _)| registration.attached[*i])
            .map(|(_, kind)| RegistryChange::Detached(*kind))
            .collect::<Vec<_>>();
        log::debug!("observer '{name}' unregistered: {changes:?}");
        Ok(changes)
    }

    pub fn dispatch_made(&self, id: PaymentId, new: &PaymentSnapshot) -> Result<()> {
        self.for_each_attached(LifecycleEventKind::Made, |observer| {
            match observer.as_made() {
                Some(handler) => handler.on_payment_made(id, new),
                None => Ok(()),
            }
        })
    }

    pub fn dispatch_updated(
        &self,
        id: PaymentId,
        old: &PaymentSnapshot,
        new: &PaymentSnapshot,
    ) -> Result<()> {
        self.for_each_attached(LifecycleEventKind::Updated, |observer| {
            match observer.as_updated() {
                Some(handler) => handler.on_payment_updated(id, old, new),
                None => Ok(()),
            }
        })
    }

    pub fn dispatch_canceled(
        &self,
        id: PaymentId,
        old: &PaymentSnapshot,
        new: &PaymentSnapshot,
    ) -> Result<()> {
        self.for_each_attached(LifecycleEventKind::Canceled, |observer| {
            match observer.as_canceled() {
                Some(handler) => handler.on_payment_canceled(id, old, new),
                None => Ok(()),
            }
        })
    }

    fn for_each_attached<F>(&self, event: LifecycleEventKind, mut invoke: F) -> Result<()>
    where
        F: FnMut(&dyn LifecycleObserver) -> Result<()>,
    {
        let slot = match event {
            LifecycleEventKind::Made => 0,
            LifecycleEventKind::Updated => 1,
            LifecycleEventKind::Canceled => 2,
        };
        for name in &self.order {
            let registration = &self.registrations[name];
            if !registration.attached[slot] {
                continue;
            }
            invoke(registration.observer.as_ref()).map_err(|e| PaymentError::ObserverFailure {
                name: name.clone(),
                event,
                source: Box::new(e),
            })?;
        }
        Ok(())
    }
}
