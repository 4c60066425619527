//! Observer registry behavior through the ledger entry points.

mod common;

use cardpay::application::dispatcher::{LifecycleObserver, MadeHandler};
use cardpay::domain::PaymentId;
use cardpay::domain::payment::PaymentSnapshot;
use cardpay::error::{PaymentError, Result};
use common::*;
use std::sync::{Arc, Mutex};

struct CountingObserver {
    made: Mutex<u32>,
}

impl CountingObserver {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            made: Mutex::new(0),
        })
    }

    fn made_count(&self) -> u32 {
        *self.made.lock().unwrap()
    }
}

impl LifecycleObserver for CountingObserver {
    fn name(&self) -> &str {
        "counting"
    }

    fn as_made(&self) -> Option<&dyn MadeHandler> {
        Some(self)
    }
}

impl MadeHandler for CountingObserver {
    fn on_payment_made(&self, _id: PaymentId, _new: &PaymentSnapshot) -> Result<()> {
        *self.made.lock().unwrap() += 1;
        Ok(())
    }
}

struct BrokenProbe;

impl LifecycleObserver for BrokenProbe {
    fn name(&self) -> &str {
        "broken"
    }

    fn probe(&self) -> Result<()> {
        Err(PaymentError::NothingToClaim)
    }
}

#[test]
fn test_registered_observer_sees_ledger_operations() {
    let mut h = Harness::new();
    let observer = CountingObserver::new();
    h.ledger.register_observer(OPERATOR, observer.clone()).unwrap();

    h.ledger
        .make(OPERATOR, h.make_request(1, 1000 * UNIT, 0, 0, 0))
        .unwrap();
    h.ledger
        .make(OPERATOR, h.make_request(2, 1000 * UNIT, 0, 0, 0))
        .unwrap();
    assert_eq!(observer.made_count(), 2);
}

#[test]
fn test_unregistered_observer_stops_receiving() {
    let mut h = Harness::new();
    let observer = CountingObserver::new();
    let (ticket, _) = h.ledger.register_observer(OPERATOR, observer.clone()).unwrap();

    h.ledger
        .make(OPERATOR, h.make_request(1, 1000 * UNIT, 0, 0, 0))
        .unwrap();
    h.ledger.unregister_observer(OPERATOR, "counting", ticket).unwrap();
    h.ledger
        .make(OPERATOR, h.make_request(2, 1000 * UNIT, 0, 0, 0))
        .unwrap();

    assert_eq!(observer.made_count(), 1);
}

#[test]
fn test_failing_probe_blocks_registration() {
    let mut h = Harness::new();
    assert!(matches!(
        h.ledger.register_observer(OPERATOR, Arc::new(BrokenProbe)),
        Err(PaymentError::ProbeRejected(name, _)) if name == "broken"
    ));
}

#[test]
fn test_observer_error_aborts_the_operation() {
    struct Rejecting;

    impl LifecycleObserver for Rejecting {
        fn name(&self) -> &str {
            "rejecting"
        }

        fn as_made(&self) -> Option<&dyn MadeHandler> {
            Some(self)
        }
    }

    impl MadeHandler for Rejecting {
        fn on_payment_made(&self, id: PaymentId, _new: &PaymentSnapshot) -> Result<()> {
            Err(PaymentError::PaymentNotFound(id))
        }
    }

    let mut h = Harness::new();
    h.ledger.register_observer(OPERATOR, Arc::new(Rejecting)).unwrap();

    let result = h.ledger.make(OPERATOR, h.make_request(1, 1000 * UNIT, 0, 0, 0));
    assert!(matches!(
        result,
        Err(PaymentError::ObserverFailure { ref name, .. }) if name == "rejecting"
    ));
}
