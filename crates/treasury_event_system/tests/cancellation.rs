//! Priority ordering and cooperative cancellation.

use std::sync::{Arc, Mutex};
use treasury_event_system::*;

#[derive(Debug, Default)]
struct WithdrawEvent {
    cancelled: bool,
}

impl Cancellable for WithdrawEvent {
    fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    fn set_cancelled(&mut self, cancelled: bool) {
        self.cancelled = cancelled;
    }
}

impl Event for WithdrawEvent {
    fn as_cancellable(&self) -> Option<&dyn Cancellable> {
        Some(self)
    }
}

impl Hierarchy for WithdrawEvent {
    fn supertypes(types: &mut Supertypes<Self>) {
        types.cancellable();
    }
}

type Log = Arc<Mutex<Vec<&'static str>>>;

fn record(
    bus: &EventBus,
    log: &Log,
    label: &'static str,
    priority: EventPriority,
    ignore_cancelled: bool,
    cancel: bool,
) {
    let log = Arc::clone(log);
    bus.subscribe(
        bus.subscription_for::<WithdrawEvent>()
            .with_priority(priority)
            .ignore_cancelled(ignore_cancelled)
            .when_called(move |event| {
                log.lock().unwrap().push(label);
                if cancel {
                    event.set_cancelled(true);
                }
                Ok(())
            })
            .complete_subscription()
            .unwrap(),
    )
    .unwrap();
}

#[test]
fn cancelled_event_skips_only_ignore_cancelled_subscribers() {
    let bus = EventBus::new();
    let log: Log = Arc::default();
    record(&bus, &log, "low", EventPriority::Low, false, true);
    record(&bus, &log, "normal", EventPriority::Normal, true, false);
    record(&bus, &log, "high", EventPriority::High, false, false);

    let event = bus.fire(WithdrawEvent::default()).wait().unwrap();
    assert!(event.is_cancelled());
    assert_eq!(*log.lock().unwrap(), vec!["low", "high"]);
    bus.shutdown();
}

#[test]
fn uncancelled_event_reaches_every_subscriber() {
    let bus = EventBus::new();
    let log: Log = Arc::default();
    record(&bus, &log, "high", EventPriority::High, false, false);
    record(&bus, &log, "normal", EventPriority::Normal, true, false);
    record(&bus, &log, "low", EventPriority::Low, false, false);

    let event = bus.fire(WithdrawEvent::default()).wait().unwrap();
    assert!(!event.is_cancelled());
    assert_eq!(*log.lock().unwrap(), vec!["low", "normal", "high"]);
    bus.shutdown();
}

#[test]
fn later_subscriber_can_uncancel() {
    let bus = EventBus::new();
    let log: Log = Arc::default();
    record(&bus, &log, "lowest", EventPriority::Lowest, false, true);
    {
        let log = Arc::clone(&log);
        bus.subscribe(
            bus.subscription_for::<WithdrawEvent>()
                .with_priority(EventPriority::Low)
                .when_called(move |event| {
                    log.lock().unwrap().push("restore");
                    event.set_cancelled(false);
                    Ok(())
                })
                .complete_subscription()
                .unwrap(),
        )
        .unwrap();
    }
    record(&bus, &log, "monitor", EventPriority::Highest, true, false);

    let event = bus.fire(WithdrawEvent::default()).wait().unwrap();
    assert!(!event.is_cancelled());
    assert_eq!(*log.lock().unwrap(), vec!["lowest", "restore", "monitor"]);
    bus.shutdown();
}

#[test]
fn cancellation_is_visible_to_ancestor_subscribers() {
    let bus = EventBus::new();
    let log: Log = Arc::default();
    record(&bus, &log, "canceller", EventPriority::Normal, false, true);
    {
        let log = Arc::clone(&log);
        bus.subscribe(
            bus.subscription_for::<dyn Cancellable>()
                .ignore_cancelled(true)
                .when_called(move |_| {
                    log.lock().unwrap().push("ancestor");
                    Ok(())
                })
                .complete_subscription()
                .unwrap(),
        )
        .unwrap();
    }

    bus.fire(WithdrawEvent::default()).wait().unwrap();
    assert_eq!(*log.lock().unwrap(), vec!["canceller"]);
    bus.shutdown();
}

/// Cancellable only through its declared ancestors.
#[derive(Debug, Default)]
struct DepositEvent {
    cancelled: bool,
}

impl Cancellable for DepositEvent {
    fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    fn set_cancelled(&mut self, cancelled: bool) {
        self.cancelled = cancelled;
    }
}

impl Event for DepositEvent {}

impl Hierarchy for DepositEvent {
    fn supertypes(types: &mut Supertypes<Self>) {
        types.cancellable();
    }
}

#[derive(Debug, Default)]
struct ChargebackEvent {
    deposit: DepositEvent,
}

impl Event for ChargebackEvent {}

impl Hierarchy for ChargebackEvent {
    fn supertypes(types: &mut Supertypes<Self>) {
        types.extends(deposit_of);
    }
}

fn deposit_of(event: &mut ChargebackEvent) -> &mut DepositEvent {
    &mut event.deposit
}

fn cancel_deposit(event: &mut DepositEvent) {
    event.set_cancelled(true);
}

fn cancel_chargeback(event: &mut ChargebackEvent) {
    event.deposit.set_cancelled(true);
}

fn record_on<E: Hierarchy>(
    bus: &EventBus,
    log: &Log,
    label: &'static str,
    priority: EventPriority,
    ignore_cancelled: bool,
    cancel: Option<fn(&mut E)>,
) {
    let log = Arc::clone(log);
    bus.subscribe(
        bus.subscription_for::<E>()
            .with_priority(priority)
            .ignore_cancelled(ignore_cancelled)
            .when_called(move |event| {
                log.lock().unwrap().push(label);
                if let Some(cancel) = cancel {
                    cancel(event);
                }
                Ok(())
            })
            .complete_subscription()
            .unwrap(),
    )
    .unwrap();
}

#[test]
fn declared_cancellable_is_honoured_without_overriding_the_view() {
    let bus = EventBus::new();
    let log: Log = Arc::default();
    record_on::<DepositEvent>(
        &bus,
        &log,
        "low",
        EventPriority::Low,
        false,
        Some(cancel_deposit),
    );
    record_on::<DepositEvent>(&bus, &log, "normal", EventPriority::Normal, true, None);
    record_on::<DepositEvent>(&bus, &log, "high", EventPriority::High, false, None);

    let event = bus.fire(DepositEvent::default()).wait().unwrap();
    assert!(event.is_cancelled());
    assert_eq!(*log.lock().unwrap(), vec!["low", "high"]);
    bus.shutdown();
}

#[test]
fn subtypes_inherit_declared_cancellation() {
    let bus = EventBus::new();
    let log: Log = Arc::default();
    record_on::<ChargebackEvent>(
        &bus,
        &log,
        "cancel",
        EventPriority::Lowest,
        false,
        Some(cancel_chargeback),
    );
    record_on::<ChargebackEvent>(&bus, &log, "skipped", EventPriority::Normal, true, None);
    record_on::<DepositEvent>(&bus, &log, "parent-skipped", EventPriority::Normal, true, None);
    record_on::<DepositEvent>(&bus, &log, "parent", EventPriority::Highest, false, None);

    let event = bus.fire(ChargebackEvent::default()).wait().unwrap();
    assert!(event.deposit.is_cancelled());
    assert_eq!(*log.lock().unwrap(), vec!["cancel", "parent"]);
    bus.shutdown();
}
