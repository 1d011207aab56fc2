//! # Treasury Event System
//!
//! An in-process, hierarchical, asynchronous and cancellable event bus for
//! economy plugins.
//!
//! ## Core Features
//!
//! - **Hierarchical routing**: a fired event also reaches subscribers of every
//!   ancestor it declares (superclass-like structs and trait objects such as
//!   `dyn Cancellable`)
//! - **Priority ordering**: subscribers run from lowest to highest priority
//! - **Cooperative cancellation**: subscribers may skip events already cancelled
//! - **Deferred completion**: a subscriber can hold a fire open until a
//!   [`Completion`] it returned is completed, from any thread
//! - **Per-type FIFO dispatch**: every concrete event type has its own
//!   executor thread, so fires of one type never overtake each other
//!
//! ## Quick Start
//!
//! ```rust
//! use treasury_event_system::*;
//!
//! #[derive(Debug)]
//! struct BalanceChanged {
//!     account: String,
//!     delta: i64,
//! }
//!
//! impl Event for BalanceChanged {}
//! impl Hierarchy for BalanceChanged {}
//!
//! let bus = EventBus::new();
//! bus.subscribe(
//!     bus.subscription_for::<BalanceChanged>()
//!         .with_priority(EventPriority::High)
//!         .when_called(|event| {
//!             event.delta *= 2;
//!             Ok(())
//!         })
//!         .complete_subscription()?,
//! )?;
//!
//! let event = bus
//!     .fire(BalanceChanged { account: "alice".into(), delta: 5 })
//!     .wait()?;
//! assert_eq!(event.delta, 10);
//! bus.shutdown();
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod bus;
pub mod caller;
pub mod completion;
pub mod error;
pub mod event;
pub mod priority;
pub mod shutdown;
pub mod sorted;
pub mod stats;
pub mod subscriber;
pub mod tracker;

pub use bus::{EventBus, EventBusConfig};
pub use caller::EventCaller;
pub use completion::{Completion, FireCompletion};
pub use error::{EventError, FireError};
pub use event::{Cancellable, Event, EventKey, Hierarchy, Supertypes};
pub use priority::EventPriority;
pub use shutdown::ShutdownState;
pub use sorted::SortedList;
pub use stats::EventBusStats;
pub use subscriber::{EventSubscriber, Handler, SubscriptionBuilder};
pub use tracker::{EventExecutorTracker, EventTypeTracker};
