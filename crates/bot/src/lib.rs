//! Chat-facing side of the shop: sessions, users, the command gateway and the
//! background workers that talk back to users.
//!
//! The gateway is transport-agnostic: it takes an [`Inbound`] message and
//! returns a [`Reply`]. Webhook/polling plumbing lives outside this crate.

pub mod command;
pub mod gateway;
pub mod i18n;
pub mod maintenance;
pub mod notify;
pub mod session;
pub mod users;
pub mod worker;

pub use command::{Command, MAX_QUANTITY, ParseError, parse};
pub use gateway::{BotGateway, BotStatus, FailureKind, GatewayConfig, Inbound, Reply};
pub use i18n::{Language, Msg};
pub use maintenance::{Maintenance, SweepReport};
pub use notify::{ChatSink, InMemoryOutbox, OutboundMessage, SinkError, spawn_notifier, status_notification};
pub use session::{Cart, CartLine, HeldLine, MenuContext, PendingCheckout, Session, SessionError, SessionStore};
pub use users::{UserDirectory, UserError, UserProfile};
pub use worker::{Shutdown, WorkerHandle};
