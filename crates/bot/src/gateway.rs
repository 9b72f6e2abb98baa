//! Inbound chat commands → component calls → localized replies.
//!
//! - Messages from one user are handled one at a time (per-user lane)
//! - Different users run concurrently
//! - A failed command leaves sessions, stock and orders as they were

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use shopkeep_catalog::{Catalog, CatalogError};
use shopkeep_core::{LocationId, Money, OrderId, ProductId, ReservationId, UserId};
use shopkeep_events::{EventBus, StatusBroadcaster, StatusEnvelope, StatusEvent};
use shopkeep_inventory::{InventoryLedger, LedgerError};
use shopkeep_orders::{OrderError, OrderFilter, OrderStateMachine, PaymentMethod};

use crate::command::{self, Command, ParseError};
use crate::i18n::{Language, Msg};
use crate::session::{Cart, HeldLine, MenuContext, PendingCheckout, Session, SessionError, SessionStore};
use crate::users::{UserDirectory, UserProfile};

/// How many orders `/orders` lists.
const ORDER_HISTORY: usize = 10;

/// A chat message as delivered by the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inbound {
    pub user_id: UserId,
    #[serde(default)]
    pub handle: Option<String>,
    /// Client locale, e.g. `pl` or `en-US`.
    #[serde(default)]
    pub language_code: Option<String>,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reply {
    pub user_id: UserId,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,
}

impl Reply {
    pub fn is_failure(&self) -> bool {
        self.failure.is_some()
    }
}

/// Classification of a failed command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    InsufficientStock,
    InvalidTransition,
    SessionExpired,
    ReservationTimeout,
    NotFound,
    InvalidInput,
    EmptyCart,
    CheckoutPending,
    Forbidden,
    Blocked,
    BotOffline,
    Internal,
}

impl FailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FailureKind::InsufficientStock => "insufficient_stock",
            FailureKind::InvalidTransition => "invalid_transition",
            FailureKind::SessionExpired => "session_expired",
            FailureKind::ReservationTimeout => "reservation_timeout",
            FailureKind::NotFound => "not_found",
            FailureKind::InvalidInput => "invalid_input",
            FailureKind::EmptyCart => "empty_cart",
            FailureKind::CheckoutPending => "checkout_pending",
            FailureKind::Forbidden => "forbidden",
            FailureKind::Blocked => "blocked",
            FailureKind::BotOffline => "bot_offline",
            FailureKind::Internal => "internal",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BotStatus {
    Running,
    Stopped,
}

impl BotStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            BotStatus::Running => "running",
            BotStatus::Stopped => "stopped",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GatewayConfig {
    /// Chat ids allowed to run `/process`, `/deliver` and `/reject`.
    pub admins: BTreeSet<UserId>,
}

/// A failed command: its class and what to tell the user.
#[derive(Debug)]
struct Failure {
    kind: FailureKind,
    msg: Msg,
}

impl Failure {
    fn new(kind: FailureKind, msg: Msg) -> Self {
        Self { kind, msg }
    }

    fn not_found(what: &'static str, id: impl ToString) -> Self {
        Self::new(
            FailureKind::NotFound,
            Msg::NotFound {
                what,
                id: id.to_string(),
            },
        )
    }

    fn internal() -> Self {
        Self::new(FailureKind::Internal, Msg::InternalError)
    }
}

impl From<ParseError> for Failure {
    fn from(err: ParseError) -> Self {
        let msg = match err {
            ParseError::Unknown => Msg::UnknownCommand,
            ParseError::Usage(usage) => Msg::Usage(usage),
            ParseError::InvalidQuantity => Msg::InvalidQuantity,
        };
        Failure::new(FailureKind::InvalidInput, msg)
    }
}

type Outcome = Result<String, Failure>;

#[derive(Debug)]
pub struct BotGateway {
    catalog: Arc<Catalog>,
    ledger: Arc<InventoryLedger>,
    orders: Arc<OrderStateMachine>,
    sessions: Arc<SessionStore>,
    users: Arc<UserDirectory>,
    bus: Arc<StatusBroadcaster>,
    config: GatewayConfig,
    running: AtomicBool,
    lanes: DashMap<UserId, Arc<tokio::sync::Mutex<()>>>,
}

impl BotGateway {
    /// The gateway starts in the running state. Stock goes through the
    /// ledger the order machine was built with.
    pub fn new(
        catalog: Arc<Catalog>,
        orders: Arc<OrderStateMachine>,
        sessions: Arc<SessionStore>,
        users: Arc<UserDirectory>,
        bus: Arc<StatusBroadcaster>,
        config: GatewayConfig,
    ) -> Self {
        Self {
            catalog,
            ledger: Arc::clone(orders.ledger()),
            orders,
            sessions,
            users,
            bus,
            config,
            running: AtomicBool::new(true),
            lanes: DashMap::new(),
        }
    }

    pub fn is_admin(&self, user: UserId) -> bool {
        self.config.admins.contains(&user)
    }

    pub fn status(&self) -> BotStatus {
        if self.running.load(Ordering::SeqCst) {
            BotStatus::Running
        } else {
            BotStatus::Stopped
        }
    }

    pub fn start(&self, now: DateTime<Utc>) -> BotStatus {
        if !self.running.swap(true, Ordering::SeqCst) {
            info!("bot started");
            self.publish(StatusEnvelope::operational("bot.started", "Bot started", now));
        }
        BotStatus::Running
    }

    /// Refuse inbound messages until started again. State is kept.
    pub fn stop(&self, now: DateTime<Utc>) -> BotStatus {
        if self.running.swap(false, Ordering::SeqCst) {
            info!("bot stopped");
            self.publish(StatusEnvelope::operational("bot.stopped", "Bot stopped", now));
        }
        BotStatus::Stopped
    }

    /// Handle one message, waiting for any earlier message of the same user.
    pub async fn handle(&self, msg: Inbound) -> Reply {
        let lane = self.lane(msg.user_id);
        let _turn = lane.lock().await;
        self.handle_at(&msg, Utc::now())
    }

    fn lane(&self, user: UserId) -> Arc<tokio::sync::Mutex<()>> {
        Arc::clone(self.lanes.entry(user).or_default().value())
    }

    /// Forget lanes nobody is waiting on. Returns how many were dropped.
    pub fn prune_lanes(&self) -> usize {
        let before = self.lanes.len();
        self.lanes.retain(|_, lane| Arc::strong_count(lane) > 1);
        before.saturating_sub(self.lanes.len())
    }

    /// Handle one message at `now`. Callers must not run two messages of the
    /// same user concurrently; [`BotGateway::handle`] takes care of that.
    pub fn handle_at(&self, msg: &Inbound, now: DateTime<Utc>) -> Reply {
        let user_id = msg.user_id;
        if self.status() == BotStatus::Stopped {
            let lang = self.users.language(user_id);
            return failure_reply(user_id, lang, Failure::new(FailureKind::BotOffline, Msg::BotOffline));
        }

        let (profile, created) = self.users.touch(
            user_id,
            msg.handle.as_deref(),
            msg.language_code.as_deref(),
            now,
        );
        if created {
            let event = StatusEvent::new(
                "user.joined",
                format!("New user {} joined", profile.display_name()),
            )
            .with_user(user_id);
            self.publish(StatusEnvelope::for_user(user_id, now, event));
        }
        let lang = profile.language;
        if profile.blocked {
            return failure_reply(user_id, lang, Failure::new(FailureKind::Blocked, Msg::Blocked));
        }

        let outcome = command::parse(&msg.text)
            .map_err(Failure::from)
            .and_then(|cmd| {
                debug!(user_id = %user_id, command = ?cmd, "command received");
                if cmd.is_admin() && !self.is_admin(user_id) {
                    warn!(user_id = %user_id, "admin command refused");
                    return Err(Failure::new(FailureKind::Forbidden, Msg::AccessDenied));
                }
                self.dispatch(&profile, created, cmd, now)
            });

        match outcome {
            Ok(text) => Reply {
                user_id,
                text,
                failure: None,
            },
            Err(failure) => {
                info!(user_id = %user_id, kind = failure.kind.as_str(), "command failed");
                failure_reply(user_id, lang, failure)
            }
        }
    }

    fn dispatch(&self, user: &UserProfile, created: bool, cmd: Command, now: DateTime<Utc>) -> Outcome {
        let lang = user.language;
        let id = user.id;
        match cmd {
            Command::Start => {
                self.navigate(id, now, MenuContext::Main);
                let name = user.display_name();
                let msg = if created {
                    Msg::Welcome { name }
                } else {
                    Msg::WelcomeBack { name }
                };
                Ok(msg.render(lang))
            }
            Command::Help => Ok(Msg::Help {
                admin: self.is_admin(id),
            }
            .render(lang)),
            Command::Language(language) => {
                self.users
                    .set_language(id, language)
                    .map_err(|_| Failure::internal())?;
                Ok(Msg::LanguageSet.render(language))
            }
            Command::Locations => Ok(self.locations(lang)),
            Command::Products(location) => {
                let text = self.products(location, lang)?;
                self.navigate(id, now, MenuContext::Location(location));
                Ok(text)
            }
            Command::Add {
                product,
                location,
                quantity,
            } => self.add_to_cart(id, product, location, quantity, now, lang),
            Command::Remove { product, location } => {
                let removed = self.session(id, now, |s| {
                    if s.checkout.is_some() {
                        return Err(Failure::new(FailureKind::CheckoutPending, Msg::CheckoutPending));
                    }
                    Ok(s.cart.remove(product, location))
                })??;
                if removed {
                    Ok(Msg::ItemRemoved.render(lang))
                } else {
                    Err(Failure::new(FailureKind::NotFound, Msg::ItemNotInCart))
                }
            }
            Command::Cart => {
                let cart = self.session(id, now, |s| {
                    s.menu = MenuContext::Cart;
                    s.cart.clone()
                })?;
                Ok(self.render_cart(&cart, lang))
            }
            Command::Clear => {
                self.session(id, now, |s| {
                    if s.checkout.is_some() {
                        return Err(Failure::new(FailureKind::CheckoutPending, Msg::CheckoutPending));
                    }
                    s.cart.clear();
                    Ok(())
                })??;
                Ok(Msg::CartCleared.render(lang))
            }
            Command::Checkout(payment) => self.checkout(id, payment, now, lang),
            Command::Confirm => self.confirm(id, now, lang),
            Command::Cancel(None) => {
                let held = self.session(id, now, |s| {
                    s.menu = MenuContext::Main;
                    s.checkout.take().map(|c| c.reservation_ids())
                })?;
                let Some(held) = held else {
                    return Err(Failure::new(FailureKind::NotFound, Msg::NothingToCancel));
                };
                self.ledger.release_all(&held);
                Ok(Msg::CheckoutCancelled.render(lang))
            }
            Command::Cancel(Some(order_id)) => {
                self.orders
                    .cancel_own(order_id, id, now)
                    .map_err(|err| self.order_failure(order_id, err))?;
                Ok(Msg::OrderCancelled { order_id }.render(lang))
            }
            Command::Orders => Ok(self.order_history(id, lang)),
            Command::Process(order_id) => {
                self.orders
                    .start_processing(order_id, now)
                    .map_err(|err| self.order_failure(order_id, err))?;
                Ok(Msg::AdminProcessing { order_id }.render(lang))
            }
            Command::Deliver(order_id) => {
                self.orders
                    .deliver(order_id, now)
                    .map_err(|err| self.order_failure(order_id, err))?;
                Ok(Msg::AdminDelivered { order_id }.render(lang))
            }
            Command::Reject { order, reason } => {
                self.orders
                    .cancel(order, Some(reason), now)
                    .map_err(|err| self.order_failure(order, err))?;
                Ok(Msg::AdminRejected { order_id: order }.render(lang))
            }
        }
    }

    /// Run `f` on the user's session. An expired session has its held stock
    /// released and fails the command.
    fn session<R>(
        &self,
        user: UserId,
        now: DateTime<Utc>,
        f: impl FnOnce(&mut Session) -> R,
    ) -> Result<R, Failure> {
        self.sessions.update(user, now, f).map_err(|err| {
            let SessionError::Expired { held, .. } = err;
            self.release_expired(user, &held);
            Failure::new(FailureKind::SessionExpired, Msg::SessionExpired)
        })
    }

    /// Move the user to `menu`, silently starting over if the session lapsed.
    fn navigate(&self, user: UserId, now: DateTime<Utc>, menu: MenuContext) {
        if let Err(SessionError::Expired { held, .. }) =
            self.sessions.update(user, now, |s| s.menu = menu)
        {
            self.release_expired(user, &held);
            if let Err(err) = self.sessions.update(user, now, |s| s.menu = menu) {
                debug!(user_id = %user, error = ?err, "menu not recorded");
            }
        }
    }

    fn release_expired(&self, user: UserId, held: &[ReservationId]) {
        if held.is_empty() {
            return;
        }
        let released = self.ledger.release_all(held);
        info!(user_id = %user, released, "expired session's reservations released");
    }

    fn locations(&self, lang: Language) -> String {
        let stocked: BTreeSet<LocationId> = self.ledger.locations_with_stock().into_iter().collect();
        let entries: Vec<String> = self
            .catalog
            .locations()
            .into_iter()
            .filter(|l| stocked.contains(&l.id))
            .map(|l| {
                Msg::LocationEntry {
                    id: l.id.get(),
                    name: l.name,
                }
                .render(lang)
            })
            .collect();
        if entries.is_empty() {
            return Msg::NoLocations.render(lang);
        }
        listing(Msg::LocationsHeader.render(lang), entries)
    }

    fn products(&self, location: LocationId, lang: Language) -> Outcome {
        let place = self
            .catalog
            .location(location)
            .map_err(|_| Failure::not_found("Location", location))?;
        let entries: Vec<String> = self
            .ledger
            .available_at(location)
            .into_iter()
            .filter_map(|level| {
                let product = self.catalog.active_product(level.product).ok()?;
                Some(
                    Msg::ProductEntry {
                        id: product.id.get(),
                        name: product.display_name(),
                        price: product.price,
                        available: level.available,
                    }
                    .render(lang),
                )
            })
            .collect();
        if entries.is_empty() {
            return Ok(Msg::NoProducts.render(lang));
        }
        let header = Msg::ProductsHeader {
            location: place.name,
        }
        .render(lang);
        Ok(listing(header, entries))
    }

    fn add_to_cart(
        &self,
        user: UserId,
        product_id: ProductId,
        location: LocationId,
        quantity: u32,
        now: DateTime<Utc>,
        lang: Language,
    ) -> Outcome {
        let product = self
            .catalog
            .active_product(product_id)
            .map_err(|_| Failure::not_found("Product", product_id))?;
        self.catalog
            .location(location)
            .map_err(|_| Failure::not_found("Location", location))?;
        let available = self.ledger.stock(product_id, location).available;

        self.session(user, now, |s| {
            if s.checkout.is_some() {
                return Err(Failure::new(FailureKind::CheckoutPending, Msg::CheckoutPending));
            }
            let requested = s.cart.quantity_of(product_id, location).saturating_add(quantity);
            if requested > available {
                return Err(Failure::new(
                    FailureKind::InsufficientStock,
                    Msg::ExceedsStock {
                        product: product.display_name(),
                        requested,
                        available,
                    },
                ));
            }
            s.cart.add(product_id, location, quantity);
            s.menu = MenuContext::Cart;
            Ok(())
        })??;
        Ok(Msg::AddedToCart.render(lang))
    }

    fn render_cart(&self, cart: &Cart, lang: Language) -> String {
        if cart.is_empty() {
            return Msg::CartEmpty.render(lang);
        }
        let mut total = Money::ZERO;
        let mut entries = Vec::with_capacity(cart.lines().len());
        for line in cart.lines() {
            let (name, each) = match self.catalog.product(line.product) {
                Ok(p) => (p.display_name(), p.price),
                Err(_) => (format!("#{}", line.product), Money::ZERO),
            };
            let location = self
                .catalog
                .location(line.location)
                .map(|l| l.name)
                .unwrap_or_else(|_| format!("#{}", line.location));
            let line_total = each.times(line.quantity);
            total = total.saturating_add(line_total);
            entries.push(
                Msg::CartEntry {
                    product: name,
                    location,
                    quantity: line.quantity,
                    each,
                    total: line_total,
                }
                .render(lang),
            );
        }
        entries.push(Msg::CartTotal { total }.render(lang));
        listing(Msg::CartHeader.render(lang), entries)
    }

    /// Reserve every cart line at current prices and hold them for confirmation.
    ///
    /// Stock is reserved outside the session lock; the per-user lane keeps the
    /// cart from changing in between.
    fn checkout(&self, user: UserId, payment: PaymentMethod, now: DateTime<Utc>, lang: Language) -> Outcome {
        let hold = self.ledger.reservation_timeout();
        let cart = self.session(user, now, |s| {
            if s.checkout.is_some() {
                return Err(Failure::new(FailureKind::CheckoutPending, Msg::CheckoutPending));
            }
            if s.cart.is_empty() {
                return Err(Failure::new(FailureKind::EmptyCart, Msg::CartEmpty));
            }
            Ok(s.cart.clone())
        })??;

        let mut prices = Vec::with_capacity(cart.lines().len());
        for line in cart.lines() {
            let product = self
                .catalog
                .active_product(line.product)
                .map_err(|_| Failure::not_found("Product", line.product))?;
            prices.push(product.price);
        }

        let ids = self
            .ledger
            .reserve_all(&cart.requests(), now)
            .map_err(|err| self.ledger_failure(err))?;

        let lines = cart
            .lines()
            .iter()
            .zip(prices)
            .zip(ids)
            .map(|((line, unit_price), reservation_id)| HeldLine {
                product: line.product,
                location: line.location,
                quantity: line.quantity,
                unit_price,
                reservation_id,
            })
            .collect();
        let checkout = PendingCheckout {
            payment,
            lines,
            held_until: now + hold,
        };

        let stored = checkout.clone();
        if let Err(failure) = self.session(user, now, move |s| {
            s.checkout = Some(stored);
            s.menu = MenuContext::Checkout;
        }) {
            self.ledger.release_all(&checkout.reservation_ids());
            return Err(failure);
        }

        info!(
            user_id = %user,
            lines = checkout.lines.len(),
            total = %checkout.total(),
            "checkout held"
        );
        Ok(Msg::CheckoutHeld {
            total: checkout.total(),
            payment,
            minutes: hold.num_minutes(),
        }
        .render(lang))
    }

    /// Turn the held checkout into a Pending order.
    ///
    /// A lapsed hold releases what is left and drops the checkout; any other
    /// failure keeps the checkout so the user can retry or cancel.
    fn confirm(&self, user: UserId, now: DateTime<Utc>, lang: Language) -> Outcome {
        let checkout = self
            .session(user, now, |s| s.checkout.clone())?
            .ok_or_else(|| Failure::new(FailureKind::NotFound, Msg::NothingToConfirm))?;
        let timed_out = || Failure::new(FailureKind::ReservationTimeout, Msg::ReservationTimeout);

        if checkout.held_until <= now {
            self.ledger.release_all(&checkout.reservation_ids());
            self.close_checkout(user, now, false);
            return Err(timed_out());
        }

        let order = match self.orders.place(user, checkout.order_lines(), checkout.payment, now) {
            Ok(order) => order,
            Err(OrderError::Ledger(LedgerError::ReservationTimeout(_))) => {
                self.ledger.release_all(&checkout.reservation_ids());
                self.close_checkout(user, now, false);
                return Err(timed_out());
            }
            Err(err) => {
                warn!(user_id = %user, error = ?err, "order placement failed");
                return Err(Failure::internal());
            }
        };
        self.close_checkout(user, now, true);

        if let Err(err) = self.users.record_order(user) {
            warn!(user_id = %user, error = ?err, "order count not updated");
        }
        Ok(Msg::OrderCreated {
            order_id: order.id_typed(),
        }
        .render(lang))
    }

    /// Drop the pending checkout; a placed one also empties the cart. Its
    /// reservations are not touched here.
    fn close_checkout(&self, user: UserId, now: DateTime<Utc>, placed: bool) {
        let closed = self.sessions.update(user, now, |s| {
            s.checkout = None;
            if placed {
                s.cart.clear();
                s.menu = MenuContext::Main;
            } else {
                s.menu = MenuContext::Cart;
            }
        });
        if let Err(err) = closed {
            debug!(user_id = %user, error = ?err, "session gone before checkout closed");
        }
    }

    fn order_history(&self, user: UserId, lang: Language) -> String {
        let filter = OrderFilter {
            user_id: Some(user),
            ..OrderFilter::default()
        };
        let entries: Vec<String> = self
            .orders
            .list(&filter)
            .into_iter()
            .rev()
            .take(ORDER_HISTORY)
            .map(|o| {
                Msg::OrderEntry {
                    order_id: o.id_typed(),
                    date: o.created_at().format("%Y-%m-%d %H:%M").to_string(),
                    status: o.status(),
                    total: o.total(),
                }
                .render(lang)
            })
            .collect();
        if entries.is_empty() {
            return Msg::NoOrders.render(lang);
        }
        listing(Msg::OrdersHeader.render(lang), entries)
    }

    fn ledger_failure(&self, err: LedgerError) -> Failure {
        match err {
            LedgerError::InsufficientStock {
                product,
                requested,
                available,
                ..
            } => {
                let name = self
                    .catalog
                    .product(product)
                    .map(|p| p.display_name())
                    .unwrap_or_else(|_: CatalogError| format!("#{product}"));
                Failure::new(
                    FailureKind::InsufficientStock,
                    Msg::ExceedsStock {
                        product: name,
                        requested,
                        available,
                    },
                )
            }
            LedgerError::ReservationTimeout(_) => {
                Failure::new(FailureKind::ReservationTimeout, Msg::ReservationTimeout)
            }
            other => {
                warn!(error = ?other, "unexpected ledger failure");
                Failure::internal()
            }
        }
    }

    fn order_failure(&self, order_id: OrderId, err: OrderError) -> Failure {
        match err {
            OrderError::NotFound(_) => Failure::not_found("Order", order_id),
            OrderError::InvalidTransition { .. } => {
                Failure::new(FailureKind::InvalidTransition, Msg::InvalidTransition { order_id })
            }
            OrderError::Ledger(err) => self.ledger_failure(err),
            OrderError::Domain(err) => {
                warn!(order_id = %order_id, error = ?err, "order rejected by domain rules");
                Failure::internal()
            }
        }
    }

    fn publish(&self, event: StatusEnvelope) {
        let Ok(()) = self.bus.publish(event);
    }
}

fn failure_reply(user_id: UserId, lang: Language, failure: Failure) -> Reply {
    Reply {
        user_id,
        text: failure.msg.render(lang),
        failure: Some(failure.kind),
    }
}

fn listing(header: String, entries: Vec<String>) -> String {
    let mut text = header;
    for entry in entries {
        text.push('\n');
        text.push_str(&entry);
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeDelta, TimeZone};
    use shopkeep_catalog::{NewLocation, NewProduct};
    use shopkeep_orders::OrderStatus;

    const ADMIN: UserId = UserId::new(1);
    const CUSTOMER: UserId = UserId::new(7);
    const TEA: ProductId = ProductId::new(1);
    const COFFEE: ProductId = ProductId::new(2);
    const DOWNTOWN: LocationId = LocationId::new(1);

    fn test_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 4, 10, 0, 0).unwrap()
    }

    struct Shop {
        gateway: BotGateway,
        ledger: Arc<InventoryLedger>,
        orders: Arc<OrderStateMachine>,
        sessions: Arc<SessionStore>,
        users: Arc<UserDirectory>,
        bus: Arc<StatusBroadcaster>,
    }

    fn shop() -> Shop {
        let catalog = Arc::new(Catalog::new());
        let maker = catalog.add_manufacturer("Leafy").unwrap();
        catalog
            .add_location(NewLocation {
                name: "Downtown".into(),
                address: None,
            })
            .unwrap();
        for (name, cents) in [("Tea", 250), ("Coffee", 400)] {
            catalog
                .add_product(NewProduct {
                    name: name.into(),
                    manufacturer_id: maker.id,
                    category_id: None,
                    price: Money::from_cents(cents),
                    variation: None,
                    description: None,
                })
                .unwrap();
        }

        let ledger = Arc::new(InventoryLedger::new(TimeDelta::minutes(10)));
        ledger.set_on_hand(TEA, DOWNTOWN, 12).unwrap();
        ledger.set_on_hand(COFFEE, DOWNTOWN, 4).unwrap();

        let bus = Arc::new(StatusBroadcaster::new(64));
        let orders = Arc::new(OrderStateMachine::new(
            Arc::clone(&ledger),
            Arc::clone(&bus),
            TimeDelta::hours(24),
        ));
        let users = Arc::new(UserDirectory::new());
        let sessions = Arc::new(SessionStore::new(TimeDelta::minutes(30)));
        let gateway = BotGateway::new(
            catalog,
            Arc::clone(&orders),
            Arc::clone(&sessions),
            Arc::clone(&users),
            Arc::clone(&bus),
            GatewayConfig {
                admins: BTreeSet::from([ADMIN]),
            },
        );
        Shop {
            gateway,
            ledger,
            orders,
            sessions,
            users,
            bus,
        }
    }

    fn inbound(user: UserId, text: &str) -> Inbound {
        Inbound {
            user_id: user,
            handle: None,
            language_code: Some("en".into()),
            text: text.into(),
        }
    }

    impl Shop {
        fn say(&self, user: UserId, text: &str, at: DateTime<Utc>) -> Reply {
            self.gateway.handle_at(&inbound(user, text), at)
        }

        fn reserved(&self, product: ProductId) -> u32 {
            self.ledger.stock(product, DOWNTOWN).reserved
        }
    }

    fn assert_ok(reply: &Reply) {
        assert!(reply.failure.is_none(), "unexpected failure: {reply:?}");
    }

    #[test]
    fn start_registers_the_user_once() {
        let shop = shop();
        let mut feed = shop.bus.subscribe();

        let first = shop.say(CUSTOMER, "/start", test_time());
        assert!(first.text.starts_with("👋 Welcome, "));
        let event = feed.try_recv().unwrap().expect("user.joined event");
        assert_eq!(event.payload().event_type, "user.joined");
        assert_eq!(event.payload().user_id, Some(CUSTOMER));

        let again = shop.say(CUSTOMER, "/start", test_time());
        assert!(again.text.starts_with("👋 Welcome back"));
        assert_eq!(feed.try_recv(), Ok(None));
        assert_eq!(shop.users.count(), 1);
    }

    #[test]
    fn adding_more_than_available_leaves_the_cart_alone() {
        let shop = shop();
        let reply = shop.say(CUSTOMER, "/add 2 1 5", test_time());
        assert_eq!(reply.failure, Some(FailureKind::InsufficientStock));
        assert!(reply.text.contains("Coffee"));

        let cart = shop.say(CUSTOMER, "/cart", test_time());
        assert_ok(&cart);
        assert_eq!(cart.text, Msg::CartEmpty.render(Language::En));
    }

    #[test]
    fn order_flow_from_cart_to_delivery() {
        let shop = shop();
        let t0 = test_time();

        assert_ok(&shop.say(CUSTOMER, "/add 1 1 3", t0));
        let held = shop.say(CUSTOMER, "/checkout cash", t0);
        assert_ok(&held);
        assert!(held.text.contains("$7.5"));
        assert_eq!(shop.reserved(TEA), 3);

        let created = shop.say(CUSTOMER, "/confirm", t0 + TimeDelta::minutes(1));
        assert_ok(&created);
        assert!(created.text.contains("#1"));
        let order = shop.orders.get(OrderId::new(1)).unwrap();
        assert_eq!(order.status(), OrderStatus::Pending);
        assert_eq!(order.user_id(), CUSTOMER);
        assert_eq!(shop.users.get(CUSTOMER).unwrap().order_count, 1);

        let refused = shop.say(CUSTOMER, "/process 1", t0);
        assert_eq!(refused.failure, Some(FailureKind::Forbidden));

        assert_ok(&shop.say(ADMIN, "/process 1", t0 + TimeDelta::minutes(2)));
        let stock = shop.ledger.stock(TEA, DOWNTOWN);
        assert_eq!((stock.on_hand, stock.reserved), (9, 0));

        assert_ok(&shop.say(ADMIN, "/deliver 1", t0 + TimeDelta::minutes(3)));
        assert_eq!(
            shop.orders.get(OrderId::new(1)).unwrap().status(),
            OrderStatus::Delivered
        );

        let history = shop.say(CUSTOMER, "/orders", t0 + TimeDelta::minutes(4));
        assert!(history.text.contains("Order #1"));
    }

    #[test]
    fn checkout_reserves_all_lines_or_none() {
        let shop = shop();
        let t0 = test_time();
        assert_ok(&shop.say(CUSTOMER, "/add 1 1 10", t0));
        assert_ok(&shop.say(CUSTOMER, "/add 2 1 4", t0));
        // Stock shrinks between adding to the cart and checking out.
        shop.ledger.adjust(COFFEE, DOWNTOWN, -1).unwrap();

        let reply = shop.say(CUSTOMER, "/checkout card", t0);
        assert_eq!(reply.failure, Some(FailureKind::InsufficientStock));
        assert_eq!(shop.reserved(TEA), 0);
        assert_eq!(shop.reserved(COFFEE), 0);
        assert_eq!(shop.ledger.reservation_count(), 0);

        let confirm = shop.say(CUSTOMER, "/confirm", t0);
        assert_eq!(confirm.failure, Some(FailureKind::NotFound));
    }

    #[test]
    fn cart_is_frozen_while_checkout_is_pending() {
        let shop = shop();
        let t0 = test_time();
        assert_ok(&shop.say(CUSTOMER, "/add 1 1 1", t0));
        assert_ok(&shop.say(CUSTOMER, "/checkout online", t0));

        for text in ["/add 1 1 1", "/clear", "/remove 1 1", "/checkout cash"] {
            let reply = shop.say(CUSTOMER, text, t0);
            assert_eq!(reply.failure, Some(FailureKind::CheckoutPending), "{text}");
        }

        assert_ok(&shop.say(CUSTOMER, "/cancel", t0));
        assert_eq!(shop.reserved(TEA), 0);
        assert_ok(&shop.say(CUSTOMER, "/clear", t0));
    }

    #[test]
    fn confirming_a_lapsed_hold_times_out() {
        let shop = shop();
        let t0 = test_time();
        assert_ok(&shop.say(CUSTOMER, "/add 1 1 2", t0));
        assert_ok(&shop.say(CUSTOMER, "/checkout cash", t0));

        let reply = shop.say(CUSTOMER, "/confirm", t0 + TimeDelta::minutes(11));
        assert_eq!(reply.failure, Some(FailureKind::ReservationTimeout));
        assert_eq!(shop.reserved(TEA), 0);
        assert_eq!(shop.orders.count(), 0);

        // The cart survives; only the hold is gone.
        let again = shop.say(CUSTOMER, "/checkout cash", t0 + TimeDelta::minutes(12));
        assert_ok(&again);
    }

    #[test]
    fn expired_session_releases_its_holds() {
        let shop = shop();
        let t0 = test_time();
        assert_ok(&shop.say(CUSTOMER, "/add 1 1 2", t0));
        assert_ok(&shop.say(CUSTOMER, "/checkout cash", t0));

        let reply = shop.say(CUSTOMER, "/cart", t0 + TimeDelta::minutes(31));
        assert_eq!(reply.failure, Some(FailureKind::SessionExpired));
        assert_eq!(shop.reserved(TEA), 0);

        let cart = shop.say(CUSTOMER, "/cart", t0 + TimeDelta::minutes(32));
        assert_eq!(cart.text, Msg::CartEmpty.render(Language::En));
    }

    #[test]
    fn navigating_after_expiry_starts_over_and_frees_stock() {
        let shop = shop();
        let t0 = test_time();
        assert_ok(&shop.say(CUSTOMER, "/add 1 1 2", t0));
        assert_ok(&shop.say(CUSTOMER, "/checkout cash", t0));

        let later = t0 + TimeDelta::minutes(31);
        assert_ok(&shop.say(CUSTOMER, "/products 1", later));
        assert_eq!(shop.reserved(TEA), 0);
        let session = shop.sessions.get(CUSTOMER, later);
        assert_eq!(session.menu, MenuContext::Location(DOWNTOWN));
        assert!(session.checkout.is_none());
    }

    #[test]
    fn customers_cancel_only_their_pending_orders() {
        let shop = shop();
        let t0 = test_time();
        assert_ok(&shop.say(CUSTOMER, "/add 2 1 2", t0));
        assert_ok(&shop.say(CUSTOMER, "/checkout card", t0));
        assert_ok(&shop.say(CUSTOMER, "/confirm", t0));

        let stranger = shop.say(UserId::new(99), "/cancel 1", t0);
        assert_eq!(stranger.failure, Some(FailureKind::NotFound));

        assert_ok(&shop.say(CUSTOMER, "/cancel 1", t0));
        assert_eq!(shop.reserved(COFFEE), 0);
        assert_eq!(
            shop.orders.get(OrderId::new(1)).unwrap().status(),
            OrderStatus::Cancelled
        );

        let twice = shop.say(CUSTOMER, "/cancel 1", t0);
        assert_eq!(twice.failure, Some(FailureKind::InvalidTransition));
    }

    #[test]
    fn admin_reject_carries_the_reason() {
        let shop = shop();
        let t0 = test_time();
        assert_ok(&shop.say(CUSTOMER, "/add 1 1 1", t0));
        assert_ok(&shop.say(CUSTOMER, "/checkout cash", t0));
        assert_ok(&shop.say(CUSTOMER, "/confirm", t0));

        assert_ok(&shop.say(ADMIN, "/reject 1 closed today", t0));
        let order = shop.orders.get(OrderId::new(1)).unwrap();
        assert_eq!(order.status(), OrderStatus::Cancelled);
        assert_eq!(order.note(), Some("closed today"));
        assert_eq!(shop.reserved(TEA), 0);
    }

    #[test]
    fn stopped_bot_and_blocked_users_are_refused() {
        let shop = shop();
        let t0 = test_time();
        assert_ok(&shop.say(CUSTOMER, "/start", t0));

        shop.gateway.stop(t0);
        assert_eq!(shop.gateway.status(), BotStatus::Stopped);
        let offline = shop.say(CUSTOMER, "/cart", t0);
        assert_eq!(offline.failure, Some(FailureKind::BotOffline));

        shop.gateway.start(t0);
        shop.users.set_blocked(CUSTOMER, true).unwrap();
        let blocked = shop.say(CUSTOMER, "/cart", t0);
        assert_eq!(blocked.failure, Some(FailureKind::Blocked));
    }

    #[test]
    fn replies_follow_the_chosen_language() {
        let shop = shop();
        let t0 = test_time();
        let set = shop.say(CUSTOMER, "/language ru", t0);
        assert_eq!(set.text, Msg::LanguageSet.render(Language::Ru));

        let cart = shop.say(CUSTOMER, "/cart", t0);
        assert_eq!(cart.text, Msg::CartEmpty.render(Language::Ru));

        let unknown = shop.say(CUSTOMER, "/dance", t0);
        assert_eq!(unknown.failure, Some(FailureKind::InvalidInput));
        assert_eq!(unknown.text, Msg::UnknownCommand.render(Language::Ru));
    }

    #[test]
    fn listings_show_only_what_can_be_bought() {
        let shop = shop();
        let t0 = test_time();
        shop.ledger.set_on_hand(COFFEE, DOWNTOWN, 0).unwrap();

        let locations = shop.say(CUSTOMER, "/locations", t0);
        assert!(locations.text.contains("#1 Downtown"));

        let products = shop.say(CUSTOMER, "/products 1", t0);
        assert!(products.text.contains("Tea"));
        assert!(!products.text.contains("Coffee"));

        let missing = shop.say(CUSTOMER, "/products 9", t0);
        assert_eq!(missing.failure, Some(FailureKind::NotFound));
    }

    #[test]
    fn checkout_is_not_held_up_by_another_users_session() {
        use std::sync::mpsc;
        use std::time::{Duration, Instant};

        let shop = shop();
        let t0 = test_time();
        assert_ok(&shop.say(CUSTOMER, "/add 1 1 2", t0));
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();

        std::thread::scope(|scope| {
            let sessions = &shop.sessions;
            scope.spawn(move || {
                sessions
                    .update(ADMIN, t0, |_| {
                        entered_tx.send(()).unwrap();
                        let _ = release_rx.recv_timeout(Duration::from_secs(5));
                    })
                    .unwrap();
            });
            entered_rx.recv().unwrap();

            let started = Instant::now();
            let held = shop.say(CUSTOMER, "/checkout cash", t0);
            let confirmed = shop.say(CUSTOMER, "/confirm", t0);
            let waited = started.elapsed();
            release_tx.send(()).unwrap();

            assert_ok(&held);
            assert_ok(&confirmed);
            assert!(waited < Duration::from_secs(1), "waited {waited:?}");
        });
        assert_eq!(shop.reserved(TEA), 2);
        assert_eq!(shop.orders.count(), 1);
    }

    #[tokio::test]
    async fn messages_of_one_user_are_serialised() {
        let shop = shop();
        let (a, b) = tokio::join!(
            shop.gateway.handle(inbound(CUSTOMER, "/add 1 1 1")),
            shop.gateway.handle(inbound(CUSTOMER, "/add 1 1 1")),
        );
        assert_ok(&a);
        assert_ok(&b);

        let cart = shop.gateway.handle(inbound(CUSTOMER, "/cart")).await;
        assert!(cart.text.contains("2 x $2.5 = $5"));
        assert_eq!(shop.gateway.prune_lanes(), 1);
    }
}
