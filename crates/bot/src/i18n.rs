//! User-facing texts in the supported languages.
//!
//! Every message a user can receive is a [`Msg`] variant; rendering picks the
//! template for the user's [`Language`] and fills in the placeholders.

use serde::{Deserialize, Serialize};

use shopkeep_core::{DomainError, Money, OrderId};
use shopkeep_orders::{OrderStatus, PaymentMethod};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    En,
    Ru,
    Pl,
}

impl Language {
    pub const ALL: [Language; 3] = [Language::En, Language::Ru, Language::Pl];

    pub fn as_str(self) -> &'static str {
        match self {
            Language::En => "en",
            Language::Ru => "ru",
            Language::Pl => "pl",
        }
    }

    /// Language from a client locale such as `ru` or `pl-PL`, falling back to English.
    pub fn from_client_code(code: Option<&str>) -> Self {
        code.and_then(|c| c.split(['-', '_']).next())
            .and_then(|c| c.parse().ok())
            .unwrap_or_default()
    }
}

impl core::fmt::Display for Language {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for Language {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Language::ALL
            .into_iter()
            .find(|l| l.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| DomainError::validation(format!("unsupported language '{}'", s.trim())))
    }
}

/// A message to a user, independent of language.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Msg {
    Welcome { name: String },
    WelcomeBack { name: String },
    Help { admin: bool },
    LanguageSet,
    Blocked,
    BotOffline,
    UnknownCommand,
    Usage(&'static str),
    InvalidQuantity,
    InternalError,

    LocationsHeader,
    NoLocations,
    ProductsHeader { location: String },
    NoProducts,
    /// One product line in a listing.
    ProductEntry { id: u32, name: String, price: Money, available: u32 },
    LocationEntry { id: u32, name: String },
    NotFound { what: &'static str, id: String },

    AddedToCart,
    ExceedsStock { product: String, requested: u32, available: u32 },
    CartEmpty,
    CartHeader,
    CartEntry { product: String, location: String, quantity: u32, each: Money, total: Money },
    CartTotal { total: Money },
    ItemRemoved,
    ItemNotInCart,
    CartCleared,

    CheckoutPending,
    CheckoutHeld { total: Money, payment: PaymentMethod, minutes: i64 },
    NothingToConfirm,
    NothingToCancel,
    OrderCreated { order_id: OrderId },
    CheckoutCancelled,
    SessionExpired,
    ReservationTimeout,

    OrdersHeader,
    NoOrders,
    OrderEntry { order_id: OrderId, date: String, status: OrderStatus, total: Money },
    OrderCancelled { order_id: OrderId },
    InvalidTransition { order_id: OrderId },

    AccessDenied,
    AdminProcessing { order_id: OrderId },
    AdminDelivered { order_id: OrderId },
    AdminRejected { order_id: OrderId },

    /// Pushed to the owner when an order changes status.
    StatusChanged { order_id: OrderId, status: OrderStatus, note: Option<String> },
}

fn pick(lang: Language, en: &'static str, ru: &'static str, pl: &'static str) -> &'static str {
    match lang {
        Language::En => en,
        Language::Ru => ru,
        Language::Pl => pl,
    }
}

/// Placeholder substitution: `{key}` in the template becomes `value`.
struct Fill(String);

fn fill(template: &str) -> Fill {
    Fill(template.to_string())
}

impl Fill {
    fn arg(self, key: &str, value: impl core::fmt::Display) -> Self {
        Fill(self.0.replace(&format!("{{{key}}}"), &value.to_string()))
    }

    fn done(self) -> String {
        self.0
    }
}

pub fn status_name(status: OrderStatus, lang: Language) -> &'static str {
    match status {
        OrderStatus::Pending => pick(lang, "Pending Approval", "Ожидает подтверждения", "Oczekuje na zatwierdzenie"),
        OrderStatus::Processing => pick(lang, "Processing", "В обработке", "W trakcie realizacji"),
        OrderStatus::Delivered => pick(lang, "Completed", "Завершен", "Zakończone"),
        OrderStatus::Cancelled => pick(lang, "Cancelled", "Отменен", "Anulowane"),
    }
}

fn status_emoji(status: OrderStatus) -> &'static str {
    match status {
        OrderStatus::Pending => "⏳",
        OrderStatus::Processing => "🔄",
        OrderStatus::Delivered => "✅",
        OrderStatus::Cancelled => "❌",
    }
}

fn payment_name(payment: PaymentMethod, lang: Language) -> &'static str {
    match payment {
        PaymentMethod::Cash => pick(lang, "Cash", "Наличные", "Gotówka"),
        PaymentMethod::Card => pick(lang, "Card", "Карта", "Karta"),
        PaymentMethod::Online => pick(lang, "Online", "Онлайн", "Online"),
    }
}

fn units(lang: Language) -> &'static str {
    pick(lang, "units", "шт.", "szt.")
}

impl Msg {
    pub fn render(&self, lang: Language) -> String {
        match self {
            Msg::Welcome { name } => fill(
                pick(
                    lang,
                    "👋 Welcome, {name}!\nUse /locations to start an order or /help for all commands.",
                    "👋 Добро пожаловать, {name}!\nНажмите /locations, чтобы начать заказ, или /help для списка команд.",
                    "👋 Witamy, {name}!\nUżyj /locations, aby rozpocząć zamówienie, lub /help, aby zobaczyć polecenia.",
                )
            )
            .arg("name", name)
            .done(),
            Msg::WelcomeBack { name } => fill(
                pick(lang, "👋 Welcome back, {name}!", "👋 С возвращением, {name}!", "👋 Witamy ponownie, {name}!")
            )
            .arg("name", name)
            .done(),
            Msg::Help { admin } => {
                let mut text = pick(
                    lang,
                    "ℹ️ Commands\n/locations - where to buy\n/products <location> - what is available\n/add <product> <location> <qty> - add to cart\n/remove <product> <location> - remove from cart\n/cart - view cart\n/clear - empty cart\n/checkout <cash|card|online> - reserve and review\n/confirm - place the order\n/cancel [order] - cancel checkout or an order\n/orders - your orders\n/language <en|ru|pl> - change language",
                    "ℹ️ Команды\n/locations - где купить\n/products <локация> - что в наличии\n/add <товар> <локация> <кол-во> - в корзину\n/remove <товар> <локация> - убрать из корзины\n/cart - корзина\n/clear - очистить корзину\n/checkout <cash|card|online> - резерв и проверка\n/confirm - оформить заказ\n/cancel [заказ] - отменить оформление или заказ\n/orders - ваши заказы\n/language <en|ru|pl> - сменить язык",
                    "ℹ️ Polecenia\n/locations - gdzie kupić\n/products <lokalizacja> - co jest dostępne\n/add <produkt> <lokalizacja> <ilość> - do koszyka\n/remove <produkt> <lokalizacja> - usuń z koszyka\n/cart - koszyk\n/clear - wyczyść koszyk\n/checkout <cash|card|online> - rezerwacja i podgląd\n/confirm - złóż zamówienie\n/cancel [zamówienie] - anuluj\n/orders - twoje zamówienia\n/language <en|ru|pl> - zmień język",
                )
                .to_string();
                if *admin {
                    text.push_str("\n\n👑 /process <order>\n/deliver <order>\n/reject <order> <reason>");
                }
                text
            }
            Msg::LanguageSet => pick(lang, "✅ Language set!", "✅ Язык установлен!", "✅ Język ustawiony!").into(),
            Msg::Blocked => pick(
                lang,
                "🚫 You are blocked from using this bot.",
                "🚫 Вы заблокированы в этом боте.",
                "🚫 Jesteś zablokowany w tym bocie.",
            )
            .into(),
            Msg::BotOffline => pick(
                lang,
                "😴 The shop is closed right now. Please try again later.",
                "😴 Магазин сейчас закрыт. Попробуйте позже.",
                "😴 Sklep jest teraz zamknięty. Spróbuj później.",
            )
            .into(),
            Msg::UnknownCommand => pick(
                lang,
                "❓ Unknown command. Use /help.",
                "❓ Неизвестная команда. Используйте /help.",
                "❓ Nieznana komenda. Użyj /help.",
            )
            .into(),
            Msg::Usage(usage) => fill(
                pick(lang, "❌ Invalid input. Usage: {usage}", "❌ Неверный ввод. Формат: {usage}", "❌ Nieprawidłowe dane. Użycie: {usage}")
            )
            .arg("usage", usage)
            .done(),
            Msg::InvalidQuantity => pick(
                lang,
                "❌ Invalid quantity. Please enter a number from 1 to 10000.",
                "❌ Неверное количество. Введите число от 1 до 10000.",
                "❌ Nieprawidłowa ilość. Podaj liczbę od 1 do 10000.",
            )
            .into(),
            Msg::InternalError => pick(
                lang,
                "❌ An error occurred. Please try again.",
                "❌ Произошла ошибка. Попробуйте еще раз.",
                "❌ Wystąpił błąd. Spróbuj ponownie.",
            )
            .into(),

            Msg::LocationsHeader => pick(
                lang,
                "📍 Locations with products in stock:",
                "📍 Локации с товарами в наличии:",
                "📍 Lokalizacje z dostępnymi produktami:",
            )
            .into(),
            Msg::NoLocations => pick(
                lang,
                "❌ No locations with products currently available.",
                "❌ Нет доступных локаций с товарами.",
                "❌ Obecnie brak lokalizacji z dostępnymi produktami.",
            )
            .into(),
            Msg::ProductsHeader { location } => fill(
                pick(lang, "📦 Available at {location}:", "📦 В наличии в {location}:", "📦 Dostępne w {location}:")
            )
            .arg("location", location)
            .done(),
            Msg::NoProducts => pick(lang, "❌ No products found.", "❌ Товары не найдены.", "❌ Nie znaleziono produktów.").into(),
            Msg::ProductEntry { id, name, price, available } => {
                format!("#{id} {name} - {price} ({available} {})", units(lang))
            }
            Msg::LocationEntry { id, name } => format!("#{id} {name}"),
            Msg::NotFound { what, id } => fill(
                pick(lang, "❌ {what} {id} not found.", "❌ {what} {id} не найден.", "❌ Nie znaleziono: {what} {id}.")
            )
            .arg("what", what)
            .arg("id", id)
            .done(),

            Msg::AddedToCart => pick(lang, "✅ Cart updated!", "✅ Корзина обновлена!", "✅ Koszyk zaktualizowany!").into(),
            Msg::ExceedsStock { product, requested, available } => fill(
                pick(
                    lang,
                    "❌ Requested {requested} {units} of '{product}', but only {available} {units} available. Please choose a smaller amount.",
                    "❌ Запрошено {requested} {units} товара '{product}', но доступно только {available} {units}. Пожалуйста, выберите меньшее количество.",
                    "❌ Żądano {requested} {units} produktu '{product}', ale dostępne jest tylko {available} {units}. Proszę wybrać mniejszą ilość.",
                )
            )
            .arg("requested", requested)
            .arg("available", available)
            .arg("product", product)
            .arg("units", units(lang))
            .done(),
            Msg::CartEmpty => pick(lang, "🛍 Your cart is empty.", "🛍 Ваша корзина пуста.", "🛍 Twój koszyk jest pusty.").into(),
            Msg::CartHeader => pick(lang, "🛍 Your Cart:", "🛍 Ваша корзина:", "🛍 Twój koszyk:").into(),
            Msg::CartEntry { product, location, quantity, each, total } => fill(
                pick(
                    lang,
                    "{product} at {location}\n{quantity} x {each} = {total}",
                    "{product} в {location}\n{quantity} x {each} = {total}",
                    "{product} w {location}\n{quantity} x {each} = {total}",
                )
            )
            .arg("product", product)
            .arg("location", location)
            .arg("quantity", quantity)
            .arg("each", each)
            .arg("total", total)
            .done(),
            Msg::CartTotal { total } => fill(
                pick(lang, "💰 Total: {total}", "💰 Итого: {total}", "💰 Razem: {total}")
            )
            .arg("total", total)
            .done(),
            Msg::ItemRemoved => pick(
                lang,
                "✅ Item removed from cart.",
                "✅ Товар удален из корзины.",
                "✅ Przedmiot usunięty z koszyka.",
            )
            .into(),
            Msg::ItemNotInCart => pick(
                lang,
                "❌ Item not found in cart.",
                "❌ Товар не найден в корзине.",
                "❌ Nie znaleziono przedmiotu w koszyku.",
            )
            .into(),
            Msg::CartCleared => pick(
                lang,
                "✅ Your cart has been cleared.",
                "✅ Ваша корзина очищена.",
                "✅ Twój koszyk został wyczyszczony.",
            )
            .into(),

            Msg::CheckoutPending => pick(
                lang,
                "⚠️ You have a checkout waiting. Send /confirm or /cancel first.",
                "⚠️ У вас есть неподтвержденное оформление. Отправьте /confirm или /cancel.",
                "⚠️ Masz oczekujące zamówienie. Wyślij /confirm lub /cancel.",
            )
            .into(),
            Msg::CheckoutHeld { total, payment, minutes } => fill(
                pick(
                    lang,
                    "📋 Order Confirmation\n💰 Total: {total}\n💳 Payment method: {payment}\nItems are reserved for {minutes} min. Send /confirm to place the order or /cancel.",
                    "📋 Подтверждение заказа\n💰 Итого: {total}\n💳 Способ оплаты: {payment}\nТовары зарезервированы на {minutes} мин. Отправьте /confirm для оформления или /cancel.",
                    "📋 Potwierdzenie zamówienia\n💰 Razem: {total}\n💳 Metoda płatności: {payment}\nProdukty są zarezerwowane na {minutes} min. Wyślij /confirm, aby złożyć zamówienie, lub /cancel.",
                )
            )
            .arg("total", total)
            .arg("payment", payment_name(*payment, lang))
            .arg("minutes", minutes)
            .done(),
            Msg::NothingToConfirm => pick(
                lang,
                "❌ Nothing to confirm. Use /checkout first.",
                "❌ Нечего подтверждать. Сначала /checkout.",
                "❌ Nie ma czego potwierdzić. Najpierw /checkout.",
            )
            .into(),
            Msg::NothingToCancel => pick(
                lang,
                "Nothing to cancel.",
                "Нечего отменять.",
                "Nie ma czego anulować.",
            )
            .into(),
            Msg::OrderCreated { order_id } => fill(
                pick(
                    lang,
                    "✅ Order #{order_id} created successfully!\nYou will be notified once an administrator confirms it.",
                    "✅ Заказ #{order_id} успешно создан!\nВы получите уведомление, когда администратор его подтвердит.",
                    "✅ Zamówienie #{order_id} zostało pomyślnie utworzone!\nZostaniesz powiadomiony, gdy administrator je potwierdzi.",
                )
            )
            .arg("order_id", order_id)
            .done(),
            Msg::CheckoutCancelled => pick(
                lang,
                "❌ Order process cancelled.",
                "❌ Процесс заказа отменён.",
                "❌ Proces zamówienia anulowany.",
            )
            .into(),
            Msg::SessionExpired => pick(
                lang,
                "⌛ Your session expired and your cart was reset. Please start again.",
                "⌛ Сессия истекла, корзина очищена. Начните заново.",
                "⌛ Sesja wygasła, koszyk został wyczyszczony. Zacznij od nowa.",
            )
            .into(),
            Msg::ReservationTimeout => pick(
                lang,
                "⌛ Your reservation expired and the items were released. Please check out again.",
                "⌛ Резерв истек, товары освобождены. Оформите заказ заново.",
                "⌛ Rezerwacja wygasła, produkty zostały zwolnione. Złóż zamówienie ponownie.",
            )
            .into(),

            Msg::OrdersHeader => pick(lang, "📋 Your Orders:", "📋 Ваши заказы:", "📋 Twoje zamówienia:").into(),
            Msg::NoOrders => pick(
                lang,
                "You have no orders yet.",
                "У вас пока нет заказов.",
                "Nie masz jeszcze żadnych zamówień.",
            )
            .into(),
            Msg::OrderEntry { order_id, date, status, total } => fill(
                pick(
                    lang,
                    "Order #{id} ({date})\n{emoji} Status: {status}\n💰 Total: {total}",
                    "Заказ #{id} ({date})\n{emoji} Статус: {status}\n💰 Сумма: {total}",
                    "Zamówienie #{id} ({date})\n{emoji} Status: {status}\n💰 Razem: {total}",
                )
            )
            .arg("id", order_id)
            .arg("date", date)
            .arg("emoji", status_emoji(*status))
            .arg("status", status_name(*status, lang))
            .arg("total", total)
            .done(),
            Msg::OrderCancelled { order_id } => fill(
                pick(lang, "❌ Order #{id} cancelled.", "❌ Заказ #{id} отменен.", "❌ Zamówienie #{id} anulowane.")
            )
            .arg("id", order_id)
            .done(),
            Msg::InvalidTransition { order_id } => fill(
                pick(
                    lang,
                    "⚠️ Order #{id} has already been processed or is in a final state.",
                    "⚠️ Заказ #{id} уже обработан или находится в конечном статусе.",
                    "⚠️ Zamówienie #{id} zostało już przetworzone lub jest w stanie końcowym.",
                )
            )
            .arg("id", order_id)
            .done(),

            Msg::AccessDenied => pick(
                lang,
                "🚫 Access Denied. You are not an administrator.",
                "🚫 Доступ запрещен. Вы не администратор.",
                "🚫 Dostęp zabroniony. Nie jesteś administratorem.",
            )
            .into(),
            Msg::AdminProcessing { order_id } => fill(
                pick(lang, "✅ Order #{id} approved.", "✅ Заказ #{id} одобрен.", "✅ Zamówienie #{id} zatwierdzone.")
            )
            .arg("id", order_id)
            .done(),
            Msg::AdminDelivered { order_id } => fill(
                pick(
                    lang,
                    "🔄 Order #{id} status updated to Completed.",
                    "🔄 Статус заказа #{id} обновлен на Завершен.",
                    "🔄 Status zamówienia #{id} zaktualizowany na Zakończone.",
                )
            )
            .arg("id", order_id)
            .done(),
            Msg::AdminRejected { order_id } => fill(
                pick(lang, "🚫 Order #{id} rejected.", "🚫 Заказ #{id} отклонен.", "🚫 Zamówienie #{id} odrzucone.")
            )
            .arg("id", order_id)
            .done(),

            Msg::StatusChanged { order_id, status, note } => {
                let mut text = fill(
                    pick(
                        lang,
                        "{emoji} Order #{id}: {status}",
                        "{emoji} Заказ #{id}: {status}",
                        "{emoji} Zamówienie #{id}: {status}",
                    )
                )
                .arg("emoji", status_emoji(*status))
                .arg("id", order_id)
                .arg("status", status_name(*status, lang))
                .done();
                if let Some(note) = note {
                    text.push('\n');
                    text.push_str(note);
                }
                text
            }
        }
    }
}
