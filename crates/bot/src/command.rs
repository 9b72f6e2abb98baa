//! Text command parsing.

use thiserror::Error;

use shopkeep_core::{LocationId, OrderId, ProductId};
use shopkeep_orders::PaymentMethod;

use crate::i18n::Language;

/// Largest quantity accepted for a single `/add`.
pub const MAX_QUANTITY: u32 = 10_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    Language(Language),
    Locations,
    Products(LocationId),
    Add {
        product: ProductId,
        location: LocationId,
        quantity: u32,
    },
    Remove {
        product: ProductId,
        location: LocationId,
    },
    Cart,
    Clear,
    Checkout(PaymentMethod),
    Confirm,
    /// Without an order: abandon the pending checkout.
    Cancel(Option<OrderId>),
    Orders,

    Process(OrderId),
    Deliver(OrderId),
    Reject {
        order: OrderId,
        reason: String,
    },
}

impl Command {
    pub fn is_admin(&self) -> bool {
        matches!(
            self,
            Command::Process(_) | Command::Deliver(_) | Command::Reject { .. }
        )
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("unknown command")]
    Unknown,

    /// Known command, malformed arguments. Carries the usage line.
    #[error("usage: {0}")]
    Usage(&'static str),

    #[error("quantity must be between 1 and {MAX_QUANTITY}")]
    InvalidQuantity,
}

const LANGUAGE: &str = "/language <en|ru|pl>";
const PRODUCTS: &str = "/products <location>";
const ADD: &str = "/add <product> <location> <qty>";
const REMOVE: &str = "/remove <product> <location>";
const CHECKOUT: &str = "/checkout <cash|card|online>";
const CANCEL: &str = "/cancel [order]";
const PROCESS: &str = "/process <order>";
const DELIVER: &str = "/deliver <order>";
const REJECT: &str = "/reject <order> <reason>";

/// Parse a chat message such as `/add 3 1 2` or `/start@shop_bot`.
pub fn parse(text: &str) -> Result<Command, ParseError> {
    let text = text.trim();
    let Some(rest) = text.strip_prefix('/') else {
        return Err(ParseError::Unknown);
    };
    let (head, args) = match rest.split_once(char::is_whitespace) {
        Some((head, args)) => (head, args.trim()),
        None => (rest, ""),
    };
    // Group chats address commands as `/cmd@botname`.
    let name = head.split('@').next().unwrap_or(head).to_ascii_lowercase();
    let argv: Vec<&str> = args.split_whitespace().collect();

    let command = match name.as_str() {
        "start" => Command::Start,
        "help" => Command::Help,
        "language" | "lang" => Command::Language(one(&argv, LANGUAGE)?),
        "locations" => Command::Locations,
        "products" => Command::Products(one(&argv, PRODUCTS)?),
        "add" => {
            let [product, location, quantity] = exact::<3>(&argv, ADD)?;
            Command::Add {
                product: id(product, ADD)?,
                location: id(location, ADD)?,
                quantity: parse_quantity(quantity)?,
            }
        }
        "remove" => {
            let [product, location] = exact::<2>(&argv, REMOVE)?;
            Command::Remove {
                product: id(product, REMOVE)?,
                location: id(location, REMOVE)?,
            }
        }
        "cart" => Command::Cart,
        "clear" => Command::Clear,
        "checkout" => Command::Checkout(one(&argv, CHECKOUT)?),
        "confirm" => Command::Confirm,
        "cancel" => match argv.as_slice() {
            [] => Command::Cancel(None),
            [order] => Command::Cancel(Some(id(order, CANCEL)?)),
            _ => return Err(ParseError::Usage(CANCEL)),
        },
        "orders" => Command::Orders,
        "process" => Command::Process(one(&argv, PROCESS)?),
        "deliver" => Command::Deliver(one(&argv, DELIVER)?),
        "reject" => {
            let Some((order, reason)) = args.split_once(char::is_whitespace) else {
                return Err(ParseError::Usage(REJECT));
            };
            let reason = reason.trim();
            if reason.is_empty() {
                return Err(ParseError::Usage(REJECT));
            }
            Command::Reject {
                order: id(order, REJECT)?,
                reason: reason.to_string(),
            }
        }
        _ => return Err(ParseError::Unknown),
    };
    Ok(command)
}

fn exact<const N: usize>(argv: &[&str], usage: &'static str) -> Result<[String; N], ParseError> {
    let owned: Vec<String> = argv.iter().map(|a| a.to_string()).collect();
    owned.try_into().map_err(|_| ParseError::Usage(usage))
}

fn one<T: core::str::FromStr>(argv: &[&str], usage: &'static str) -> Result<T, ParseError> {
    match argv {
        [value] => value.parse().map_err(|_| ParseError::Usage(usage)),
        _ => Err(ParseError::Usage(usage)),
    }
}

fn id<T: core::str::FromStr>(value: impl AsRef<str>, usage: &'static str) -> Result<T, ParseError> {
    value.as_ref().parse().map_err(|_| ParseError::Usage(usage))
}

fn parse_quantity(value: impl AsRef<str>) -> Result<u32, ParseError> {
    match value.as_ref().parse::<u32>() {
        Ok(q) if (1..=MAX_QUANTITY).contains(&q) => Ok(q),
        _ => Err(ParseError::InvalidQuantity),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_and_addressed_commands() {
        assert_eq!(parse("/start"), Ok(Command::Start));
        assert_eq!(parse("  /HELP@shop_bot "), Ok(Command::Help));
        assert_eq!(parse("/language pl"), Ok(Command::Language(Language::Pl)));
        assert_eq!(parse("/products #2"), Ok(Command::Products(LocationId::new(2))));
    }

    #[test]
    fn parses_cart_commands() {
        assert_eq!(
            parse("/add 3 1 2"),
            Ok(Command::Add {
                product: ProductId::new(3),
                location: LocationId::new(1),
                quantity: 2,
            })
        );
        assert_eq!(
            parse("/checkout card"),
            Ok(Command::Checkout(PaymentMethod::Card))
        );
        assert_eq!(parse("/cancel"), Ok(Command::Cancel(None)));
        assert_eq!(parse("/cancel 17"), Ok(Command::Cancel(Some(OrderId::new(17)))));
    }

    #[test]
    fn reject_keeps_the_whole_reason() {
        assert_eq!(
            parse("/reject 5 out of stock at pickup"),
            Ok(Command::Reject {
                order: OrderId::new(5),
                reason: "out of stock at pickup".into(),
            })
        );
        assert_eq!(parse("/reject 5"), Err(ParseError::Usage(REJECT)));
        assert!(parse("/reject 5 nope").unwrap().is_admin());
    }

    #[test]
    fn rejects_bad_input() {
        assert_eq!(parse("hello"), Err(ParseError::Unknown));
        assert_eq!(parse("/frobnicate"), Err(ParseError::Unknown));
        assert_eq!(parse("/add 3 1"), Err(ParseError::Usage(ADD)));
        assert_eq!(parse("/add x 1 2"), Err(ParseError::Usage(ADD)));
        assert_eq!(parse("/add 3 1 0"), Err(ParseError::InvalidQuantity));
        assert_eq!(parse("/add 3 1 10001"), Err(ParseError::InvalidQuantity));
        assert_eq!(parse("/checkout bitcoin"), Err(ParseError::Usage(CHECKOUT)));
    }
}
