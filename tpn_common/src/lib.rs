mod helpers;
mod nano;
mod secret;

pub use helpers::parse_boolean_flag;
pub use nano::{NanoTon, NanoTonConversionError, NANO_PER_TON, TON_CURRENCY_CODE, TON_DECIMALS};
pub use secret::Secret;
