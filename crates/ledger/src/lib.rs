//! Item ledger: tokens, the item model and the guarded transition.
//!
//! Every other component changes item state through [`ItemLedger::transition`].

pub mod in_memory;
pub mod item;
pub mod ledger;
pub mod token;

pub use in_memory::InMemoryItemLedger;
pub use item::{Item, ItemState, check_transition};
pub use ledger::{
    ItemFilter, ItemLedger, ItemSpec, MAX_BATCH_SIZE, MAX_TOKEN_ATTEMPTS, create_items,
};
pub use token::{
    DEFAULT_SCAN_PREFIX, Token, TokenGenerator, generate_scan_token, generate_short_token,
};
