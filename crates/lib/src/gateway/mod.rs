//! Gateway: the single sequential loop between the SMS and XMPP boundaries.
//!
//! Owns translation in both directions and the delivery-receipt table for one run.

mod error;
mod process;
mod receipts;
mod translate;

pub use error::{GatewayError, TranslateError};
pub use process::Gateway;
pub use receipts::ReceiptTable;
pub use translate::{pending_receipt, sms_to_xmpp, xmpp_to_sms};
