//! Exchange REST Client (spec §4.3): RSA-PSS request signing, retry-with-
//! backoff transport, and thin fail-fast operation wrappers.

pub mod config;
pub mod operations;
pub mod signer;
pub mod transport;
pub mod types;

pub use config::RestClientConfig;
pub use operations::KalshiClient;
pub use signer::{AuthHeaders, RsaPssSigner};
pub use transport::RestTransport;
pub use types::{
    BatchOrderResult, ExchangeStatus, OrderAction, OrderFill, OrderRequest, OrderResponse, OrderSide,
    OrderStatus, OrderType, PortfolioBalance, PortfolioPosition,
};
