//! Connection Lifecycle Manager (spec §4.2): a generic reconnect/health-
//! monitor/state-machine core plus REST, WebSocket, and scraper
//! specializations of the `ConnectionHandler` hook set.

pub mod handler;
pub mod lifecycle;
pub mod rest;
pub mod scraper;
pub mod state;
pub mod websocket;

pub use handler::ConnectionHandler;
pub use lifecycle::{ConnectionLifecycle, ConnectionStatus, LifecycleConfig};
pub use rest::{NoopSigner, RequestSigner, RestConfig, RestConnectionHandler};
pub use scraper::{ContentValidator, NonEmptyValidator, ScrapeResult, ScraperConfig, ScraperConnectionHandler};
pub use state::{ConnectionState, StateMachine, StateTransition};
pub use websocket::{WebSocketConfig, WebSocketConnectionHandler};
